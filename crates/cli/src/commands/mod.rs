pub mod ask;
pub mod init;
pub mod reindex;
pub mod runtime;
pub mod serve;
