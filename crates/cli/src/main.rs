//! mnemo CLI entry point.
//!
//! Commands:
//! - `init`: Write a default config file
//! - `serve`: Start the HTTP API server
//! - `ask`: Ask the agent one question from the terminal
//! - `reindex`: Rebuild a user's vector index from their notes

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "mnemo",
    about = "mnemo: an AI assistant over your private notes",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.mnemo/config.toml)
    #[arg(short, long, global = true, env = "MNEMO_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Ask the agent a single question
    Ask {
        /// The question
        message: String,

        /// User to act as
        #[arg(short, long, default_value_t = 1)]
        user: i32,

        /// Continue an existing session instead of starting a new one
        #[arg(short, long)]
        session: Option<String>,

        /// Only cite notes carrying this tag
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// Rebuild a user's vector index from the note store
    Reindex {
        /// User whose notes to index
        #[arg(short, long, default_value_t = 1)]
        user: i32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init { force } => commands::init::run(config_path, force)?,
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Ask {
            message,
            user,
            session,
            tag,
        } => commands::ask::run(config_path, user, session, tag, message).await?,
        Commands::Reindex { user } => commands::reindex::run(config_path, user).await?,
    }

    Ok(())
}
