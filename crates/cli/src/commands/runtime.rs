//! Wiring shared by every command: config, stores, provider and index.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use mnemo_agent::ChatService;
use mnemo_config::AppConfig;
use mnemo_core::error::ProviderError;
use mnemo_core::note::NoteStore;
use mnemo_core::provider::Provider;
use mnemo_core::session::SessionStore;
use mnemo_store::{InMemoryStore, SqliteStore};
use mnemo_vectorstore::{EmbeddingFunction, HashingEmbedder, ProviderEmbedder, VectorStore};
use tracing::{info, warn};

pub struct Runtime {
    pub config: AppConfig,
    pub sessions: Arc<dyn SessionStore>,
    pub notes: Arc<dyn NoteStore>,
    pub index: Arc<VectorStore>,
    pub provider: Option<Arc<dyn Provider>>,
}

impl Runtime {
    /// Load config and open every backing service.
    pub async fn open(config_path: Option<&Path>) -> anyhow::Result<Self> {
        let config = AppConfig::load(config_path).context("failed to load config")?;

        let provider = match mnemo_providers::build_from_config(&config) {
            Ok(p) => Some(p),
            Err(ProviderError::NotConfigured(_)) => {
                warn!("No API key configured; chat is disabled");
                None
            }
            Err(e) => return Err(e).context("failed to build provider"),
        };

        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;

        let (sessions, notes): (Arc<dyn SessionStore>, Arc<dyn NoteStore>) =
            match config.store.backend.as_str() {
                "memory" => {
                    let store = InMemoryStore::new();
                    (Arc::new(store.clone()), Arc::new(store))
                }
                _ => {
                    let path = config.database_path();
                    let store = SqliteStore::new(&path.to_string_lossy())
                        .await
                        .with_context(|| format!("failed to open database {}", path.display()))?;
                    (Arc::new(store.clone()), Arc::new(store))
                }
            };

        let embedder: Arc<dyn EmbeddingFunction> = match &provider {
            Some(p) => Arc::new(ProviderEmbedder::new(p.clone(), config.embedding_model.clone())),
            None => Arc::new(HashingEmbedder::default()),
        };
        let index = VectorStore::open(config.vector_dir(), embedder)
            .await
            .context("failed to open vector index")?;

        info!(
            backend = %config.store.backend,
            data_dir = %data_dir.display(),
            model = %config.model,
            "Runtime ready"
        );

        Ok(Self {
            config,
            sessions,
            notes,
            index: Arc::new(index),
            provider,
        })
    }

    pub fn chat_service(&self) -> ChatService {
        let service = ChatService::new(
            self.sessions.clone(),
            self.notes.clone(),
            self.config.model.clone(),
            self.config.agent.clone(),
        )
        .with_index(self.index.clone());
        match &self.provider {
            Some(provider) => service.with_provider(provider.clone()),
            None => service,
        }
    }
}
