//! Engine facade
//!
//! Wires the store, planner, graph, ingestion, analyzer, session tracker,
//! and rate limiter into one handle the transport adapters consume. Real
//! service clients come from configuration; tests inject stubs through
//! `with_services`.

use std::sync::Arc;

use tracing::{info, warn};

use crate::analyze::Analyzer;
use crate::config::UltrathinkConfig;
use crate::error::Result;
use crate::graph::Graph;
use crate::ingest::Ingestor;
use crate::ratelimit::RateLimiter;
use crate::search::SearchPlanner;
use crate::services::{
    ChatService, Embedder, OllamaChat, OllamaEmbedder, QdrantIndex, VectorStore,
};
use crate::session::SessionTracker;
use crate::storage::Store;

pub struct Engine {
    store: Arc<Store>,
    planner: Arc<SearchPlanner>,
    graph: Arc<Graph>,
    ingestor: Arc<Ingestor>,
    analyzer: Arc<Analyzer>,
    sessions: Arc<SessionTracker>,
    limiter: Arc<RateLimiter>,
    /// Kept for startup collection provisioning
    qdrant: Option<Arc<QdrantIndex>>,
}

impl Engine {
    /// Build from configuration, constructing real service clients for the
    /// enabled collaborators.
    pub fn from_config(config: &UltrathinkConfig) -> Result<Self> {
        let db_path = config.resolve_db_path()?;
        let store = Arc::new(Store::new(db_path)?);

        let embedder: Option<Arc<dyn Embedder>> = if config.ollama.enabled {
            Some(Arc::new(OllamaEmbedder::new(&config.ollama)))
        } else {
            None
        };
        let chat: Option<Arc<dyn ChatService>> = if config.ollama.enabled {
            Some(Arc::new(OllamaChat::new(&config.ollama)))
        } else {
            None
        };
        let qdrant = if config.qdrant.enabled {
            Some(Arc::new(QdrantIndex::new(
                &config.qdrant,
                config.ollama.embedding_dimensions,
            )))
        } else {
            None
        };
        let vectors: Option<Arc<dyn VectorStore>> = qdrant
            .as_ref()
            .map(|q| Arc::clone(q) as Arc<dyn VectorStore>);

        Self::assemble(config, store, embedder, vectors, chat, qdrant)
    }

    /// Build with injected services; the seam the tests use.
    pub fn with_services(
        config: &UltrathinkConfig,
        store: Arc<Store>,
        embedder: Option<Arc<dyn Embedder>>,
        vectors: Option<Arc<dyn VectorStore>>,
        chat: Option<Arc<dyn ChatService>>,
    ) -> Result<Self> {
        Self::assemble(config, store, embedder, vectors, chat, None)
    }

    fn assemble(
        config: &UltrathinkConfig,
        store: Arc<Store>,
        embedder: Option<Arc<dyn Embedder>>,
        vectors: Option<Arc<dyn VectorStore>>,
        chat: Option<Arc<dyn ChatService>>,
        qdrant: Option<Arc<QdrantIndex>>,
    ) -> Result<Self> {
        let sessions = Arc::new(SessionTracker::new(Arc::clone(&store), &config.session));
        let planner = Arc::new(SearchPlanner::new(
            Arc::clone(&store),
            embedder.clone(),
            vectors.clone(),
        ));
        let graph = Arc::new(Graph::new(Arc::clone(&store)));
        let ingestor = Arc::new(Ingestor::new(
            Arc::clone(&store),
            Arc::clone(&sessions),
            embedder,
            vectors,
        ));
        let analyzer = Arc::new(Analyzer::new(Arc::clone(&planner), chat));
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            store,
            planner,
            graph,
            ingestor,
            analyzer,
            sessions,
            limiter,
            qdrant,
        })
    }

    /// Best-effort startup provisioning of external collaborators. A missing
    /// vector service is not fatal; retrieval degrades to lexical.
    pub async fn connect_services(&self) {
        if let Some(qdrant) = &self.qdrant {
            match qdrant.ensure_collection().await {
                Ok(()) => info!("vector collection ready"),
                Err(err) => {
                    warn!("vector index unavailable, semantic search will degrade: {err}")
                }
            }
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn planner(&self) -> &Arc<SearchPlanner> {
        &self.planner
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn ingestor(&self) -> &Arc<Ingestor> {
        &self.ingestor
    }

    pub fn analyzer(&self) -> &Arc<Analyzer> {
        &self.analyzer
    }

    pub fn sessions(&self) -> &Arc<SessionTracker> {
        &self.sessions
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}
