use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use acumen_agents::DataHub;
use acumen_intel::{HttpReasoningClient, HttpScoringClient, HttpValidationClient};
use acumen_pipeline::{default_registry, QueryEngine};
use acumen_types::{AcumenError, Result};

/// Server configuration, read from the environment with local-dev defaults.
///
/// Collaborator URLs are optional: unset means the deterministic local
/// implementations, set means the corresponding HTTP client.
#[derive(Debug, Clone)]
pub struct Settings {
    pub addr: SocketAddr,
    pub data_root: PathBuf,
    pub scoring_url: Option<String>,
    pub reasoning_url: Option<String>,
    pub validation_url: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let addr = std::env::var("ACUMEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| AcumenError::Other(format!("invalid ACUMEN_ADDR '{addr}': {e}")))?;
        let data_root = std::env::var("ACUMEN_DATA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                tracing::warn!("ACUMEN_DATA_ROOT not set, using ./data");
                PathBuf::from("./data")
            });

        Ok(Self {
            addr,
            data_root,
            scoring_url: std::env::var("ACUMEN_SCORING_URL").ok(),
            reasoning_url: std::env::var("ACUMEN_REASONING_URL").ok(),
            validation_url: std::env::var("ACUMEN_VALIDATION_URL").ok(),
        })
    }

    /// Engine over the file-backed data hub, with remote collaborators wired
    /// in wherever a URL is configured.
    pub fn build_engine(&self) -> QueryEngine {
        let hub = DataHub::file_backed(&self.data_root);
        let mut engine = QueryEngine::new(default_registry(hub));

        if let Some(url) = &self.scoring_url {
            tracing::info!(url = %url, "using remote scoring service");
            engine = engine.with_scoring(Arc::new(HttpScoringClient::new(url.clone())));
        }
        if let Some(url) = &self.reasoning_url {
            tracing::info!(url = %url, "using remote reasoning service");
            engine = engine.with_reasoning(Arc::new(HttpReasoningClient::new(url.clone())));
        }
        if let Some(url) = &self.validation_url {
            tracing::info!(url = %url, "using remote validation service");
            engine = engine.with_validation(Arc::new(HttpValidationClient::new(url.clone())));
        }
        engine
    }
}
