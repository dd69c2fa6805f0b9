//! Data source connectors for the extraction stage.
//!
//! A [`DataHub`] holds one connector per upstream source (bank feed,
//! e-commerce platform, OCR document store). Connectors return raw,
//! source-shaped records; the [`crate::extraction`] module normalizes them
//! into [`acumen_types::Transaction`] values.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use acumen_types::{AcumenError, Payload, Result};

// ---------------------------------------------------------------------------
// SourceKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Bank,
    Ecommerce,
    Ocr,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Bank => "bank",
            SourceKind::Ecommerce => "ecommerce",
            SourceKind::Ocr => "ocr",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SourceConnector trait
// ---------------------------------------------------------------------------

/// One independent data source the extraction stage can ingest from.
///
/// `fetch` resolves a query's data reference (e.g. `last_90_days`) to the raw
/// records this source holds for it. Returning an empty vector means the
/// tenant has no data in this source, which is not an error.
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Short identifier recorded on every transaction ("bank", "ocr", ...).
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    async fn fetch(&self, data_ref: &str) -> Result<Vec<Payload>>;
}

// ---------------------------------------------------------------------------
// StaticConnector
// ---------------------------------------------------------------------------

/// In-memory connector serving a fixed record set. Used by tests and demos.
pub struct StaticConnector {
    name: String,
    kind: SourceKind,
    records: Vec<Payload>,
}

impl StaticConnector {
    pub fn new(kind: SourceKind, records: Vec<Payload>) -> Self {
        Self {
            name: kind.as_str().to_string(),
            kind,
            records,
        }
    }

    /// Connector with a custom name, e.g. two bank feeds side by side.
    pub fn named(name: impl Into<String>, kind: SourceKind, records: Vec<Payload>) -> Self {
        Self {
            name: name.into(),
            kind,
            records,
        }
    }
}

#[async_trait]
impl SourceConnector for StaticConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, _data_ref: &str) -> Result<Vec<Payload>> {
        Ok(self.records.clone())
    }
}

// ---------------------------------------------------------------------------
// JsonFileConnector
// ---------------------------------------------------------------------------

/// Connector backed by JSON files on disk.
///
/// Records for a data reference live at `<root>/<data_ref>/<name>.json`, a
/// JSON array of raw records. A missing file means the tenant has no data in
/// this source and yields an empty record set. Read failures are transient
/// (the file may reappear); malformed JSON is not.
pub struct JsonFileConnector {
    name: String,
    kind: SourceKind,
    root: PathBuf,
}

impl JsonFileConnector {
    pub fn new(kind: SourceKind, root: impl Into<PathBuf>) -> Self {
        Self {
            name: kind.as_str().to_string(),
            kind,
            root: root.into(),
        }
    }
}

#[async_trait]
impl SourceConnector for JsonFileConnector {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, data_ref: &str) -> Result<Vec<Payload>> {
        let path = self
            .root
            .join(data_ref_dir(data_ref))
            .join(format!("{}.json", self.name));

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(source = %self.name, path = %path.display(), "no data file for source");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(AcumenError::Agent {
                    stage: "extraction".to_string(),
                    message: format!("source '{}' unavailable: {}", self.name, e),
                    transient: true,
                });
            }
        };

        let records: Vec<Payload> =
            serde_json::from_slice(&bytes).map_err(|e| AcumenError::Agent {
                stage: "extraction".to_string(),
                message: format!("source '{}' returned malformed records: {}", self.name, e),
                transient: false,
            })?;

        tracing::debug!(source = %self.name, records = records.len(), "fetched source records");
        Ok(records)
    }
}

/// Map a data reference onto a relative directory, stripping the optional
/// `dataset://` scheme and any path-traversal components.
fn data_ref_dir(data_ref: &str) -> PathBuf {
    let trimmed = data_ref.strip_prefix("dataset://").unwrap_or(data_ref);
    trimmed
        .split('/')
        .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
        .collect()
}

// ---------------------------------------------------------------------------
// DataHub
// ---------------------------------------------------------------------------

/// The set of source connectors available to the extraction stage.
#[derive(Clone, Default)]
pub struct DataHub {
    connectors: Vec<Arc<dyn SourceConnector>>,
}

impl DataHub {
    /// Hub with no connectors. Extraction over an empty hub produces no
    /// transactions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Hub with the three file-backed production sources rooted at `root`.
    pub fn file_backed(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        Self::default()
            .with_connector(JsonFileConnector::new(SourceKind::Bank, root.clone()))
            .with_connector(JsonFileConnector::new(SourceKind::Ecommerce, root.clone()))
            .with_connector(JsonFileConnector::new(SourceKind::Ocr, root))
    }

    pub fn with_connector(mut self, connector: impl SourceConnector + 'static) -> Self {
        self.connectors.push(Arc::new(connector));
        self
    }

    pub fn connectors(&self) -> &[Arc<dyn SourceConnector>] {
        &self.connectors
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }
}
