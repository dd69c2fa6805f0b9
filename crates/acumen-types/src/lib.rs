//! Shared types, errors, execution context, and results for the Acumen engine.
//!
//! This crate provides the foundational types used across all other Acumen crates:
//! - `AcumenError` — unified error taxonomy
//! - `ExecutionContext` — per-query state threaded through the pipeline
//! - `AgentResult` / `AggregatedResult` — per-stage and final outputs
//! - `AuditRecord` — append-only trace of every stage execution
//! - `CancelHandle` — cooperative cancellation signal

use serde::{Deserialize, Serialize};

/// Unified error type for all Acumen subsystems.
#[derive(Debug, thiserror::Error)]
pub enum AcumenError {
    // === Parser errors ===
    #[error("AgentQL parse error at line {line}, col {col}: {message}")]
    Parse {
        line: usize,
        col: usize,
        message: String,
        source_snippet: Option<String>,
    },

    // === Compiler errors ===
    #[error("Unknown agent '{stage}' in EXECUTE chain")]
    UnknownAgent { stage: String },

    #[error("Contract mismatch: stage '{stage}' requires field '{field}' which no upstream stage produces")]
    ContractMismatch { stage: String, field: String },

    // === Runtime stage errors ===
    #[error("Agent '{stage}' failed: {message}")]
    Agent {
        stage: String,
        message: String,
        transient: bool,
    },

    #[error("Stage '{stage}' timed out after {timeout_ms}ms")]
    StageTimeout { stage: String, timeout_ms: u64 },

    #[error("Max retries exhausted for stage '{stage}' after {attempts} attempts")]
    RetriesExhausted { stage: String, attempts: u32 },

    // === Collaborator errors ===
    #[error("Collaborator {service} returned HTTP {status}: {message}")]
    Collaborator {
        service: String,
        status: u16,
        message: String,
        retryable: bool,
    },

    #[error("Authentication failed for collaborator {service}")]
    CollaboratorAuth { service: String },

    // === Aggregation ===
    #[error("Aggregation invariant violated: {0}")]
    Aggregation(String),

    // === Control ===
    #[error("Query cancelled")]
    Cancelled,

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl AcumenError {
    /// Returns `true` if the error is transient and the stage may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AcumenError::StageTimeout { .. }
                | AcumenError::Agent {
                    transient: true,
                    ..
                }
                | AcumenError::Collaborator {
                    retryable: true,
                    ..
                }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AcumenError::Parse { .. }
                | AcumenError::UnknownAgent { .. }
                | AcumenError::ContractMismatch { .. }
                | AcumenError::CollaboratorAuth { .. }
                | AcumenError::Aggregation(_)
        )
    }

    /// Maps the error to an HTTP status code for server mode.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            AcumenError::Parse { .. }
            | AcumenError::UnknownAgent { .. }
            | AcumenError::ContractMismatch { .. } => Some(400),
            AcumenError::CollaboratorAuth { .. } => Some(401),
            AcumenError::Collaborator { status, .. } => Some(*status),
            AcumenError::StageTimeout { .. } => Some(504),
            AcumenError::Aggregation(_) => Some(500),
            _ => None,
        }
    }
}

/// A convenience alias for `Result<T, AcumenError>`.
pub type Result<T> = std::result::Result<T, AcumenError>;

/// Named output fields produced (or consumed) by a stage. serde_json's map is
/// BTree-backed, so serialized key order is stable across runs.
pub type Payload = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Severity / RiskFactor — the risk vocabulary shared by agents and results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// High-severity factors must be referenced by the explanation (validation
    /// completeness check).
    pub fn is_high(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

/// One detected risk, e.g. `negative_cashflow` / "Negative cashflow detected: -8100.00".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFactor {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub severity: Severity,
}

impl RiskFactor {
    pub fn new(kind: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            severity,
        }
    }
}

// ---------------------------------------------------------------------------
// Transaction — normalized financial record produced by the Extraction agent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: chrono::NaiveDate,
    /// Positive magnitude; direction is carried by `kind`.
    pub amount: f64,
    pub kind: TransactionKind,
    pub category: String,
    pub description: String,
    pub source: String,
}

impl Transaction {
    /// Amount with sign applied: income positive, expense negative.
    pub fn signed_amount(&self) -> f64 {
        match self.kind {
            TransactionKind::Income => self.amount,
            TransactionKind::Expense => -self.amount,
        }
    }
}

// ---------------------------------------------------------------------------
// StageStatus / AgentResult — per-stage execution outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
    TimedOut,
}

/// The recorded outcome of one stage. `error` is present iff the stage did not succeed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub stage_name: String,
    pub status: StageStatus,
    pub payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
}

impl AgentResult {
    pub fn succeeded(
        stage: impl Into<String>,
        payload: Payload,
        started_at: chrono::DateTime<chrono::Utc>,
        finished_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self {
            stage_name: stage.into(),
            status: StageStatus::Succeeded,
            payload,
            error: None,
            started_at,
            finished_at,
        }
    }

    /// A non-success outcome. `status` must be `Failed`, `Skipped`, or `TimedOut`.
    pub fn failure(
        stage: impl Into<String>,
        status: StageStatus,
        error: impl Into<String>,
        started_at: chrono::DateTime<chrono::Utc>,
        finished_at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        debug_assert!(status != StageStatus::Succeeded);
        Self {
            stage_name: stage.into(),
            status,
            payload: Payload::new(),
            error: Some(error.into()),
            started_at,
            finished_at,
        }
    }

    /// A stage that never ran (cancellation). Timestamps collapse to the skip instant.
    pub fn skipped(
        stage: impl Into<String>,
        reason: impl Into<String>,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        Self::failure(stage, StageStatus::Skipped, reason, at, at)
    }
}

// ---------------------------------------------------------------------------
// QueryStatus / ValidationVerdict / AggregatedResult — the final answer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Complete,
    Partial,
    Failed,
}

/// Verdict of the post-aggregation validation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub ok: bool,
    pub notes: String,
}

impl ValidationVerdict {
    pub fn passing() -> Self {
        Self {
            ok: true,
            notes: String::new(),
        }
    }

    pub fn failing(notes: impl Into<String>) -> Self {
        Self {
            ok: false,
            notes: notes.into(),
        }
    }
}

impl Default for ValidationVerdict {
    fn default() -> Self {
        Self::passing()
    }
}

/// Projection of a query's return fields over everything the pipeline produced.
///
/// `score`, `risk_factors`, and `explanation` are structural slots; any other
/// requested fields are flattened alongside them. Requested fields nothing
/// produced are omitted entirely so a client can tell "no alerts" apart from
/// "alerts stage never ran".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub risk_factors: Vec<RiskFactor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub validation: ValidationVerdict,
    pub status: QueryStatus,
    #[serde(flatten)]
    pub fields: Payload,
}

impl AggregatedResult {
    /// An empty result shell with the given status.
    pub fn empty(status: QueryStatus) -> Self {
        Self {
            score: None,
            risk_factors: Vec::new(),
            explanation: None,
            recommendations: Vec::new(),
            confidence: None,
            validation: ValidationVerdict::passing(),
            status,
            fields: Payload::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// AuditRecord — append-only trace of one stage execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub query_id: uuid::Uuid,
    pub stage_name: String,
    /// Snapshot of the input fields the stage consumed.
    pub inputs: Payload,
    /// Names of the fields the stage produced.
    pub output_fields: Vec<String>,
    pub duration_ms: u64,
    pub status: StageStatus,
}

// ---------------------------------------------------------------------------
// CancelHandle — cooperative cancellation shared with the engine
// ---------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation signal. The engine checks it between stages and races
/// in-flight stages against [`cancelled`](CancelHandle::cancelled).
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    flag: AtomicBool,
    notify: tokio::sync::Notify,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancelInner {
                flag: AtomicBool::new(false),
                notify: tokio::sync::Notify::new(),
            }),
        }
    }

    /// Request cancellation. Idempotent; wakes every waiter.
    pub fn cancel(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before re-checking the flag so a cancel() between the
            // check and the await cannot be missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ExecutionContext — per-query state, exclusively owned by one engine run
// ---------------------------------------------------------------------------

/// Mutable per-query state threaded through the pipeline. Owned by exactly one
/// engine run; only the [`CancelHandle`] is shared outward.
#[derive(Debug)]
pub struct ExecutionContext {
    pub query_id: uuid::Uuid,
    pub tenant_id: String,
    pub data_ref: String,
    outputs: Vec<AgentResult>,
    cancel: CancelHandle,
}

impl ExecutionContext {
    pub fn new(tenant_id: impl Into<String>, data_ref: impl Into<String>) -> Self {
        Self {
            query_id: uuid::Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            data_ref: data_ref.into(),
            outputs: Vec::new(),
            cancel: CancelHandle::new(),
        }
    }

    /// Attach an externally held cancellation handle.
    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Record a stage result. Stages execute at most once; a second result for
    /// the same stage is an engine bug and surfaces as an `Aggregation` error.
    pub fn record(&mut self, result: AgentResult) -> Result<()> {
        if self.output(&result.stage_name).is_some() {
            return Err(AcumenError::Aggregation(format!(
                "stage '{}' recorded twice",
                result.stage_name
            )));
        }
        self.outputs.push(result);
        Ok(())
    }

    /// The recorded result for a stage, if it has run.
    pub fn output(&self, stage: &str) -> Option<&AgentResult> {
        self.outputs.iter().find(|r| r.stage_name == stage)
    }

    /// All recorded results in execution order.
    pub fn outputs(&self) -> &[AgentResult] {
        &self.outputs
    }

    /// Look up a produced field across all stage payloads, later stages
    /// shadowing earlier ones (last-writer-wins).
    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.outputs
            .iter()
            .rev()
            .find_map(|r| r.payload.get(name))
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
