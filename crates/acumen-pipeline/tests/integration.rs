//! End-to-end integration tests for the Acumen query engine.
//!
//! Each test exercises the full path: parse AgentQL -> compile -> run stages ->
//! enrich -> aggregate -> validate, over JSON fixtures on disk.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde_json::{json, Value};
use tempfile::TempDir;

use acumen_agents::{DataHub, SourceConnector, SourceKind};
use acumen_intel::{
    FeatureVector, ScoreOutcome, ScoringService, ValidateRequest, ValidationService,
};
use acumen_pipeline::{
    default_registry, Agent, BackoffPolicy, EngineConfig, QueryEngine, QueryEvent,
};
use acumen_types::{
    AcumenError, CancelHandle, ExecutionContext, Payload, QueryStatus, Result, Severity,
    StageStatus, ValidationVerdict,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const FULL_QUERY: &str = "QUERY sme_credit_check \
     USING last_90_days \
     EXECUTE extraction -> monitoring -> forecasting \
     RETURN score, explanation, risk_factors";

/// Write a bank statement fixture: one credit and one debit per day, starting
/// 2025-01-01, under `<root>/<data_ref>/bank.json` where the file-backed hub
/// looks for it.
fn write_bank_fixture(root: &Path, data_ref: &str, days: u64, income: f64, expense: f64) {
    let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    let mut records = Vec::new();
    for i in 0..days {
        let date = (start + Days::new(i)).format("%Y-%m-%d").to_string();
        records.push(json!({
            "date": date,
            "amount": income,
            "description": "Client payment",
            "type": "credit",
        }));
        records.push(json!({
            "date": date,
            "amount": expense,
            "description": "Operating costs",
            "type": "debit",
        }));
    }
    let dir = root.join(data_ref);
    std::fs::create_dir_all(&dir).expect("fixture dir");
    std::fs::write(
        dir.join("bank.json"),
        serde_json::to_string_pretty(&records).expect("fixture json"),
    )
    .expect("fixture write");
}

/// Engine over a 90-day bank fixture with constant daily income and expense.
fn fixture_engine(dir: &TempDir, income: f64, expense: f64) -> QueryEngine {
    write_bank_fixture(dir.path(), "last_90_days", 90, income, expense);
    QueryEngine::new(default_registry(DataHub::file_backed(dir.path())))
}

/// Compact label for an event, so sequences can be compared in one assert.
fn label(event: &QueryEvent) -> String {
    match event {
        QueryEvent::QueryStarted { .. } => "query_started".to_string(),
        QueryEvent::StageStarted { stage, .. } => format!("started:{stage}"),
        QueryEvent::StageCompleted { stage, .. } => format!("completed:{stage}"),
        QueryEvent::StageRetrying { stage, attempt, .. } => format!("retrying:{stage}:{attempt}"),
        QueryEvent::StageFailed { stage, .. } => format!("failed:{stage}"),
        QueryEvent::ValidationChecked { ok, .. } => format!("validated:{ok}"),
        QueryEvent::QueryCancelled { .. } => "query_cancelled".to_string(),
        QueryEvent::QueryCompleted { status, .. } => format!("query_completed:{status}"),
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<QueryEvent>) -> Vec<String> {
    let mut labels = Vec::new();
    while let Ok(event) = rx.try_recv() {
        labels.push(label(&event));
    }
    labels
}

/// Bank connector that fails the first `failures` fetches, then serves two
/// fixed records. `calls` counts every fetch.
struct FlakyConnector {
    calls: Arc<AtomicUsize>,
    failures: usize,
    transient: bool,
}

#[async_trait]
impl SourceConnector for FlakyConnector {
    fn name(&self) -> &str {
        "bank"
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Bank
    }

    async fn fetch(&self, _data_ref: &str) -> Result<Vec<Payload>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            return Err(AcumenError::Agent {
                stage: "extraction".to_string(),
                message: "source 'bank' unavailable: connection reset".to_string(),
                transient: self.transient,
            });
        }
        let records = json!([
            {"date": "2025-01-01", "amount": 1000.0, "description": "Invoice", "type": "credit"},
            {"date": "2025-01-01", "amount": 400.0, "description": "Rent", "type": "debit"},
        ]);
        let records: Vec<Payload> = serde_json::from_value(records).expect("records");
        Ok(records)
    }
}

/// Stage agent that never finishes, for exercising cancellation.
struct StallAgent;

#[async_trait]
impl Agent for StallAgent {
    fn name(&self) -> &str {
        "stall"
    }

    fn input_contract(&self) -> &[&str] {
        &[]
    }

    fn output_contract(&self) -> &[&str] {
        &["stalled"]
    }

    async fn run(&self, _ctx: &ExecutionContext, _inputs: &Payload) -> Result<Payload> {
        std::future::pending().await
    }
}

struct BrokenScorer;

#[async_trait]
impl ScoringService for BrokenScorer {
    async fn score(&self, _features: &FeatureVector) -> Result<ScoreOutcome> {
        Err(AcumenError::Collaborator {
            service: "scoring".to_string(),
            status: 500,
            message: "model offline".to_string(),
            retryable: false,
        })
    }

    fn name(&self) -> &str {
        "broken-scorer"
    }
}

struct FixedValidator(ValidationVerdict);

#[async_trait]
impl ValidationService for FixedValidator {
    async fn validate(&self, _request: &ValidateRequest) -> Result<ValidationVerdict> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "fixed-validator"
    }
}

struct BrokenValidator;

#[async_trait]
impl ValidationService for BrokenValidator {
    async fn validate(&self, _request: &ValidateRequest) -> Result<ValidationVerdict> {
        Err(AcumenError::Collaborator {
            service: "validation".to_string(),
            status: 503,
            message: "gateway down".to_string(),
            retryable: true,
        })
    }

    fn name(&self) -> &str {
        "broken-validator"
    }
}

// ---------------------------------------------------------------------------
// Test 1: Healthy business, full query (extract -> monitor -> forecast ->
// score -> explain -> validate)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn healthy_business_completes_with_full_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = fixture_engine(&dir, 1000.0, 600.0);

    let result = engine
        .execute(FULL_QUERY, "tenant-1")
        .await
        .expect("query should succeed");

    assert_eq!(result.status, QueryStatus::Complete);
    assert_eq!(result.score, Some(100.0), "steady surplus should score 100");
    assert_eq!(result.confidence, Some(0.95), "180 transactions should cap confidence");
    assert!(
        result.risk_factors.is_empty(),
        "no flags expected: {:?}",
        result.risk_factors
    );

    let explanation = result.explanation.as_deref().expect("explanation requested");
    assert!(
        explanation.contains("low credit risk"),
        "unexpected explanation: {explanation}"
    );
    assert!(result.validation.ok, "validator notes: {}", result.validation.notes);
    assert_eq!(
        result.recommendations.len(),
        1,
        "a clean result gets the single steady-state recommendation"
    );
}

// ---------------------------------------------------------------------------
// Test 2: Struggling business surfaces risk factors and recommendations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn struggling_business_surfaces_risk_factors() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = fixture_engine(&dir, 500.0, 800.0);

    let result = engine
        .execute(FULL_QUERY, "tenant-2")
        .await
        .expect("query should succeed");

    assert_eq!(result.status, QueryStatus::Complete);
    assert_eq!(result.score, Some(65.0));

    let kinds: Vec<&str> = result.risk_factors.iter().map(|f| f.kind.as_str()).collect();
    assert_eq!(kinds, vec!["negative_cashflow", "high_expense_ratio"]);
    assert_eq!(result.risk_factors[0].severity, Severity::High);
    assert_eq!(result.risk_factors[1].severity, Severity::Medium);

    let explanation = result.explanation.as_deref().expect("explanation requested");
    assert!(explanation.contains("moderate credit risk"), "{explanation}");
    assert!(
        explanation.contains("negative cashflow"),
        "high-severity factors must be named: {explanation}"
    );
    assert!(result.validation.ok, "validator notes: {}", result.validation.notes);
    assert!(
        result.recommendations.len() >= 2,
        "each flagged risk should carry advice: {:?}",
        result.recommendations
    );
}

// ---------------------------------------------------------------------------
// Test 3: Requested fields project into the result verbatim
// ---------------------------------------------------------------------------

#[tokio::test]
async fn requested_fields_project_into_the_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = fixture_engine(&dir, 1000.0, 600.0);

    let result = engine
        .execute(
            "QUERY projection USING last_90_days \
             EXECUTE extraction -> monitoring -> forecasting \
             RETURN fhi_score, cashflow_30d, sources",
            "tenant-1",
        )
        .await
        .expect("query should succeed");

    assert_eq!(result.status, QueryStatus::Complete);
    assert_eq!(result.fields.get("fhi_score"), Some(&json!(100.0)));
    assert_eq!(result.fields.get("sources"), Some(&json!(["bank"])));
    let points = result
        .fields
        .get("cashflow_30d")
        .and_then(Value::as_array)
        .expect("forecast points requested");
    assert_eq!(points.len(), 30, "default horizon is 30 days");

    // Nothing asked for a score, so no synthetic scoring stage ran.
    assert!(result.score.is_none());
    assert!(result.explanation.is_none());
}

// ---------------------------------------------------------------------------
// Test 4: Lifecycle events emit in stage order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lifecycle_events_emit_in_stage_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = fixture_engine(&dir, 1000.0, 600.0);
    let mut events = engine.subscribe();

    engine
        .execute(FULL_QUERY, "tenant-1")
        .await
        .expect("query should succeed");

    let labels = drain(&mut events);
    assert_eq!(
        labels,
        vec![
            "query_started",
            "started:extraction",
            "completed:extraction",
            "started:monitoring",
            "completed:monitoring",
            "started:forecasting",
            "completed:forecasting",
            "started:scoring",
            "completed:scoring",
            "started:explanation",
            "completed:explanation",
            "validated:true",
            "query_completed:complete",
        ],
        "unexpected event sequence"
    );
}

// ---------------------------------------------------------------------------
// Test 5: Identical inputs aggregate identically
// ---------------------------------------------------------------------------

#[tokio::test]
async fn identical_runs_aggregate_identically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = fixture_engine(&dir, 1000.0, 600.0);

    let first = engine.execute(FULL_QUERY, "tenant-1").await.expect("first run");
    let second = engine.execute(FULL_QUERY, "tenant-1").await.expect("second run");

    let a = serde_json::to_string(&first).expect("serialize");
    let b = serde_json::to_string(&second).expect("serialize");
    assert_eq!(a, b, "same fixture, same query, same bytes");
}

// ---------------------------------------------------------------------------
// Test 6: Malformed query text is a parse error
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_query_is_a_parse_error() {
    let engine = QueryEngine::new(default_registry(DataHub::empty()));
    let err = engine
        .execute("QUERY broken USING last_90_days RETURN score", "tenant-1")
        .await
        .expect_err("missing EXECUTE clause");
    assert!(matches!(err, AcumenError::Parse { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Test 7: Unknown stage fails at compile time
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_stage_fails_at_compile() {
    let engine = QueryEngine::new(default_registry(DataHub::empty()));
    let err = engine
        .execute(
            "QUERY q USING d EXECUTE extraction -> alchemy RETURN score",
            "tenant-1",
        )
        .await
        .expect_err("alchemy is not registered");
    match err {
        AcumenError::UnknownAgent { stage } => assert_eq!(stage, "alchemy"),
        other => panic!("expected UnknownAgent, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test 8: Contract mismatch fails before any stage runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn contract_mismatch_fails_before_any_stage_runs() {
    let engine = QueryEngine::new(default_registry(DataHub::empty()));
    let err = engine
        .execute("QUERY q USING d EXECUTE monitoring RETURN fhi_score", "tenant-1")
        .await
        .expect_err("monitoring needs transactions from upstream");
    match err {
        AcumenError::ContractMismatch { stage, field } => {
            assert_eq!(stage, "monitoring");
            assert_eq!(field, "transactions");
        }
        other => panic!("expected ContractMismatch, got {other:?}"),
    }
    assert!(
        engine.audit_log().is_empty().await,
        "nothing ran, nothing audited"
    );
}

// ---------------------------------------------------------------------------
// Test 9: Empty hub extracts nothing, monitoring fails, downstream is skipped
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_hub_fails_monitoring_and_skips_downstream() {
    let engine = QueryEngine::new(default_registry(DataHub::empty()));
    let mut events = engine.subscribe();

    let result = engine
        .execute(
            "QUERY q USING missing EXECUTE extraction -> monitoring -> forecasting RETURN fhi_score",
            "tenant-1",
        )
        .await
        .expect("stage failures degrade, they do not abort");
    assert_eq!(result.status, QueryStatus::Failed, "nothing requested resolved");

    let query_id = match events.recv().await.expect("events") {
        QueryEvent::QueryStarted { query_id, .. } => query_id,
        other => panic!("expected QueryStarted first, got {other:?}"),
    };

    // Only stages that actually ran are audited; forecasting never started.
    let records = engine.audit_log().for_query(query_id).await;
    let summary: Vec<(&str, StageStatus)> = records
        .iter()
        .map(|r| (r.stage_name.as_str(), r.status))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("extraction", StageStatus::Succeeded),
            ("monitoring", StageStatus::Failed),
        ]
    );
}

// ---------------------------------------------------------------------------
// Test 10: Transient source errors retry and recover
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_source_errors_retry_and_recover() {
    let calls = Arc::new(AtomicUsize::new(0));
    let hub = DataHub::empty().with_connector(FlakyConnector {
        calls: Arc::clone(&calls),
        failures: 1,
        transient: true,
    });
    let engine = QueryEngine::new(default_registry(hub)).with_config(EngineConfig {
        backoff: BackoffPolicy::None,
        ..EngineConfig::default()
    });
    let mut events = engine.subscribe();

    let result = engine
        .execute(
            "QUERY retry_probe USING live_feed EXECUTE extraction RETURN transactions_extracted",
            "tenant-1",
        )
        .await
        .expect("second attempt should succeed");

    assert_eq!(result.status, QueryStatus::Complete);
    assert_eq!(result.fields.get("transactions_extracted"), Some(&json!(2)));
    assert_eq!(calls.load(Ordering::SeqCst), 2, "one failure, one success");

    let labels = drain(&mut events);
    assert!(
        labels.contains(&"retrying:extraction:1".to_string()),
        "expected a retry event: {labels:?}"
    );
}

// ---------------------------------------------------------------------------
// Test 11: Retries exhaust after max_attempts and the stage fails
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exhausted_retries_fail_the_stage() {
    let calls = Arc::new(AtomicUsize::new(0));
    let hub = DataHub::empty().with_connector(FlakyConnector {
        calls: Arc::clone(&calls),
        failures: usize::MAX,
        transient: true,
    });
    let engine = QueryEngine::new(default_registry(hub)).with_config(EngineConfig {
        max_attempts: 3,
        backoff: BackoffPolicy::None,
        ..EngineConfig::default()
    });
    let mut events = engine.subscribe();

    let result = engine
        .execute(
            "QUERY retry_probe USING live_feed EXECUTE extraction RETURN transactions_extracted",
            "tenant-1",
        )
        .await
        .expect("exhaustion degrades the result");

    assert_eq!(result.status, QueryStatus::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 3, "every attempt hits the source");

    let labels = drain(&mut events);
    assert!(labels.contains(&"retrying:extraction:1".to_string()), "{labels:?}");
    assert!(labels.contains(&"retrying:extraction:2".to_string()), "{labels:?}");
    assert!(labels.contains(&"failed:extraction".to_string()), "{labels:?}");
}

// ---------------------------------------------------------------------------
// Test 12: Permanent source errors do not retry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn permanent_source_errors_do_not_retry() {
    let calls = Arc::new(AtomicUsize::new(0));
    let hub = DataHub::empty().with_connector(FlakyConnector {
        calls: Arc::clone(&calls),
        failures: usize::MAX,
        transient: false,
    });
    let engine = QueryEngine::new(default_registry(hub)).with_config(EngineConfig {
        backoff: BackoffPolicy::None,
        ..EngineConfig::default()
    });
    let mut events = engine.subscribe();

    let result = engine
        .execute(
            "QUERY once USING live_feed EXECUTE extraction RETURN transactions_extracted",
            "tenant-1",
        )
        .await
        .expect("permanent failure degrades the result");

    assert_eq!(result.status, QueryStatus::Failed);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "permanent errors fail fast");

    let labels = drain(&mut events);
    assert!(
        !labels.iter().any(|l| l.starts_with("retrying:")),
        "no retry events expected: {labels:?}"
    );
}

// ---------------------------------------------------------------------------
// Test 13: Cancellation mid-stage abandons the stage and yields Partial
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancellation_mid_stage_yields_partial() {
    let mut registry = default_registry(DataHub::empty());
    registry.register(StallAgent);
    let engine = QueryEngine::new(registry).with_config(EngineConfig {
        cancel_grace: Duration::from_millis(10),
        ..EngineConfig::default()
    });
    let audit = engine.audit_log();
    let mut events = engine.subscribe();
    let cancel = CancelHandle::new();

    let task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            engine
                .execute_with_cancel(
                    "QUERY stall_probe USING live_feed EXECUTE stall RETURN stalled",
                    "tenant-9",
                    cancel,
                )
                .await
        })
    };

    // Wait until the stage is actually in flight before cancelling.
    let mut query_id = None;
    loop {
        match events.recv().await.expect("event stream closed early") {
            QueryEvent::QueryStarted { query_id: id, .. } => query_id = Some(id),
            QueryEvent::StageStarted { stage, .. } if stage == "stall" => break,
            _ => {}
        }
    }
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("engine should unwind after the grace period")
        .expect("task should not panic")
        .expect("a cancelled query still aggregates");
    assert_eq!(result.status, QueryStatus::Partial);

    let records = audit.for_query(query_id.expect("QueryStarted seen")).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stage_name, "stall");
    assert_eq!(records[0].status, StageStatus::Skipped);

    let labels = drain(&mut events);
    assert!(labels.contains(&"query_cancelled".to_string()), "{labels:?}");
    assert!(
        labels.contains(&"query_completed:partial".to_string()),
        "{labels:?}"
    );
}

// ---------------------------------------------------------------------------
// Test 14: A failing validation verdict halves confidence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_validator_halves_confidence() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = fixture_engine(&dir, 1000.0, 600.0)
        .with_validation(Arc::new(FixedValidator(ValidationVerdict::failing(
            "band mismatch",
        ))));

    let result = engine
        .execute(FULL_QUERY, "tenant-1")
        .await
        .expect("query should succeed");

    assert_eq!(result.status, QueryStatus::Complete, "verdicts do not fail queries");
    assert!(!result.validation.ok);
    assert_eq!(result.validation.notes, "band mismatch");
    assert_eq!(
        result.confidence,
        Some(0.475),
        "a failed check halves the reported confidence"
    );
}

// ---------------------------------------------------------------------------
// Test 15: An unavailable validator fails open
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unavailable_validator_fails_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = fixture_engine(&dir, 1000.0, 600.0).with_validation(Arc::new(BrokenValidator));

    let result = engine
        .execute(FULL_QUERY, "tenant-1")
        .await
        .expect("query should succeed");

    assert_eq!(result.status, QueryStatus::Complete);
    assert!(result.validation.ok, "unavailable validators fail open");
    assert!(
        result.validation.notes.contains("validation unavailable"),
        "notes: {}",
        result.validation.notes
    );
    assert_eq!(result.confidence, Some(0.5), "confidence is capped when unchecked");
}

// ---------------------------------------------------------------------------
// Test 16: A broken scorer degrades the query to Partial
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broken_scorer_degrades_to_partial() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = fixture_engine(&dir, 1000.0, 600.0).with_scoring(Arc::new(BrokenScorer));
    let mut events = engine.subscribe();

    let result = engine
        .execute(
            "QUERY degraded USING last_90_days \
             EXECUTE extraction -> monitoring -> forecasting \
             RETURN score, fhi_score",
            "tenant-1",
        )
        .await
        .expect("collaborator failures degrade, they do not abort");

    assert_eq!(result.status, QueryStatus::Partial);
    assert!(result.score.is_none());
    assert_eq!(result.fields.get("fhi_score"), Some(&json!(100.0)));

    let labels = drain(&mut events);
    assert!(labels.contains(&"failed:scoring".to_string()), "{labels:?}");
    assert!(
        !labels.iter().any(|l| l.starts_with("validated:")),
        "no score, nothing to validate: {labels:?}"
    );
}

// ---------------------------------------------------------------------------
// Test 17: Repeated timeouts mark the stage TimedOut in the audit trail
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn repeated_timeouts_mark_the_stage_timed_out() {
    let mut registry = default_registry(DataHub::empty());
    registry.register(StallAgent);
    let engine = QueryEngine::new(registry).with_config(EngineConfig {
        stage_timeout: Duration::from_millis(50),
        max_attempts: 2,
        backoff: BackoffPolicy::None,
        ..EngineConfig::default()
    });
    let audit = engine.audit_log();
    let mut events = engine.subscribe();

    let result = engine
        .execute(
            "QUERY slow USING live_feed EXECUTE stall RETURN stalled",
            "tenant-1",
        )
        .await
        .expect("timeouts degrade the result");
    assert_eq!(result.status, QueryStatus::Failed);

    let query_id = match events.recv().await.expect("events") {
        QueryEvent::QueryStarted { query_id, .. } => query_id,
        other => panic!("expected QueryStarted first, got {other:?}"),
    };
    let records = audit.for_query(query_id).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].stage_name, "stall");
    assert_eq!(records[0].status, StageStatus::TimedOut);

    let labels = drain(&mut events);
    assert!(labels.contains(&"retrying:stall:1".to_string()), "{labels:?}");
    assert!(labels.contains(&"failed:stall".to_string()), "{labels:?}");
}

// ---------------------------------------------------------------------------
// Test 18: The audit trail records every executed stage in order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn audit_trail_records_every_stage_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = fixture_engine(&dir, 1000.0, 600.0);
    let mut events = engine.subscribe();

    engine
        .execute(FULL_QUERY, "tenant-1")
        .await
        .expect("query should succeed");

    let query_id = match events.recv().await.expect("events") {
        QueryEvent::QueryStarted { query_id, .. } => query_id,
        other => panic!("expected QueryStarted first, got {other:?}"),
    };

    let records = engine.audit_log().for_query(query_id).await;
    let stages: Vec<&str> = records.iter().map(|r| r.stage_name.as_str()).collect();
    assert_eq!(
        stages,
        vec!["extraction", "monitoring", "forecasting", "scoring", "explanation"]
    );
    assert!(
        records.iter().all(|r| r.status == StageStatus::Succeeded),
        "statuses: {:?}",
        records.iter().map(|r| r.status).collect::<Vec<_>>()
    );

    let extraction = &records[0];
    assert!(
        extraction.output_fields.iter().any(|f| f == "transactions"),
        "extraction outputs: {:?}",
        extraction.output_fields
    );
    let scoring = &records[3];
    assert!(
        scoring.inputs.contains_key("fhi_score"),
        "scoring consumes the assembled feature vector: {:?}",
        scoring.inputs.keys().collect::<Vec<_>>()
    );
}
