//! The query engine: parse, compile, run stages in order, enrich, aggregate,
//! validate.
//!
//! Stages run strictly sequentially because each consumes upstream output.
//! Every stage attempt runs under a timeout, transient failures retry with
//! backoff, and cancellation is checked between stages and raced against the
//! in-flight stage with a short grace period.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};

use acumen_agents::CashflowMetrics;
use acumen_agentql::AgentQuery;
use acumen_intel::{
    ExplainRequest, FeatureVector, HeuristicScorer, ReasoningService, RuleValidator,
    ScoringService, TemplateReasoner, ValidationService,
};
use acumen_types::{
    AcumenError, AgentResult, AggregatedResult, AuditRecord, CancelHandle, ExecutionContext,
    Payload, QueryStatus, Result, StageStatus,
};

use crate::agent::AgentRegistry;
use crate::aggregator::aggregate;
use crate::audit::AuditLog;
use crate::compiler::{compile, ExecutionPlan, PlannedStage};
use crate::events::{EventEmitter, QueryEvent};
use crate::retry::{execute_with_retry, BackoffPolicy};
use crate::validation::apply_validation;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Tunable execution limits.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wall-clock budget for one attempt of a pipeline stage.
    pub stage_timeout: Duration,
    /// Wall-clock budget for one attempt of a collaborator call.
    pub collaborator_timeout: Duration,
    /// Total attempts per stage, first try included.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    /// How long an in-flight stage may keep running after cancellation before
    /// it is abandoned and marked skipped.
    pub cancel_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(30),
            collaborator_timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            cancel_grace: Duration::from_millis(250),
        }
    }
}

// ---------------------------------------------------------------------------
// QueryEngine
// ---------------------------------------------------------------------------

/// Executes AgentQL queries against a registry of stage agents and a set of
/// collaborator services.
pub struct QueryEngine {
    registry: AgentRegistry,
    scoring: Arc<dyn ScoringService>,
    reasoning: Arc<dyn ReasoningService>,
    validation: Arc<dyn ValidationService>,
    audit: AuditLog,
    emitter: EventEmitter,
    config: EngineConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StageOutcome {
    Succeeded,
    Failed,
    Cancelled,
}

/// What happened while a stage ran, before anything is recorded.
struct StageExecution {
    /// `None` means the stage was abandoned because the query was cancelled
    /// and the grace period expired.
    result: Option<Result<Payload>>,
    started_at: chrono::DateTime<Utc>,
    finished_at: chrono::DateTime<Utc>,
    duration_ms: u64,
}

impl QueryEngine {
    /// Engine backed by the deterministic local collaborator implementations.
    pub fn new(registry: AgentRegistry) -> Self {
        Self {
            registry,
            scoring: Arc::new(HeuristicScorer),
            reasoning: Arc::new(TemplateReasoner),
            validation: Arc::new(RuleValidator),
            audit: AuditLog::new(),
            emitter: EventEmitter::default(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_scoring(mut self, service: Arc<dyn ScoringService>) -> Self {
        self.scoring = service;
        self
    }

    pub fn with_reasoning(mut self, service: Arc<dyn ReasoningService>) -> Self {
        self.reasoning = service;
        self
    }

    pub fn with_validation(mut self, service: Arc<dyn ValidationService>) -> Self {
        self.validation = service;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Handle onto the shared audit log.
    pub fn audit_log(&self) -> AuditLog {
        self.audit.clone()
    }

    /// Subscribe to query lifecycle events.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<QueryEvent> {
        self.emitter.subscribe()
    }

    /// Parse and compile without executing.
    pub fn plan(&self, source: &str) -> Result<ExecutionPlan> {
        let query = acumen_agentql::parse(source)?;
        compile(&query, &self.registry)
    }

    /// Parse, compile, and run a query to completion.
    pub async fn execute(&self, source: &str, tenant_id: &str) -> Result<AggregatedResult> {
        self.execute_with_cancel(source, tenant_id, CancelHandle::new())
            .await
    }

    /// As [`QueryEngine::execute`], with an externally held cancellation
    /// handle. Cancelling mid-run skips the remaining stages and yields a
    /// partial result.
    pub async fn execute_with_cancel(
        &self,
        source: &str,
        tenant_id: &str,
        cancel: CancelHandle,
    ) -> Result<AggregatedResult> {
        let query = acumen_agentql::parse(source)?;
        let plan = compile(&query, &self.registry)?;

        let mut ctx = ExecutionContext::new(tenant_id, &query.data_ref).with_cancel(cancel);
        let clock = std::time::Instant::now();

        tracing::info!(
            query_id = %ctx.query_id,
            name = %query.name,
            tenant_id,
            stages = plan.stages.len(),
            "executing query"
        );
        self.emitter.emit(QueryEvent::QueryStarted {
            query_id: ctx.query_id,
            query_name: query.name.clone(),
            stage_count: plan.stages.len(),
        });

        let mut cancelled = false;
        for (idx, planned) in plan.stages.iter().enumerate() {
            if ctx.is_cancelled() {
                for remaining in &plan.stages[idx..] {
                    ctx.record(AgentResult::skipped(
                        &remaining.name,
                        "query cancelled",
                        Utc::now(),
                    ))?;
                }
                cancelled = true;
                self.emitter.emit(QueryEvent::QueryCancelled {
                    query_id: ctx.query_id,
                });
                break;
            }

            match self.run_stage(&mut ctx, planned).await? {
                StageOutcome::Succeeded => {}
                StageOutcome::Failed => {
                    for remaining in &plan.stages[idx + 1..] {
                        ctx.record(AgentResult::skipped(
                            &remaining.name,
                            format!("upstream stage '{}' failed", planned.name),
                            Utc::now(),
                        ))?;
                    }
                    break;
                }
                StageOutcome::Cancelled => {
                    for remaining in &plan.stages[idx + 1..] {
                        ctx.record(AgentResult::skipped(
                            &remaining.name,
                            "query cancelled",
                            Utc::now(),
                        ))?;
                    }
                    cancelled = true;
                    self.emitter.emit(QueryEvent::QueryCancelled {
                        query_id: ctx.query_id,
                    });
                    break;
                }
            }
        }

        if !cancelled {
            cancelled = self.enrich(&mut ctx, &query).await?;
            if cancelled {
                self.emitter.emit(QueryEvent::QueryCancelled {
                    query_id: ctx.query_id,
                });
            }
        }

        let mut result = aggregate(&ctx, &query);
        if cancelled {
            result.status = QueryStatus::Partial;
        } else if let Some(ok) = apply_validation(
            self.validation.as_ref(),
            &mut result,
            self.config.collaborator_timeout,
        )
        .await
        {
            self.emitter.emit(QueryEvent::ValidationChecked {
                query_id: ctx.query_id,
                ok,
            });
        }

        let duration_ms = clock.elapsed().as_millis() as u64;
        tracing::info!(
            query_id = %ctx.query_id,
            status = status_label(result.status),
            duration_ms,
            "query finished"
        );
        self.emitter.emit(QueryEvent::QueryCompleted {
            query_id: ctx.query_id,
            status: status_label(result.status).to_string(),
            duration_ms,
        });
        Ok(result)
    }

    async fn run_stage(
        &self,
        ctx: &mut ExecutionContext,
        planned: &PlannedStage,
    ) -> Result<StageOutcome> {
        let agent = self
            .registry
            .get(&planned.name)
            .ok_or_else(|| AcumenError::UnknownAgent {
                stage: planned.name.clone(),
            })?;
        let inputs = assemble_inputs(ctx, planned);

        let execution = {
            let ctx_ref: &ExecutionContext = ctx;
            self.attempt_stage(ctx_ref, &planned.name, self.config.stage_timeout, || {
                agent.run(ctx_ref, &inputs)
            })
            .await
        };
        self.finish_stage(ctx, &planned.name, inputs, execution)
            .await
    }

    /// Run one stage body under the retry policy, with per-attempt timeouts,
    /// racing the whole thing against cancellation.
    async fn attempt_stage<F, Fut>(
        &self,
        ctx: &ExecutionContext,
        stage: &str,
        attempt_timeout: Duration,
        f: F,
    ) -> StageExecution
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Payload>>,
    {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        tracing::debug!(query_id = %ctx.query_id, stage, "stage started");
        self.emitter.emit(QueryEvent::StageStarted {
            query_id: ctx.query_id,
            stage: stage.to_string(),
        });

        let run_once = || async {
            match tokio::time::timeout(attempt_timeout, f()).await {
                Ok(result) => result,
                Err(_) => Err(AcumenError::StageTimeout {
                    stage: stage.to_string(),
                    timeout_ms: attempt_timeout.as_millis() as u64,
                }),
            }
        };

        let cancel = ctx.cancel_handle();
        let retried = execute_with_retry(
            run_once,
            self.config.max_attempts,
            &self.config.backoff,
            stage,
            &self.emitter,
            ctx.query_id,
        );
        tokio::pin!(retried);

        let result = tokio::select! {
            result = &mut retried => Some(result),
            _ = cancel.cancelled() => {
                tracing::debug!(stage, grace_ms = self.config.cancel_grace.as_millis() as u64, "cancellation requested mid-stage");
                tokio::time::timeout(self.config.cancel_grace, &mut retried)
                    .await
                    .ok()
            }
        };

        StageExecution {
            result,
            started_at,
            finished_at: Utc::now(),
            duration_ms: clock.elapsed().as_millis() as u64,
        }
    }

    /// Record the stage result into the context, the audit log, and the
    /// event stream.
    async fn finish_stage(
        &self,
        ctx: &mut ExecutionContext,
        stage: &str,
        inputs: Payload,
        execution: StageExecution,
    ) -> Result<StageOutcome> {
        let query_id = ctx.query_id;
        match execution.result {
            Some(Ok(payload)) => {
                let output_fields: Vec<String> = payload.keys().cloned().collect();
                ctx.record(AgentResult::succeeded(
                    stage,
                    payload,
                    execution.started_at,
                    execution.finished_at,
                ))?;
                self.audit
                    .record(AuditRecord {
                        query_id,
                        stage_name: stage.to_string(),
                        inputs,
                        output_fields,
                        duration_ms: execution.duration_ms,
                        status: StageStatus::Succeeded,
                    })
                    .await;
                tracing::info!(query_id = %query_id, stage, duration_ms = execution.duration_ms, "stage completed");
                self.emitter.emit(QueryEvent::StageCompleted {
                    query_id,
                    stage: stage.to_string(),
                    duration_ms: execution.duration_ms,
                });
                Ok(StageOutcome::Succeeded)
            }
            Some(Err(e)) => {
                let status = match &e {
                    AcumenError::StageTimeout { .. } => StageStatus::TimedOut,
                    _ => StageStatus::Failed,
                };
                tracing::error!(query_id = %query_id, stage, error = %e, "stage failed");
                ctx.record(AgentResult::failure(
                    stage,
                    status,
                    e.to_string(),
                    execution.started_at,
                    execution.finished_at,
                ))?;
                self.audit
                    .record(AuditRecord {
                        query_id,
                        stage_name: stage.to_string(),
                        inputs,
                        output_fields: Vec::new(),
                        duration_ms: execution.duration_ms,
                        status,
                    })
                    .await;
                self.emitter.emit(QueryEvent::StageFailed {
                    query_id,
                    stage: stage.to_string(),
                    error: e.to_string(),
                });
                Ok(StageOutcome::Failed)
            }
            None => {
                tracing::warn!(query_id = %query_id, stage, "stage abandoned after cancellation grace period");
                ctx.record(AgentResult::skipped(
                    stage,
                    "query cancelled",
                    execution.finished_at,
                ))?;
                self.audit
                    .record(AuditRecord {
                        query_id,
                        stage_name: stage.to_string(),
                        inputs,
                        output_fields: Vec::new(),
                        duration_ms: execution.duration_ms,
                        status: StageStatus::Skipped,
                    })
                    .await;
                Ok(StageOutcome::Cancelled)
            }
        }
    }

    /// Append synthetic collaborator stages for requested fields nothing
    /// produced. Scoring needs monitoring output; explanation needs a score.
    /// Enrichment failures never abort the run. Returns `true` when the query
    /// was cancelled mid-enrichment.
    async fn enrich(&self, ctx: &mut ExecutionContext, query: &AgentQuery) -> Result<bool> {
        let wants = |field: &str| query.return_fields.iter().any(|f| f == field);

        if wants("score") && ctx.field("score").is_none() && ctx.output("scoring").is_none() {
            match feature_vector(ctx) {
                Some(features) => {
                    let inputs = to_payload(serde_json::to_value(&features)?);
                    let scoring = Arc::clone(&self.scoring);
                    let execution = {
                        let ctx_ref: &ExecutionContext = ctx;
                        self.attempt_stage(
                            ctx_ref,
                            "scoring",
                            self.config.collaborator_timeout,
                            move || {
                                let scoring = Arc::clone(&scoring);
                                let features = features.clone();
                                async move {
                                    let outcome = scoring.score(&features).await?;
                                    let mut payload = Payload::new();
                                    payload.insert("score".into(), json!(outcome.score));
                                    payload.insert("confidence".into(), json!(outcome.confidence));
                                    Ok(payload)
                                }
                            },
                        )
                        .await
                    };
                    let outcome = self.finish_stage(ctx, "scoring", inputs, execution).await?;
                    if outcome == StageOutcome::Cancelled {
                        return Ok(true);
                    }
                }
                None => {
                    tracing::debug!(
                        query_id = %ctx.query_id,
                        "score requested but monitoring output is unavailable, skipping scoring"
                    );
                }
            }
        }

        if wants("explanation")
            && ctx.field("explanation").is_none()
            && ctx.output("explanation").is_none()
        {
            if let Some(score) = ctx.field("score").and_then(Value::as_f64) {
                let request = explain_request(ctx, score);
                let inputs = to_payload(serde_json::to_value(&request)?);
                let reasoning = Arc::clone(&self.reasoning);
                let execution = {
                    let ctx_ref: &ExecutionContext = ctx;
                    self.attempt_stage(
                        ctx_ref,
                        "explanation",
                        self.config.collaborator_timeout,
                        move || {
                            let reasoning = Arc::clone(&reasoning);
                            let request = request.clone();
                            async move {
                                let explanation = reasoning.explain(&request).await?;
                                let mut payload = Payload::new();
                                payload.insert("explanation".into(), json!(explanation.text));
                                payload.insert(
                                    "recommendations".into(),
                                    json!(explanation.recommendations),
                                );
                                Ok(payload)
                            }
                        },
                    )
                    .await
                };
                let outcome = self
                    .finish_stage(ctx, "explanation", inputs, execution)
                    .await?;
                if outcome == StageOutcome::Cancelled {
                    return Ok(true);
                }
            } else {
                tracing::debug!(
                    query_id = %ctx.query_id,
                    "explanation requested but no score is available, skipping reasoning"
                );
            }
        }

        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Gather the stage's declared inputs from upstream payloads, falling back to
/// the query's ambient `data_ref` / `tenant_id`.
fn assemble_inputs(ctx: &ExecutionContext, planned: &PlannedStage) -> Payload {
    let mut inputs = Payload::new();
    for name in &planned.inputs {
        if let Some(value) = ctx.field(name) {
            inputs.insert(name.clone(), value.clone());
        } else if name == "data_ref" {
            inputs.insert(name.clone(), Value::String(ctx.data_ref.clone()));
        } else if name == "tenant_id" {
            inputs.insert(name.clone(), Value::String(ctx.tenant_id.clone()));
        }
    }
    inputs
}

/// Features for the scoring collaborator, assembled from the monitoring
/// metrics plus the forecast summary when one exists.
fn feature_vector(ctx: &ExecutionContext) -> Option<FeatureVector> {
    let metrics: CashflowMetrics = serde_json::from_value(ctx.field("metrics")?.clone()).ok()?;
    let fhi_score = ctx.field("fhi_score")?.as_f64()?;
    let forecasted_net_cashflow = ctx
        .field("forecast_summary")
        .and_then(|v| v.get("predicted_net_cashflow"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let cashflow_ratio = if metrics.total_income > 0.0 {
        metrics.net_cashflow / metrics.total_income
    } else {
        -1.0
    };

    Some(FeatureVector {
        total_income: metrics.total_income,
        total_expenses: metrics.total_expenses,
        net_cashflow: metrics.net_cashflow,
        cashflow_ratio,
        volatility: metrics.cashflow_volatility,
        coefficient_of_variation: metrics.cashflow_coefficient_of_variation,
        fhi_score,
        forecasted_net_cashflow,
        transaction_count: metrics.num_transactions,
    })
}

fn explain_request(ctx: &ExecutionContext, score: f64) -> ExplainRequest {
    let risk_factors = ctx
        .field("risk_flags")
        .or_else(|| ctx.field("risk_factors"))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    ExplainRequest {
        score,
        fhi_score: ctx.field("fhi_score").and_then(Value::as_f64),
        liquidity_risk_score: ctx.field("liquidity_risk_score").and_then(Value::as_f64),
        net_cashflow: ctx
            .field("metrics")
            .and_then(|m| m.get("net_cashflow"))
            .and_then(Value::as_f64),
        expense_ratio: ctx
            .field("metrics")
            .and_then(|m| m.get("expense_ratio"))
            .and_then(Value::as_f64),
        risk_factors,
    }
}

fn to_payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

fn status_label(status: QueryStatus) -> &'static str {
    match status {
        QueryStatus::Complete => "complete",
        QueryStatus::Partial => "partial",
        QueryStatus::Failed => "failed",
    }
}
