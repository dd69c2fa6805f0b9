//! Projection of a query's RETURN fields over everything the stages produced.

use serde_json::Value;

use acumen_agentql::AgentQuery;
use acumen_types::{
    AggregatedResult, ExecutionContext, QueryStatus, RiskFactor, StageStatus,
};

/// Project the requested return fields out of the recorded stage payloads.
///
/// Fields resolve across payloads in execution order with later stages
/// shadowing earlier ones. `score`, `risk_factors`, and `explanation` fill
/// the structural slots of [`AggregatedResult`]; everything else lands in the
/// flattened `fields` map. A requested field nothing produced is omitted
/// entirely.
///
/// `risk_factors` resolves from the `risk_factors` field when some stage
/// produced one, falling back to the monitoring agent's `risk_flags`.
pub fn aggregate(ctx: &ExecutionContext, query: &AgentQuery) -> AggregatedResult {
    let mut result = AggregatedResult::empty(QueryStatus::Complete);
    let mut resolved = 0usize;

    for field in &query.return_fields {
        let found = match field.as_str() {
            "score" => {
                result.score = ctx.field("score").and_then(Value::as_f64);
                result.score.is_some()
            }
            "risk_factors" => match risk_factors(ctx) {
                Some(factors) => {
                    result.risk_factors = factors;
                    true
                }
                None => false,
            },
            "explanation" => {
                result.explanation = ctx
                    .field("explanation")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                result.explanation.is_some()
            }
            "confidence" => {
                result.confidence = ctx.field("confidence").and_then(Value::as_f64);
                result.confidence.is_some()
            }
            "recommendations" => match ctx.field("recommendations") {
                Some(value) => {
                    result.recommendations =
                        serde_json::from_value(value.clone()).unwrap_or_default();
                    true
                }
                None => false,
            },
            name => match ctx.field(name) {
                Some(value) => {
                    result.fields.insert(name.to_string(), value.clone());
                    true
                }
                None => false,
            },
        };
        if found {
            resolved += 1;
        } else {
            tracing::debug!(field = %field, "requested field was never produced");
        }
    }

    // Confidence qualifies the score and recommendations accompany the
    // explanation, whether or not the query asked for them by name.
    if result.score.is_some() && result.confidence.is_none() {
        result.confidence = ctx.field("confidence").and_then(Value::as_f64);
    }
    if result.explanation.is_some() && result.recommendations.is_empty() {
        if let Some(value) = ctx.field("recommendations") {
            result.recommendations = serde_json::from_value(value.clone()).unwrap_or_default();
        }
    }

    let all_stages_succeeded = ctx
        .outputs()
        .iter()
        .all(|r| r.status == StageStatus::Succeeded);

    result.status = if resolved == query.return_fields.len() && all_stages_succeeded {
        QueryStatus::Complete
    } else if resolved > 0 {
        QueryStatus::Partial
    } else {
        QueryStatus::Failed
    };
    result
}

fn risk_factors(ctx: &ExecutionContext) -> Option<Vec<RiskFactor>> {
    let value = ctx.field("risk_factors").or_else(|| ctx.field("risk_flags"))?;
    serde_json::from_value(value.clone()).ok()
}
