//! Post-aggregation validation of the scored answer.

use std::time::Duration;

use acumen_intel::{ValidateRequest, ValidationService};
use acumen_types::{AggregatedResult, ValidationVerdict};

/// Ask the validation collaborator to check the aggregated answer and fold
/// the verdict into the result.
///
/// Validation is advisory. A failing verdict halves the confidence instead of
/// failing the query. An unreachable or slow validator records a passing
/// verdict whose notes name the outage, with confidence capped at 0.5 so the
/// caller can tell the answer was never actually checked.
///
/// Returns the folded-in `ok` flag, or `None` when the result carries nothing
/// a validator could check.
pub async fn apply_validation(
    service: &dyn ValidationService,
    result: &mut AggregatedResult,
    timeout: Duration,
) -> Option<bool> {
    let (Some(score), Some(explanation)) = (result.score, result.explanation.as_deref()) else {
        return None;
    };

    let request = ValidateRequest {
        explanation: explanation.to_string(),
        score,
        risk_factors: result.risk_factors.clone(),
    };

    let verdict = match tokio::time::timeout(timeout, service.validate(&request)).await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "validation collaborator failed, passing unchecked");
            return Some(fail_open(result, &format!("validation unavailable: {e}")));
        }
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "validation timed out, passing unchecked");
            return Some(fail_open(result, "validation unavailable: timed out"));
        }
    };

    if !verdict.ok {
        tracing::warn!(notes = %verdict.notes, "validation rejected the answer");
        if let Some(confidence) = result.confidence {
            result.confidence = Some(confidence / 2.0);
        }
    }
    let ok = verdict.ok;
    result.validation = verdict;
    Some(ok)
}

fn fail_open(result: &mut AggregatedResult, notes: &str) -> bool {
    result.validation = ValidationVerdict {
        ok: true,
        notes: notes.to_string(),
    };
    if let Some(confidence) = result.confidence {
        result.confidence = Some(confidence.min(0.5));
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use acumen_types::{AcumenError, QueryStatus, Result};
    use async_trait::async_trait;

    struct FixedValidator(ValidationVerdict);

    #[async_trait]
    impl ValidationService for FixedValidator {
        async fn validate(&self, _request: &ValidateRequest) -> Result<ValidationVerdict> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct BrokenValidator;

    #[async_trait]
    impl ValidationService for BrokenValidator {
        async fn validate(&self, _request: &ValidateRequest) -> Result<ValidationVerdict> {
            Err(AcumenError::Collaborator {
                service: "validation".into(),
                status: 503,
                message: "service unavailable".into(),
                retryable: true,
            })
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    struct StalledValidator;

    #[async_trait]
    impl ValidationService for StalledValidator {
        async fn validate(&self, _request: &ValidateRequest) -> Result<ValidationVerdict> {
            std::future::pending().await
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    fn scored_result() -> AggregatedResult {
        let mut result = AggregatedResult::empty(QueryStatus::Complete);
        result.score = Some(88.0);
        result.explanation = Some("Low credit risk.".into());
        result.confidence = Some(0.95);
        result
    }

    #[tokio::test]
    async fn passing_verdict_leaves_confidence_alone() {
        let mut result = scored_result();
        let ok = apply_validation(
            &FixedValidator(ValidationVerdict::passing()),
            &mut result,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(ok, Some(true));
        assert!(result.validation.ok);
        assert_eq!(result.confidence, Some(0.95));
    }

    #[tokio::test]
    async fn failing_verdict_halves_confidence() {
        let mut result = scored_result();
        let ok = apply_validation(
            &FixedValidator(ValidationVerdict::failing("score contradicts explanation")),
            &mut result,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(ok, Some(false));
        assert!(!result.validation.ok);
        assert_eq!(result.validation.notes, "score contradicts explanation");
        assert_eq!(result.confidence, Some(0.475));
    }

    #[tokio::test]
    async fn broken_validator_fails_open() {
        let mut result = scored_result();
        let ok = apply_validation(&BrokenValidator, &mut result, Duration::from_secs(1)).await;
        assert_eq!(ok, Some(true));
        assert!(result.validation.ok);
        assert!(result.validation.notes.contains("validation unavailable"));
        assert_eq!(result.confidence, Some(0.5));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_validator_times_out_and_fails_open() {
        let mut result = scored_result();
        let ok =
            apply_validation(&StalledValidator, &mut result, Duration::from_millis(50)).await;
        assert_eq!(ok, Some(true));
        assert!(result.validation.notes.contains("timed out"));
        assert_eq!(result.confidence, Some(0.5));
    }

    #[tokio::test]
    async fn unscored_result_is_not_validated() {
        let mut result = AggregatedResult::empty(QueryStatus::Partial);
        let ok = apply_validation(
            &FixedValidator(ValidationVerdict::failing("noise")),
            &mut result,
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(ok, None);
        assert!(result.validation.ok);
    }
}
