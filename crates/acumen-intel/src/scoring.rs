use std::time::Duration;

use async_trait::async_trait;

use acumen_types::Result;

use crate::http::post_json;
use crate::{FeatureVector, ScoreOutcome};

// ---------------------------------------------------------------------------
// ScoringService
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ScoringService: Send + Sync {
    async fn score(&self, features: &FeatureVector) -> Result<ScoreOutcome>;
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// HeuristicScorer
// ---------------------------------------------------------------------------

/// Deterministic rule-based scoring model, used when no remote scoring
/// service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    fn strength_score(features: &FeatureVector) -> f64 {
        let mut score = 50.0;

        // Cashflow ratio contribution (up to 25 points)
        let ratio = features.cashflow_ratio;
        if ratio > 0.2 {
            score += 25.0;
        } else if ratio > 0.1 {
            score += 20.0;
        } else if ratio > 0.0 {
            score += 10.0;
        } else if ratio > -0.1 {
            score += 5.0;
        }

        // FHI contribution (up to 25 points)
        score += (features.fhi_score / 100.0) * 25.0;

        // Volatility penalty (up to 15 points)
        let cv = features.coefficient_of_variation;
        if cv > 0.5 {
            score -= 15.0;
        } else if cv > 0.3 {
            score -= 10.0;
        } else if cv > 0.2 {
            score -= 5.0;
        }

        // Forecasted cashflow contribution (up to 15 points)
        let forecasted = features.forecasted_net_cashflow;
        if forecasted > 10_000.0 {
            score += 15.0;
        } else if forecasted > 5_000.0 {
            score += 10.0;
        } else if forecasted > 0.0 {
            score += 5.0;
        }

        score.clamp(0.0, 100.0)
    }

    /// Confidence grows with the amount of observed data.
    fn confidence(features: &FeatureVector) -> f64 {
        (0.35 + features.transaction_count as f64 / 200.0).clamp(0.35, 0.95)
    }
}

#[async_trait]
impl ScoringService for HeuristicScorer {
    async fn score(&self, features: &FeatureVector) -> Result<ScoreOutcome> {
        // No observed transactions means no basis for a score.
        if features.transaction_count == 0 {
            return Ok(ScoreOutcome {
                score: 0.0,
                confidence: 0.35,
            });
        }
        Ok(ScoreOutcome {
            score: Self::strength_score(features),
            confidence: Self::confidence(features),
        })
    }

    fn name(&self) -> &str {
        "heuristic-scorer"
    }
}

// ---------------------------------------------------------------------------
// HttpScoringClient
// ---------------------------------------------------------------------------

/// Client for a remote scoring model exposing `POST {base}/score`.
#[derive(Debug, Clone)]
pub struct HttpScoringClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpScoringClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ScoringService for HttpScoringClient {
    async fn score(&self, features: &FeatureVector) -> Result<ScoreOutcome> {
        let url = format!("{}/score", self.base_url.trim_end_matches('/'));
        let outcome: ScoreOutcome =
            post_json(&self.client, "scoring", &url, features, self.timeout).await?;
        // Remote models are not trusted to stay in range.
        Ok(ScoreOutcome {
            score: outcome.score.clamp(0.0, 100.0),
            confidence: outcome.confidence.clamp(0.0, 1.0),
        })
    }

    fn name(&self) -> &str {
        "http-scorer"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_positive_features() -> FeatureVector {
        // 90 days of 1000 income / 600 expenses per day.
        FeatureVector {
            total_income: 90_000.0,
            total_expenses: 54_000.0,
            net_cashflow: 36_000.0,
            cashflow_ratio: 0.4,
            volatility: 0.0,
            coefficient_of_variation: 0.0,
            fhi_score: 100.0,
            forecasted_net_cashflow: 12_000.0,
            transaction_count: 180,
        }
    }

    fn steady_negative_features() -> FeatureVector {
        // 90 days of 500 income / 800 expenses per day.
        FeatureVector {
            total_income: 45_000.0,
            total_expenses: 72_000.0,
            net_cashflow: -27_000.0,
            cashflow_ratio: -0.6,
            volatility: 0.0,
            coefficient_of_variation: 0.0,
            fhi_score: 60.0,
            forecasted_net_cashflow: -9_000.0,
            transaction_count: 180,
        }
    }

    #[tokio::test]
    async fn steady_positive_business_scores_high() {
        let outcome = HeuristicScorer.score(&steady_positive_features()).await.unwrap();
        // 50 base + 25 ratio + 25 FHI + 15 forecast, clamped to 100.
        assert_eq!(outcome.score, 100.0);
        assert!(outcome.score >= 70.0);
    }

    #[tokio::test]
    async fn steady_negative_business_scores_moderate() {
        let outcome = HeuristicScorer.score(&steady_negative_features()).await.unwrap();
        // 50 base + 0 ratio + 15 FHI + 0 forecast.
        assert_eq!(outcome.score, 65.0);
        assert!(outcome.score < 70.0);
        assert!(outcome.score >= 40.0);
    }

    #[tokio::test]
    async fn neutral_features_score_near_base() {
        let features = FeatureVector {
            cashflow_ratio: -1.0,
            fhi_score: 50.0,
            transaction_count: 90,
            ..FeatureVector::default()
        };
        let outcome = HeuristicScorer.score(&features).await.unwrap();
        // 50 base + 12.5 FHI.
        assert_eq!(outcome.score, 62.5);
    }

    #[tokio::test]
    async fn volatility_penalty_applies() {
        let mut features = steady_positive_features();
        features.coefficient_of_variation = 0.75;
        let outcome = HeuristicScorer.score(&features).await.unwrap();
        // 115 uncapped minus 15 volatility.
        assert_eq!(outcome.score, 100.0);

        features.forecasted_net_cashflow = 0.0;
        let outcome = HeuristicScorer.score(&features).await.unwrap();
        // 50 + 25 + 25 - 15.
        assert_eq!(outcome.score, 85.0);
    }

    #[tokio::test]
    async fn no_transactions_scores_zero() {
        let outcome = HeuristicScorer.score(&FeatureVector::default()).await.unwrap();
        assert_eq!(outcome.score, 0.0);
        assert_eq!(outcome.confidence, 0.35);
    }

    #[tokio::test]
    async fn confidence_grows_with_data_and_saturates() {
        let mut features = steady_positive_features();

        features.transaction_count = 50;
        let c = HeuristicScorer.score(&features).await.unwrap().confidence;
        assert!((c - 0.60).abs() < 1e-9);

        features.transaction_count = 1_000;
        let c = HeuristicScorer.score(&features).await.unwrap().confidence;
        assert!((c - 0.95).abs() < 1e-9);
    }
}
