use serde::{Deserialize, Serialize};

use acumen_types::RiskFactor;

// ---------------------------------------------------------------------------
// FeatureVector
// ---------------------------------------------------------------------------

/// Features fed into the scoring collaborator, assembled by the engine from
/// monitoring metrics and the forecast summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureVector {
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_cashflow: f64,
    /// `net_cashflow / total_income`, or -1 when there is no income.
    pub cashflow_ratio: f64,
    pub volatility: f64,
    pub coefficient_of_variation: f64,
    pub fhi_score: f64,
    pub forecasted_net_cashflow: f64,
    pub transaction_count: u64,
}

// ---------------------------------------------------------------------------
// ScoreOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    /// Financial strength score in [0, 100].
    pub score: f64,
    /// Model confidence in [0, 1].
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// ExplainRequest / Explanation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplainRequest {
    pub score: f64,
    pub fhi_score: Option<f64>,
    pub liquidity_risk_score: Option<f64>,
    pub net_cashflow: Option<f64>,
    pub expense_ratio: Option<f64>,
    #[serde(default)]
    pub risk_factors: Vec<RiskFactor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub text: String,
    pub recommendations: Vec<String>,
}

// ---------------------------------------------------------------------------
// ValidateRequest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub explanation: String,
    pub score: f64,
    #[serde(default)]
    pub risk_factors: Vec<RiskFactor>,
}

// ---------------------------------------------------------------------------
// Risk bands
// ---------------------------------------------------------------------------

/// Risk band implied by a numeric score: >= 70 low, 40..70 moderate, < 40 high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Low,
    Moderate,
    High,
}

impl RiskBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            RiskBand::Low
        } else if score >= 40.0 {
            RiskBand::Moderate
        } else {
            RiskBand::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBand::Low => "low",
            RiskBand::Moderate => "moderate",
            RiskBand::High => "high",
        }
    }
}
