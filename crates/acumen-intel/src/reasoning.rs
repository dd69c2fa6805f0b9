use std::time::Duration;

use async_trait::async_trait;

use acumen_types::Result;

use crate::http::post_json;
use crate::{ExplainRequest, Explanation, RiskBand};

// ---------------------------------------------------------------------------
// ReasoningService
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn explain(&self, request: &ExplainRequest) -> Result<Explanation>;
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// TemplateReasoner
// ---------------------------------------------------------------------------

/// Deterministic explanation builder, used when no LLM gateway is configured.
/// States the score and its risk band, summarizes the cashflow position, and
/// names every identified risk factor so the validation stage can verify
/// completeness.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateReasoner;

impl TemplateReasoner {
    fn render_text(request: &ExplainRequest) -> String {
        let band = RiskBand::from_score(request.score);
        let mut text = format!(
            "The business shows {} credit risk with a financial strength score of {:.0}/100.",
            band.as_str(),
            request.score
        );

        if let Some(fhi) = request.fhi_score {
            text.push_str(&format!(
                " The financial health index stands at {:.0}/100.",
                fhi
            ));
        }

        if let Some(net) = request.net_cashflow {
            if net < 0.0 {
                text.push_str(&format!(
                    " Net cashflow over the period was negative at {:.2}, which weighs on credit readiness.",
                    net
                ));
            } else {
                text.push_str(&format!(
                    " Net cashflow over the period was positive at {:.2}.",
                    net
                ));
            }
        }

        if let Some(ratio) = request.expense_ratio {
            text.push_str(&format!(
                " Expenses consumed {:.0}% of income.",
                ratio * 100.0
            ));
        }

        if !request.risk_factors.is_empty() {
            let listed: Vec<String> = request
                .risk_factors
                .iter()
                .map(|f| format!("{} ({})", humanize(&f.kind), f.message))
                .collect();
            text.push_str(&format!(" Identified concerns: {}.", listed.join("; ")));
        }

        if let Some(liquidity) = request.liquidity_risk_score {
            text.push_str(&format!(
                " Projected liquidity pressure over the next 30 days scores {:.0}/100.",
                liquidity
            ));
        }

        text
    }

    fn render_recommendations(request: &ExplainRequest) -> Vec<String> {
        let mut recommendations: Vec<String> = Vec::new();
        for factor in &request.risk_factors {
            let rec = match factor.kind.as_str() {
                "negative_cashflow" => {
                    "Reduce discretionary spending to bring net cashflow back above zero."
                }
                "high_expense_ratio" => {
                    "Review recurring expenses and aim to keep the expense ratio below 80% of income."
                }
                "high_volatility" => {
                    "Smooth cashflow by spreading large payments and invoicing earlier."
                }
                "anomaly" => {
                    "Review flagged transactions for data-entry errors or unusual activity."
                }
                _ => continue,
            };
            if !recommendations.iter().any(|r| r.as_str() == rec) {
                recommendations.push(rec.to_string());
            }
        }

        if request.score < 70.0 {
            recommendations.push(
                "Build a cash reserve covering at least one month of operating expenses."
                    .to_string(),
            );
        }
        if recommendations.is_empty() {
            recommendations.push(
                "Maintain consistent revenue collection to preserve credit readiness.".to_string(),
            );
        }
        recommendations
    }
}

/// `negative_cashflow` -> `negative cashflow`.
fn humanize(kind: &str) -> String {
    kind.replace('_', " ")
}

#[async_trait]
impl ReasoningService for TemplateReasoner {
    async fn explain(&self, request: &ExplainRequest) -> Result<Explanation> {
        Ok(Explanation {
            text: Self::render_text(request),
            recommendations: Self::render_recommendations(request),
        })
    }

    fn name(&self) -> &str {
        "template-reasoner"
    }
}

// ---------------------------------------------------------------------------
// HttpReasoningClient
// ---------------------------------------------------------------------------

/// Client for an LLM reasoning gateway exposing `POST {base}/explain`.
#[derive(Debug, Clone)]
pub struct HttpReasoningClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpReasoningClient {
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
impl ReasoningService for HttpReasoningClient {
    async fn explain(&self, request: &ExplainRequest) -> Result<Explanation> {
        let url = format!("{}/explain", self.base_url.trim_end_matches('/'));
        post_json(&self.client, "reasoning", &url, request, self.timeout).await
    }

    fn name(&self) -> &str {
        "http-reasoner"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
