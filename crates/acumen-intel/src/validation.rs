use std::time::Duration;

use async_trait::async_trait;

use acumen_types::{Result, ValidationVerdict};

use crate::http::post_json;
use crate::{RiskBand, ValidateRequest};

// ---------------------------------------------------------------------------
// ValidationService
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ValidationService: Send + Sync {
    async fn validate(&self, request: &ValidateRequest) -> Result<ValidationVerdict>;
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// RuleValidator
// ---------------------------------------------------------------------------

/// Deterministic consistency checks over an explanation and its score:
/// the text must not assert a risk level contradicting the score band, and
/// every high-severity risk factor must be referenced in the text.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleValidator;

impl RuleValidator {
    /// Risk levels the explanation text asserts, e.g. "low credit risk" or
    /// "risk is high".
    fn asserted_bands(text: &str) -> Vec<RiskBand> {
        let lowered = text.to_lowercase();
        let patterns = [
            regex::Regex::new(r"\b(low|moderate|high)\s+(?:credit\s+)?risk\b").unwrap(),
            regex::Regex::new(r"\brisk\s+(?:level\s+)?is\s+(low|moderate|high)\b").unwrap(),
        ];

        let mut bands = Vec::new();
        for pattern in &patterns {
            for cap in pattern.captures_iter(&lowered) {
                let band = match &cap[1] {
                    "low" => RiskBand::Low,
                    "moderate" => RiskBand::Moderate,
                    _ => RiskBand::High,
                };
                if !bands.contains(&band) {
                    bands.push(band);
                }
            }
        }
        bands
    }
}

#[async_trait]
impl ValidationService for RuleValidator {
    async fn validate(&self, request: &ValidateRequest) -> Result<ValidationVerdict> {
        let mut notes = Vec::new();

        // (a) numeric sanity: asserted risk levels must match the score band.
        let expected = RiskBand::from_score(request.score);
        for asserted in Self::asserted_bands(&request.explanation) {
            if asserted != expected {
                notes.push(format!(
                    "explanation asserts {} risk but a score of {:.0} implies {} risk",
                    asserted.as_str(),
                    request.score,
                    expected.as_str()
                ));
            }
        }

        // (b) completeness: every high-severity factor must be referenced.
        let lowered = request.explanation.to_lowercase();
        for factor in request.risk_factors.iter().filter(|f| f.severity.is_high()) {
            let humanized = factor.kind.replace('_', " ").to_lowercase();
            if !lowered.contains(&humanized) && !lowered.contains(&factor.kind.to_lowercase()) {
                notes.push(format!(
                    "high-severity risk '{}' is not mentioned in the explanation",
                    factor.kind
                ));
            }
        }

        if notes.is_empty() {
            Ok(ValidationVerdict::passing())
        } else {
            Ok(ValidationVerdict::failing(notes.join("; ")))
        }
    }

    fn name(&self) -> &str {
        "rule-validator"
    }
}

// ---------------------------------------------------------------------------
// HttpValidationClient
// ---------------------------------------------------------------------------

/// Client for an LLM validation gateway exposing `POST {base}/validate`.
#[derive(Debug, Clone)]
pub struct HttpValidationClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpValidationClient {
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
impl ValidationService for HttpValidationClient {
    async fn validate(&self, request: &ValidateRequest) -> Result<ValidationVerdict> {
        let url = format!("{}/validate", self.base_url.trim_end_matches('/'));
        post_json(&self.client, "validation", &url, request, self.timeout).await
    }

    fn name(&self) -> &str {
        "http-validator"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
