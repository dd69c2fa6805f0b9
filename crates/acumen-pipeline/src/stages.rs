//! The three built-in stage agents: extraction, monitoring, forecasting.
//!
//! Each agent is a thin contract-bearing wrapper over the domain functions in
//! `acumen-agents`; the engine owns timeouts, retries, and recording.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use acumen_agents::{
    compute_metrics, detect_risks, financial_health_index, forecast_cashflow, normalize_records,
    DataHub, DEFAULT_HORIZON_DAYS,
};
use acumen_types::{AcumenError, ExecutionContext, Payload, Result, Transaction};

use crate::agent::Agent;

// ---------------------------------------------------------------------------
// ExtractionAgent
// ---------------------------------------------------------------------------

/// Fans out over every connector in the hub concurrently and merges the
/// normalized transactions in connector registration order, so output order
/// never depends on task scheduling.
///
/// A single failing source does not fail the stage; its error is reported in
/// the `source_errors` output field. The stage fails only when every source
/// fails, and that failure is transient if any branch error was.
pub struct ExtractionAgent {
    hub: DataHub,
}

impl ExtractionAgent {
    pub fn new(hub: DataHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl Agent for ExtractionAgent {
    fn name(&self) -> &str {
        "extraction"
    }

    fn input_contract(&self) -> &[&str] {
        &["data_ref"]
    }

    fn output_contract(&self) -> &[&str] {
        &["transactions", "transactions_extracted", "sources"]
    }

    async fn run(&self, ctx: &ExecutionContext, inputs: &Payload) -> Result<Payload> {
        let data_ref = inputs
            .get("data_ref")
            .and_then(Value::as_str)
            .unwrap_or(&ctx.data_ref);

        let mut set = tokio::task::JoinSet::new();
        for connector in self.hub.connectors() {
            let connector = connector.clone();
            let data_ref = data_ref.to_string();
            set.spawn(async move {
                let outcome = async {
                    let records = connector.fetch(&data_ref).await?;
                    normalize_records(connector.kind(), &records)
                }
                .await;
                (connector.name().to_string(), outcome)
            });
        }

        let mut fetched: HashMap<String, Vec<Transaction>> = HashMap::new();
        let mut errors: Vec<(String, AcumenError)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (name, outcome) = joined
                .map_err(|e| AcumenError::Other(format!("extraction worker panicked: {e}")))?;
            match outcome {
                Ok(txs) => {
                    fetched.insert(name, txs);
                }
                Err(e) => errors.push((name, e)),
            }
        }
        errors.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, error) in &errors {
            tracing::warn!(source = %name, error = %error, "source failed during extraction");
        }

        if fetched.is_empty() && !errors.is_empty() {
            let transient = errors.iter().any(|(_, e)| e.is_transient());
            let message = errors
                .iter()
                .map(|(name, e)| format!("source '{name}': {e}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(AcumenError::Agent {
                stage: "extraction".to_string(),
                message: format!("all sources failed: {message}"),
                transient,
            });
        }

        let mut transactions: Vec<Transaction> = Vec::new();
        let mut sources: Vec<String> = Vec::new();
        for connector in self.hub.connectors() {
            if let Some(txs) = fetched.remove(connector.name()) {
                if !txs.is_empty() {
                    sources.push(connector.name().to_string());
                }
                transactions.extend(txs);
            }
        }

        tracing::debug!(
            transactions = transactions.len(),
            sources = sources.len(),
            failed_sources = errors.len(),
            "extraction merged source records"
        );

        let mut payload = Payload::new();
        payload.insert(
            "transactions".to_string(),
            serde_json::to_value(&transactions)?,
        );
        payload.insert(
            "transactions_extracted".to_string(),
            serde_json::json!(transactions.len()),
        );
        payload.insert("sources".to_string(), serde_json::json!(sources));
        if !errors.is_empty() {
            let messages: Vec<String> = errors
                .iter()
                .map(|(name, e)| format!("source '{name}': {e}"))
                .collect();
            payload.insert("source_errors".to_string(), serde_json::json!(messages));
        }
        Ok(payload)
    }
}

// ---------------------------------------------------------------------------
// MonitoringAgent
// ---------------------------------------------------------------------------

pub struct MonitoringAgent;

#[async_trait]
impl Agent for MonitoringAgent {
    fn name(&self) -> &str {
        "monitoring"
    }

    fn input_contract(&self) -> &[&str] {
        &["transactions"]
    }

    fn output_contract(&self) -> &[&str] {
        &["fhi_score", "risk_flags", "metrics"]
    }

    async fn run(&self, _ctx: &ExecutionContext, inputs: &Payload) -> Result<Payload> {
        let transactions = transactions_input(inputs, "monitoring")?;
        let Some(metrics) = compute_metrics(&transactions) else {
            return Err(AcumenError::Agent {
                stage: "monitoring".to_string(),
                message: "no transactions to analyze".to_string(),
                transient: false,
            });
        };
        let fhi = financial_health_index(&metrics);
        let flags = detect_risks(&metrics, &transactions);
        tracing::debug!(
            fhi_score = fhi,
            risk_flags = flags.len(),
            "monitoring computed metrics"
        );

        let mut payload = Payload::new();
        payload.insert("fhi_score".to_string(), serde_json::json!(fhi));
        payload.insert("risk_flags".to_string(), serde_json::to_value(&flags)?);
        payload.insert("metrics".to_string(), serde_json::to_value(&metrics)?);
        Ok(payload)
    }
}

// ---------------------------------------------------------------------------
// ForecastingAgent
// ---------------------------------------------------------------------------

/// Projects daily net cashflow over the default 30-day horizon. `metrics` is
/// consumed only as an ordering constraint; the projection itself works from
/// the raw transactions.
pub struct ForecastingAgent;

#[async_trait]
impl Agent for ForecastingAgent {
    fn name(&self) -> &str {
        "forecasting"
    }

    fn input_contract(&self) -> &[&str] {
        &["transactions", "metrics"]
    }

    fn output_contract(&self) -> &[&str] {
        &[
            "cashflow_30d",
            "liquidity_risk_score",
            "stress_scenarios",
            "forecast_summary",
        ]
    }

    async fn run(&self, _ctx: &ExecutionContext, inputs: &Payload) -> Result<Payload> {
        let transactions = transactions_input(inputs, "forecasting")?;
        let Some(forecast) = forecast_cashflow(&transactions, DEFAULT_HORIZON_DAYS) else {
            return Err(AcumenError::Agent {
                stage: "forecasting".to_string(),
                message: "no transaction history to forecast".to_string(),
                transient: false,
            });
        };
        tracing::debug!(
            horizon_days = forecast.points.len(),
            liquidity_risk = forecast.liquidity_risk_score,
            "forecasting projected cashflow"
        );

        let mut payload = Payload::new();
        payload.insert(
            "cashflow_30d".to_string(),
            serde_json::to_value(&forecast.points)?,
        );
        payload.insert(
            "liquidity_risk_score".to_string(),
            serde_json::json!(forecast.liquidity_risk_score),
        );
        payload.insert(
            "stress_scenarios".to_string(),
            serde_json::to_value(&forecast.stress_scenarios)?,
        );
        payload.insert(
            "forecast_summary".to_string(),
            serde_json::to_value(&forecast.summary)?,
        );
        Ok(payload)
    }
}

fn transactions_input(inputs: &Payload, stage: &str) -> Result<Vec<Transaction>> {
    match inputs.get("transactions") {
        Some(value) => Ok(serde_json::from_value(value.clone())?),
        None => Err(AcumenError::ContractMismatch {
            stage: stage.to_string(),
            field: "transactions".to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
