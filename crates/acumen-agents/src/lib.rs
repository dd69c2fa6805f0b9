//! Domain agents for the Acumen credit-risk pipeline.
//!
//! This crate holds the pure domain logic behind the three built-in stages:
//!
//! - **extraction** — source connectors ([`DataHub`]) and normalization of
//!   raw bank/e-commerce/OCR records into [`acumen_types::Transaction`]s
//! - **monitoring** — cashflow metrics, the Financial Health Index, and risk
//!   flag detection
//! - **forecasting** — moving-average cashflow projection, stress scenarios,
//!   and liquidity risk
//!
//! The pipeline crate wraps these functions as registry agents; nothing here
//! knows about queries, retries, or payload contracts.

pub mod extraction;
pub mod forecasting;
pub mod monitoring;
pub mod sources;
mod stats;

pub use extraction::{
    categorize, normalize_bank_records, normalize_ecommerce_records, normalize_ocr_documents,
    normalize_records,
};
pub use forecasting::{
    forecast_cashflow, CashflowForecast, ForecastPoint, ForecastSummary, Impact, StressScenario,
    StressScenarios, DEFAULT_HORIZON_DAYS,
};
pub use monitoring::{compute_metrics, detect_risks, financial_health_index, CashflowMetrics};
pub use sources::{DataHub, JsonFileConnector, SourceConnector, SourceKind, StaticConnector};
