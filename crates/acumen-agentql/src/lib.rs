//! Parser for AgentQL, the query language that drives Acumen pipelines.
//!
//! Parses `QUERY` / `USING` / `EXECUTE` / `RETURN` clauses into a typed
//! [`AgentQuery`]. Keywords match case-insensitively, clauses may appear in
//! any order, and each clause must appear exactly once. Stage names in the
//! `EXECUTE` chain are normalized to lowercase and must not repeat.
//!
//! # Example
//! ```
//! let text = "QUERY sme_risk_check\n\
//!             USING dataset://tenant-42/transactions\n\
//!             EXECUTE Extraction -> Monitoring -> Forecasting\n\
//!             RETURN score, explanation, risk_factors";
//! let query = acumen_agentql::parse(text).unwrap();
//! assert_eq!(query.name, "sme_risk_check");
//! assert_eq!(query.stages, vec!["extraction", "monitoring", "forecasting"]);
//! ```

pub mod ast;
mod parser;

pub use ast::*;
pub use parser::parse;
