//! Collaborator services for the Acumen engine: ML scoring, LLM reasoning,
//! and LLM validation.
//!
//! Each service is a narrow `#[async_trait]` trait with two implementations:
//! a deterministic local one (used when no remote endpoint is configured, and
//! in tests) and a reqwest-backed HTTP client speaking the collaborator
//! contract (`POST /score`, `POST /explain`, `POST /validate`).

mod http;
mod reasoning;
mod scoring;
mod types;
mod validation;

pub use reasoning::*;
pub use scoring::*;
pub use types::*;
pub use validation::*;
