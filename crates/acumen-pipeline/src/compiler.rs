//! Plan compilation: resolve EXECUTE stages against the registry and verify
//! field contracts before anything runs.

use std::collections::BTreeSet;

use acumen_agentql::AgentQuery;
use acumen_types::{AcumenError, Result};

use crate::agent::AgentRegistry;

// ---------------------------------------------------------------------------
// ExecutionPlan
// ---------------------------------------------------------------------------

/// One resolved stage of a compiled plan, with its contracts copied out of
/// the registry so the engine never re-resolves mid-run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStage {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// A compiled, contract-checked execution plan. Stages run strictly in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub stages: Vec<PlannedStage>,
}

// ---------------------------------------------------------------------------
// compile
// ---------------------------------------------------------------------------

/// Compile a parsed query into an execution plan.
///
/// Fails with [`AcumenError::UnknownAgent`] on the first stage name the
/// registry cannot resolve, and with [`AcumenError::ContractMismatch`] when a
/// stage requires a field that neither the query itself (`data_ref`,
/// `tenant_id`) nor any upstream stage provides.
pub fn compile(query: &AgentQuery, registry: &AgentRegistry) -> Result<ExecutionPlan> {
    let mut stages = Vec::with_capacity(query.stages.len());
    let mut available: BTreeSet<String> = BTreeSet::new();
    available.insert("data_ref".to_string());
    available.insert("tenant_id".to_string());

    for stage_name in &query.stages {
        let agent = registry
            .get(stage_name)
            .ok_or_else(|| AcumenError::UnknownAgent {
                stage: stage_name.clone(),
            })?;

        for input in agent.input_contract() {
            if !available.contains(*input) {
                return Err(AcumenError::ContractMismatch {
                    stage: stage_name.clone(),
                    field: (*input).to_string(),
                });
            }
        }

        for output in agent.output_contract() {
            available.insert((*output).to_string());
        }

        stages.push(PlannedStage {
            name: stage_name.clone(),
            inputs: agent.input_contract().iter().map(|s| s.to_string()).collect(),
            outputs: agent
                .output_contract()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        });
    }

    tracing::debug!(stages = stages.len(), "compiled execution plan");
    Ok(ExecutionPlan { stages })
}
