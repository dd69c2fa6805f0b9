use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use acumen_types::AggregatedResult;

use crate::error::ApiError;
use crate::AppState;

/// Request body for query execution.
///
/// POST /queries/execute
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub query_text: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// One registered stage agent and its field contracts.
#[derive(Debug, Serialize)]
pub struct AgentDescriptor {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

/// Execute an AgentQL query and return the aggregated result.
///
/// Stage failures degrade the result (`status`: partial/failed); only parse
/// and compile errors, auth failures, and internal faults become HTTP errors.
pub async fn execute_query(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<AggregatedResult>, ApiError> {
    let tenant_id = req.tenant_id.as_deref().unwrap_or("default");
    let result = state.engine.execute(&req.query_text, tenant_id).await?;
    Ok(Json(result))
}

/// GET /health
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "acumen-api",
    }))
}

/// GET /agents
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentDescriptor>> {
    let registry = state.engine.registry();
    let agents = registry
        .names()
        .into_iter()
        .filter_map(|name| {
            registry.get(&name).map(|agent| AgentDescriptor {
                name: name.clone(),
                inputs: agent.input_contract().iter().map(|f| f.to_string()).collect(),
                outputs: agent
                    .output_contract()
                    .iter()
                    .map(|f| f.to_string())
                    .collect(),
            })
        })
        .collect();
    Json(agents)
}
