//! Stage agent trait, dynamic dispatch wrapper, and agent registry.

use std::collections::HashMap;

use async_trait::async_trait;

use acumen_agents::DataHub;
use acumen_types::{ExecutionContext, Payload, Result};

// ---------------------------------------------------------------------------
// Agent trait
// ---------------------------------------------------------------------------

/// One pipeline stage. Agents declare their field contracts up front so the
/// compiler can reject a chain before anything runs.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The stage identifier used in EXECUTE chains (e.g. "monitoring").
    fn name(&self) -> &str;

    /// Payload fields this agent requires. `data_ref` and `tenant_id` are
    /// always available from the query itself.
    fn input_contract(&self) -> &[&str];

    /// Payload fields this agent guarantees to produce on success.
    fn output_contract(&self) -> &[&str];

    /// Execute the stage over the assembled input fields.
    async fn run(&self, ctx: &ExecutionContext, inputs: &Payload) -> Result<Payload>;
}

// ---------------------------------------------------------------------------
// DynAgent — object-safe wrapper
// ---------------------------------------------------------------------------

pub struct DynAgent(Box<dyn Agent>);

impl DynAgent {
    pub fn new(agent: impl Agent + 'static) -> Self {
        Self(Box::new(agent))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn input_contract(&self) -> &[&str] {
        self.0.input_contract()
    }

    pub fn output_contract(&self) -> &[&str] {
        self.0.output_contract()
    }

    pub async fn run(&self, ctx: &ExecutionContext, inputs: &Payload) -> Result<Payload> {
        self.0.run(ctx, inputs).await
    }
}

// ---------------------------------------------------------------------------
// AgentRegistry
// ---------------------------------------------------------------------------

/// Named agents available to EXECUTE chains. Lookup is case-insensitive; the
/// parser lowercases stage names and registration lowercases agent names, so
/// `Extraction` and `extraction` resolve to the same agent.
pub struct AgentRegistry {
    agents: HashMap<String, DynAgent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
        }
    }

    pub fn register(&mut self, agent: impl Agent + 'static) {
        let name = agent.name().to_lowercase();
        self.agents.insert(name, DynAgent::new(agent));
    }

    pub fn get(&self, name: &str) -> Option<&DynAgent> {
        self.agents.get(&name.to_lowercase())
    }

    pub fn has(&self, name: &str) -> bool {
        self.agents.contains_key(&name.to_lowercase())
    }

    /// Registered agent names in sorted order.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Default registry factory
// ---------------------------------------------------------------------------

/// Registry with the three built-in stages wired to the given data hub.
pub fn default_registry(hub: DataHub) -> AgentRegistry {
    let mut reg = AgentRegistry::new();
    reg.register(crate::stages::ExtractionAgent::new(hub));
    reg.register(crate::stages::MonitoringAgent);
    reg.register(crate::stages::ForecastingAgent);
    reg
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
