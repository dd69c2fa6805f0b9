use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentQuery {
    pub name: String,
    pub data_ref: String,
    pub stages: Vec<String>,
    pub return_fields: Vec<String>,
}

impl AgentQuery {
    /// Canonical text form: one clause per line, uppercase keywords.
    pub fn to_text(&self) -> String {
        format!(
            "QUERY {}\nUSING {}\nEXECUTE {}\nRETURN {}",
            self.name,
            self.data_ref,
            self.stages.join(" -> "),
            self.return_fields.join(", "),
        )
    }
}
