use crate::{InputPort, OutputPort, TypeDeclaration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Serializable workflow definition: types, actors and optional explicit
/// connections. Everything not connected explicitly is wired by type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Directory of JSON type declarations, relative to the workflow file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types_dir: Option<PathBuf>,
    /// Inline type declarations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<TypeDeclaration>,
    pub actors: Vec<ActorSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,
}

impl WorkflowSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn add_type(&mut self, decl: TypeDeclaration) {
        self.types.push(decl);
    }

    pub fn add_actor(&mut self, actor: ActorSpec) {
        self.actors.push(actor);
    }

    pub fn connect(
        &mut self,
        from_actor: impl Into<String>,
        from_port: impl Into<String>,
        to_actor: impl Into<String>,
        to_port: impl Into<String>,
    ) {
        self.connections.push(Connection {
            from_actor: from_actor.into(),
            from_port: from_port.into(),
            to_actor: to_actor.into(),
            to_port: to_port.into(),
        });
    }

    pub fn find_actor(&self, name: &str) -> Option<&ActorSpec> {
        self.actors.iter().find(|a| a.name == name)
    }
}

/// Actor specification in a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorSpec {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub inports: BTreeMap<String, InputPort>,
    #[serde(default)]
    pub outports: BTreeMap<String, OutputPort>,
}

impl ActorSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            config: serde_json::Map::new(),
            inports: BTreeMap::new(),
            outports: BTreeMap::new(),
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_inport(mut self, port: impl Into<String>, spec: impl Into<InputPort>) -> Self {
        self.inports.insert(port.into(), spec.into());
        self
    }

    pub fn with_outport(mut self, port: impl Into<String>, spec: OutputPort) -> Self {
        self.outports.insert(port.into(), spec);
        self
    }

    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }
}

/// Explicit connection between two actor ports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from_actor: String,
    pub from_port: String,
    pub to_actor: String,
    pub to_port: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PortContract;

    #[test]
    fn test_workflow_spec_from_json() {
        let json = r#"{
            "name": "checks",
            "types": [{"name": "Trigger"}],
            "actors": [
                {
                    "name": "has-docker",
                    "kind": "script",
                    "config": {"script": "scripts/has_docker.sh"},
                    "inports": {"start": {"kind": "wired", "type": "Trigger", "cardinality": "any"}},
                    "outports": {"has_docker": {"type": "DockerStatus"}}
                }
            ]
        }"#;

        let spec: WorkflowSpec = serde_json::from_str(json).unwrap();
        let actor = spec.find_actor("has-docker").unwrap();

        assert_eq!(actor.config_str("script"), Some("scripts/has_docker.sh"));
        assert_eq!(
            actor.inports["start"],
            InputPort::Wired(PortContract::any("Trigger"))
        );
        assert!(!actor.outports["has_docker"].is_final);
        assert!(spec.connections.is_empty());
    }
}
