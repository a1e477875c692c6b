//! Port contracts and the type-compatibility rule used for wiring

use crate::{ConstructionError, TypeRegistry};
use serde::{Deserialize, Serialize};

/// How many producers an input port binds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    /// Exactly one producer
    Single,
    /// Exactly one producer, chosen among all compatible outputs
    Any,
    /// Every compatible producer, collected by actor name
    All,
}

impl Cardinality {
    pub fn binds_many(self) -> bool {
        matches!(self, Cardinality::All)
    }
}

/// Accepted message type and cardinality of an input port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortContract {
    #[serde(rename = "type")]
    pub accepted_type: String,
    pub cardinality: Cardinality,
}

impl PortContract {
    pub fn new(accepted_type: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            accepted_type: accepted_type.into(),
            cardinality,
        }
    }

    pub fn single(accepted_type: impl Into<String>) -> Self {
        Self::new(accepted_type, Cardinality::Single)
    }

    pub fn any(accepted_type: impl Into<String>) -> Self {
        Self::new(accepted_type, Cardinality::Any)
    }

    pub fn all(accepted_type: impl Into<String>) -> Self {
        Self::new(accepted_type, Cardinality::All)
    }

    /// True if a producer of `produced` may feed this port
    pub fn accepts(&self, registry: &TypeRegistry, produced: &str) -> bool {
        registry.is_subtype(produced, &self.accepted_type)
    }
}

/// Declaration of an actor input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InputPort {
    /// Bound to producer outputs during wiring
    Wired(PortContract),
    /// Supplied by the caller when the graph is built
    Initial,
}

impl InputPort {
    pub fn contract(&self) -> Option<&PortContract> {
        match self {
            InputPort::Wired(c) => Some(c),
            InputPort::Initial => None,
        }
    }
}

impl From<PortContract> for InputPort {
    fn from(contract: PortContract) -> Self {
        InputPort::Wired(contract)
    }
}

/// Declaration of an actor output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPort {
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Harvested into the execution result
    #[serde(default, rename = "final")]
    pub is_final: bool,
}

impl OutputPort {
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            is_final: false,
        }
    }

    pub fn final_port(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            is_final: true,
        }
    }
}

/// Check that `type_name` is resolved in `registry`
pub fn require_type(
    registry: &TypeRegistry,
    actor: &str,
    port: &str,
    type_name: &str,
) -> Result<(), ConstructionError> {
    if registry.contains(type_name) {
        Ok(())
    } else {
        Err(ConstructionError::UnresolvedType {
            actor: actor.to_string(),
            port: port.to_string(),
            type_name: type_name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TypeDeclaration;

    fn registry() -> TypeRegistry {
        TypeRegistry::resolve(vec![
            TypeDeclaration::new("ShellCommandStatus"),
            TypeDeclaration::new("DockerStatus").with_superclass("ShellCommandStatus"),
            TypeDeclaration::new("Trigger"),
        ])
        .0
    }

    #[test]
    fn test_accepts_same_and_descendant() {
        let registry = registry();
        let contract = PortContract::all("ShellCommandStatus");

        assert!(contract.accepts(&registry, "ShellCommandStatus"));
        assert!(contract.accepts(&registry, "DockerStatus"));
        assert!(!contract.accepts(&registry, "Trigger"));
        assert!(!contract.accepts(&registry, "Unknown"));
    }

    #[test]
    fn test_narrow_contract_rejects_parent() {
        let registry = registry();
        let contract = PortContract::any("DockerStatus");

        assert!(!contract.accepts(&registry, "ShellCommandStatus"));
    }

    #[test]
    fn test_input_port_serde_shape() {
        let port: InputPort =
            serde_json::from_str(r#"{"kind": "wired", "type": "DockerStatus", "cardinality": "any"}"#)
                .unwrap();
        assert_eq!(port, InputPort::Wired(PortContract::any("DockerStatus")));

        let port: InputPort = serde_json::from_str(r#"{"kind": "initial"}"#).unwrap();
        assert_eq!(port, InputPort::Initial);

        let out: OutputPort = serde_json::from_str(r#"{"type": "Report", "final": true}"#).unwrap();
        assert!(out.is_final);
    }

    #[test]
    fn test_require_type() {
        let registry = registry();
        assert!(require_type(&registry, "a", "p", "Trigger").is_ok());
        assert!(matches!(
            require_type(&registry, "a", "p", "Nope"),
            Err(ConstructionError::UnresolvedType { .. })
        ));
    }
}
