use checkcore::{ActorNode, ActorSpec, ConstructionError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Factory trait for creating actors from workflow specs
pub trait ActorFactory: Send + Sync {
    /// Create an actor from its spec (name, config and declared ports)
    fn create(&self, spec: &ActorSpec) -> Result<ActorNode, ConstructionError>;

    /// Actor kind identifier, matched against `ActorSpec::kind`
    fn kind(&self) -> &str;

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata::default()
    }
}

/// Metadata about an actor kind
#[derive(Debug, Clone)]
pub struct ActorMetadata {
    pub description: String,
    pub category: String,
}

impl Default for ActorMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
        }
    }
}

/// Registry of available actor kinds. Registration is explicit; nothing is
/// discovered by path or naming convention.
#[derive(Default)]
pub struct ActorRegistry {
    factories: BTreeMap<String, Arc<dyn ActorFactory>>,
}

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn ActorFactory>) {
        let kind = factory.kind().to_string();
        tracing::info!("Registering actor kind: {}", kind);
        if self.factories.insert(kind.clone(), factory).is_some() {
            tracing::warn!("Actor kind {} registered twice, keeping the latest", kind);
        }
    }

    pub fn create_actor(&self, spec: &ActorSpec) -> Result<ActorNode, ConstructionError> {
        let factory = self
            .factories
            .get(&spec.kind)
            .ok_or_else(|| ConstructionError::UnknownActorKind(spec.kind.clone()))?;

        factory.create(spec)
    }

    pub fn list_kinds(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn get_metadata(&self, kind: &str) -> Option<ActorMetadata> {
        self.factories.get(kind).map(|f| f.metadata())
    }
}
