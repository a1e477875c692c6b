use crate::registry::ActorRegistry;
use crate::wiring::{WiringResolver, WorkflowGraph};
use crate::{ExecutionResult, WorkflowExecutor};
use checkcore::{
    CheckError, EventBus, ExecutionEvent, TypeDeclaration, TypeRegistry, Value, WorkflowSpec,
    COMMAND_STATUS_TYPE,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Main runtime: builds graphs from workflow specs and executes them
pub struct CheckRuntime {
    registry: Arc<ActorRegistry>,
    executor: Arc<WorkflowExecutor>,
    event_bus: Arc<EventBus>,
}

impl CheckRuntime {
    pub fn new(registry: ActorRegistry) -> Self {
        Self::with_config(registry, RuntimeConfig::default())
    }

    pub fn with_config(registry: ActorRegistry, config: RuntimeConfig) -> Self {
        let executor = Arc::new(WorkflowExecutor::new(
            config.max_parallel_actors,
            config.command_status_type,
        ));
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Self {
            registry: Arc::new(registry),
            executor,
            event_bus,
        }
    }

    pub fn registry(&self) -> &Arc<ActorRegistry> {
        &self.registry
    }

    /// Resolve types, create actors and wire them. Nothing runs.
    ///
    /// `declarations` come first, so they win over inline declarations of
    /// the same name.
    pub fn build(
        &self,
        spec: &WorkflowSpec,
        declarations: Vec<TypeDeclaration>,
        initial: &BTreeMap<String, Value>,
    ) -> Result<WorkflowGraph, CheckError> {
        let (types, unresolved) = TypeRegistry::resolve(
            declarations.into_iter().chain(spec.types.iter().cloned()),
        );
        if !unresolved.is_empty() {
            tracing::warn!("Unresolved message types: {}", unresolved.join(", "));
        }

        let actors = spec
            .actors
            .iter()
            .map(|actor| self.registry.create_actor(actor))
            .collect::<Result<Vec<_>, _>>()?;

        let graph = WiringResolver::new(Arc::new(types)).resolve(
            spec.name.clone(),
            actors,
            &spec.connections,
            initial,
        )?;

        tracing::info!(
            "Built workflow {} with {} actors and {} edges",
            graph.name(),
            graph.len(),
            graph.edges().len()
        );
        Ok(graph)
    }

    pub async fn execute(&self, graph: Arc<WorkflowGraph>) -> ExecutionResult {
        self.executor.execute(graph, &self.event_bus).await
    }

    /// Build and execute in one step
    pub async fn run(
        &self,
        spec: &WorkflowSpec,
        declarations: Vec<TypeDeclaration>,
        initial: &BTreeMap<String, Value>,
    ) -> Result<ExecutionResult, CheckError> {
        let graph = self.build(spec, declarations, initial)?;
        Ok(self.execute(Arc::new(graph)).await)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_parallel_actors: usize,
    pub event_buffer_size: usize,
    /// Messages of this type (or a subtype) with a non-zero exit code count
    /// as failed prerequisites
    pub command_status_type: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_actors: 10,
            event_buffer_size: 1000,
            command_status_type: COMMAND_STATUS_TYPE.to_string(),
        }
    }
}
