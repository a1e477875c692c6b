//! Workflow construction and execution
//!
//! Wires actors into a graph by message type, then runs the graph with every
//! actor wrapped so that failures flow downstream as status messages.

mod executor;
mod loader;
pub mod propagation;
mod registry;
mod runtime;
pub mod wiring;

pub use executor::{ExecutionResult, ExecutionSummary, WorkflowExecutor};
pub use loader::{load_workflow, LoadedWorkflow};
pub use propagation::{ErrorPropagation, Invocation};
pub use registry::{ActorFactory, ActorMetadata, ActorRegistry};
pub use runtime::{CheckRuntime, RuntimeConfig};
pub use wiring::{Binding, Edge, ProducerRef, WiringResolver, WorkflowGraph};
