//! Core abstractions for checkflow
//!
//! Message types, port contracts, status messages and the actor model that
//! the runtime wires into a graph. This crate does not execute anything.

mod actor;
mod error;
pub mod events;
mod message;
pub mod msgtype;
pub mod port;
mod value;
mod workflow;

pub use actor::{
    Action, ActionOutput, ActorContext, ActorNode, ActorNodeBuilder, InputValue,
};
pub use error::{ActorError, CheckError, ConstructionError};
pub use events::*;
pub use message::{ErrorDetail, Outcome, SkipCause, StatusMessage};
pub use msgtype::{TypeDeclaration, TypeDescriptor, TypeRegistry, COMMAND_STATUS_TYPE};
pub use port::{Cardinality, InputPort, OutputPort, PortContract};
pub use value::{CommandStatus, Value};
pub use workflow::{ActorSpec, Connection, WorkflowSpec};

/// Result type for checkflow operations
pub type Result<T> = std::result::Result<T, CheckError>;
