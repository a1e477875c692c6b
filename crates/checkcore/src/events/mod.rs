mod base;

pub use base::{ActorEvent, EventBus, EventEmitter, ExecutionEvent, ExecutionId};
