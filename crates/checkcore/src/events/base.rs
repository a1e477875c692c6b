use crate::Outcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted during workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    WorkflowStarted {
        execution_id: ExecutionId,
        workflow: String,
        actors: usize,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        execution_id: ExecutionId,
        succeeded: usize,
        skipped: usize,
        failed: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    ActorStarted {
        execution_id: ExecutionId,
        actor: String,
        kind: String,
        timestamp: DateTime<Utc>,
    },
    ActorCompleted {
        execution_id: ExecutionId,
        actor: String,
        /// Outcome of the actor as a whole
        outcome: Outcome,
        /// Outcome per output port
        outcomes: BTreeMap<String, Outcome>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    ActorEvent {
        execution_id: ExecutionId,
        actor: String,
        event: ActorEvent,
        timestamp: DateTime<Utc>,
    },
}

/// Events specific to one actor's action
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ActorEvent {
    Info { message: String },
    Warning { message: String },
}

/// Event emitter for actions to send real-time updates
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    actor: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        execution_id: ExecutionId,
        actor: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            execution_id,
            actor: actor.into(),
            sender,
        }
    }

    /// Emitter that nobody listens to
    pub fn detached(actor: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self::new(ExecutionId::nil(), actor, sender)
    }

    pub fn emit(&self, event: ActorEvent) {
        let _ = self.sender.send(ExecutionEvent::ActorEvent {
            execution_id: self.execution_id,
            actor: self.actor.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(ActorEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(ActorEvent::Warning {
            message: message.into(),
        });
    }
}

/// Global event bus
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, execution_id: ExecutionId, actor: &str) -> EventEmitter {
        EventEmitter::new(execution_id, actor, self.sender.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emitter_reaches_subscribers() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let emitter = bus.create_emitter(ExecutionId::new_v4(), "has-docker");

        emitter.info("checking");

        match rx.recv().await.unwrap() {
            ExecutionEvent::ActorEvent { actor, event, .. } => {
                assert_eq!(actor, "has-docker");
                assert!(matches!(event, ActorEvent::Info { message } if message == "checking"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
