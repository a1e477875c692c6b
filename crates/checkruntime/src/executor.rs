use crate::propagation::{ErrorPropagation, Invocation};
use crate::wiring::{Binding, WorkflowGraph};
use checkcore::{
    ActorContext, EventBus, ExecutionEvent, ExecutionId, InputValue, Outcome, StatusMessage,
};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

/// Runs workflow graphs, executing independent actors concurrently
pub struct WorkflowExecutor {
    max_parallel: usize,
    command_status_type: String,
}

impl WorkflowExecutor {
    pub fn new(max_parallel: usize, command_status_type: impl Into<String>) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            command_status_type: command_status_type.into(),
        }
    }

    /// Execute `graph` to completion.
    ///
    /// Failures inside actors are carried as status messages, so this always
    /// returns a full result.
    pub async fn execute(&self, graph: Arc<WorkflowGraph>, event_bus: &EventBus) -> ExecutionResult {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();

        event_bus.emit(ExecutionEvent::WorkflowStarted {
            execution_id,
            workflow: graph.name().to_string(),
            actors: graph.len(),
            timestamp: Utc::now(),
        });

        tracing::info!("Starting workflow execution: {} ({})", graph.name(), execution_id);

        let propagation = Arc::new(ErrorPropagation::new(
            graph.registry().clone(),
            self.command_status_type.clone(),
        ));

        let mut started: HashSet<String> = HashSet::new();
        let mut outcomes: BTreeMap<String, Outcome> = BTreeMap::new();
        let mut outputs: BTreeMap<String, BTreeMap<String, StatusMessage>> = BTreeMap::new();
        let mut running = FuturesUnordered::new();

        loop {
            for name in self.find_ready_actors(&graph, &started, &outcomes) {
                if running.len() >= self.max_parallel {
                    break;
                }
                let Some(node) = graph.actor(&name).cloned() else {
                    continue;
                };

                let ctx = ActorContext {
                    actor: name.clone(),
                    inputs: self.collect_actor_inputs(&graph, &name, &outputs),
                    outputs: node.outports().clone(),
                    events: event_bus.create_emitter(execution_id, &name),
                };

                event_bus.emit(ExecutionEvent::ActorStarted {
                    execution_id,
                    actor: name.clone(),
                    kind: node.action().kind().to_string(),
                    timestamp: Utc::now(),
                });
                started.insert(name.clone());

                let propagation = propagation.clone();
                let handle = tokio::spawn(async move { propagation.invoke(&node, ctx).await });
                running.push(async move {
                    let start = Instant::now();
                    let joined = handle.await;
                    (name, joined, start.elapsed().as_millis() as u64)
                });
            }

            if running.is_empty() {
                break;
            }

            if let Some((name, joined, duration_ms)) = running.next().await {
                let invocation = match joined {
                    Ok(invocation) => invocation,
                    Err(e) => {
                        tracing::error!("Actor {} task aborted: {}", name, e);
                        self.aborted(&graph, &name, &e.to_string())
                    }
                };

                tracing::info!(
                    "Actor {} finished in {}ms: {:?}",
                    name,
                    duration_ms,
                    invocation.outcome
                );

                event_bus.emit(ExecutionEvent::ActorCompleted {
                    execution_id,
                    actor: name.clone(),
                    outcome: invocation.outcome,
                    outcomes: invocation
                        .outputs
                        .iter()
                        .map(|(port, msg)| (port.clone(), msg.outcome()))
                        .collect(),
                    duration_ms,
                    timestamp: Utc::now(),
                });

                outcomes.insert(name.clone(), invocation.outcome);
                outputs.insert(name, invocation.outputs);
            }
        }

        let result = ExecutionResult::collect(execution_id, &graph, outcomes, outputs);
        let duration_ms = start_time.elapsed().as_millis() as u64;

        event_bus.emit(ExecutionEvent::WorkflowCompleted {
            execution_id,
            succeeded: result.summary.succeeded,
            skipped: result.summary.skipped,
            failed: result.summary.failed,
            duration_ms,
            timestamp: Utc::now(),
        });

        tracing::info!(
            "Workflow {} completed in {}ms: {} succeeded, {} skipped, {} failed",
            graph.name(),
            duration_ms,
            result.summary.succeeded,
            result.summary.skipped,
            result.summary.failed
        );

        result
    }

    /// Actors not yet started whose producers have all completed, in
    /// topological order
    fn find_ready_actors(
        &self,
        graph: &WorkflowGraph,
        started: &HashSet<String>,
        completed: &BTreeMap<String, Outcome>,
    ) -> Vec<String> {
        graph
            .topological_order()
            .iter()
            .filter(|name| !started.contains(*name))
            .filter(|name| {
                graph
                    .dependencies(name)
                    .iter()
                    .all(|dep| completed.contains_key(*dep))
            })
            .cloned()
            .collect()
    }

    /// Bound inputs for `actor`, read from completed producers
    fn collect_actor_inputs(
        &self,
        graph: &WorkflowGraph,
        actor: &str,
        outputs: &BTreeMap<String, BTreeMap<String, StatusMessage>>,
    ) -> BTreeMap<String, InputValue> {
        let Some(bindings) = graph.bindings(actor) else {
            return BTreeMap::new();
        };

        let read = |producer: &crate::wiring::ProducerRef| -> StatusMessage {
            outputs
                .get(&producer.actor)
                .and_then(|ports| ports.get(&producer.port))
                .cloned()
                .unwrap_or_else(|| {
                    let msg_type = graph
                        .actor(&producer.actor)
                        .and_then(|a| a.outports().get(&producer.port))
                        .map(|out| out.msg_type.clone())
                        .unwrap_or_default();
                    StatusMessage::execution_failure(
                        msg_type,
                        producer.actor.clone(),
                        format!("no value on output '{}'", producer.port),
                    )
                })
        };

        bindings
            .iter()
            .map(|(port, binding)| {
                let value = match binding {
                    Binding::Single(producer) => InputValue::Single(read(producer)),
                    Binding::All(producers) => InputValue::All(
                        producers
                            .iter()
                            .map(|(key, producer)| (key.clone(), read(producer)))
                            .collect(),
                    ),
                    Binding::Initial(value) => InputValue::Initial(value.clone()),
                };
                (port.clone(), value)
            })
            .collect()
    }

    /// Failure messages for an actor whose task never returned
    fn aborted(&self, graph: &WorkflowGraph, actor: &str, reason: &str) -> Invocation {
        let outputs = graph
            .actor(actor)
            .map(|node| {
                node.outports()
                    .iter()
                    .map(|(port, out)| {
                        (
                            port.clone(),
                            StatusMessage::execution_failure(
                                out.msg_type.clone(),
                                actor,
                                format!("actor task aborted: {}", reason),
                            ),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Invocation {
            outcome: Outcome::ExecutionFailure,
            outputs,
        }
    }
}

/// Result of one workflow run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub execution_id: ExecutionId,
    pub workflow: String,
    /// Final port name → message produced on it
    pub finals: BTreeMap<String, StatusMessage>,
    /// Every actor's outcome
    pub actors: BTreeMap<String, Outcome>,
    /// Every actor's output messages, by actor then port
    pub outputs: BTreeMap<String, BTreeMap<String, StatusMessage>>,
    pub summary: ExecutionSummary,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_actors: usize,
}

impl ExecutionResult {
    fn collect(
        execution_id: ExecutionId,
        graph: &WorkflowGraph,
        actors: BTreeMap<String, Outcome>,
        outputs: BTreeMap<String, BTreeMap<String, StatusMessage>>,
    ) -> Self {
        let finals = graph
            .final_ports()
            .into_iter()
            .filter_map(|(port, actor)| {
                outputs
                    .get(actor)
                    .and_then(|ports| ports.get(port))
                    .map(|msg| (port.to_string(), msg.clone()))
            })
            .collect();

        let mut summary = ExecutionSummary {
            total_actors: graph.len(),
            ..ExecutionSummary::default()
        };
        for outcome in actors.values() {
            match outcome {
                Outcome::Success => summary.succeeded += 1,
                Outcome::PrerequisiteSkip => summary.skipped += 1,
                Outcome::ExecutionFailure => summary.failed += 1,
            }
        }

        Self {
            execution_id,
            workflow: graph.name().to_string(),
            finals,
            actors,
            outputs,
            summary,
        }
    }

    /// Message produced on `port` of `actor`
    pub fn output(&self, actor: &str, port: &str) -> Option<&StatusMessage> {
        self.outputs.get(actor).and_then(|ports| ports.get(port))
    }

    pub fn is_success(&self) -> bool {
        self.summary.skipped == 0 && self.summary.failed == 0
    }
}
