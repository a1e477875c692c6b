//! Per-actor failure wrapper
//!
//! Every action runs through [`ErrorPropagation::invoke`], which always
//! returns one status message per declared output port: a prerequisite-skip
//! when an input failed, an execution-failure when the action errored or
//! panicked, and a success otherwise.

use checkcore::{
    ActorContext, ActorNode, InputValue, Outcome, SkipCause, StatusMessage, TypeRegistry,
};
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of running one actor through the wrapper
#[derive(Debug, Clone)]
pub struct Invocation {
    pub outcome: Outcome,
    pub outputs: BTreeMap<String, StatusMessage>,
}

/// The failing input that made an actor skip its action
#[derive(Debug, Clone, PartialEq)]
pub struct FailedPrerequisite {
    pub actor: String,
    pub cause: SkipCause,
}

pub struct ErrorPropagation {
    registry: Arc<TypeRegistry>,
    command_status_type: String,
}

impl ErrorPropagation {
    pub fn new(registry: Arc<TypeRegistry>, command_status_type: impl Into<String>) -> Self {
        Self {
            registry,
            command_status_type: command_status_type.into(),
        }
    }

    /// True if messages of `msg_type` carry a command status whose exit code
    /// decides success
    pub fn is_command_status(&self, msg_type: &str) -> bool {
        self.registry.is_subtype(msg_type, &self.command_status_type)
    }

    /// True if `msg` is a command status whose command exited non-zero
    pub fn command_failed(&self, msg: &StatusMessage) -> bool {
        msg.command().is_some_and(|status| !status.success())
            && self.is_command_status(&msg.msg_type)
    }

    /// First failing input, in port order then producer order
    pub fn failed_prerequisite(
        &self,
        inputs: &BTreeMap<String, InputValue>,
    ) -> Option<FailedPrerequisite> {
        inputs
            .values()
            .flat_map(InputValue::messages)
            .find_map(|msg| {
                if let Some(error) = &msg.error {
                    return Some(FailedPrerequisite {
                        actor: msg.source.clone(),
                        cause: SkipCause::Error(error.clone()),
                    });
                }
                match msg.command() {
                    Some(status) if self.command_failed(msg) => Some(FailedPrerequisite {
                        actor: msg.source.clone(),
                        cause: SkipCause::CommandFailed(status.clone()),
                    }),
                    _ => None,
                }
            })
    }

    /// Run `node`'s action under the wrapper. Never fails and never panics.
    pub async fn invoke(&self, node: &ActorNode, ctx: ActorContext) -> Invocation {
        let failed = if node.action().collects_failures() {
            None
        } else {
            self.failed_prerequisite(&ctx.inputs)
        };

        if let Some(failed) = failed {
            warn!(
                actor = %node.name(),
                requirement = %failed.actor,
                cause = %failed.cause,
                "requirement failed, skipping action"
            );
            ctx.events
                .warn(format!("requirement failed: {}", failed.actor));

            let outputs = node
                .outports()
                .iter()
                .map(|(port, out)| {
                    (
                        port.clone(),
                        StatusMessage::prerequisite_skip(
                            out.msg_type.clone(),
                            node.name(),
                            failed.actor.clone(),
                            failed.cause.clone(),
                        ),
                    )
                })
                .collect();
            return Invocation {
                outcome: Outcome::PrerequisiteSkip,
                outputs,
            };
        }

        let result = AssertUnwindSafe(node.action().run(ctx)).catch_unwind().await;

        let fault = match result {
            Ok(Ok(produced)) => {
                let mut produced = produced.outputs;
                let mut outcome = Outcome::Success;
                let mut outputs = BTreeMap::new();

                for (port, out) in node.outports() {
                    let msg = match produced.remove(port) {
                        Some(payload) => {
                            StatusMessage::success(out.msg_type.clone(), node.name(), payload)
                        }
                        None => {
                            warn!(actor = %node.name(), port = %port, "action produced no value for port");
                            outcome = Outcome::ExecutionFailure;
                            StatusMessage::execution_failure(
                                out.msg_type.clone(),
                                node.name(),
                                format!("no value produced for output '{}'", port),
                            )
                        }
                    };
                    outputs.insert(port.clone(), msg);
                }

                // A command that ran but exited non-zero is still a success
                // message; its dependents skip on it, and the actor counts as
                // failed
                if outcome == Outcome::Success && outputs.values().any(|m| self.command_failed(m)) {
                    debug!(actor = %node.name(), "command exited non-zero");
                    outcome = Outcome::ExecutionFailure;
                }

                for extra in produced.keys() {
                    debug!(actor = %node.name(), port = %extra, "ignoring undeclared output");
                }

                return Invocation { outcome, outputs };
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("action panicked: {}", panic_message(panic.as_ref())),
        };

        warn!(actor = %node.name(), error = %fault, "action failed");
        let outputs = node
            .outports()
            .iter()
            .map(|(port, out)| {
                (
                    port.clone(),
                    StatusMessage::execution_failure(out.msg_type.clone(), node.name(), fault.clone()),
                )
            })
            .collect();

        Invocation {
            outcome: Outcome::ExecutionFailure,
            outputs,
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use checkcore::{
        ActionOutput, ActorError, CommandStatus, ErrorDetail, EventEmitter, OutputPort,
        PortContract, TypeDeclaration, Value,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: Arc<AtomicUsize>,
        result: fn() -> Result<ActionOutput, ActorError>,
    }

    #[async_trait]
    impl checkcore::Action for Counting {
        fn kind(&self) -> &str {
            "counting"
        }

        async fn run(&self, _ctx: ActorContext) -> Result<ActionOutput, ActorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    struct Panicking;

    #[async_trait]
    impl checkcore::Action for Panicking {
        fn kind(&self) -> &str {
            "panicking"
        }

        async fn run(&self, _ctx: ActorContext) -> Result<ActionOutput, ActorError> {
            panic!("script vanished")
        }
    }

    fn propagation() -> ErrorPropagation {
        let (registry, _) = TypeRegistry::resolve(vec![
            TypeDeclaration::new("ShellCommandStatus"),
            TypeDeclaration::new("DockerStatus").with_superclass("ShellCommandStatus"),
            TypeDeclaration::new("DockerInfoStatus").with_superclass("ShellCommandStatus"),
            TypeDeclaration::new("Note"),
        ]);
        ErrorPropagation::new(Arc::new(registry), "ShellCommandStatus")
    }

    fn docker_info(action: impl checkcore::Action + 'static) -> ActorNode {
        ActorNode::builder("docker-info")
            .inport("has_docker", PortContract::any("DockerStatus"))
            .outport("info", OutputPort::new("DockerInfoStatus"))
            .action(action)
    }

    fn ctx(node: &ActorNode, upstream: StatusMessage) -> ActorContext {
        ActorContext {
            actor: node.name().to_string(),
            inputs: BTreeMap::from([("has_docker".to_string(), InputValue::Single(upstream))]),
            outputs: node.outports().clone(),
            events: EventEmitter::detached(node.name()),
        }
    }

    fn ok_output() -> Result<ActionOutput, ActorError> {
        Ok(ActionOutput::new().with_output("info", CommandStatus::new(0).with_stdout("24.0")))
    }

    #[tokio::test]
    async fn test_non_zero_exit_skips_action() {
        let calls = Arc::new(AtomicUsize::new(0));
        let node = docker_info(Counting {
            calls: calls.clone(),
            result: ok_output,
        });
        let upstream =
            StatusMessage::success("DockerStatus", "has-docker", CommandStatus::new(1).into());

        let invocation = propagation().invoke(&node, ctx(&node, upstream)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(invocation.outcome, Outcome::PrerequisiteSkip);
        let msg = &invocation.outputs["info"];
        assert!(msg.is_skip());
        assert_eq!(msg.source, "docker-info");
        match msg.error.as_ref().unwrap() {
            ErrorDetail::PrerequisiteSkip { failed_actor, cause } => {
                assert_eq!(failed_actor, "has-docker");
                assert_eq!(**cause, SkipCause::CommandFailed(CommandStatus::new(1)));
            }
            other => panic!("unexpected detail: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upstream_error_skips_action() {
        let calls = Arc::new(AtomicUsize::new(0));
        let node = docker_info(Counting {
            calls: calls.clone(),
            result: ok_output,
        });
        let upstream = StatusMessage::execution_failure("DockerStatus", "has-docker", "ssh refused");

        let invocation = propagation().invoke(&node, ctx(&node, upstream)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            invocation.outputs["info"].error.as_ref().unwrap().root_actor("docker-info"),
            "has-docker"
        );
    }

    #[tokio::test]
    async fn test_success_wraps_payload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let node = docker_info(Counting {
            calls: calls.clone(),
            result: ok_output,
        });
        let upstream =
            StatusMessage::success("DockerStatus", "has-docker", CommandStatus::new(0).into());

        let invocation = propagation().invoke(&node, ctx(&node, upstream)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(invocation.outcome, Outcome::Success);
        let msg = &invocation.outputs["info"];
        assert!(msg.error.is_none());
        assert_eq!(
            msg.payload,
            Some(Value::Command(CommandStatus::new(0).with_stdout("24.0")))
        );
    }

    #[tokio::test]
    async fn test_non_zero_exit_output_counts_as_failure() {
        let node = docker_info(Counting {
            calls: Arc::new(AtomicUsize::new(0)),
            result: || Ok(ActionOutput::new().with_output("info", CommandStatus::new(1))),
        });
        let upstream =
            StatusMessage::success("DockerStatus", "has-docker", CommandStatus::new(0).into());

        let invocation = propagation().invoke(&node, ctx(&node, upstream)).await;

        assert_eq!(invocation.outcome, Outcome::ExecutionFailure);
        // The message itself keeps the exit code for dependents and reports
        let msg = &invocation.outputs["info"];
        assert!(msg.error.is_none());
        assert_eq!(msg.command(), Some(&CommandStatus::new(1)));
    }

    #[tokio::test]
    async fn test_non_command_payload_is_not_inspected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let node = ActorNode::builder("reader")
            .inport("has_docker", PortContract::any("Note"))
            .outport("info", OutputPort::new("DockerInfoStatus"))
            .action(Counting {
                calls: calls.clone(),
                result: ok_output,
            });
        // Same exit code, but Note is not a command-status type
        let upstream = StatusMessage::success("Note", "writer", CommandStatus::new(3).into());

        let invocation = propagation().invoke(&node, ctx(&node, upstream)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(invocation.outcome, Outcome::Success);
    }

    struct Collector;

    #[async_trait]
    impl checkcore::Action for Collector {
        fn kind(&self) -> &str {
            "collector"
        }

        fn collects_failures(&self) -> bool {
            true
        }

        async fn run(&self, ctx: ActorContext) -> Result<ActionOutput, ActorError> {
            let upstream = ctx.single("has_docker")?;
            Ok(ActionOutput::new().with_output("info", upstream.outcome() == Outcome::Success))
        }
    }

    #[tokio::test]
    async fn test_collecting_action_sees_failures() {
        let node = docker_info(Collector);
        let upstream = StatusMessage::execution_failure("DockerStatus", "has-docker", "boom");

        let invocation = propagation().invoke(&node, ctx(&node, upstream)).await;

        assert_eq!(invocation.outcome, Outcome::Success);
        assert_eq!(invocation.outputs["info"].payload, Some(Value::Bool(false)));
    }

    #[tokio::test]
    async fn test_action_error_becomes_execution_failure() {
        let node = docker_info(Counting {
            calls: Arc::new(AtomicUsize::new(0)),
            result: || Err(ActorError::Process("connection reset".to_string())),
        });
        let upstream =
            StatusMessage::success("DockerStatus", "has-docker", CommandStatus::new(0).into());

        let invocation = propagation().invoke(&node, ctx(&node, upstream)).await;

        assert_eq!(invocation.outcome, Outcome::ExecutionFailure);
        let msg = &invocation.outputs["info"];
        assert!(msg.is_failure());
        assert!(msg.error.as_ref().unwrap().to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let node = docker_info(Panicking);
        let upstream =
            StatusMessage::success("DockerStatus", "has-docker", CommandStatus::new(0).into());

        let invocation = propagation().invoke(&node, ctx(&node, upstream)).await;

        assert_eq!(invocation.outcome, Outcome::ExecutionFailure);
        assert!(invocation.outputs["info"]
            .error
            .as_ref()
            .unwrap()
            .to_string()
            .contains("script vanished"));
    }

    #[tokio::test]
    async fn test_missing_output_port_is_failure() {
        let node = docker_info(Counting {
            calls: Arc::new(AtomicUsize::new(0)),
            result: || Ok(ActionOutput::new().with_output("other", "x")),
        });
        let upstream =
            StatusMessage::success("DockerStatus", "has-docker", CommandStatus::new(0).into());

        let invocation = propagation().invoke(&node, ctx(&node, upstream)).await;

        assert_eq!(invocation.outcome, Outcome::ExecutionFailure);
        assert!(invocation.outputs["info"].is_failure());
    }
}
