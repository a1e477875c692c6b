use crate::{CommandStatus, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Runtime value flowing on a port.
///
/// Success, prerequisite-skip and execution-failure share this one shape; an
/// empty `error` means success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Declared type of the producing output port
    pub msg_type: String,
    /// Name of the producing actor
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl StatusMessage {
    pub fn success(msg_type: impl Into<String>, source: impl Into<String>, payload: Value) -> Self {
        Self {
            msg_type: msg_type.into(),
            source: source.into(),
            error: None,
            payload: Some(payload),
        }
    }

    pub fn prerequisite_skip(
        msg_type: impl Into<String>,
        source: impl Into<String>,
        failed_actor: impl Into<String>,
        cause: SkipCause,
    ) -> Self {
        Self {
            msg_type: msg_type.into(),
            source: source.into(),
            error: Some(ErrorDetail::PrerequisiteSkip {
                failed_actor: failed_actor.into(),
                cause: Box::new(cause),
            }),
            payload: None,
        }
    }

    pub fn execution_failure(
        msg_type: impl Into<String>,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            msg_type: msg_type.into(),
            source: source.into(),
            error: Some(ErrorDetail::ExecutionFailure {
                message: message.into(),
            }),
            payload: None,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match &self.error {
            None => Outcome::Success,
            Some(ErrorDetail::PrerequisiteSkip { .. }) => Outcome::PrerequisiteSkip,
            Some(ErrorDetail::ExecutionFailure { .. }) => Outcome::ExecutionFailure,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn is_skip(&self) -> bool {
        matches!(self.error, Some(ErrorDetail::PrerequisiteSkip { .. }))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.error, Some(ErrorDetail::ExecutionFailure { .. }))
    }

    /// Command status payload, if any
    pub fn command(&self) -> Option<&CommandStatus> {
        self.payload.as_ref().and_then(Value::as_command)
    }
}

/// Why a message carries no result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorDetail {
    /// The action was not run because an upstream actor failed
    PrerequisiteSkip {
        failed_actor: String,
        cause: Box<SkipCause>,
    },
    /// The action ran and faulted
    ExecutionFailure { message: String },
}

impl ErrorDetail {
    /// Follow skip chains down to the actor that actually failed
    pub fn root_actor<'a>(&'a self, own_source: &'a str) -> &'a str {
        match self {
            ErrorDetail::ExecutionFailure { .. } => own_source,
            ErrorDetail::PrerequisiteSkip {
                failed_actor,
                cause,
            } => match cause.as_ref() {
                SkipCause::Error(inner) => inner.root_actor(failed_actor),
                SkipCause::CommandFailed(_) => failed_actor,
            },
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDetail::PrerequisiteSkip {
                failed_actor,
                cause,
            } => write!(f, "requirement failed: {} ({})", failed_actor, cause),
            ErrorDetail::ExecutionFailure { message } => write!(f, "execution failed: {}", message),
        }
    }
}

/// What the failing upstream actor reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipCause {
    /// Upstream message carried an error of its own
    Error(ErrorDetail),
    /// Upstream command ran but exited non-zero
    CommandFailed(CommandStatus),
}

impl fmt::Display for SkipCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipCause::Error(detail) => write!(f, "{}", detail),
            SkipCause::CommandFailed(status) => write!(f, "exit code {}", status.exit_code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    PrerequisiteSkip,
    ExecutionFailure,
}
