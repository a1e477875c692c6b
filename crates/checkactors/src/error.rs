use checkcore::ActorError;
use thiserror::Error;

/// Errors raised while running a command on the target machine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("failed to spawn process: {0}")]
    Spawn(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("unknown target host: {0}")]
    UnknownHost(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<ExecError> for ActorError {
    fn from(err: ExecError) -> Self {
        ActorError::Process(err.to_string())
    }
}
