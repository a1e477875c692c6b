use thiserror::Error;

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("Construction error: {0}")]
    Construction(#[from] ConstructionError),

    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors an actor's action may return. The propagation wrapper turns these
/// into execution-failure messages; they never reach the engine.
#[derive(Error, Debug, Clone)]
pub enum ActorError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input for '{port}': expected {expected}, got {actual}")]
    InvalidInput {
        port: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Process error: {0}")]
    Process(String),
}

/// Fatal errors raised while turning a set of actors into a workflow graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("Unresolved message type '{type_name}' on port '{actor}.{port}'")]
    UnresolvedType {
        actor: String,
        port: String,
        type_name: String,
    },

    #[error("Duplicate actor name: {0}")]
    DuplicateActor(String),

    #[error("Final port '{port}' declared by both '{first}' and '{second}'")]
    DuplicateFinalPort {
        port: String,
        first: String,
        second: String,
    },

    #[error("Unsatisfied dependency: no producer of '{accepted}' for port '{actor}.{port}'")]
    UnsatisfiedDependency {
        actor: String,
        port: String,
        accepted: String,
    },

    #[error("Ambiguous wiring for port '{actor}.{port}' accepting '{accepted}': candidates {candidates:?}")]
    AmbiguousWiring {
        actor: String,
        port: String,
        accepted: String,
        candidates: Vec<String>,
    },

    #[error("Producers {producers:?} share key '{key}' on all-port '{actor}.{port}'")]
    DuplicateProducerKey {
        actor: String,
        port: String,
        key: String,
        producers: Vec<String>,
    },

    #[error("Cyclic dependency between actors {actors:?}")]
    CyclicDependency { actors: Vec<String> },

    #[error("Missing initial value '{port}' required by actor '{actor}'")]
    MissingInitialValue { actor: String, port: String },

    #[error("Actor not found: {0}")]
    ActorNotFound(String),

    #[error("Port not found: {actor}.{port}")]
    PortNotFound { actor: String, port: String },

    #[error("Port '{actor}.{port}' is bound more than once")]
    PortAlreadyBound { actor: String, port: String },

    #[error("Port '{actor}.{port}' is an initial port and cannot be connected")]
    InitialPortConnected { actor: String, port: String },

    #[error("Type mismatch: '{producer}.{producer_port}' produces '{produced}' but '{consumer}.{consumer_port}' accepts '{accepted}'")]
    PortTypeMismatch {
        producer: String,
        producer_port: String,
        produced: String,
        consumer: String,
        consumer_port: String,
        accepted: String,
    },

    #[error("Unknown actor kind: {0}")]
    UnknownActorKind(String),

    #[error("Invalid actor '{actor}': {reason}")]
    InvalidActor { actor: String, reason: String },
}
