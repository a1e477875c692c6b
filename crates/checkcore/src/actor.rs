use crate::{events::EventEmitter, ActorError, InputPort, OutputPort, StatusMessage, Value};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The compute step of an actor.
///
/// Unless `collects_failures` is set, actions only see successful inputs: the
/// propagation wrapper short-circuits before `run` when a prerequisite
/// failed, and turns any `Err` (or panic) into an execution-failure message.
#[async_trait]
pub trait Action: Send + Sync {
    /// Short type identifier (e.g., "script", "report")
    fn kind(&self) -> &str;

    /// Aggregating actions receive failed inputs in-band instead of being
    /// skipped
    fn collects_failures(&self) -> bool {
        false
    }

    async fn run(&self, ctx: ActorContext) -> Result<ActionOutput, ActorError>;
}

/// A named unit with typed ports and an action. Immutable once built.
#[derive(Clone)]
pub struct ActorNode {
    name: String,
    inports: BTreeMap<String, InputPort>,
    outports: BTreeMap<String, OutputPort>,
    action: Arc<dyn Action>,
}

impl ActorNode {
    pub fn builder(name: impl Into<String>) -> ActorNodeBuilder {
        ActorNodeBuilder {
            name: name.into(),
            inports: BTreeMap::new(),
            outports: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inports(&self) -> &BTreeMap<String, InputPort> {
        &self.inports
    }

    pub fn outports(&self) -> &BTreeMap<String, OutputPort> {
        &self.outports
    }

    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }
}

impl fmt::Debug for ActorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorNode")
            .field("name", &self.name)
            .field("kind", &self.action.kind())
            .field("inports", &self.inports)
            .field("outports", &self.outports)
            .finish()
    }
}

pub struct ActorNodeBuilder {
    name: String,
    inports: BTreeMap<String, InputPort>,
    outports: BTreeMap<String, OutputPort>,
}

impl ActorNodeBuilder {
    pub fn inport(mut self, port: impl Into<String>, spec: impl Into<InputPort>) -> Self {
        self.inports.insert(port.into(), spec.into());
        self
    }

    pub fn initial(mut self, port: impl Into<String>) -> Self {
        self.inports.insert(port.into(), InputPort::Initial);
        self
    }

    pub fn outport(mut self, port: impl Into<String>, spec: OutputPort) -> Self {
        self.outports.insert(port.into(), spec);
        self
    }

    pub fn inports(mut self, ports: BTreeMap<String, InputPort>) -> Self {
        self.inports.extend(ports);
        self
    }

    pub fn outports(mut self, ports: BTreeMap<String, OutputPort>) -> Self {
        self.outports.extend(ports);
        self
    }

    pub fn action(self, action: impl Action + 'static) -> ActorNode {
        self.shared_action(Arc::new(action))
    }

    pub fn shared_action(self, action: Arc<dyn Action>) -> ActorNode {
        ActorNode {
            name: self.name,
            inports: self.inports,
            outports: self.outports,
            action,
        }
    }
}

/// Value delivered to one input port
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// Single/Any ports
    Single(StatusMessage),
    /// All ports, keyed by producer actor name
    All(BTreeMap<String, StatusMessage>),
    /// Initial ports
    Initial(Value),
}

impl InputValue {
    /// Status messages carried by this input; All maps are flattened
    pub fn messages(&self) -> Vec<&StatusMessage> {
        match self {
            InputValue::Single(m) => vec![m],
            InputValue::All(map) => map.values().collect(),
            InputValue::Initial(_) => Vec::new(),
        }
    }
}

/// Execution context passed to an action
#[derive(Clone)]
pub struct ActorContext {
    pub actor: String,

    /// Bound inputs, by port name
    pub inputs: BTreeMap<String, InputValue>,

    /// Declared outputs, by port name
    pub outputs: BTreeMap<String, OutputPort>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,
}

impl ActorContext {
    pub fn require_input(&self, port: &str) -> Result<&InputValue, ActorError> {
        self.inputs
            .get(port)
            .ok_or_else(|| ActorError::MissingInput(port.to_string()))
    }

    /// The message bound to a Single/Any port
    pub fn single(&self, port: &str) -> Result<&StatusMessage, ActorError> {
        match self.require_input(port)? {
            InputValue::Single(m) => Ok(m),
            other => Err(invalid(port, "single message", other)),
        }
    }

    /// The producer-keyed map bound to an All port
    pub fn all(&self, port: &str) -> Result<&BTreeMap<String, StatusMessage>, ActorError> {
        match self.require_input(port)? {
            InputValue::All(map) => Ok(map),
            other => Err(invalid(port, "message map", other)),
        }
    }

    /// The caller-supplied value of an Initial port
    pub fn initial(&self, port: &str) -> Result<&Value, ActorError> {
        match self.require_input(port)? {
            InputValue::Initial(v) => Ok(v),
            other => Err(invalid(port, "initial value", other)),
        }
    }
}

fn invalid(port: &str, expected: &str, actual: &InputValue) -> ActorError {
    let actual = match actual {
        InputValue::Single(_) => "single message",
        InputValue::All(_) => "message map",
        InputValue::Initial(_) => "initial value",
    };
    ActorError::InvalidInput {
        port: port.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    }
}

/// Payloads produced by an action, by output port
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutput {
    pub outputs: BTreeMap<String, Value>,
}

impl ActionOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(port.into(), value.into());
        self
    }
}
