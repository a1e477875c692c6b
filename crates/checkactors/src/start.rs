use async_trait::async_trait;
use checkcore::{ActionOutput, ActorContext, ActorError, ActorNode, ActorSpec, ConstructionError, OutputPort};
use checkruntime::{ActorFactory, ActorMetadata};

/// Turns the target hostname into the trigger every check waits on
pub struct StartAction;

#[async_trait]
impl checkcore::Action for StartAction {
    fn kind(&self) -> &str {
        "start"
    }

    async fn run(&self, ctx: ActorContext) -> Result<ActionOutput, ActorError> {
        let hostname = ctx.initial("hostname")?.clone();
        if let Some(name) = hostname.as_str() {
            ctx.events.info(format!("Starting checks on {}", name));
        }
        Ok(ActionOutput::new().with_output("out", hostname))
    }
}

pub struct StartActorFactory;

impl ActorFactory for StartActorFactory {
    fn create(&self, spec: &ActorSpec) -> Result<ActorNode, ConstructionError> {
        Ok(ActorNode::builder(&spec.name)
            .initial("hostname")
            .outport("out", OutputPort::new("Trigger"))
            .action(StartAction))
    }

    fn kind(&self) -> &str {
        "start"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Emits a Trigger carrying the target hostname".to_string(),
            category: "control".to_string(),
        }
    }
}
