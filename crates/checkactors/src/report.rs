use async_trait::async_trait;
use checkcore::{
    ActionOutput, ActorContext, ActorError, ActorNode, ActorSpec, ConstructionError, OutputPort,
    Outcome, PortContract, Value, COMMAND_STATUS_TYPE,
};
use checkruntime::{ActorFactory, ActorMetadata};
use serde_json::json;

/// Collects every command status into one JSON object keyed by source actor.
/// Each entry carries a `status` of `ok`, `failed` or `skipped`; skipped and
/// faulted checks carry their error instead of command output.
pub struct ReportAction {
    input: String,
}

#[async_trait]
impl checkcore::Action for ReportAction {
    fn kind(&self) -> &str {
        "report"
    }

    fn collects_failures(&self) -> bool {
        true
    }

    async fn run(&self, ctx: ActorContext) -> Result<ActionOutput, ActorError> {
        let statuses = ctx.all(&self.input)?;

        let summary: serde_json::Map<String, serde_json::Value> = statuses
            .iter()
            .map(|(source, msg)| {
                let entry = match (&msg.error, msg.command()) {
                    (Some(error), _) => json!({
                        "status": status_label(msg.outcome()),
                        "error": error.to_string(),
                    }),
                    (None, Some(status)) => json!({
                        "status": if status.success() { "ok" } else { "failed" },
                        "exit_code": status.exit_code,
                        "stdout": status.stdout,
                        "stderr": status.stderr,
                    }),
                    (None, None) => json!({
                        "status": "ok",
                        "payload": msg.payload.as_ref().map(Value::to_plain_json),
                    }),
                };
                (source.clone(), entry)
            })
            .collect();

        ctx.events
            .info(format!("Collected {} check results", summary.len()));
        Ok(ActionOutput::new().with_output("msg", Value::Json(serde_json::Value::Object(summary))))
    }
}

fn status_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Success => "ok",
        Outcome::PrerequisiteSkip => "skipped",
        Outcome::ExecutionFailure => "failed",
    }
}

pub struct ReportActorFactory;

impl ActorFactory for ReportActorFactory {
    fn create(&self, spec: &ActorSpec) -> Result<ActorNode, ConstructionError> {
        let accepts = spec.config_str("accepts").unwrap_or(COMMAND_STATUS_TYPE);

        Ok(ActorNode::builder(&spec.name)
            .inport("allstat", PortContract::all(accepts))
            .outport("msg", OutputPort::final_port("Report"))
            .action(ReportAction {
                input: "allstat".to_string(),
            }))
    }

    fn kind(&self) -> &str {
        "report"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Summarizes every check result into the final report".to_string(),
            category: "output".to_string(),
        }
    }
}
