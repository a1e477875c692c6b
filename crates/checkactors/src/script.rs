//! Check actor: runs a script on the target and reports its command status

use crate::exec::ProcessExecutor;
use async_trait::async_trait;
use checkcore::{
    ActionOutput, ActorContext, ActorError, ActorNode, ActorSpec, CommandStatus, ConstructionError,
};
use checkruntime::{ActorFactory, ActorMetadata};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ScriptAction {
    name: String,
    script: PathBuf,
    output_dir: Option<PathBuf>,
    command: Vec<String>,
    executor: Arc<dyn ProcessExecutor>,
}

impl ScriptAction {
    async fn save_output(&self, dir: &Path, status: &CommandStatus) -> Result<(), ActorError> {
        let write_err = |e: std::io::Error| {
            ActorError::ExecutionFailed(format!("cannot write output to {}: {}", dir.display(), e))
        };
        tokio::fs::create_dir_all(dir).await.map_err(write_err)?;
        tokio::fs::write(dir.join(format!("{}_stdout.txt", self.name)), &status.stdout)
            .await
            .map_err(write_err)?;
        tokio::fs::write(dir.join(format!("{}_stderr.txt", self.name)), &status.stderr)
            .await
            .map_err(write_err)?;
        Ok(())
    }
}

#[async_trait]
impl checkcore::Action for ScriptAction {
    fn kind(&self) -> &str {
        "script"
    }

    async fn run(&self, ctx: ActorContext) -> Result<ActionOutput, ActorError> {
        let script = tokio::fs::read(&self.script).await.map_err(|e| {
            ActorError::Configuration(format!("cannot read {}: {}", self.script.display(), e))
        })?;

        ctx.events.info(format!("Running {}", self.script.display()));
        let status = self.executor.run(&self.command, &script).await?;

        if status.success() {
            info!(actor = %self.name, "check passed");
        } else {
            warn!(actor = %self.name, exit_code = status.exit_code, "check exited non-zero");
            ctx.events
                .warn(format!("{} exited with {}", self.script.display(), status.exit_code));
        }

        if let Some(dir) = &self.output_dir {
            self.save_output(dir, &status).await?;
        }

        let output = ctx
            .outputs
            .keys()
            .fold(ActionOutput::new(), |output, port| {
                output.with_output(port.clone(), status.clone())
            });
        Ok(output)
    }
}

/// Creates `script` actors. Ports come from the actor spec; every output
/// port carries the script's command status.
pub struct ScriptActorFactory {
    executor: Arc<dyn ProcessExecutor>,
    command: Vec<String>,
    base_dir: Option<PathBuf>,
}

impl ScriptActorFactory {
    pub fn new(executor: Arc<dyn ProcessExecutor>, command: Vec<String>) -> Self {
        Self {
            executor,
            command,
            base_dir: None,
        }
    }

    /// Relative `script` and `output_dir` paths are resolved against `dir`
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path,
        }
    }
}

impl ActorFactory for ScriptActorFactory {
    fn create(&self, spec: &ActorSpec) -> Result<ActorNode, ConstructionError> {
        let invalid = |reason: &str| ConstructionError::InvalidActor {
            actor: spec.name.clone(),
            reason: reason.to_string(),
        };

        let script = spec
            .config_str("script")
            .ok_or_else(|| invalid("missing 'script' config"))?;
        if spec.outports.is_empty() {
            return Err(invalid("no output ports declared"));
        }

        let action = ScriptAction {
            name: spec.name.clone(),
            script: self.resolve(script),
            output_dir: spec.config_str("output_dir").map(|dir| self.resolve(dir)),
            command: self.command.clone(),
            executor: self.executor.clone(),
        };

        Ok(ActorNode::builder(&spec.name)
            .inports(spec.inports.clone())
            .outports(spec.outports.clone())
            .action(action))
    }

    fn kind(&self) -> &str {
        "script"
    }

    fn metadata(&self) -> ActorMetadata {
        ActorMetadata {
            description: "Runs a shell script on the target machine".to_string(),
            category: "check".to_string(),
        }
    }
}
