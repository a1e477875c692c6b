// crates/checkcli/src/main.rs

use anyhow::{Context, Result};
use checkactors::{
    builtin_types, register_all, InventoryProvider, LocalProcessExecutor, ScriptActorFactory,
    StaticInventory, TargetConfig,
};
use checkcore::{
    ActorEvent, ActorSpec, ExecutionEvent, Outcome, OutputPort, PortContract, TypeDeclaration,
    TypeRegistry, Value, WorkflowSpec,
};
use checkruntime::{load_workflow, ActorRegistry, CheckRuntime, RuntimeConfig};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "checkflow")]
#[command(about = "Run dependency-ordered checks against a machine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow against a target machine
    Run {
        /// Path to workflow JSON file
        #[arg(short, long)]
        workflow: PathBuf,

        /// Target hostname (localhost runs checks locally)
        #[arg(short, long, default_value = "localhost")]
        target: String,

        /// SSH user
        #[arg(short, long)]
        user: Option<String>,

        /// SSH identity file
        #[arg(short, long)]
        identity: Option<String>,

        /// Inventory JSON mapping hostnames to addresses
        #[arg(long)]
        inventory: Option<PathBuf>,

        /// Maximum number of actors running at once
        #[arg(long, default_value_t = 10)]
        max_parallel: usize,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Resolve types and wiring without running anything
    Validate {
        /// Path to workflow JSON file
        #[arg(short, long)]
        workflow: PathBuf,
    },

    /// Print the resolved message-type hierarchy
    Types {
        /// Directory of additional JSON type declarations
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// List available actor kinds
    Actors,

    /// Create an example workflow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Run { verbose: true, .. });
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            workflow,
            target,
            user,
            identity,
            inventory,
            max_parallel,
            ..
        } => {
            let inventory = match inventory {
                Some(path) => StaticInventory::from_file(&path)?,
                None => StaticInventory::default(),
            };
            let mut target = TargetConfig::resolve(&target, &inventory)?;
            target.user = user;
            target.identity = identity;

            let success = run_workflow(&workflow, &target, &inventory, max_parallel).await?;
            if !success {
                std::process::exit(1);
            }
        }

        Commands::Validate { workflow } => {
            validate_workflow(&workflow)?;
        }

        Commands::Types { dir } => {
            list_types(dir.as_deref())?;
        }

        Commands::Actors => {
            list_actors();
        }

        Commands::Init { output } => {
            create_example_workflow(&output)?;
        }
    }

    Ok(())
}

/// Actor registry whose scripts run through `target`'s command, with
/// relative script paths taken from `base_dir`
fn actor_registry(target: &TargetConfig, base_dir: &Path) -> ActorRegistry {
    let scripts = ScriptActorFactory::new(Arc::new(LocalProcessExecutor::new()), target.command())
        .with_base_dir(base_dir);
    let mut registry = ActorRegistry::new();
    register_all(&mut registry, scripts);
    registry
}

/// Load a workflow and append the built-in types after its own, so a
/// workflow may redefine any of them
fn load(path: &Path) -> Result<(WorkflowSpec, Vec<TypeDeclaration>)> {
    let loaded = load_workflow(path)
        .with_context(|| format!("failed to load workflow {}", path.display()))?;
    let mut spec = loaded.spec;
    spec.types.extend(builtin_types());
    Ok((spec, loaded.declarations))
}

fn workflow_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn initial_values(target: &TargetConfig) -> BTreeMap<String, Value> {
    BTreeMap::from([("hostname".to_string(), Value::from(target.hostname.as_str()))])
}

async fn run_workflow(
    path: &Path,
    target: &TargetConfig,
    inventory: &dyn InventoryProvider,
    max_parallel: usize,
) -> Result<bool> {
    eprintln!("🚀 Loading workflow from: {}", path.display());
    let (spec, declarations) = load(path)?;

    if let Some(machine) = inventory.lookup(&target.hostname) {
        tracing::debug!("Target machine: {:?}", machine);
    }
    eprintln!("📋 Workflow: {} ({} actors)", spec.name, spec.actors.len());
    eprintln!("🎯 Target: {} ({})", target.hostname, target.ip);
    eprintln!();

    let runtime = CheckRuntime::with_config(
        actor_registry(target, &workflow_dir(path)),
        RuntimeConfig {
            max_parallel_actors: max_parallel,
            ..RuntimeConfig::default()
        },
    );

    let graph = runtime.build(&spec, declarations, &initial_values(target))?;

    let event_task = tokio::spawn(print_progress(runtime.subscribe_events()));

    let result = runtime.execute(Arc::new(graph)).await;
    // Closing the bus ends the progress loop even if the completion event
    // was lagged away
    drop(runtime);
    event_task.await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.is_success())
}

/// Print execution events until the workflow completes. Returns false if
/// the bus closed before the completion event arrived.
async fn print_progress(mut events: broadcast::Receiver<ExecutionEvent>) -> bool {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "Progress output lagged behind execution");
                continue;
            }
            Err(RecvError::Closed) => return false,
        };
        match event {
            ExecutionEvent::WorkflowStarted { actors, .. } => {
                eprintln!("▶️  Workflow started ({} actors)", actors);
            }
            ExecutionEvent::ActorStarted { actor, kind, .. } => {
                eprintln!("  ⚡ Starting actor: {} ({})", actor, kind);
            }
            ExecutionEvent::ActorCompleted {
                actor,
                outcome,
                duration_ms,
                ..
            } => {
                let icon = match outcome {
                    Outcome::Success => "✅",
                    Outcome::ExecutionFailure => "❌",
                    Outcome::PrerequisiteSkip => "⏭️ ",
                };
                eprintln!("  {} Actor {} completed in {}ms", icon, actor, duration_ms);
            }
            ExecutionEvent::ActorEvent { actor, event, .. } => match event {
                ActorEvent::Info { message } => {
                    eprintln!("     ℹ️  [{}] {}", actor, message);
                }
                ActorEvent::Warning { message } => {
                    eprintln!("     ⚠️  [{}] {}", actor, message);
                }
            },
            ExecutionEvent::WorkflowCompleted {
                succeeded,
                skipped,
                failed,
                duration_ms,
                ..
            } => {
                eprintln!(
                    "✨ Workflow completed in {}ms: {} succeeded, {} skipped, {} failed",
                    duration_ms, succeeded, skipped, failed
                );
                return true;
            }
        }
    }
}

fn validate_workflow(path: &Path) -> Result<()> {
    eprintln!("🔍 Validating workflow: {}", path.display());
    let (spec, declarations) = load(path)?;

    let target = TargetConfig::local();
    let runtime = CheckRuntime::new(actor_registry(&target, &workflow_dir(path)));
    let graph = runtime.build(&spec, declarations, &initial_values(&target))?;

    println!("✅ Workflow is valid:");
    println!("   Name: {}", graph.name());
    println!("   Actors: {}", graph.len());
    println!("   Execution order:");
    for actor in graph.topological_order() {
        let deps = graph.dependencies(actor);
        if deps.is_empty() {
            println!("     {}", actor);
        } else {
            println!("     {} <- {}", actor, deps.join(", "));
        }
    }
    println!("   Edges:");
    for edge in graph.edges() {
        println!(
            "     {}.{} -> {}.{}",
            edge.producer, edge.producer_port, edge.consumer, edge.consumer_port
        );
    }
    for (port, actor) in graph.final_ports() {
        println!("   Final output: {} (from {})", port, actor);
    }

    Ok(())
}

fn list_types(dir: Option<&Path>) -> Result<()> {
    let mut declarations = match dir {
        Some(dir) => TypeDeclaration::load_dir(dir)?,
        None => Vec::new(),
    };
    declarations.extend(builtin_types());

    let (registry, unresolved) = TypeRegistry::resolve(declarations);

    println!("📚 Message types:");
    for descriptor in registry.iter() {
        println!("  • {}", descriptor.chain().collect::<Vec<_>>().join(" -> "));
    }
    if !unresolved.is_empty() {
        println!();
        println!("⚠️  Unresolved: {}", unresolved.join(", "));
    }

    Ok(())
}

fn list_actors() {
    println!("📦 Available Actor Kinds:");
    println!();

    let registry = actor_registry(&TargetConfig::local(), Path::new("."));

    for kind in registry.list_kinds() {
        if let Some(metadata) = registry.get_metadata(&kind) {
            println!("  • {} ({})", kind, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", kind);
        }
    }
}

const EXAMPLE_SCRIPTS: &[(&str, &str)] = &[
    ("has_docker.sh", "command -v docker\n"),
    ("docker_info.sh", "docker info\n"),
    ("has_rsync.sh", "command -v rsync\n"),
    ("connectivity.sh", "ping -c 1 -W 2 8.8.8.8\n"),
];

fn create_example_workflow(output: &Path) -> Result<()> {
    let mut workflow = WorkflowSpec::new("Example machine checks");
    workflow.description =
        Some("Checks docker and rsync availability and network connectivity".to_string());

    let check = |name: &str, script: &str, accepts: &str, port: &str, produces: &str| {
        ActorSpec::new(name, "script")
            .with_config("script", format!("scripts/{}", script))
            .with_config("output_dir", "output")
            .with_inport("in", PortContract::any(accepts))
            .with_outport(port, OutputPort::new(produces))
    };

    workflow.add_actor(ActorSpec::new("start", "start"));
    workflow.add_actor(check("has-docker", "has_docker.sh", "Trigger", "status", "DockerStatus"));
    workflow.add_actor(check(
        "docker-info",
        "docker_info.sh",
        "DockerStatus",
        "docker_exec_status",
        "DockerInfoStatus",
    ));
    workflow.add_actor(check("has-rsync", "has_rsync.sh", "Trigger", "status", "RsyncStatus"));
    workflow.add_actor(check(
        "connectivity",
        "connectivity.sh",
        "Trigger",
        "connectivity_status",
        "ConnectivityStatus",
    ));
    workflow.add_actor(ActorSpec::new("report", "report"));

    let json = serde_json::to_string_pretty(&workflow)?;
    std::fs::write(output, json)?;

    let scripts = workflow_dir(output).join("scripts");
    std::fs::create_dir_all(&scripts)?;
    for (name, body) in EXAMPLE_SCRIPTS {
        let path = scripts.join(name);
        if !path.exists() {
            std::fs::write(&path, body)?;
        }
    }

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  checkflow run --workflow {} --target localhost", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkcore::ExecutionId;
    use chrono::Utc;

    #[tokio::test]
    async fn test_progress_survives_lag() {
        let (tx, rx) = broadcast::channel(2);
        let execution_id = ExecutionId::nil();
        for i in 0..4 {
            tx.send(ExecutionEvent::ActorStarted {
                execution_id,
                actor: format!("check-{}", i),
                kind: "script".to_string(),
                timestamp: Utc::now(),
            })
            .unwrap();
        }
        tx.send(ExecutionEvent::WorkflowCompleted {
            execution_id,
            succeeded: 4,
            skipped: 0,
            failed: 0,
            duration_ms: 5,
            timestamp: Utc::now(),
        })
        .unwrap();

        assert!(print_progress(rx).await);
    }

    #[tokio::test]
    async fn test_progress_stops_when_bus_closes() {
        let (tx, rx) = broadcast::channel::<ExecutionEvent>(4);
        drop(tx);
        assert!(!print_progress(rx).await);
    }
}
