//! Built-in check actors
//!
//! The trigger, the script runner and the final report, plus the process
//! executor and target resolution the script runner depends on.

mod error;
pub mod exec;
pub mod inventory;
mod report;
mod script;
mod start;
pub mod target;
mod types;

pub use error::ExecError;
pub use exec::{LocalProcessExecutor, ProcessExecutor};
pub use inventory::{InventoryProvider, MachineInfo, StaticInventory};
pub use report::{ReportAction, ReportActorFactory};
pub use script::{ScriptAction, ScriptActorFactory};
pub use start::{StartAction, StartActorFactory};
pub use target::TargetConfig;
pub use checkcore::COMMAND_STATUS_TYPE;
pub use types::builtin_types;

use checkruntime::ActorRegistry;
use std::sync::Arc;

/// Register the built-in actor kinds. `scripts` carries the executor and
/// target command every `script` actor uses.
pub fn register_all(registry: &mut ActorRegistry, scripts: ScriptActorFactory) {
    registry.register(Arc::new(StartActorFactory));
    registry.register(Arc::new(scripts));
    registry.register(Arc::new(ReportActorFactory));
}
