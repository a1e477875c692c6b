use checkcore::{TypeDeclaration, COMMAND_STATUS_TYPE};
use serde_json::json;

/// Message types the built-in actors produce and consume
pub fn builtin_types() -> Vec<TypeDeclaration> {
    let status = |name: &str| TypeDeclaration::new(name).with_superclass(COMMAND_STATUS_TYPE);

    vec![
        TypeDeclaration::new("Trigger").with_field("hostname", json!({"type": "string"})),
        TypeDeclaration::new(COMMAND_STATUS_TYPE)
            .with_field("exit_code", json!({"type": "integer"}))
            .with_field("stdout", json!({"type": "string"}))
            .with_field("stderr", json!({"type": "string"})),
        status("DockerStatus"),
        status("DockerInfoStatus"),
        status("DockerListStatus"),
        status("RsyncStatus"),
        status("RsyncExecStatus"),
        status("ConnectivityStatus"),
        TypeDeclaration::new("Report").with_field("summary", json!({"type": "object"})),
    ]
}
