use checkcore::{CheckError, TypeDeclaration, WorkflowSpec};
use std::path::Path;

/// A workflow file together with the type declarations it references
#[derive(Debug, Clone)]
pub struct LoadedWorkflow {
    pub spec: WorkflowSpec,
    /// Declarations read from `types_dir`; inline ones stay in `spec.types`
    pub declarations: Vec<TypeDeclaration>,
}

/// Read a workflow JSON file. A relative `types_dir` is resolved against
/// the directory holding the workflow file.
pub fn load_workflow(path: &Path) -> Result<LoadedWorkflow, CheckError> {
    let text = std::fs::read_to_string(path)?;
    let spec: WorkflowSpec = serde_json::from_str(&text)?;

    let mut declarations = Vec::new();
    if let Some(types_dir) = &spec.types_dir {
        let dir = if types_dir.is_relative() {
            path.parent().unwrap_or_else(|| Path::new(".")).join(types_dir)
        } else {
            types_dir.clone()
        };
        tracing::debug!("Loading type declarations from {}", dir.display());
        declarations.extend(TypeDeclaration::load_dir(&dir)?);
    }

    Ok(LoadedWorkflow { spec, declarations })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_workflow_with_types_dir() {
        let dir = tempfile::tempdir().unwrap();
        let types = dir.path().join("msgtypes");
        std::fs::create_dir(&types).unwrap();
        std::fs::write(types.join("status.json"), r#"{"name": "ShellCommandStatus"}"#).unwrap();

        let workflow = dir.path().join("workflow.json");
        std::fs::write(
            &workflow,
            r#"{
                "name": "checks",
                "types_dir": "msgtypes",
                "types": [{"name": "DockerStatus", "superclass": "ShellCommandStatus"}],
                "actors": []
            }"#,
        )
        .unwrap();

        let loaded = load_workflow(&workflow).unwrap();
        let names: Vec<_> = loaded.declarations.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["ShellCommandStatus"]);
        assert_eq!(loaded.spec.types[0].name, "DockerStatus");
        assert_eq!(loaded.spec.name, "checks");
    }

    #[test]
    fn test_load_workflow_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let workflow = dir.path().join("workflow.json");
        std::fs::write(&workflow, "{").unwrap();

        assert!(matches!(
            load_workflow(&workflow),
            Err(CheckError::Serialization(_))
        ));
    }
}
