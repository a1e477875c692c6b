//! Message-type hierarchy
//!
//! Types are declared as data (`{name, superclass?, fields?}`) and resolved
//! into a static table of descriptors. Subtyping is an ancestor-chain
//! containment test; no language-level inheritance is involved.

use crate::CheckError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

/// Root of the message types whose payload is a command status; a non-zero
/// exit code on such a message counts as a failure
pub const COMMAND_STATUS_TYPE: &str = "ShellCommandStatus";

/// A single declarative type unit, as read from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDeclaration {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superclass: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Wire shape accepted for a declaration unit. `type` and `properties` are
/// accepted as synonyms of `name` and `fields`.
#[derive(Deserialize)]
struct RawDeclaration {
    #[serde(default, alias = "type")]
    name: Option<String>,
    #[serde(default)]
    superclass: Option<String>,
    #[serde(default, alias = "properties")]
    fields: serde_json::Map<String, serde_json::Value>,
}

impl TypeDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superclass: None,
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_superclass(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, schema: serde_json::Value) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    /// Parse one unit. `origin` names the unit in warnings; when the unit
    /// carries no name, the file stem of `origin` is used instead.
    ///
    /// Returns `None` (after logging a warning) if the unit is undecodable or
    /// has the wrong shape.
    pub fn parse(origin: &str, text: &str) -> Option<Self> {
        let raw: RawDeclaration = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(origin = %origin, error = %e, "dropping malformed type declaration");
                return None;
            }
        };

        let name = raw.name.or_else(|| {
            Path::new(origin)
                .file_stem()
                .and_then(|s| s.to_str())
                .map(String::from)
        });

        match name {
            Some(name) if !name.trim().is_empty() => Some(Self {
                name,
                superclass: raw.superclass,
                fields: raw.fields,
            }),
            _ => {
                warn!(origin = %origin, "dropping type declaration without a name");
                None
            }
        }
    }

    /// Parse a batch of `(origin, text)` units, dropping invalid ones.
    pub fn parse_all<'a, I>(units: I) -> Vec<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        units
            .into_iter()
            .filter_map(|(origin, text)| Self::parse(origin, text))
            .collect()
    }

    /// Load every `*.json` file in `dir`, in file-name order.
    ///
    /// A missing directory yields no declarations; files that are not JSON,
    /// cannot be read as UTF-8 or fail to parse are skipped with a warning.
    pub fn load_dir(dir: &Path) -> Result<Vec<Self>, CheckError> {
        if !dir.is_dir() {
            warn!(path = %dir.display(), "type declaration path is not a directory");
            return Ok(Vec::new());
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            paths.push(entry?.path());
        }
        paths.sort();

        let mut declarations = Vec::new();
        for path in paths {
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                warn!(path = %path.display(), "ignoring non-JSON file");
                continue;
            }
            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable declaration");
                    continue;
                }
            };
            let text = match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping undecodable declaration");
                    continue;
                }
            };
            if let Some(decl) = Self::parse(&path.to_string_lossy(), &text) {
                declarations.push(decl);
            }
        }
        Ok(declarations)
    }
}

/// A resolved message type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub superclass: Option<String>,
    /// Ancestors, nearest first. Empty for a root type.
    pub ancestors: Vec<String>,
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl TypeDescriptor {
    /// True if `other` is this type or one of its ancestors
    pub fn is_subtype_of(&self, other: &str) -> bool {
        self.name == other || self.ancestors.iter().any(|a| a == other)
    }

    /// This type followed by its ancestors
    pub fn chain(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.ancestors.iter().map(String::as_str))
    }
}

/// Read-only table of resolved message types
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, TypeDescriptor>,
}

impl TypeRegistry {
    /// Resolve declarations into a registry.
    ///
    /// Returns the registry and the sorted names that could not be resolved
    /// because their superclass is undefined or part of a cycle.
    pub fn resolve<I>(declarations: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = TypeDeclaration>,
    {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for decl in declarations {
            if !seen.insert(decl.name.clone()) {
                warn!(name = %decl.name, "ignoring duplicate type declaration");
                continue;
            }
            pending.push(decl);
        }

        let mut types: BTreeMap<String, TypeDescriptor> = BTreeMap::new();
        loop {
            let before = pending.len();
            let mut remaining = Vec::with_capacity(before);

            for decl in pending {
                let ancestors = match &decl.superclass {
                    None => Some(Vec::new()),
                    Some(parent) => types.get(parent).map(|p| {
                        p.chain().map(String::from).collect::<Vec<_>>()
                    }),
                };

                match ancestors {
                    Some(ancestors) => {
                        debug!(name = %decl.name, ?ancestors, "resolved message type");
                        types.insert(
                            decl.name.clone(),
                            TypeDescriptor {
                                name: decl.name,
                                superclass: decl.superclass,
                                ancestors,
                                fields: decl.fields,
                            },
                        );
                    }
                    None => remaining.push(decl),
                }
            }

            pending = remaining;
            if pending.is_empty() || pending.len() == before {
                break;
            }
        }

        let mut unresolved: Vec<String> = pending.into_iter().map(|d| d.name).collect();
        unresolved.sort();
        if !unresolved.is_empty() {
            warn!(?unresolved, "message types not built for missing superclass");
        }

        (Self { types }, unresolved)
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// True if `sub` is known and equals or descends from `sup`
    pub fn is_subtype(&self, sub: &str, sup: &str) -> bool {
        self.types
            .get(sub)
            .map(|d| d.is_subtype_of(sup))
            .unwrap_or(false)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDescriptor> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// name → ancestor chain, for every resolved type
    pub fn ancestor_chains(&self) -> BTreeMap<String, Vec<String>> {
        self.types
            .iter()
            .map(|(name, d)| (name.clone(), d.ancestors.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decl(name: &str, superclass: Option<&str>) -> TypeDeclaration {
        let d = TypeDeclaration::new(name);
        match superclass {
            Some(s) => d.with_superclass(s),
            None => d,
        }
    }

    #[test]
    fn test_three_level_chain() {
        let (registry, unresolved) = TypeRegistry::resolve(vec![
            decl("Leaf", Some("Mid")),
            decl("Base", None),
            decl("Mid", Some("Base")),
        ]);

        assert!(unresolved.is_empty());
        let leaf = registry.get("Leaf").unwrap();
        assert_eq!(leaf.ancestors, vec!["Mid".to_string(), "Base".to_string()]);
        assert!(registry.is_subtype("Leaf", "Mid"));
        assert!(registry.is_subtype("Leaf", "Base"));
        assert!(registry.is_subtype("Leaf", "Leaf"));
        assert!(!registry.is_subtype("Base", "Leaf"));
        assert!(!registry.is_subtype("Mid", "Leaf"));
    }

    #[test]
    fn test_dangling_superclass_reported_once() {
        let (registry, unresolved) = TypeRegistry::resolve(vec![
            decl("Base", None),
            decl("Orphan", Some("Missing")),
            decl("OrphanChild", Some("Orphan")),
        ]);

        assert_eq!(unresolved, vec!["Orphan".to_string(), "OrphanChild".to_string()]);
        assert!(registry.get("Orphan").is_none());
        assert!(registry.get("OrphanChild").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_cycles_are_unresolved() {
        let (registry, unresolved) = TypeRegistry::resolve(vec![
            decl("A", Some("B")),
            decl("B", Some("A")),
            decl("Selfish", Some("Selfish")),
        ]);

        assert!(registry.is_empty());
        assert_eq!(unresolved, vec!["A", "B", "Selfish"]);
    }

    #[test]
    fn test_duplicate_first_wins() {
        let (registry, unresolved) = TypeRegistry::resolve(vec![
            decl("Base", None),
            decl("Other", None),
            decl("Thing", Some("Base")),
            decl("Thing", Some("Other")),
        ]);

        assert!(unresolved.is_empty());
        assert_eq!(registry.get("Thing").unwrap().superclass.as_deref(), Some("Base"));
    }

    #[test]
    fn test_parse_accepts_synonyms_and_drops_malformed() {
        let decls = TypeDeclaration::parse_all(vec![
            ("a.json", r#"{"type": "DockerStatus", "superclass": "ShellCommandStatus"}"#),
            ("b.json", r#"{"name": "Report", "properties": {"text": {"type": "string"}}}"#),
            ("c.json", r#"{"name": "Broken", "superclass": 42}"#),
            ("d.json", "not json at all"),
            ("Trigger.json", "{}"),
        ]);

        let names: Vec<_> = decls.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["DockerStatus", "Report", "Trigger"]);
        assert_eq!(decls[0].superclass.as_deref(), Some("ShellCommandStatus"));
        assert!(decls[1].fields.contains_key("text"));
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.json"), r#"{"name": "Base"}"#).unwrap();
        std::fs::write(
            dir.path().join("leaf.json"),
            r#"{"name": "Leaf", "superclass": "Base"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("bad.json"), "{").unwrap();
        std::fs::write(dir.path().join("README.txt"), "ignored").unwrap();

        let decls = TypeDeclaration::load_dir(dir.path()).unwrap();
        assert_eq!(decls.len(), 2);

        let (registry, unresolved) = TypeRegistry::resolve(decls);
        assert!(unresolved.is_empty());
        assert!(registry.is_subtype("Leaf", "Base"));
    }

    #[test]
    fn test_load_dir_skips_non_utf8_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("base.json"), r#"{"name": "Base"}"#).unwrap();
        std::fs::write(dir.path().join("binary.json"), [0xff, 0xfe, 0x00, 0x7b]).unwrap();

        let decls = TypeDeclaration::load_dir(dir.path()).unwrap();
        assert_eq!(decls.len(), 1);
        assert_eq!(decls[0].name, "Base");
    }

    #[test]
    fn test_load_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let decls = TypeDeclaration::load_dir(&dir.path().join("nope")).unwrap();
        assert!(decls.is_empty());
    }

    fn sample_declarations() -> Vec<TypeDeclaration> {
        vec![
            decl("ShellCommandStatus", None),
            decl("DockerStatus", Some("ShellCommandStatus")),
            decl("DockerInfoStatus", Some("ShellCommandStatus")),
            decl("DockerListStatus", Some("DockerStatus")),
            decl("RsyncStatus", Some("ShellCommandStatus")),
            decl("Trigger", None),
            decl("Dangling", Some("Nowhere")),
            decl("DanglingChild", Some("Dangling")),
            decl("LoopA", Some("LoopB")),
            decl("LoopB", Some("LoopA")),
        ]
    }

    proptest! {
        #[test]
        fn resolution_is_order_independent(
            shuffled in Just(sample_declarations()).prop_shuffle()
        ) {
            let (expected, expected_unresolved) = TypeRegistry::resolve(sample_declarations());
            let (registry, unresolved) = TypeRegistry::resolve(shuffled);

            prop_assert_eq!(registry.ancestor_chains(), expected.ancestor_chains());
            prop_assert_eq!(unresolved, expected_unresolved);
        }
    }
}
