//! Machine inventory: maps target hostnames to addresses

use crate::ExecError;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const LOCALHOST_IP: &str = "127.0.0.1";

/// One known machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineInfo {
    pub hostname: String,
    /// Addresses in preference order; the first one is used
    #[serde(default)]
    pub ip: Vec<String>,
}

impl MachineInfo {
    pub fn new(hostname: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            ip: vec![ip.into()],
        }
    }

    pub fn primary_ip(&self) -> Option<&str> {
        self.ip.first().map(String::as_str)
    }
}

pub trait InventoryProvider: Send + Sync {
    fn lookup(&self, hostname: &str) -> Option<MachineInfo>;
}

/// Inventory backed by a fixed list of machines
#[derive(Debug, Clone, Default)]
pub struct StaticInventory {
    machines: Vec<MachineInfo>,
}

impl StaticInventory {
    pub fn new(machines: Vec<MachineInfo>) -> Self {
        Self { machines }
    }

    /// Parse a JSON array of `{hostname, ip}` objects. `ip` may be a single
    /// string or a list.
    pub fn from_json(text: &str) -> Result<Self, ExecError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Addresses {
            One(String),
            Many(Vec<String>),
        }

        #[derive(Deserialize)]
        struct Entry {
            hostname: String,
            #[serde(default)]
            ip: Option<Addresses>,
        }

        let entries: Vec<Entry> =
            serde_json::from_str(text).map_err(|e| ExecError::Config(format!("inventory: {}", e)))?;

        let machines = entries
            .into_iter()
            .map(|entry| MachineInfo {
                hostname: entry.hostname,
                ip: match entry.ip {
                    Some(Addresses::One(ip)) => vec![ip],
                    Some(Addresses::Many(ips)) => ips,
                    None => Vec::new(),
                },
            })
            .collect();
        Ok(Self { machines })
    }

    pub fn from_file(path: &Path) -> Result<Self, ExecError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ExecError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn machines(&self) -> &[MachineInfo] {
        &self.machines
    }
}

impl InventoryProvider for StaticInventory {
    fn lookup(&self, hostname: &str) -> Option<MachineInfo> {
        if is_localhost(hostname) {
            return Some(MachineInfo::new(hostname, LOCALHOST_IP));
        }
        self.machines
            .iter()
            .find(|m| m.hostname == hostname)
            .cloned()
    }
}

pub fn is_localhost(hostname: &str) -> bool {
    hostname == "localhost" || hostname == LOCALHOST_IP
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localhost_always_resolves() {
        let inventory = StaticInventory::default();
        for name in ["localhost", "127.0.0.1"] {
            let machine = inventory.lookup(name).unwrap();
            assert_eq!(machine.primary_ip(), Some(LOCALHOST_IP));
        }
    }

    #[test]
    fn test_lookup_from_json() {
        let inventory = StaticInventory::from_json(
            r#"[
                {"hostname": "web-1", "ip": ["192.168.122.10", "10.0.0.10"]},
                {"hostname": "db-1", "ip": "192.168.122.11"},
                {"hostname": "offline"}
            ]"#,
        )
        .unwrap();

        assert_eq!(inventory.lookup("web-1").unwrap().primary_ip(), Some("192.168.122.10"));
        assert_eq!(inventory.lookup("db-1").unwrap().primary_ip(), Some("192.168.122.11"));
        assert_eq!(inventory.lookup("offline").unwrap().primary_ip(), None);
        assert!(inventory.lookup("missing").is_none());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        std::fs::write(&path, r#"[{"hostname": "web-1", "ip": "192.168.122.10"}]"#).unwrap();

        let inventory = StaticInventory::from_file(&path).unwrap();
        assert_eq!(inventory.machines().len(), 1);
        assert!(StaticInventory::from_file(&dir.path().join("nope.json")).is_err());
    }

    #[test]
    fn test_malformed_inventory() {
        assert!(matches!(
            StaticInventory::from_json("{\"hostname\": 1}"),
            Err(ExecError::Config(_))
        ));
    }
}
