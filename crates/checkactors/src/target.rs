//! Command used to run a script on the target machine

use crate::inventory::{is_localhost, InventoryProvider, LOCALHOST_IP};
use crate::ExecError;

const LOCAL_COMMAND: &[&str] = &["sudo", "bash"];
const REMOTE_COMMAND: &str = "cat | sudo bash /dev/stdin";

/// Where checks run and how to reach the machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub hostname: String,
    pub ip: String,
    pub user: Option<String>,
    pub identity: Option<String>,
}

impl TargetConfig {
    pub fn local() -> Self {
        Self {
            hostname: "localhost".to_string(),
            ip: LOCALHOST_IP.to_string(),
            user: None,
            identity: None,
        }
    }

    /// Resolve `hostname` to an address through `inventory`
    pub fn resolve(
        hostname: &str,
        inventory: &dyn InventoryProvider,
    ) -> Result<Self, ExecError> {
        let ip = if is_localhost(hostname) {
            LOCALHOST_IP.to_string()
        } else {
            inventory
                .lookup(hostname)
                .and_then(|m| m.primary_ip().map(str::to_string))
                .ok_or_else(|| ExecError::UnknownHost(hostname.to_string()))?
        };
        tracing::debug!("Target {} resolved to {}", hostname, ip);

        Ok(Self {
            hostname: hostname.to_string(),
            ip,
            user: None,
            identity: None,
        })
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn is_local(&self) -> bool {
        self.ip == LOCALHOST_IP
    }

    /// The command vector that reads a script on stdin and runs it as root
    pub fn command(&self) -> Vec<String> {
        if self.is_local() {
            return LOCAL_COMMAND.iter().map(|s| s.to_string()).collect();
        }

        let mut options = vec![
            "StrictHostKeyChecking=no".to_string(),
            "PasswordAuthentication=no".to_string(),
        ];
        if let Some(user) = &self.user {
            options.push(format!("User={}", user));
        }
        if let Some(identity) = &self.identity {
            options.push(format!("IdentityFile={}", identity));
        }

        let mut argv = vec!["ssh".to_string()];
        for option in options {
            argv.push("-o".to_string());
            argv.push(option);
        }
        argv.push("-4".to_string());
        argv.push(self.ip.clone());
        argv.push(REMOTE_COMMAND.to_string());
        argv
    }
}
