use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};

use crate::config::{CheckConfig, CheckKind, HostConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Up,
    Down,
}

/// Result of the most recent execution of one check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
    pub latency_ms: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Outcome {
    pub fn up(message: impl Into<String>, latency_ms: f64, timestamp: DateTime<Utc>) -> Self {
        Self { success: true, message: message.into(), latency_ms: Some(latency_ms), timestamp }
    }

    pub fn down(message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self { success: false, message: message.into(), latency_ms: None, timestamp }
    }

    pub fn status(&self) -> Status {
        if self.success { Status::Up } else { Status::Down }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckStatus {
    #[serde(flatten)]
    pub kind: CheckKind,
    pub enabled: bool,
    /// `None` until the first sweep has executed this check.
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostStatus {
    pub name: String,
    pub address: String,
    pub notify_url: Option<String>,
    pub checks: Vec<CheckStatus>,
}

impl From<&CheckConfig> for CheckStatus {
    fn from(check: &CheckConfig) -> Self {
        Self { kind: check.kind.clone(), enabled: check.enabled, outcome: None }
    }
}

impl From<&CheckStatus> for CheckConfig {
    fn from(check: &CheckStatus) -> Self {
        Self { kind: check.kind.clone(), enabled: check.enabled }
    }
}

impl From<&HostConfig> for HostStatus {
    fn from(host: &HostConfig) -> Self {
        Self {
            name: host.name.clone(),
            address: host.address.clone(),
            notify_url: host.notify_url.clone(),
            checks: host.checks.iter().map(CheckStatus::from).collect(),
        }
    }
}

impl From<&HostStatus> for HostConfig {
    fn from(host: &HostStatus) -> Self {
        Self {
            name: host.name.clone(),
            address: host.address.clone(),
            notify_url: host.notify_url.clone(),
            checks: host.checks.iter().map(CheckConfig::from).collect(),
        }
    }
}

impl HostStatus {
    /// Target URL for an HTTP check, falling back to `http://<address>`.
    pub fn http_target(&self, url: &str) -> String {
        if url.is_empty() {
            format!("http://{}", self.address)
        } else {
            url.to_string()
        }
    }
}
