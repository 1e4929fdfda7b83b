use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::ConfigError;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MonitorConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_ms: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

fn default_check_interval() -> u64 { 30 }
fn default_api_port() -> u16 { 8080 }
fn default_max_concurrency() -> usize { 64 }
fn default_ping_timeout() -> u64 { 2000 }
fn default_http_timeout() -> u64 { 5000 }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            api_port: default_api_port(),
            max_concurrency: default_max_concurrency(),
            ping_timeout_ms: default_ping_timeout(),
            http_timeout_ms: default_http_timeout(),
            hosts: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HostConfig {
    pub name: String,
    pub address: String,
    #[serde(
        default,
        rename = "healthchecks_ping_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub notify_url: Option<String>,
    #[serde(default)]
    pub checks: Vec<CheckConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CheckConfig {
    #[serde(flatten)]
    pub kind: CheckKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool { true }

/// Kind-specific parameters of a check.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckKind {
    Ping,
    Http {
        #[serde(default)]
        url: String,
        #[serde(default = "default_expect")]
        expect: u16,
    },
}

pub fn default_expect() -> u16 { 200 }

impl CheckKind {
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::Ping => "ping",
            CheckKind::Http { .. } => "http",
        }
    }

    pub fn same_kind(&self, other: &CheckKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

impl CheckConfig {
    pub fn ping() -> Self {
        Self { kind: CheckKind::Ping, enabled: true }
    }
}

impl MonitorConfig {
    /// Applies load-time defaults. Idempotent.
    pub fn normalize(&mut self) {
        for host in &mut self.hosts {
            if host.checks.is_empty() {
                host.checks.push(CheckConfig::ping());
            }
            if host.notify_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
                host.notify_url = None;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.check_interval == 0 {
            return Err(ConfigError::Invalid("check_interval must be greater than zero".into()));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be greater than zero".into()));
        }
        let mut seen = HashSet::new();
        for (i, host) in self.hosts.iter().enumerate() {
            if host.name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("host at index {} has no name", i)));
            }
            if host.address.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("host {} has no address", host.name)));
            }
            if !seen.insert(host.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate host name: {}", host.name)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(ConfigFormat::Json),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            _ => Err(ConfigError::UnsupportedFormat(ext)),
        }
    }
}

pub fn parse(content: &str, format: ConfigFormat) -> Result<MonitorConfig, ConfigError> {
    let mut config: MonitorConfig = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
        ConfigFormat::Toml => toml::from_str(content)?,
    };
    config.normalize();
    config.validate()?;
    Ok(config)
}

pub fn render(config: &MonitorConfig, format: ConfigFormat) -> Result<String, ConfigError> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
    })
}

pub fn load(path: &Path) -> Result<MonitorConfig, ConfigError> {
    let format = ConfigFormat::from_path(path)?;
    let content = fs::read_to_string(path)?;
    parse(&content, format)
}

/// Writes the document next to `path` and renames it into place.
pub fn save(path: &Path, config: &MonitorConfig) -> Result<(), ConfigError> {
    let format = ConfigFormat::from_path(path)?;
    let rendered = render(config, format)?;

    let tmp = tmp_path(path);
    fs::write(&tmp, &rendered)?;
    if let Err(e) = fs::rename(&tmp, path) {
        warn!(path = %path.display(), error = %e, "Rename failed, writing config in place");
        let _ = fs::remove_file(&tmp);
        fs::write(path, &rendered)?;
    }
    debug!(path = %path.display(), "Saved config");
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
check_interval: 10
hosts:
  - name: router
    address: 192.168.1.1
    healthchecks_ping_url: https://hc-ping.com/abc
    checks:
      - type: ping
      - type: http
        url: http://192.168.1.1/status
        expect: 204
        enabled: false
  - name: nas
    address: nas.lan
"#;

    #[test]
    fn parses_yaml_with_defaults() {
        let config = parse(YAML, ConfigFormat::Yaml).unwrap();
        assert_eq!(config.check_interval, 10);
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.hosts.len(), 2);

        let router = &config.hosts[0];
        assert_eq!(router.notify_url.as_deref(), Some("https://hc-ping.com/abc"));
        assert_eq!(router.checks[0], CheckConfig::ping());
        assert_eq!(
            router.checks[1],
            CheckConfig {
                kind: CheckKind::Http { url: "http://192.168.1.1/status".into(), expect: 204 },
                enabled: false,
            }
        );

        // zero checks gets the implicit ping
        assert_eq!(config.hosts[1].checks, vec![CheckConfig::ping()]);
    }

    #[test]
    fn http_check_defaults_url_and_expect() {
        let json = r#"{"hosts":[{"name":"a","address":"10.0.0.1","checks":[{"type":"http"}]}]}"#;
        let config = parse(json, ConfigFormat::Json).unwrap();
        assert_eq!(
            config.hosts[0].checks[0].kind,
            CheckKind::Http { url: String::new(), expect: 200 }
        );
        assert!(config.hosts[0].checks[0].enabled);
    }

    #[test]
    fn parses_toml() {
        let src = r#"
check_interval = 15

[[hosts]]
name = "web"
address = "example.com"

[[hosts.checks]]
type = "http"
url = "https://example.com/health"
expect = 200
"#;
        let config = parse(src, ConfigFormat::Toml).unwrap();
        assert_eq!(config.check_interval, 15);
        assert_eq!(
            config.hosts[0].checks[0].kind,
            CheckKind::Http { url: "https://example.com/health".into(), expect: 200 }
        );
    }

    #[test]
    fn rejects_duplicate_host_names() {
        let json = r#"{"hosts":[{"name":"a","address":"x"},{"name":"a","address":"y"}]}"#;
        let err = parse(json, ConfigFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("duplicate")));
    }

    #[test]
    fn rejects_zero_interval() {
        let json = r#"{"check_interval":0,"hosts":[]}"#;
        assert!(matches!(parse(json, ConfigFormat::Json), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn empty_notify_url_is_dropped() {
        let json = r#"{"hosts":[{"name":"a","address":"x","healthchecks_ping_url":""}]}"#;
        let config = parse(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.hosts[0].notify_url, None);
    }

    #[test]
    fn unsupported_extension() {
        let err = ConfigFormat::from_path(Path::new("monitor.ini")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(ext) if ext == "ini"));
    }

    #[test]
    fn save_then_load_preserves_document() {
        let dir = tempfile::tempdir().unwrap();
        let doc = parse(YAML, ConfigFormat::Yaml).unwrap();

        for file in ["monitor.yaml", "monitor.toml", "monitor.json"] {
            let path = dir.path().join(file);
            save(&path, &doc).unwrap();
            assert!(!tmp_path(&path).exists());
            assert_eq!(load(&path).unwrap(), doc, "format {}", file);
        }
    }
}
