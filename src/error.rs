use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0:#}")]
    Io(#[from] std::io::Error),
    #[error("JSON config error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML config error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("TOML config error: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("TOML config error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("unsupported config file format: {0:?} (use .json, .yaml, .yml or .toml)")]
    UnsupportedFormat(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("host not found: {0}")]
    NotFound(String),
    #[error("host already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid host: {0}")]
    Invalid(String),
    #[error("host {host} has no check at index {index} ({len} checks)")]
    IndexOutOfRange { host: String, index: usize, len: usize },
    #[error("check {index} on host {host} is a {actual} check, not {requested}")]
    WrongKind {
        host: String,
        index: usize,
        actual: &'static str,
        requested: &'static str,
    },
    #[error("failed to persist configuration: {0}")]
    Persistence(#[from] ConfigError),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("a scheduler is already running for this store")]
    AlreadyRunning,
    #[error("scheduler interval must be greater than zero")]
    ZeroInterval,
}
