use derive_more::Display;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Error taxonomy shared by the backend and its command-line driver.
///
/// Three Proxmox failure classes are kept apart: a transport
/// failure (`Reqwest`), a rejected operation (`Proxmox`) and a response the
/// backend cannot decode (`Protocol`).
///
#[derive(Debug, Error)]
pub enum Error {
    #[error("Error: {0}")]
    Any(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not ready: {0}")]
    NotReady(String),
    #[error("Unrecognized state: {0}")]
    Unrecognized(String),
    #[error("Timeout after: {0} seconds")]
    Timeout(f32),
    #[error("Proxmox API error: {0} failed: status {1}, body: {2}")]
    Proxmox(ProxmoxError, reqwest::StatusCode, String),
    #[error("Proxmox API error: {0} returned a malformed response: {1}")]
    Protocol(ProxmoxError, String),
    #[error("Header convert error: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Environment error: {0}")]
    Environment(#[from] dotenv::Error),
    #[error("Environment variable error: {0}")]
    EnvironmentVariable(#[from] std::env::VarError),
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Failed to set logger: {0}")]
    Logger(#[from] tracing_log::log::SetLoggerError),
    #[error("IO error: {0}")]
    InputOutput(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Telemetry error: {0}")]
    Telemetry(#[from] tracing::dispatcher::SetGlobalDefaultError),
    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl Error {
    /// Returns `true` if the hypervisor answered, but refused the operation.
    ///
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Proxmox(..))
    }
}

/// Proxmox API operation that failed.
///
#[derive(Debug, Display, Clone, Copy, PartialEq)]
pub enum ProxmoxError {
    ListVms,
    Status,
    Start,
    Shutdown,
    Stop,
    Create,
    Delete,
    StorageContent,
    DownloadUrl,
    Task,
    Agent,
}
