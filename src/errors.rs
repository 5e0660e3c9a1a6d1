use thiserror::Error;

use crate::executor::platform::PlatformError;

#[derive(Debug, Error)]
pub enum TapClawError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No active window is accessible")]
    NoActiveWindow,

    #[error("Action target unreachable: {0}")]
    ActionUnreachable(String),

    #[error("Unknown app: {0}")]
    UnknownApp(String),

    #[error("Inference unavailable: {0}")]
    InferenceUnavailable(String),

    #[error("Inference timed out after {0}s")]
    InferenceTimeout(u64),

    #[error("Automation permission revoked: {0}")]
    PermissionRevoked(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("Memory store error: {0}")]
    Memory(String),

    #[error("SSE parsing error: {0}")]
    SseParsing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Session worker has shut down")]
    SessionClosed,

    #[error("Turn cancelled")]
    Cancelled,
}

impl TapClawError {
    /// Classification used inside execution reports.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TapClawError::NoActiveWindow => ErrorKind::NoActiveWindow,
            TapClawError::ActionUnreachable(_) => ErrorKind::ActionUnreachable,
            TapClawError::UnknownApp(_) => ErrorKind::UnknownApp,
            TapClawError::PermissionRevoked(_) => ErrorKind::PermissionRevoked,
            TapClawError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::Platform,
        }
    }
}

impl From<PlatformError> for TapClawError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::NoActiveWindow => TapClawError::NoActiveWindow,
            PlatformError::PermissionRevoked(msg) => TapClawError::PermissionRevoked(msg),
            PlatformError::Rejected(msg) => TapClawError::ActionUnreachable(msg),
            PlatformError::Failed(msg) => TapClawError::Platform(msg),
        }
    }
}

impl serde::Serialize for TapClawError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

/// Data-only error classification recorded per action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ActionUnreachable,
    UnknownApp,
    PermissionRevoked,
    NoActiveWindow,
    Platform,
    Skipped,
    Cancelled,
}

pub type TapClawResult<T> = Result<T, TapClawError>;
