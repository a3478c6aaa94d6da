//! Error types shared across the workspace.
//!
//! Domain crates keep their own error enums and convert into
//! [`EmustackError`] so the CLI can report everything through one type.

/// Top-level emustack error.
#[derive(Debug, thiserror::Error)]
pub enum EmustackError {
    /// Configuration problem (file, parse or validation).
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Failure while driving the container runtime.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// The configuration file is not valid TOML for [`EmustackConfig`](crate::EmustackConfig).
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// A field holds a value outside its accepted range.
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Container runtime errors.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The container runtime could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The emulator image could not be acquired.
    #[error("image acquisition failed: {0}")]
    Image(String),

    /// A container operation (create/start/stop/inspect) failed.
    #[error("container operation failed: {0}")]
    Container(String),

    /// The emulator never reported readiness.
    #[error("readiness failed: {0}")]
    Readiness(String),
}
