//! CLI-specific error types and exit code mapping

use emustack_core::error::EmustackError;
use emustack_fixture::FixtureError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// Fixture lifecycle failure.
    #[error("fixture error: {0}")]
    Fixture(#[from] FixtureError),

    /// The probed emulator is not serving requests.
    #[error("emulator unhealthy: {0}")]
    Unhealthy(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, signal setup).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from emustack-core.
    #[error("{0}")]
    Core(#[from] EmustackError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 0    | Success                                  |
    /// | 1    | General / command error                  |
    /// | 2    | Configuration error                      |
    /// | 3    | Container runtime unreachable            |
    /// | 4    | Emulator never became ready              |
    /// | 5    | Health probe reported no running service |
    /// | 10   | IO error                                 |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(EmustackError::Config(_)) => 2,
            Self::Fixture(FixtureError::Config { .. }) => 2,
            Self::Fixture(FixtureError::DockerConnection(_)) => 3,
            Self::Fixture(
                FixtureError::ReadinessTimeout { .. } | FixtureError::ContainerExited { .. },
            ) => 4,
            Self::Unhealthy(_) => 5,
            Self::Io(_) => 10,
            Self::Fixture(_) | Self::Command(_) | Self::JsonSerialize(_) | Self::Core(_) => 1,
        }
    }
}
