//! Fixture error types.
//!
//! [`FixtureError`] covers everything that can go wrong between building a
//! controller and tearing its container down. `From<FixtureError> for
//! EmustackError` lets callers propagate it with `?` into the core taxonomy.

use std::time::Duration;

use emustack_core::error::{ConfigError, EmustackError, RuntimeError};

/// Fixture domain errors.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    /// Invalid option or configuration value.
    #[error("config error: {field}: {reason}")]
    Config {
        /// Offending field or option.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The container runtime could not be reached.
    #[error("docker connection error: {0}")]
    DockerConnection(String),

    /// Any other runtime API failure.
    #[error("docker api error: {0}")]
    DockerApi(String),

    /// Pulling the emulator image failed.
    #[error("failed to pull image '{image}': {reason}")]
    ImagePull {
        /// Image reference.
        image: String,
        /// Failure reason.
        reason: String,
    },

    /// A container with the configured name already exists.
    #[error("container name '{name}' is already in use")]
    NameConflict {
        /// Conflicting container name.
        name: String,
    },

    /// Container creation failed for a reason other than a name conflict.
    #[error("could not create container: {reason}")]
    ContainerCreate {
        /// Failure reason.
        reason: String,
    },

    /// The created container failed to start.
    #[error("could not start container '{container_id}': {reason}")]
    ContainerStart {
        /// Container ID.
        container_id: String,
        /// Failure reason.
        reason: String,
    },

    /// The runtime does not know the container.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// The container disappeared while waiting for readiness.
    #[error("container '{container_id}' exited before becoming ready")]
    ContainerExited {
        /// Container ID.
        container_id: String,
    },

    /// The readiness marker did not show up in time.
    #[error("init timeout exceeded ({timeout:?}) waiting for '{marker}'")]
    ReadinessTimeout {
        /// Configured timeout.
        timeout: Duration,
        /// Marker that was being waited for.
        marker: String,
    },

    /// The service port has no usable host binding.
    #[error("container '{container_id}' has no host binding for {port}")]
    PortNotBound {
        /// Container ID.
        container_id: String,
        /// Container port (`4566/tcp`).
        port: String,
    },

    /// Stopping the container failed.
    #[error("could not stop container '{container_id}': {reason}")]
    ContainerStop {
        /// Container ID.
        container_id: String,
        /// Failure reason.
        reason: String,
    },

    /// The functional health probe failed.
    #[error("health probe failed: {0}")]
    Health(String),
}

impl From<FixtureError> for EmustackError {
    fn from(err: FixtureError) -> Self {
        match &err {
            FixtureError::Config { field, reason } => {
                EmustackError::Config(ConfigError::InvalidValue {
                    field: field.clone(),
                    reason: reason.clone(),
                })
            }
            FixtureError::DockerConnection(msg) => {
                EmustackError::Runtime(RuntimeError::Connection(msg.clone()))
            }
            FixtureError::ImagePull { .. } => {
                EmustackError::Runtime(RuntimeError::Image(err.to_string()))
            }
            FixtureError::ReadinessTimeout { .. }
            | FixtureError::ContainerExited { .. }
            | FixtureError::Health(_) => {
                EmustackError::Runtime(RuntimeError::Readiness(err.to_string()))
            }
            FixtureError::DockerApi(_)
            | FixtureError::NameConflict { .. }
            | FixtureError::ContainerCreate { .. }
            | FixtureError::ContainerStart { .. }
            | FixtureError::ContainerNotFound(_)
            | FixtureError::PortNotBound { .. }
            | FixtureError::ContainerStop { .. } => {
                EmustackError::Runtime(RuntimeError::Container(err.to_string()))
            }
        }
    }
}
