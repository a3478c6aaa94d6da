#![doc = include_str!("../README.md")]

pub mod config;
pub mod controller;
pub mod docker;
pub mod error;
pub mod health;
pub mod options;
pub mod ports;
pub mod probe;
pub mod watcher;

pub use config::{
    ControllerConfig, ControllerConfigBuilder, INIT_SCRIPT_TARGET_PREFIX, SERVICE_PORT,
};
pub use controller::FixtureController;
pub use docker::{BollardDockerClient, ContainerSpec, DockerClient};
pub use error::FixtureError;
pub use health::HealthProbe;
pub use options::FixtureOption;
pub use ports::{HostEndpoint, resolve_endpoint};
pub use probe::ReadinessProber;
pub use watcher::CancellationWatcher;
