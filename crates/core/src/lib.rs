#![doc = include_str!("../README.md")]

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

// --- re-exports ---

// errors
pub use error::{ConfigError, EmustackError, RuntimeError};

// configuration
pub use config::{EmustackConfig, FixtureConfig, GeneralConfig};

// domain types
pub use types::{ContainerDetails, ContainerSummary, HostBinding};
