//! Container runtime domain types.
//!
//! These are runtime-agnostic views of what the fixture needs from a
//! container: identity for listing, and port bindings for endpoint discovery.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A container as returned by a runtime listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Runtime-assigned container ID.
    pub id: String,
    /// Container name without the leading `/`.
    pub name: String,
    /// Image reference the container was created from.
    pub image: String,
    /// Runtime state string (`running`, `exited`, ...).
    pub state: String,
}

/// One host-side binding of a container port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostBinding {
    /// Host address the port is bound on (`0.0.0.0`, `::`, `127.0.0.1`, ...).
    pub host_ip: String,
    /// Host port, as reported by the runtime.
    pub host_port: String,
}

impl fmt::Display for HostBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host_ip, self.host_port)
    }
}

/// Inspection result for a single container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetails {
    /// Full container ID.
    pub id: String,
    /// Container name without the leading `/`.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Whether the container's main process is running.
    pub running: bool,
    /// Port bindings keyed by container port (`"4566/tcp"`).
    pub ports: HashMap<String, Vec<HostBinding>>,
}

impl ContainerDetails {
    /// Returns the bindings published for `container_port`, if any.
    pub fn bindings_for(&self, container_port: &str) -> &[HostBinding] {
        self.ports
            .get(container_port)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
