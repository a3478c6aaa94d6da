//! Host endpoint resolution.
//!
//! Turns the port bindings reported by `inspect_container` into the
//! `http://host:port` address tests connect to.

use std::fmt;
use std::net::IpAddr;

use emustack_core::types::{ContainerDetails, HostBinding};

use crate::error::FixtureError;

/// Loopback host used when the runtime binds to a wildcard address.
pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Resolved host side of the service port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEndpoint {
    /// Host name or IP literal (IPv6 without brackets).
    pub host: String,
    /// Host port.
    pub port: u16,
}

impl HostEndpoint {
    /// Base URL, `http://host:port`.
    pub fn url(&self) -> String {
        format!("http://{self}")
    }
}

impl fmt::Display for HostEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Finds the host binding for `container_port` in `details`.
///
/// `container_port` may omit the protocol, in which case `tcp` is assumed.
/// IPv4 bindings are preferred over IPv6 ones; wildcard addresses resolve to
/// the loopback host.
///
/// # Errors
///
/// `FixtureError::PortNotBound` when no binding carries a usable host port.
pub fn resolve_endpoint(
    details: &ContainerDetails,
    container_port: &str,
) -> Result<HostEndpoint, FixtureError> {
    let key = if container_port.contains('/') {
        container_port.to_owned()
    } else {
        format!("{container_port}/tcp")
    };

    let usable: Vec<(&HostBinding, u16)> = details
        .bindings_for(&key)
        .iter()
        .filter_map(|binding| {
            binding
                .host_port
                .parse::<u16>()
                .ok()
                .filter(|port| *port > 0)
                .map(|port| (binding, port))
        })
        .collect();

    let chosen = usable
        .iter()
        .find(|(binding, _)| !is_ipv6(&binding.host_ip))
        .or_else(|| usable.first());

    match chosen {
        Some((binding, port)) => Ok(HostEndpoint {
            host: normalize_host(&binding.host_ip),
            port: *port,
        }),
        None => Err(FixtureError::PortNotBound {
            container_id: details.id.clone(),
            port: key,
        }),
    }
}

fn is_ipv6(host: &str) -> bool {
    matches!(host.parse::<IpAddr>(), Ok(IpAddr::V6(_)))
}

fn normalize_host(host: &str) -> String {
    match host {
        "" | "0.0.0.0" | "::" => LOOPBACK_HOST.to_owned(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn details(bindings: &[(&str, &str)]) -> ContainerDetails {
        let mut ports = HashMap::new();
        ports.insert(
            "4566/tcp".to_owned(),
            bindings
                .iter()
                .map(|(ip, port)| HostBinding {
                    host_ip: (*ip).to_owned(),
                    host_port: (*port).to_owned(),
                })
                .collect(),
        );
        ContainerDetails {
            id: "abc123".to_owned(),
            name: "localstack".to_owned(),
            image: "localstack/localstack:1.4".to_owned(),
            running: true,
            ports,
        }
    }

    #[test]
    fn wildcard_ipv4_maps_to_loopback() {
        let endpoint = resolve_endpoint(&details(&[("0.0.0.0", "49153")]), "4566/tcp").unwrap();
        assert_eq!(endpoint.url(), "http://127.0.0.1:49153");
    }

    #[test]
    fn ipv4_preferred_over_ipv6() {
        let endpoint = resolve_endpoint(
            &details(&[("::", "49160"), ("0.0.0.0", "49153")]),
            "4566/tcp",
        )
        .unwrap();
        assert_eq!(endpoint.port, 49153);
    }

    #[test]
    fn specific_host_is_kept() {
        let endpoint =
            resolve_endpoint(&details(&[("192.168.1.20", "32768")]), "4566/tcp").unwrap();
        assert_eq!(endpoint.url(), "http://192.168.1.20:32768");
    }

    #[test]
    fn ipv6_only_binding_is_bracketed() {
        let endpoint = resolve_endpoint(&details(&[("fe80::1", "40000")]), "4566/tcp").unwrap();
        assert_eq!(endpoint.url(), "http://[fe80::1]:40000");

        let endpoint = resolve_endpoint(&details(&[("::", "40000")]), "4566/tcp").unwrap();
        assert_eq!(endpoint.url(), "http://127.0.0.1:40000");
    }

    #[test]
    fn port_without_protocol_defaults_to_tcp() {
        let endpoint = resolve_endpoint(&details(&[("", "49153")]), "4566").unwrap();
        assert_eq!(endpoint.host, LOOPBACK_HOST);
    }

    #[test]
    fn missing_binding_is_port_not_bound() {
        let err = resolve_endpoint(&details(&[]), "4566/tcp").unwrap_err();
        assert!(matches!(err, FixtureError::PortNotBound { ref port, .. } if port == "4566/tcp"));

        let err = resolve_endpoint(&details(&[("0.0.0.0", "49153")]), "4510/tcp").unwrap_err();
        assert!(matches!(err, FixtureError::PortNotBound { .. }));
    }

    #[test]
    fn unparsable_host_port_is_skipped() {
        let err = resolve_endpoint(&details(&[("0.0.0.0", ""), ("0.0.0.0", "0")]), "4566/tcp")
            .unwrap_err();
        assert!(matches!(err, FixtureError::PortNotBound { .. }));

        let endpoint = resolve_endpoint(
            &details(&[("0.0.0.0", "not-a-port"), ("0.0.0.0", "49200")]),
            "4566/tcp",
        )
        .unwrap();
        assert_eq!(endpoint.port, 49200);
    }
}
