//! Host port bookkeeping for a single node.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use crate::error::HostPortError;
use crate::ids::PodKey;

/// A claimed `(ip, port, protocol)` tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    /// Host IP; unspecified addresses bind every interface.
    pub ip: IpAddr,
    /// Host port number.
    pub port: i32,
    /// `TCP`, `UDP` or `SCTP`.
    pub protocol: String,
}

impl HostPort {
    /// Two entries collide when protocol and port match and either side
    /// binds every interface or both bind the same address.
    #[must_use]
    pub fn conflicts_with(&self, other: &HostPort) -> bool {
        self.protocol == other.protocol
            && self.port == other.port
            && (self.ip.is_unspecified() || other.ip.is_unspecified() || self.ip == other.ip)
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IP={} Port={} Proto={}", self.ip, self.port, self.protocol)
    }
}

/// Host ports requested by a pod's containers.
///
/// An unparsable or empty host IP is treated as `0.0.0.0`.
#[must_use]
pub fn host_ports(pod: &Pod) -> Vec<HostPort> {
    let Some(spec) = pod.spec.as_ref() else {
        return Vec::new();
    };
    spec.containers
        .iter()
        .flat_map(|c| c.ports.iter().flatten())
        .filter_map(|port| {
            let host_port = port.host_port.filter(|p| *p != 0)?;
            let ip = port
                .host_ip
                .as_deref()
                .and_then(|ip| ip.parse().ok())
                .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
            Some(HostPort {
                ip,
                port: host_port,
                protocol: port.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
            })
        })
        .collect()
}

/// The host ports claimed on one node, by pod.
#[derive(Debug, Clone, Default)]
pub struct HostPortUsage {
    reserved: BTreeMap<PodKey, Vec<HostPort>>,
}

impl HostPortUsage {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the pod's host ports against existing claims without claiming them.
    ///
    /// A pod never conflicts with its own earlier claim.
    ///
    /// # Errors
    ///
    /// Returns the first conflicting pair.
    pub fn validate(&self, pod: &Pod) -> Result<(), HostPortError> {
        let key = PodKey::of(pod);
        for requested in host_ports(pod) {
            for (owner, entries) in &self.reserved {
                if *owner == key {
                    continue;
                }
                if let Some(existing) = entries.iter().find(|e| requested.conflicts_with(e)) {
                    return Err(HostPortError::Conflict {
                        requested: requested.to_string(),
                        existing: existing.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Claim the pod's host ports, replacing any earlier claim by the same pod.
    pub fn add(&mut self, pod: &Pod) {
        let key = PodKey::of(pod);
        let ports = host_ports(pod);
        if !ports.is_empty() {
            debug!(pod = %key, ports = ports.len(), "Claimed host ports");
        }
        self.reserved.insert(key, ports);
    }

    /// Release the claims of a pod.
    pub fn delete_pod(&mut self, key: &PodKey) {
        self.reserved.remove(key);
    }

    /// All claimed entries.
    pub fn entries(&self) -> impl Iterator<Item = (&PodKey, &HostPort)> {
        self.reserved
            .iter()
            .flat_map(|(key, ports)| ports.iter().map(move |p| (key, p)))
    }

    /// Number of pods holding a claim record.
    #[must_use]
    pub fn pod_count(&self) -> usize {
        self.reserved.len()
    }
}
