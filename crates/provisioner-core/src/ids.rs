//! Identifier types for pods and in-flight machines.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};

/// Prefix of the synthetic hostnames given to machines while they are scheduled.
pub const HOSTNAME_PLACEHOLDER_PREFIX: &str = "hostname-placeholder-";

/// A `namespace/name` pod identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PodKey {
    namespace: String,
    name: String,
}

impl PodKey {
    /// Create a key from its parts.
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Build the key of a pod. A missing namespace maps to `default`.
    #[must_use]
    pub fn of(pod: &Pod) -> Self {
        Self {
            namespace: namespace_of(pod).to_string(),
            name: pod.metadata.name.clone().unwrap_or_default(),
        }
    }

    /// The pod namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The pod name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PodKey({}/{})", self.namespace, self.name)
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The namespace of a pod, `default` when unset.
#[must_use]
pub fn namespace_of(pod: &Pod) -> &str {
    pod.metadata.namespace.as_deref().unwrap_or("default")
}

/// A monotonic source of synthetic machine hostnames.
///
/// One sequence lives for one scheduling round, so values are unique within
/// the round without any process-wide state. Values are never reused.
#[derive(Debug, Default)]
pub struct HostnameSequence {
    next: AtomicU64,
}

impl HostnameSequence {
    /// Create a sequence whose first hostname ends in `0001`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next hostname.
    pub fn next_hostname(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{HOSTNAME_PLACEHOLDER_PREFIX}{n:04}")
    }

    /// Number of hostnames handed out so far.
    #[must_use]
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}
