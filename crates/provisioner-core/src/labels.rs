//! Well-known node label keys.
//!
//! Requirements on these keys are allowed to be undefined on a machine: a
//! pod selecting a zone does not need the provisioner to have declared
//! zones up front. Any other label key must be defined before a pod can
//! require it.

/// Node hostname. Machines carry a synthetic value while being scheduled.
pub const LABEL_HOSTNAME: &str = "kubernetes.io/hostname";

/// Availability zone.
pub const LABEL_TOPOLOGY_ZONE: &str = "topology.kubernetes.io/zone";

/// Region.
pub const LABEL_TOPOLOGY_REGION: &str = "topology.kubernetes.io/region";

/// Instance type name.
pub const LABEL_INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";

/// CPU architecture.
pub const LABEL_ARCH: &str = "kubernetes.io/arch";

/// Operating system.
pub const LABEL_OS: &str = "kubernetes.io/os";

/// Capacity type of the offering (`spot` or `on-demand`).
pub const LABEL_CAPACITY_TYPE: &str = "provisioner.sh/capacity-type";

/// Name of the provisioner that owns the machine.
pub const LABEL_PROVISIONER_NAME: &str = "provisioner.sh/provisioner-name";

/// Spot capacity.
pub const CAPACITY_TYPE_SPOT: &str = "spot";

/// On-demand capacity.
pub const CAPACITY_TYPE_ON_DEMAND: &str = "on-demand";

/// Label keys that are allowed to be undefined on a machine.
pub const WELL_KNOWN_LABELS: &[&str] = &[
    LABEL_HOSTNAME,
    LABEL_TOPOLOGY_ZONE,
    LABEL_TOPOLOGY_REGION,
    LABEL_INSTANCE_TYPE,
    LABEL_ARCH,
    LABEL_OS,
    LABEL_CAPACITY_TYPE,
    LABEL_PROVISIONER_NAME,
];

/// Check if a label key is well known.
#[must_use]
pub fn is_well_known(key: &str) -> bool {
    WELL_KNOWN_LABELS.contains(&key)
}
