//! Instance type catalog entries.

use std::collections::BTreeSet;

use provisioner_core::labels::{LABEL_CAPACITY_TYPE, LABEL_INSTANCE_TYPE, LABEL_TOPOLOGY_ZONE};
use provisioner_core::requirements::{Requirement, Requirements};
use provisioner_core::resources::{self, ResourceList};
use serde::{Deserialize, Serialize};

use crate::offering::Offerings;

/// Resources reserved on a node before any pod can use them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceTypeOverhead {
    /// Reserved for the kubelet and container runtime.
    #[serde(default)]
    pub kube_reserved: ResourceList,
    /// Reserved for operating system daemons.
    #[serde(default)]
    pub system_reserved: ResourceList,
    /// Held back to keep the kubelet from evicting pods.
    #[serde(default)]
    pub eviction_threshold: ResourceList,
}

impl InstanceTypeOverhead {
    /// Sum of all reservations.
    #[must_use]
    pub fn total(&self) -> ResourceList {
        resources::merge([&self.kube_reserved, &self.system_reserved, &self.eviction_threshold])
    }
}

/// A named hardware shape offered by the cloud provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceType {
    /// Provider name, e.g. `m5.large`.
    pub name: String,
    /// Labels a node of this type satisfies.
    pub requirements: Requirements,
    /// Where and how the type can be obtained.
    pub offerings: Offerings,
    /// Raw capacity of the node.
    pub capacity: ResourceList,
    /// Reservations subtracted from capacity.
    #[serde(default)]
    pub overhead: InstanceTypeOverhead,
}

impl InstanceType {
    /// Build an instance type whose requirements are derived from its name
    /// and offerings: the instance type label, plus the zones and capacity
    /// types of all offerings.
    #[must_use]
    pub fn new(name: impl Into<String>, capacity: ResourceList, offerings: Offerings) -> Self {
        let name = name.into();
        let zones: BTreeSet<&str> = offerings.as_slice().iter().map(|o| o.zone.as_str()).collect();
        let capacity_types: BTreeSet<&str> = offerings
            .as_slice()
            .iter()
            .map(|o| o.capacity_type.as_str())
            .collect();
        let requirements: Requirements = [
            Requirement::in_values(LABEL_INSTANCE_TYPE, [name.clone()]),
            Requirement::in_values(LABEL_TOPOLOGY_ZONE, zones),
            Requirement::in_values(LABEL_CAPACITY_TYPE, capacity_types),
        ]
        .into_iter()
        .collect();

        Self {
            name,
            requirements,
            offerings,
            capacity,
            overhead: InstanceTypeOverhead::default(),
        }
    }

    /// Add a requirement, e.g. the architecture of the type.
    #[must_use]
    pub fn with_requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.add_requirement(requirement);
        self
    }

    /// Set the overhead reservations.
    #[must_use]
    pub fn with_overhead(mut self, overhead: InstanceTypeOverhead) -> Self {
        self.overhead = overhead;
        self
    }

    /// Resources available to pods: capacity minus overhead.
    #[must_use]
    pub fn allocatable(&self) -> ResourceList {
        resources::subtract(&self.capacity, &self.overhead.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offering::Offering;
    use provisioner_core::labels::LABEL_ARCH;

    fn m5_large() -> InstanceType {
        InstanceType::new(
            "m5.large",
            ResourceList::parse([("cpu", "2"), ("memory", "8Gi")]).unwrap(),
            Offerings::new(vec![
                Offering::new("zone-a", "on-demand", 0.096),
                Offering::new("zone-b", "spot", 0.035),
            ]),
        )
    }

    #[test]
    fn new_derives_requirements_from_offerings() {
        let it = m5_large();
        assert_eq!(it.requirements.get(LABEL_INSTANCE_TYPE).any(), Some("m5.large"));
        let zones: Vec<_> = it.requirements.get(LABEL_TOPOLOGY_ZONE).values().map(str::to_string).collect();
        assert_eq!(zones, ["zone-a", "zone-b"]);
        assert!(it.requirements.get(LABEL_CAPACITY_TYPE).has("spot"));
    }

    #[test]
    fn with_requirement_merges() {
        let it = m5_large().with_requirement(Requirement::in_values(LABEL_ARCH, ["amd64"]));
        assert_eq!(it.requirements.len(), 4);
    }

    #[test]
    fn allocatable_subtracts_overhead() {
        let it = m5_large().with_overhead(InstanceTypeOverhead {
            kube_reserved: ResourceList::parse([("cpu", "80m"), ("memory", "256Mi")]).unwrap(),
            system_reserved: ResourceList::parse([("cpu", "20m")]).unwrap(),
            eviction_threshold: ResourceList::parse([("memory", "100Mi")]).unwrap(),
        });
        let allocatable = it.allocatable();
        assert_eq!(allocatable.milli_value("cpu"), 1900);
        assert_eq!(allocatable.to_string(), r#"{"cpu":"1900m","memory":"7836Mi"}"#);
    }

    #[test]
    fn deserialize_catalog_entry() {
        let json = r#"{
            "name": "c6g.xlarge",
            "requirements": [
                {"key": "kubernetes.io/arch", "operator": "In", "values": ["arm64"]},
                {"key": "topology.kubernetes.io/zone", "operator": "In", "values": ["zone-a"]}
            ],
            "offerings": [{"zone": "zone-a", "capacity_type": "spot", "price": 0.06}],
            "capacity": {"cpu": "4", "memory": "8Gi"}
        }"#;
        let it: InstanceType = serde_json::from_str(json).unwrap();
        assert_eq!(it.name, "c6g.xlarge");
        assert!(it.requirements.get(LABEL_ARCH).has("arm64"));
        assert_eq!(it.allocatable(), it.capacity);
        assert_eq!(it.offerings.available().count(), 1);
    }
}
