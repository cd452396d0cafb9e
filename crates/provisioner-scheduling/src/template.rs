//! Machine templates.

use std::collections::BTreeMap;
use std::sync::Arc;

use provisioner_cloudprovider::InstanceType;
use provisioner_core::labels::LABEL_PROVISIONER_NAME;
use provisioner_core::{Requirement, Requirements, ResourceList, Taints};

/// The shape every machine of a provisioner starts from.
///
/// Labels are mirrored into `requirements` as single-value `In`
/// requirements, so a pod selecting on a template label is compatible.
#[derive(Debug, Clone, Default)]
pub struct MachineTemplate {
    /// Name of the provisioner that owns the machines.
    pub provisioner_name: String,
    /// Labels applied to the launched node.
    pub labels: BTreeMap<String, String>,
    /// Constraints on the node's labels.
    pub requirements: Requirements,
    /// Taints pods must tolerate.
    pub taints: Taints,
    /// Taints removed once the node is initialized; not checked at admission.
    pub startup_taints: Taints,
    /// Requests of the machine's pods plus daemon overhead.
    pub requests: ResourceList,
    /// Candidate instance types.
    pub instance_type_options: Vec<Arc<InstanceType>>,
}

impl MachineTemplate {
    /// Create a template for a provisioner.
    #[must_use]
    pub fn new(provisioner_name: impl Into<String>) -> Self {
        let provisioner_name = provisioner_name.into();
        let template = Self::default().with_label(LABEL_PROVISIONER_NAME, &provisioner_name);
        Self {
            provisioner_name,
            ..template
        }
    }

    /// Add a node label and the matching requirement.
    #[must_use]
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self.requirements.add_requirement(Requirement::in_values(key, [value]));
        self
    }

    /// Merge additional requirements.
    #[must_use]
    pub fn with_requirements(mut self, requirements: Requirements) -> Self {
        self.requirements.add(requirements);
        self
    }

    /// Set the taints pods must tolerate.
    #[must_use]
    pub fn with_taints(mut self, taints: Taints) -> Self {
        self.taints = taints;
        self
    }

    /// Set the startup taints.
    #[must_use]
    pub fn with_startup_taints(mut self, taints: Taints) -> Self {
        self.startup_taints = taints;
        self
    }

    /// Set the candidate instance types.
    #[must_use]
    pub fn with_instance_types(mut self, instance_types: Vec<Arc<InstanceType>>) -> Self {
        self.instance_type_options = instance_types;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisioner_core::labels::LABEL_TOPOLOGY_ZONE;
    use provisioner_core::taints::{taint, TAINT_EFFECT_NO_SCHEDULE};

    #[test]
    fn new_requires_provisioner_name() {
        let template = MachineTemplate::new("default");
        assert_eq!(template.provisioner_name, "default");
        assert_eq!(template.labels.get(LABEL_PROVISIONER_NAME).map(String::as_str), Some("default"));
        assert!(template.requirements.get(LABEL_PROVISIONER_NAME).has("default"));
        assert!(template.requests.is_empty());
    }

    #[test]
    fn labels_and_requirements_intersect() {
        let template = MachineTemplate::new("default")
            .with_requirements(
                [Requirement::in_values(LABEL_TOPOLOGY_ZONE, ["zone-a", "zone-b"])]
                    .into_iter()
                    .collect(),
            )
            .with_label(LABEL_TOPOLOGY_ZONE, "zone-b");
        let zone = template.requirements.get(LABEL_TOPOLOGY_ZONE);
        assert!(zone.has("zone-b"));
        assert!(!zone.has("zone-a"));
    }

    #[test]
    fn startup_taints_are_kept_apart() {
        let template = MachineTemplate::new("default")
            .with_startup_taints(Taints::new(vec![taint("node.cilium.io/agent-not-ready", None, TAINT_EFFECT_NO_SCHEDULE)]));
        assert!(template.taints.is_empty());
        assert!(!template.startup_taints.is_empty());
    }
}
