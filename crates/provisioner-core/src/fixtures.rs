//! Pod builders for tests.
//!
//! Available under `cfg(test)` and with the `test-utils` feature so that
//! downstream crates can build realistic pods without repeating the
//! Kubernetes struct boilerplate.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, NodeAffinity, NodeSelector, NodeSelectorRequirement,
    NodeSelectorTerm, Pod, PodAffinity, PodAffinityTerm, PodAntiAffinity, PodSpec,
    PreferredSchedulingTerm, ResourceRequirements, Toleration, TopologySpreadConstraint,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

/// Fluent builder for [`Pod`] values.
#[derive(Debug, Clone)]
pub struct PodBuilder {
    pod: Pod,
}

impl PodBuilder {
    /// Start a pod in the `default` namespace.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            pod: Pod {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    namespace: Some("default".to_string()),
                    ..Default::default()
                },
                spec: Some(PodSpec::default()),
                ..Default::default()
            },
        }
    }

    /// Set the namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: &str) -> Self {
        self.pod.metadata.namespace = Some(namespace.to_string());
        self
    }

    /// Add a pod label.
    #[must_use]
    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.pod
            .metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Add an app container with resource requests.
    #[must_use]
    pub fn container_requests(mut self, requests: &[(&str, &str)]) -> Self {
        let container = self.container(ResourceRequirements {
            requests: Some(quantities(requests)),
            ..Default::default()
        });
        self.spec().containers.push(container);
        self
    }

    /// Add an app container with limits only.
    #[must_use]
    pub fn container_limits(mut self, limits: &[(&str, &str)]) -> Self {
        let container = self.container(ResourceRequirements {
            limits: Some(quantities(limits)),
            ..Default::default()
        });
        self.spec().containers.push(container);
        self
    }

    /// Add an init container with resource requests.
    #[must_use]
    pub fn init_container_requests(mut self, requests: &[(&str, &str)]) -> Self {
        let container = self.container(ResourceRequirements {
            requests: Some(quantities(requests)),
            ..Default::default()
        });
        self.spec()
            .init_containers
            .get_or_insert_with(Vec::new)
            .push(container);
        self
    }

    /// Set the pod overhead.
    #[must_use]
    pub fn overhead(mut self, overhead: &[(&str, &str)]) -> Self {
        self.spec().overhead = Some(quantities(overhead));
        self
    }

    /// Add a node selector entry.
    #[must_use]
    pub fn node_selector(mut self, key: &str, value: &str) -> Self {
        self.spec()
            .node_selector
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Add an expression to the first required node selector term.
    #[must_use]
    pub fn required_node_affinity(mut self, key: &str, operator: &str, values: &[&str]) -> Self {
        let selector = self
            .node_affinity()
            .required_during_scheduling_ignored_during_execution
            .get_or_insert_with(NodeSelector::default);
        if selector.node_selector_terms.is_empty() {
            selector.node_selector_terms.push(NodeSelectorTerm::default());
        }
        selector.node_selector_terms[0]
            .match_expressions
            .get_or_insert_with(Vec::new)
            .push(node_selector_requirement(key, operator, values));
        self
    }

    /// Add a weighted preferred node affinity term with one expression.
    #[must_use]
    pub fn preferred_node_affinity(
        mut self,
        weight: i32,
        key: &str,
        operator: &str,
        values: &[&str],
    ) -> Self {
        self.node_affinity()
            .preferred_during_scheduling_ignored_during_execution
            .get_or_insert_with(Vec::new)
            .push(PreferredSchedulingTerm {
                weight,
                preference: NodeSelectorTerm {
                    match_expressions: Some(vec![node_selector_requirement(key, operator, values)]),
                    ..Default::default()
                },
            });
        self
    }

    /// Add a toleration.
    #[must_use]
    pub fn toleration(
        mut self,
        key: &str,
        operator: &str,
        value: Option<&str>,
        effect: Option<&str>,
    ) -> Self {
        self.spec()
            .tolerations
            .get_or_insert_with(Vec::new)
            .push(Toleration {
                key: Some(key.to_string()),
                operator: Some(operator.to_string()),
                value: value.map(str::to_string),
                effect: effect.map(str::to_string),
                ..Default::default()
            });
        self
    }

    /// Add a container exposing a port without binding it on the host.
    #[must_use]
    pub fn container_port(mut self, port: i32, host_ip: Option<&str>) -> Self {
        let mut container = self.container(ResourceRequirements::default());
        container.ports = Some(vec![ContainerPort {
            container_port: port,
            host_ip: host_ip.map(str::to_string),
            ..Default::default()
        }]);
        self.spec().containers.push(container);
        self
    }

    /// Add a container binding a host port.
    #[must_use]
    pub fn host_port(mut self, port: i32, host_ip: Option<&str>, protocol: Option<&str>) -> Self {
        let mut container = self.container(ResourceRequirements::default());
        container.ports = Some(vec![ContainerPort {
            container_port: port,
            host_port: Some(port),
            host_ip: host_ip.map(str::to_string),
            protocol: protocol.map(str::to_string),
            ..Default::default()
        }]);
        self.spec().containers.push(container);
        self
    }

    /// Add a `DoNotSchedule` topology spread constraint selecting `labels`.
    #[must_use]
    pub fn topology_spread(mut self, key: &str, max_skew: i32, labels: &[(&str, &str)]) -> Self {
        self.spec()
            .topology_spread_constraints
            .get_or_insert_with(Vec::new)
            .push(TopologySpreadConstraint {
                topology_key: key.to_string(),
                max_skew,
                when_unsatisfiable: "DoNotSchedule".to_string(),
                label_selector: Some(label_selector(labels)),
                ..Default::default()
            });
        self
    }

    /// Add a `ScheduleAnyway` topology spread constraint selecting `labels`.
    #[must_use]
    pub fn soft_topology_spread(mut self, key: &str, max_skew: i32, labels: &[(&str, &str)]) -> Self {
        self.spec()
            .topology_spread_constraints
            .get_or_insert_with(Vec::new)
            .push(TopologySpreadConstraint {
                topology_key: key.to_string(),
                max_skew,
                when_unsatisfiable: "ScheduleAnyway".to_string(),
                label_selector: Some(label_selector(labels)),
                ..Default::default()
            });
        self
    }

    /// Add a required pod affinity term.
    #[must_use]
    pub fn pod_affinity(mut self, key: &str, labels: &[(&str, &str)]) -> Self {
        let term = pod_affinity_term(key, labels);
        self.affinity()
            .pod_affinity
            .get_or_insert_with(PodAffinity::default)
            .required_during_scheduling_ignored_during_execution
            .get_or_insert_with(Vec::new)
            .push(term);
        self
    }

    /// Add a required pod anti-affinity term.
    #[must_use]
    pub fn pod_anti_affinity(mut self, key: &str, labels: &[(&str, &str)]) -> Self {
        let term = pod_affinity_term(key, labels);
        self.affinity()
            .pod_anti_affinity
            .get_or_insert_with(PodAntiAffinity::default)
            .required_during_scheduling_ignored_during_execution
            .get_or_insert_with(Vec::new)
            .push(term);
        self
    }

    /// Finish the pod.
    #[must_use]
    pub fn build(self) -> Pod {
        self.pod
    }

    fn container(&self, resources: ResourceRequirements) -> Container {
        let index = self.pod.spec.as_ref().map_or(0, |s| s.containers.len());
        Container {
            name: format!("c{index}"),
            image: Some("registry.local/app:latest".to_string()),
            resources: Some(resources),
            ..Default::default()
        }
    }

    fn spec(&mut self) -> &mut PodSpec {
        self.pod.spec.get_or_insert_with(PodSpec::default)
    }

    fn affinity(&mut self) -> &mut Affinity {
        self.spec().affinity.get_or_insert_with(Affinity::default)
    }

    fn node_affinity(&mut self) -> &mut NodeAffinity {
        self.affinity()
            .node_affinity
            .get_or_insert_with(NodeAffinity::default)
    }
}

fn quantities(entries: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), Quantity((*v).to_string())))
        .collect()
}

fn node_selector_requirement(key: &str, operator: &str, values: &[&str]) -> NodeSelectorRequirement {
    NodeSelectorRequirement {
        key: key.to_string(),
        operator: operator.to_string(),
        values: (!values.is_empty()).then(|| values.iter().map(|v| (*v).to_string()).collect()),
    }
}

fn label_selector(labels: &[(&str, &str)]) -> LabelSelector {
    LabelSelector {
        match_labels: Some(
            labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ),
        ..Default::default()
    }
}

fn pod_affinity_term(key: &str, labels: &[(&str, &str)]) -> PodAffinityTerm {
    PodAffinityTerm {
        topology_key: key.to_string(),
        label_selector: Some(label_selector(labels)),
        ..Default::default()
    }
}
