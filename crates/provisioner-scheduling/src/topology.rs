//! Topology constraint tracking across the machines of one scheduling round.
//!
//! A [`Topology`] holds the known domains per topology key (zones, hostnames,
//! ...) and one group per distinct spread, affinity or anti-affinity
//! constraint seen on a recorded pod. Groups count the selected pods in each
//! domain; anti-affinity groups also remember the domains their owners landed
//! in so that pods matched by the selector can avoid them. Every recorded pod
//! is also kept as a placement, and a group first seen after some pods were
//! placed starts from their counts.
//!
//! The topology is shared by every machine of the round. Admission takes a
//! [`TopologyTransaction`] via [`Topology::lock`] and holds it from
//! derivation through record, so concurrent admissions observe each other's
//! placements in a serial order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{Pod, PodAffinityTerm};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use parking_lot::{Mutex, MutexGuard};
use provisioner_cloudprovider::InstanceType;
use provisioner_core::ids::namespace_of;
use provisioner_core::labels::LABEL_HOSTNAME;
use provisioner_core::{HostnameSequence, Operator, Requirement, Requirements};
use tracing::trace;

use crate::error::TopologyError;

const DO_NOT_SCHEDULE: &str = "DoNotSchedule";

/// Kind of a topology constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopologyKind {
    /// Hard topology spread (`DoNotSchedule`).
    Spread,
    /// Required pod affinity.
    Affinity,
    /// Required pod anti-affinity.
    AntiAffinity,
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spread => write!(f, "spread"),
            Self::Affinity => write!(f, "affinity"),
            Self::AntiAffinity => write!(f, "anti-affinity"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Definition {
    kind: TopologyKind,
    key: String,
    max_skew: i32,
    selector: Option<LabelSelector>,
    namespaces: BTreeSet<String>,
}

impl Definition {
    fn from_term(kind: TopologyKind, term: &PodAffinityTerm, namespace: &str) -> Self {
        let namespaces: BTreeSet<String> = match term.namespaces.as_deref() {
            Some(namespaces) if !namespaces.is_empty() => namespaces.iter().cloned().collect(),
            _ => BTreeSet::from([namespace.to_string()]),
        };
        Self {
            kind,
            key: term.topology_key.clone(),
            max_skew: 0,
            selector: term.label_selector.clone(),
            namespaces,
        }
    }

    fn selects(&self, pod: &Pod) -> bool {
        self.matches(namespace_of(pod), pod.metadata.labels.as_ref())
    }

    /// A missing selector selects nothing.
    fn matches(&self, namespace: &str, labels: Option<&BTreeMap<String, String>>) -> bool {
        self.namespaces.contains(namespace) && self.selector.as_ref().is_some_and(|s| selector_matches(s, labels))
    }
}

/// The distinct hard topology constraints a pod declares.
fn definitions(pod: &Pod) -> Vec<Definition> {
    let Some(spec) = pod.spec.as_ref() else {
        return Vec::new();
    };
    let namespace = namespace_of(pod);
    let mut out: Vec<Definition> = Vec::new();
    let mut push = |definition: Definition| {
        if !out.contains(&definition) {
            out.push(definition);
        }
    };

    for constraint in spec.topology_spread_constraints.iter().flatten() {
        if constraint.when_unsatisfiable != DO_NOT_SCHEDULE {
            continue;
        }
        push(Definition {
            kind: TopologyKind::Spread,
            key: constraint.topology_key.clone(),
            max_skew: constraint.max_skew,
            selector: constraint.label_selector.clone(),
            namespaces: BTreeSet::from([namespace.to_string()]),
        });
    }

    if let Some(affinity) = spec.affinity.as_ref() {
        let affinity_terms = affinity
            .pod_affinity
            .as_ref()
            .and_then(|a| a.required_during_scheduling_ignored_during_execution.as_ref())
            .into_iter()
            .flatten()
            .map(|term| (TopologyKind::Affinity, term));
        let anti_affinity_terms = affinity
            .pod_anti_affinity
            .as_ref()
            .and_then(|a| a.required_during_scheduling_ignored_during_execution.as_ref())
            .into_iter()
            .flatten()
            .map(|term| (TopologyKind::AntiAffinity, term));

        for (kind, term) in affinity_terms.chain(anti_affinity_terms) {
            push(Definition::from_term(kind, term, namespace));
        }
    }
    out
}

/// Kubernetes label selector semantics. Unknown operators never match.
fn selector_matches(selector: &LabelSelector, labels: Option<&BTreeMap<String, String>>) -> bool {
    let label = |key: &str| labels.and_then(|l| l.get(key));

    let labels_match = selector
        .match_labels
        .iter()
        .flatten()
        .all(|(key, value)| label(key.as_str()) == Some(value));

    labels_match
        && selector.match_expressions.iter().flatten().all(|expression| {
            let values = expression.values.as_deref().unwrap_or_default();
            let value = label(expression.key.as_str());
            match expression.operator.as_str() {
                "In" => value.is_some_and(|v| values.contains(v)),
                "NotIn" => !value.is_some_and(|v| values.contains(v)),
                "Exists" => value.is_some(),
                "DoesNotExist" => value.is_none(),
                _ => false,
            }
        })
}

/// A recorded pod, as far as selectors and domains are concerned.
#[derive(Debug, Clone)]
struct Placement {
    namespace: String,
    labels: Option<BTreeMap<String, String>>,
    requirements: Requirements,
}

impl Placement {
    fn of(pod: &Pod, requirements: &Requirements) -> Self {
        Self {
            namespace: namespace_of(pod).to_string(),
            labels: pod.metadata.labels.clone(),
            requirements: requirements.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct TopologyGroup {
    definition: Definition,
    counts: BTreeMap<String, u32>,
    owner_domains: BTreeSet<String>,
}

impl TopologyGroup {
    /// A group counting the selected pods among `placements`.
    fn new(definition: Definition, registered: Option<&BTreeSet<String>>, placements: &[Placement]) -> Self {
        let counts = registered
            .into_iter()
            .flatten()
            .map(|domain| (domain.clone(), 0))
            .collect();
        let selected: Vec<&Placement> = placements
            .iter()
            .filter(|p| definition.matches(&p.namespace, p.labels.as_ref()))
            .collect();
        let mut group = Self {
            definition,
            counts,
            owner_domains: BTreeSet::new(),
        };

        for placement in selected {
            let allowed = placement.requirements.get(group.key());
            if allowed.operator() == Operator::In {
                for value in allowed.values() {
                    group.counts.entry(value.to_string()).or_insert(0);
                }
            }
            let domains = group.domains_within(&allowed);
            group.record(&domains);
        }
        group
    }

    fn domains_within(&self, allowed: &Requirement) -> Vec<String> {
        self.counts.keys().filter(|domain| allowed.has(domain)).cloned().collect()
    }

    fn key(&self) -> &str {
        &self.definition.key
    }

    fn next_domains(&self, pod: &Pod, pod_domains: &Requirement, machine_domains: &Requirement) -> Requirement {
        match self.definition.kind {
            TopologyKind::Spread => self.next_spread_domain(pod, pod_domains, machine_domains),
            TopologyKind::Affinity => self.next_affinity_domains(pod, pod_domains, machine_domains),
            TopologyKind::AntiAffinity => {
                let used = self
                    .counts
                    .iter()
                    .filter(|(_, count)| **count > 0)
                    .map(|(domain, _)| domain.as_str());
                pod_domains.intersection(&Requirement::not_in(self.key(), used))
            }
        }
    }

    /// The least populated domain that keeps skew within bounds.
    fn next_spread_domain(&self, pod: &Pod, pod_domains: &Requirement, machine_domains: &Requirement) -> Requirement {
        // new hosts can always be created, so the hostname minimum is zero
        let min = if self.key() == LABEL_HOSTNAME {
            0
        } else {
            self.counts
                .iter()
                .filter(|(domain, _)| pod_domains.has(domain))
                .map(|(_, count)| *count)
                .min()
                .unwrap_or(0)
        };
        let increment = u32::from(self.definition.selects(pod));
        let max_skew = i64::from(self.definition.max_skew);

        let best = self
            .counts
            .iter()
            .filter(|(domain, _)| machine_domains.has(domain))
            .map(|(domain, count)| (domain, count + increment))
            .filter(|(_, count)| i64::from(*count) - i64::from(min) <= max_skew)
            .min_by_key(|(_, count)| *count);

        match best {
            Some((domain, _)) => Requirement::in_values(self.key(), [domain.as_str()]),
            None => Requirement::does_not_exist(self.key()),
        }
    }

    /// Domains already holding a selected pod. A pod selecting itself may
    /// start the group in a fresh domain.
    fn next_affinity_domains(&self, pod: &Pod, pod_domains: &Requirement, machine_domains: &Requirement) -> Requirement {
        let mut options: BTreeSet<&str> = self
            .counts
            .iter()
            .filter(|(domain, count)| **count > 0 && pod_domains.has(domain))
            .map(|(domain, _)| domain.as_str())
            .collect();

        if options.is_empty() && self.definition.selects(pod) {
            let both = pod_domains.intersection(machine_domains);
            let first = self
                .counts
                .keys()
                .find(|domain| both.has(domain))
                .or_else(|| self.counts.keys().find(|domain| pod_domains.has(domain)));
            options.extend(first.map(String::as_str));
        }
        Requirement::in_values(self.key(), options)
    }

    fn record(&mut self, domains: &[String]) {
        let count_all = match self.definition.kind {
            TopologyKind::AntiAffinity => true,
            TopologyKind::Spread | TopologyKind::Affinity => domains.len() == 1,
        };
        if count_all {
            for domain in domains {
                *self.counts.entry(domain.clone()).or_insert(0) += 1;
            }
        }
    }

    fn violation(&self, pod_domains: &Requirement, machine_domains: &Requirement) -> TopologyError {
        TopologyError {
            kind: self.definition.kind,
            key: self.definition.key.clone(),
            counts: format!("{:?}", self.counts),
            pod_domains: pod_domains.to_string(),
            machine_domains: machine_domains.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct TopologyState {
    domains: BTreeMap<String, BTreeSet<String>>,
    groups: Vec<TopologyGroup>,
    placements: Vec<Placement>,
}

impl TopologyState {
    fn register(&mut self, key: &str, value: &str) {
        self.domains
            .entry(key.to_string())
            .or_default()
            .insert(value.to_string());
        for group in self.groups.iter_mut().filter(|g| g.key() == key) {
            group.counts.entry(value.to_string()).or_insert(0);
        }
    }

    fn find(&self, definition: &Definition) -> Option<&TopologyGroup> {
        self.groups.iter().find(|g| &g.definition == definition)
    }
}

/// Collect every value an instance type can take per label key.
#[must_use]
pub fn domains_from_instance_types(instance_types: &[Arc<InstanceType>]) -> BTreeMap<String, BTreeSet<String>> {
    let mut domains: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for instance_type in instance_types {
        for requirement in instance_type.requirements.values() {
            if requirement.operator() == Operator::In {
                domains
                    .entry(requirement.key().to_string())
                    .or_default()
                    .extend(requirement.values().map(str::to_string));
            }
        }
    }
    domains
}

/// Shared topology state for one scheduling round.
#[derive(Debug, Default)]
pub struct Topology {
    state: Mutex<TopologyState>,
    hostnames: HostnameSequence,
}

impl Topology {
    /// Create a topology with no known domains.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a topology with known domains per key.
    #[must_use]
    pub fn with_domains(domains: BTreeMap<String, BTreeSet<String>>) -> Self {
        Self {
            state: Mutex::new(TopologyState {
                domains,
                ..TopologyState::default()
            }),
            hostnames: HostnameSequence::new(),
        }
    }

    /// Create a topology whose domains are everything the catalog offers.
    #[must_use]
    pub fn from_instance_types(instance_types: &[Arc<InstanceType>]) -> Self {
        Self::with_domains(domains_from_instance_types(instance_types))
    }

    /// Make a domain known, e.g. the hostname of a new machine.
    pub fn register(&self, key: &str, value: &str) {
        self.state.lock().register(key, value);
    }

    /// Allocate a hostname unique within this round.
    pub fn next_hostname(&self) -> String {
        self.hostnames.next_hostname()
    }

    /// Take exclusive access for one admission.
    pub fn lock(&self) -> TopologyTransaction<'_> {
        TopologyTransaction {
            state: self.state.lock(),
        }
    }

    /// Known domains of a key.
    #[must_use]
    pub fn domains(&self, key: &str) -> BTreeSet<String> {
        self.state.lock().domains.get(key).cloned().unwrap_or_default()
    }

    /// Number of tracked constraint groups.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.state.lock().groups.len()
    }

    /// Selected pod counts per domain, summed over groups of `kind` on `key`.
    #[must_use]
    pub fn counts(&self, kind: TopologyKind, key: &str) -> BTreeMap<String, u32> {
        let state = self.state.lock();
        let mut counts: BTreeMap<String, u32> = BTreeMap::new();
        for group in state
            .groups
            .iter()
            .filter(|g| g.definition.kind == kind && g.key() == key)
        {
            for (domain, count) in &group.counts {
                *counts.entry(domain.clone()).or_insert(0) += count;
            }
        }
        counts
    }
}

/// Exclusive access to a [`Topology`] for the duration of one admission.
pub struct TopologyTransaction<'a> {
    state: MutexGuard<'a, TopologyState>,
}

impl TopologyTransaction<'_> {
    /// Derive the requirements a pod's topology constraints impose on a
    /// machine. `machine_requirements` already includes the pod's own
    /// requirements. Nothing is recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if some constraint leaves no domain the machine allows.
    pub fn add_requirements(
        &self,
        pod_requirements: &Requirements,
        machine_requirements: &Requirements,
        pod: &Pod,
    ) -> Result<Requirements, TopologyError> {
        let owned = definitions(pod);
        let mut current = machine_requirements.clone();
        let mut derived = Requirements::new();

        for definition in &owned {
            let transient;
            let group = if let Some(group) = self.state.find(definition) {
                group
            } else {
                transient = TopologyGroup::new(
                    definition.clone(),
                    self.state.domains.get(&definition.key),
                    &self.state.placements,
                );
                &transient
            };
            let pod_domains = pod_requirements.get(group.key());
            let machine_domains = current.get(group.key());
            let domains = group.next_domains(pod, &pod_domains, &machine_domains);
            narrow(group, domains, &pod_domains, &mut current, &mut derived)?;
        }

        // pods matched by someone else's anti-affinity avoid the owners' domains
        let inverse = self.state.groups.iter().filter(|g| {
            g.definition.kind == TopologyKind::AntiAffinity
                && !owned.contains(&g.definition)
                && g.definition.selects(pod)
        });
        for group in inverse {
            let pod_domains = pod_requirements.get(group.key());
            let avoid = Requirement::not_in(group.key(), group.owner_domains.iter().map(String::as_str));
            let domains = pod_domains.intersection(&avoid);
            narrow(group, domains, &pod_domains, &mut current, &mut derived)?;
        }

        Ok(derived)
    }

    /// Record a committed pod against every group, creating the groups it
    /// declares from the pods placed so far. `requirements` are the machine's
    /// full requirements after the pod was added, hostname included.
    pub fn record(&mut self, pod: &Pod, requirements: &Requirements) {
        let owned = definitions(pod);
        let state = &mut *self.state;

        for definition in &owned {
            if state.find(definition).is_none() {
                let group = TopologyGroup::new(
                    definition.clone(),
                    state.domains.get(&definition.key),
                    &state.placements,
                );
                state.groups.push(group);
            }
        }

        let keys: BTreeSet<String> = state.groups.iter().map(|g| g.definition.key.clone()).collect();
        for key in &keys {
            let requirement = requirements.get(key);
            if requirement.operator() == Operator::In {
                for value in requirement.values() {
                    state.register(key, value);
                }
            }
        }

        for group in &mut state.groups {
            let domains = group.domains_within(&requirements.get(group.key()));
            if group.definition.selects(pod) {
                group.record(&domains);
            }
            if group.definition.kind == TopologyKind::AntiAffinity && owned.contains(&group.definition) {
                group.owner_domains.extend(domains);
            }
        }
        state.placements.push(Placement::of(pod, requirements));

        trace!(
            pod = ?pod.metadata.name,
            groups = state.groups.len(),
            placements = state.placements.len(),
            "Recorded pod topology"
        );
    }

    /// Make a domain known.
    pub fn register(&mut self, key: &str, value: &str) {
        self.state.register(key, value);
    }
}

fn narrow(
    group: &TopologyGroup,
    domains: Requirement,
    pod_domains: &Requirement,
    current: &mut Requirements,
    derived: &mut Requirements,
) -> Result<(), TopologyError> {
    let machine_domains = current.get(group.key());
    if machine_domains.intersection(&domains).is_empty() {
        return Err(group.violation(pod_domains, &machine_domains));
    }
    current.add_requirement(domains.clone());
    derived.add_requirement(domains);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisioner_core::fixtures::PodBuilder;
    use provisioner_core::labels::LABEL_TOPOLOGY_ZONE;

    fn zones(names: &[&str]) -> Topology {
        Topology::with_domains(BTreeMap::from([(
            LABEL_TOPOLOGY_ZONE.to_string(),
            names.iter().map(|z| (*z).to_string()).collect(),
        )]))
    }

    fn spread_pod(name: &str) -> Pod {
        PodBuilder::new(name)
            .label("app", "web")
            .topology_spread(LABEL_TOPOLOGY_ZONE, 1, &[("app", "web")])
            .build()
    }

    fn in_zone(zone: &str) -> Requirements {
        [Requirement::in_values(LABEL_TOPOLOGY_ZONE, [zone])].into_iter().collect()
    }

    #[test]
    fn selector_semantics() {
        let labels = BTreeMap::from([("app".to_string(), "web".to_string())]);
        let selector = LabelSelector {
            match_labels: Some(BTreeMap::from([("app".to_string(), "web".to_string())])),
            ..Default::default()
        };
        assert!(selector_matches(&selector, Some(&labels)));
        assert!(!selector_matches(&selector, None));
        assert!(selector_matches(&LabelSelector::default(), None));

        let pod = PodBuilder::new("p").label("app", "web").build();
        let nothing = Definition {
            kind: TopologyKind::Spread,
            key: LABEL_TOPOLOGY_ZONE.to_string(),
            max_skew: 1,
            selector: None,
            namespaces: BTreeSet::from(["default".to_string()]),
        };
        assert!(!nothing.selects(&pod));
    }

    #[test]
    fn soft_spread_is_ignored() {
        let pod = PodBuilder::new("p")
            .soft_topology_spread(LABEL_TOPOLOGY_ZONE, 1, &[("app", "web")])
            .build();
        assert!(definitions(&pod).is_empty());
    }

    #[test]
    fn spread_picks_least_populated_zone() {
        let topology = zones(&["zone-a", "zone-b", "zone-c"]);
        let mut placed = Vec::new();
        for i in 0..4 {
            let pod = spread_pod(&format!("web-{i}"));
            let mut txn = topology.lock();
            let derived = txn
                .add_requirements(&Requirements::new(), &Requirements::new(), &pod)
                .unwrap();
            let zone = derived.get(LABEL_TOPOLOGY_ZONE).any().unwrap().to_string();
            txn.record(&pod, &in_zone(&zone));
            placed.push(zone);
        }
        assert_eq!(placed, ["zone-a", "zone-b", "zone-c", "zone-a"]);
        assert_eq!(
            topology.counts(TopologyKind::Spread, LABEL_TOPOLOGY_ZONE),
            BTreeMap::from([
                ("zone-a".to_string(), 2),
                ("zone-b".to_string(), 1),
                ("zone-c".to_string(), 1),
            ])
        );
    }

    #[test]
    fn spread_rejects_machine_pinned_to_full_zone() {
        let topology = zones(&["zone-a", "zone-b"]);
        let first = spread_pod("web-0");
        topology.lock().record(&first, &in_zone("zone-a"));

        let err = topology
            .lock()
            .add_requirements(&Requirements::new(), &in_zone("zone-a"), &spread_pod("web-1"))
            .unwrap_err();
        assert_eq!(err.kind, TopologyKind::Spread);
        assert_eq!(err.key, LABEL_TOPOLOGY_ZONE);
    }

    #[test]
    fn add_requirements_does_not_create_groups() {
        let topology = zones(&["zone-a"]);
        let _ = topology
            .lock()
            .add_requirements(&Requirements::new(), &Requirements::new(), &spread_pod("web-0"))
            .unwrap();
        assert_eq!(topology.group_count(), 0);
    }

    #[test]
    fn affinity_follows_selected_pods() {
        let topology = zones(&["zone-a", "zone-b"]);
        let db = PodBuilder::new("db").label("app", "db").build();
        let follower = PodBuilder::new("api")
            .pod_affinity(LABEL_TOPOLOGY_ZONE, &[("app", "db")])
            .build();

        // nothing selected yet, and the follower does not select itself
        let err = topology
            .lock()
            .add_requirements(&Requirements::new(), &Requirements::new(), &follower)
            .unwrap_err();
        assert_eq!(err.kind, TopologyKind::Affinity);

        // the group only exists once a pod declaring it is recorded
        topology.lock().record(&follower, &in_zone("zone-a"));
        topology.lock().record(&db, &in_zone("zone-b"));
        let derived = topology
            .lock()
            .add_requirements(&Requirements::new(), &Requirements::new(), &follower)
            .unwrap();
        assert_eq!(derived.get(LABEL_TOPOLOGY_ZONE).any(), Some("zone-b"));
    }

    #[test]
    fn affinity_counts_pods_placed_before_the_group() {
        let topology = zones(&["zone-a", "zone-b"]);
        let db = PodBuilder::new("db").label("app", "db").build();
        topology.lock().record(&db, &in_zone("zone-b"));
        assert_eq!(topology.group_count(), 0);

        let follower = PodBuilder::new("api")
            .pod_affinity(LABEL_TOPOLOGY_ZONE, &[("app", "db")])
            .build();
        let derived = topology
            .lock()
            .add_requirements(&Requirements::new(), &Requirements::new(), &follower)
            .unwrap();
        assert_eq!(derived.get(LABEL_TOPOLOGY_ZONE).any(), Some("zone-b"));

        topology.lock().record(&follower, &in_zone("zone-b"));
        assert_eq!(
            topology.counts(TopologyKind::Affinity, LABEL_TOPOLOGY_ZONE),
            BTreeMap::from([("zone-a".to_string(), 0), ("zone-b".to_string(), 1)])
        );
    }

    #[test]
    fn anti_affinity_avoids_pods_placed_before_the_group() {
        let topology = zones(&["zone-a", "zone-b"]);
        let web = PodBuilder::new("web").label("app", "web").build();
        topology.lock().record(&web, &in_zone("zone-a"));

        let loner = PodBuilder::new("loner")
            .pod_anti_affinity(LABEL_TOPOLOGY_ZONE, &[("app", "web")])
            .build();
        let err = topology
            .lock()
            .add_requirements(&Requirements::new(), &in_zone("zone-a"), &loner)
            .unwrap_err();
        assert_eq!(err.kind, TopologyKind::AntiAffinity);

        let derived = topology
            .lock()
            .add_requirements(&Requirements::new(), &Requirements::new(), &loner)
            .unwrap();
        assert!(!derived.get(LABEL_TOPOLOGY_ZONE).has("zone-a"));
    }

    #[test]
    fn self_selecting_affinity_starts_in_first_allowed_zone() {
        let topology = zones(&["zone-a", "zone-b"]);
        let pod = PodBuilder::new("cache")
            .label("app", "cache")
            .pod_affinity(LABEL_TOPOLOGY_ZONE, &[("app", "cache")])
            .build();
        let derived = topology
            .lock()
            .add_requirements(&Requirements::new(), &in_zone("zone-b"), &pod)
            .unwrap();
        assert_eq!(derived.get(LABEL_TOPOLOGY_ZONE).any(), Some("zone-b"));
    }

    #[test]
    fn anti_affinity_avoids_used_and_owner_domains() {
        let topology = zones(&["zone-a", "zone-b"]);
        let owner = PodBuilder::new("owner")
            .label("app", "owner")
            .pod_anti_affinity(LABEL_TOPOLOGY_ZONE, &[("app", "web")])
            .build();
        topology.lock().record(&owner, &in_zone("zone-a"));

        // a web pod is matched by the owner's selector and must avoid zone-a
        let web = PodBuilder::new("web").label("app", "web").build();
        let derived = topology
            .lock()
            .add_requirements(&Requirements::new(), &Requirements::new(), &web)
            .unwrap();
        let zone = derived.get(LABEL_TOPOLOGY_ZONE);
        assert!(!zone.has("zone-a"));
        assert!(zone.has("zone-b"));

        let err = topology
            .lock()
            .add_requirements(&Requirements::new(), &in_zone("zone-a"), &web)
            .unwrap_err();
        assert_eq!(err.kind, TopologyKind::AntiAffinity);
    }

    #[test]
    fn register_extends_existing_groups() {
        let topology = Topology::new();
        let pod = PodBuilder::new("p")
            .label("app", "web")
            .topology_spread(LABEL_HOSTNAME, 1, &[("app", "web")])
            .build();
        topology.register(LABEL_HOSTNAME, "host-1");
        let host_1: Requirements = [Requirement::in_values(LABEL_HOSTNAME, ["host-1"])].into_iter().collect();
        topology.lock().record(&pod, &host_1);
        topology.register(LABEL_HOSTNAME, "host-2");

        assert_eq!(
            topology.counts(TopologyKind::Spread, LABEL_HOSTNAME),
            BTreeMap::from([("host-1".to_string(), 1), ("host-2".to_string(), 0)])
        );
        assert_eq!(topology.domains(LABEL_HOSTNAME).len(), 2);
    }

    #[test]
    fn domains_from_catalog() {
        use provisioner_cloudprovider::{Offering, Offerings};
        use provisioner_core::ResourceList;

        let types = vec![
            Arc::new(InstanceType::new(
                "a",
                ResourceList::new(),
                Offerings::new(vec![Offering::new("zone-a", "spot", 0.1)]),
            )),
            Arc::new(InstanceType::new(
                "b",
                ResourceList::new(),
                Offerings::new(vec![Offering::new("zone-b", "spot", 0.1)]),
            )),
        ];
        let topology = Topology::from_instance_types(&types);
        assert_eq!(
            topology.domains(LABEL_TOPOLOGY_ZONE),
            BTreeSet::from(["zone-a".to_string(), "zone-b".to_string()])
        );
    }
}
