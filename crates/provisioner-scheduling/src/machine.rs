//! In-flight machines and pod admission.
//!
//! A [`Machine`] is a node that does not exist yet. Pods are packed onto it
//! one at a time with [`Machine::add`]; every successful admission narrows
//! the machine's requirements and candidate instance types and grows its
//! requests. A rejected admission leaves the machine and the shared
//! [`Topology`] exactly as they were.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use provisioner_cloudprovider::InstanceType;
use provisioner_core::labels::LABEL_HOSTNAME;
use provisioner_core::resources::{self, ResourceList};
use provisioner_core::telemetry::EVENTS_TARGET;
use provisioner_core::{HostPortUsage, PodKey, Requirement, Requirements, Taints};
use tracing::debug;

use crate::error::{AdmissionError, Result};
use crate::filter::filter_instance_types;
use crate::template::MachineTemplate;
use crate::topology::Topology;

/// Instance type names listed before the rest are summarized.
const INSTANCE_TYPE_LIST_LIMIT: usize = 5;

/// The outcome of a successful evaluation, applied in one step.
struct Admission {
    requirements: Requirements,
    requests: ResourceList,
    instance_types: Vec<Arc<InstanceType>>,
}

/// A machine being packed with pods.
#[derive(Debug)]
pub struct Machine {
    template: MachineTemplate,
    hostname: String,
    pods: Vec<Arc<Pod>>,
    topology: Arc<Topology>,
    host_port_usage: HostPortUsage,
    finalized: bool,
}

impl Machine {
    /// Create an empty machine from a template.
    ///
    /// The machine gets a fresh placeholder hostname, registered as a domain
    /// in `topology`. Its requests start at `daemon_resources` and its
    /// candidates are `instance_types`, replacing whatever the template held.
    ///
    /// Unlike every other template requirement, a hostname requirement is
    /// dropped rather than intersected. The machine's only hostname is its
    /// placeholder, so keeping a template hostname would leave a machine that
    /// admits nothing.
    #[must_use]
    pub fn new(
        template: &MachineTemplate,
        topology: Arc<Topology>,
        daemon_resources: ResourceList,
        instance_types: Vec<Arc<InstanceType>>,
    ) -> Self {
        let hostname = topology.next_hostname();
        topology.register(LABEL_HOSTNAME, &hostname);

        let mut template = template.clone();
        template.requirements.remove(LABEL_HOSTNAME);
        template.requests = daemon_resources;
        template.instance_type_options = instance_types;

        debug!(
            hostname = %hostname,
            provisioner = %template.provisioner_name,
            instance_types = template.instance_type_options.len(),
            "Created machine"
        );

        Self {
            template,
            hostname,
            pods: Vec::new(),
            topology,
            host_port_usage: HostPortUsage::new(),
            finalized: false,
        }
    }

    /// Try to place a pod on this machine.
    ///
    /// Checks run in order: taints, host ports, requirements, topology, then
    /// resources and instance types. The first failure is returned and nothing
    /// is changed. On success the pod is appended and the machine's
    /// requirements, requests and instance type options are replaced with the
    /// narrowed values.
    ///
    /// # Errors
    ///
    /// Returns the reason the pod cannot be placed here.
    pub fn add(&mut self, pod: &Arc<Pod>) -> Result<()> {
        let result = self.try_add(pod);
        match &result {
            Ok(()) => debug!(
                pod = %PodKey::of(pod),
                hostname = %self.hostname,
                pods = self.pods.len(),
                instance_types = self.template.instance_type_options.len(),
                "Added pod to machine"
            ),
            Err(e) => debug!(
                target: EVENTS_TARGET,
                pod = %PodKey::of(pod),
                hostname = %self.hostname,
                reason = e.reason(),
                error = %e,
                "Pod rejected by machine"
            ),
        }
        result
    }

    fn try_add(&mut self, pod: &Arc<Pod>) -> Result<()> {
        if self.finalized {
            return Err(AdmissionError::MachineFinalized {
                hostname: self.hostname.clone(),
            });
        }

        self.template.taints.tolerates(pod)?;
        self.host_port_usage.validate(pod)?;

        let pod_requirements = Requirements::from_pod(pod)?;
        let mut requirements = self.scheduling_requirements();
        requirements.compatible(&pod_requirements)?;
        requirements.add(pod_requirements.clone());

        // held until the pod is recorded so no other admission interleaves
        let topology = Arc::clone(&self.topology);
        let mut transaction = topology.lock();

        let topology_requirements = transaction.add_requirements(&pod_requirements, &requirements, pod)?;
        requirements.compatible(&topology_requirements)?;
        requirements.add(topology_requirements);

        let pod_requests = resources::requests_for_pods([pod.as_ref()])?;
        let requests = resources::merge([&self.template.requests, &pod_requests]);
        let (instance_types, diagnostics) =
            filter_instance_types(&self.template.instance_type_options, &requirements, &requests);
        if instance_types.is_empty() {
            return Err(AdmissionError::NoViableInstanceType {
                candidates: diagnostics.candidates,
                diagnostics,
                requests: pod_requests,
                requirements,
            });
        }

        transaction.record(pod, &requirements);
        self.commit(
            pod,
            Admission {
                requirements,
                requests,
                instance_types,
            },
        );
        Ok(())
    }

    fn commit(&mut self, pod: &Arc<Pod>, admission: Admission) {
        let Admission {
            mut requirements,
            requests,
            instance_types,
        } = admission;
        requirements.remove(LABEL_HOSTNAME);

        self.pods.push(Arc::clone(pod));
        self.template.instance_type_options = instance_types;
        self.template.requests = requests;
        self.template.requirements = requirements;
        self.host_port_usage.add(pod);
    }

    /// Close the machine to further admissions. Calling it again is a no-op.
    pub fn finalize_scheduling(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        debug!(
            hostname = %self.hostname,
            pods = self.pods.len(),
            "Finalized machine"
        );
    }

    /// Pods admitted so far, in admission order.
    #[must_use]
    pub fn pods(&self) -> &[Arc<Pod>] {
        &self.pods
    }

    /// Daemon overhead plus the requests of every admitted pod.
    #[must_use]
    pub fn requests(&self) -> &ResourceList {
        &self.template.requests
    }

    /// The machine's requirements, without the placeholder hostname.
    #[must_use]
    pub fn requirements(&self) -> &Requirements {
        &self.template.requirements
    }

    /// The requirements admission runs against, hostname included.
    #[must_use]
    pub fn scheduling_requirements(&self) -> Requirements {
        let mut requirements = self.template.requirements.clone();
        requirements.add_requirement(Requirement::in_values(LABEL_HOSTNAME, [self.hostname.as_str()]));
        requirements
    }

    /// Instance types still able to host every admitted pod.
    #[must_use]
    pub fn instance_type_options(&self) -> &[Arc<InstanceType>] {
        &self.template.instance_type_options
    }

    /// Taints pods must tolerate.
    #[must_use]
    pub fn taints(&self) -> &Taints {
        &self.template.taints
    }

    /// The template this machine was created from, with current state.
    #[must_use]
    pub fn template(&self) -> &MachineTemplate {
        &self.template
    }

    /// Placeholder hostname, unique within the round.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Check whether [`Machine::finalize_scheduling`] has been called.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Host ports claimed by admitted pods.
    #[must_use]
    pub fn host_port_usage(&self) -> &HostPortUsage {
        &self.host_port_usage
    }
}

impl fmt::Display for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "machine with {} pods requesting {} from types {}",
            self.pods.len(),
            self.template.requests,
            instance_type_list(&self.template.instance_type_options)
        )
    }
}

/// Comma-separated instance type names, summarizing past the first five.
#[must_use]
pub fn instance_type_list(instance_types: &[Arc<InstanceType>]) -> String {
    let mut out = String::new();
    for (i, instance_type) in instance_types.iter().enumerate() {
        if i == INSTANCE_TYPE_LIST_LIMIT {
            let _ = write!(out, " and {} other(s)", instance_types.len() - i);
            break;
        }
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&instance_type.name);
    }
    out
}
