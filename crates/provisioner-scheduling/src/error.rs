//! Error types for machine admission.

use provisioner_core::{
    HostPortError, QuantityError, Requirements, RequirementsError, ResourceList, TaintError,
};
use thiserror::Error;

use crate::filter::FilterDiagnostics;
use crate::topology::TopologyKind;

/// No domain can satisfy a topology constraint given current placements.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsatisfiable {kind} topology constraint on {key} (counts = {counts}, pod domains = {pod_domains}, machine domains = {machine_domains})")]
pub struct TopologyError {
    /// Kind of the violated constraint.
    pub kind: TopologyKind,
    /// Topology key, e.g. the zone label.
    pub key: String,
    /// Domain counts of the constraint, rendered.
    pub counts: String,
    /// Domains the pod allows.
    pub pod_domains: String,
    /// Domains the machine allows.
    pub machine_domains: String,
}

/// Reasons a pod cannot be added to a machine.
///
/// Every variant is a per-attempt outcome: the machine is unchanged and the
/// caller is free to try another machine.
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// The pod does not tolerate a machine taint.
    #[error(transparent)]
    TaintIntolerance(#[from] TaintError),

    /// A requested host port is already claimed on the machine.
    #[error(transparent)]
    PortConflict(#[from] HostPortError),

    /// Machine, pod and topology requirements contradict.
    #[error("incompatible requirements, {0}")]
    IncompatibleRequirements(#[from] RequirementsError),

    /// No topology domain satisfies a spread or affinity constraint.
    #[error(transparent)]
    TopologyViolation(#[from] TopologyError),

    /// The pod carries a resource quantity that does not parse.
    #[error("invalid resource request, {0}")]
    InvalidResourceRequest(#[from] QuantityError),

    /// Every remaining instance type was filtered out.
    #[error("no instance type satisfied resources {requests} and requirements {requirements} [had {candidates}] ({diagnostics})")]
    NoViableInstanceType {
        /// Instance types considered before filtering.
        candidates: usize,
        /// Exclusion counts per predicate.
        diagnostics: FilterDiagnostics,
        /// Requests of the rejected pod alone.
        requests: ResourceList,
        /// The merged requirements the filter ran against.
        requirements: Requirements,
    },

    /// Scheduling has been finalized for the machine.
    #[error("machine {hostname} is finalized")]
    MachineFinalized {
        /// Synthetic hostname of the machine.
        hostname: String,
    },
}

impl AdmissionError {
    /// Short, stable label for the rejection reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::TaintIntolerance(_) => "taint_intolerance",
            Self::PortConflict(_) => "port_conflict",
            Self::IncompatibleRequirements(_) => "incompatible_requirements",
            Self::TopologyViolation(_) => "topology_violation",
            Self::InvalidResourceRequest(_) => "invalid_resource_request",
            Self::NoViableInstanceType { .. } => "no_viable_instance_type",
            Self::MachineFinalized { .. } => "machine_finalized",
        }
    }

    /// Check if the pod might fit a different machine.
    ///
    /// Malformed pods and finalized machines are the only outcomes that no
    /// other candidate machine can change.
    #[must_use]
    pub const fn is_retriable_elsewhere(&self) -> bool {
        !matches!(
            self,
            Self::InvalidResourceRequest(_) | Self::MachineFinalized { .. }
        )
    }
}

/// A specialized Result type for admission.
pub type Result<T> = std::result::Result<T, AdmissionError>;
