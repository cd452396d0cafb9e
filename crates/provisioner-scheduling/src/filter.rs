//! Instance type filtering.
//!
//! Narrows a candidate list to the instance types that are compatible with
//! a requirement set, can hold the requested resources, and have an
//! available offering in an allowed zone and capacity type.

use std::fmt;
use std::sync::Arc;

use provisioner_cloudprovider::InstanceType;
use provisioner_core::labels::{LABEL_CAPACITY_TYPE, LABEL_TOPOLOGY_ZONE};
use provisioner_core::resources::{self, ResourceList};
use provisioner_core::Requirements;

/// Aggregate exclusion counts of one filter pass.
///
/// A candidate failing several predicates is counted under each of them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterDiagnostics {
    /// Candidates evaluated.
    pub candidates: usize,
    /// Requirements contradict the instance type's own.
    pub incompatible: usize,
    /// Requests exceed allocatable capacity.
    pub insufficient_capacity: usize,
    /// No available offering in an allowed zone and capacity type.
    pub no_offering: usize,
}

impl fmt::Display for FilterDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} incompatible, {} won't fit, {} no offerings",
            self.incompatible, self.insufficient_capacity, self.no_offering
        )
    }
}

/// Keep the instance types satisfying all three predicates, in input order.
///
/// Every predicate is evaluated for every candidate so the diagnostics are
/// complete.
#[must_use]
pub fn filter_instance_types(
    instance_types: &[Arc<InstanceType>],
    requirements: &Requirements,
    requests: &ResourceList,
) -> (Vec<Arc<InstanceType>>, FilterDiagnostics) {
    let mut diagnostics = FilterDiagnostics {
        candidates: instance_types.len(),
        ..FilterDiagnostics::default()
    };

    let viable = instance_types
        .iter()
        .filter(|instance_type| {
            let compatible = compatible(instance_type, requirements);
            let fits = fits(instance_type, requests);
            let has_offering = has_offering(instance_type, requirements);

            diagnostics.incompatible += usize::from(!compatible);
            diagnostics.insufficient_capacity += usize::from(!fits);
            diagnostics.no_offering += usize::from(!has_offering);

            compatible && fits && has_offering
        })
        .cloned()
        .collect();

    (viable, diagnostics)
}

/// The instance type's requirements intersect `requirements` on every shared key.
#[must_use]
pub fn compatible(instance_type: &InstanceType, requirements: &Requirements) -> bool {
    instance_type.requirements.intersects(requirements).is_ok()
}

/// `requests` fit within the instance type's allocatable resources.
#[must_use]
pub fn fits(instance_type: &InstanceType, requests: &ResourceList) -> bool {
    resources::fits(requests, &instance_type.allocatable())
}

/// Some available offering is in an allowed zone and capacity type.
/// Unconstrained dimensions allow everything.
#[must_use]
pub fn has_offering(instance_type: &InstanceType, requirements: &Requirements) -> bool {
    let zones = requirements
        .has(LABEL_TOPOLOGY_ZONE)
        .then(|| requirements.get(LABEL_TOPOLOGY_ZONE));
    let capacity_types = requirements
        .has(LABEL_CAPACITY_TYPE)
        .then(|| requirements.get(LABEL_CAPACITY_TYPE));

    instance_type.offerings.available().any(|offering| {
        zones.as_ref().map_or(true, |z| z.has(&offering.zone))
            && capacity_types
                .as_ref()
                .map_or(true, |c| c.has(&offering.capacity_type))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisioner_cloudprovider::{Offering, Offerings};
    use provisioner_core::labels::LABEL_ARCH;
    use provisioner_core::Requirement;

    fn instance_type(name: &str, cpu: &str, offerings: Vec<Offering>) -> Arc<InstanceType> {
        Arc::new(InstanceType::new(
            name,
            ResourceList::parse([("cpu", cpu), ("memory", "8Gi")]).unwrap(),
            Offerings::new(offerings),
        ))
    }

    fn requests(cpu: &str) -> ResourceList {
        ResourceList::parse([("cpu", cpu)]).unwrap()
    }

    fn names(types: &[Arc<InstanceType>]) -> Vec<&str> {
        types.iter().map(|it| it.name.as_str()).collect()
    }

    #[test]
    fn keeps_input_order() {
        let types = vec![
            instance_type("c", "4", vec![Offering::new("zone-a", "spot", 0.1)]),
            instance_type("a", "4", vec![Offering::new("zone-a", "spot", 0.1)]),
            instance_type("b", "4", vec![Offering::new("zone-a", "spot", 0.1)]),
        ];
        let (viable, diagnostics) = filter_instance_types(&types, &Requirements::new(), &requests("1"));
        assert_eq!(names(&viable), ["c", "a", "b"]);
        assert_eq!(diagnostics.to_string(), "0 incompatible, 0 won't fit, 0 no offerings");
    }

    #[test]
    fn counts_every_failed_predicate() {
        let arm = Arc::new(
            InstanceType::new(
                "arm",
                ResourceList::parse([("cpu", "1")]).unwrap(),
                Offerings::new(vec![Offering::new("zone-b", "spot", 0.1).unavailable()]),
            )
            .with_requirement(Requirement::in_values(LABEL_ARCH, ["arm64"])),
        );
        let types = vec![arm, instance_type("big", "8", vec![Offering::new("zone-a", "on-demand", 1.0)])];
        let reqs: Requirements = [Requirement::in_values(LABEL_ARCH, ["amd64"])].into_iter().collect();

        let (viable, diagnostics) = filter_instance_types(&types, &reqs, &requests("2"));
        assert_eq!(names(&viable), ["big"]);
        assert_eq!(
            diagnostics,
            FilterDiagnostics {
                candidates: 2,
                incompatible: 1,
                insufficient_capacity: 1,
                no_offering: 1,
            }
        );
    }

    #[test]
    fn offering_must_match_zone_and_capacity_type() {
        let it = instance_type(
            "m",
            "4",
            vec![
                Offering::new("zone-a", "spot", 0.1),
                Offering::new("zone-b", "on-demand", 0.3),
            ],
        );
        let spot_in_b: Requirements = [
            Requirement::in_values(LABEL_TOPOLOGY_ZONE, ["zone-b"]),
            Requirement::in_values(LABEL_CAPACITY_TYPE, ["spot"]),
        ]
        .into_iter()
        .collect();
        assert!(!has_offering(&it, &spot_in_b));

        let spot: Requirements = [Requirement::in_values(LABEL_CAPACITY_TYPE, ["spot"])].into_iter().collect();
        assert!(has_offering(&it, &spot));
        assert!(has_offering(&it, &Requirements::new()));
    }

    #[test]
    fn unavailable_offerings_do_not_count() {
        let it = instance_type("m", "4", vec![Offering::new("zone-a", "spot", 0.1).unavailable()]);
        assert!(compatible(&it, &Requirements::new()));
        assert!(!has_offering(&it, &Requirements::new()));
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let (viable, diagnostics) = filter_instance_types(&[], &Requirements::new(), &requests("1"));
        assert!(viable.is_empty());
        assert_eq!(diagnostics, FilterDiagnostics::default());
    }
}
