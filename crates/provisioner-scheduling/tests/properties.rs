//! Property tests for the instance type filter and admission sequences.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use provisioner_cloudprovider::{InstanceType, Offering, Offerings};
use provisioner_core::fixtures::PodBuilder;
use provisioner_core::labels::{LABEL_CAPACITY_TYPE, LABEL_TOPOLOGY_ZONE};
use provisioner_core::{Requirement, Requirements, ResourceList};
use provisioner_scheduling::{filter_instance_types, instance_type_list, Machine, MachineTemplate, Topology};

const ZONES: [&str; 3] = ["zone-a", "zone-b", "zone-c"];
const CAPACITY_TYPES: [&str; 2] = ["spot", "on-demand"];

#[derive(Debug, Clone)]
struct OfferingSpec {
    zone: usize,
    capacity_type: usize,
    available: bool,
}

#[derive(Debug, Clone)]
struct TypeSpec {
    cpu: i64,
    offerings: Vec<OfferingSpec>,
}

fn offering_strategy() -> impl Strategy<Value = OfferingSpec> {
    (0..ZONES.len(), 0..CAPACITY_TYPES.len(), any::<bool>()).prop_map(|(zone, capacity_type, available)| {
        OfferingSpec {
            zone,
            capacity_type,
            available,
        }
    })
}

fn type_strategy() -> impl Strategy<Value = TypeSpec> {
    (1i64..16, proptest::collection::vec(offering_strategy(), 1..4))
        .prop_map(|(cpu, offerings)| TypeSpec { cpu, offerings })
}

/// `None` leaves the key unconstrained.
fn subset_strategy(len: usize) -> impl Strategy<Value = Option<BTreeSet<usize>>> {
    proptest::option::of(proptest::collection::vec(any::<bool>(), len)).prop_map(|mask| {
        mask.map(|mask| mask.iter().enumerate().filter(|(_, on)| **on).map(|(i, _)| i).collect())
    })
}

fn build(index: usize, spec: &TypeSpec) -> Arc<InstanceType> {
    let offerings = spec
        .offerings
        .iter()
        .map(|o| {
            let offering = Offering::new(ZONES[o.zone], CAPACITY_TYPES[o.capacity_type], 0.1);
            if o.available {
                offering
            } else {
                offering.unavailable()
            }
        })
        .collect();
    let mut capacity = ResourceList::new();
    capacity.set_milli("cpu", spec.cpu * 1000);
    Arc::new(InstanceType::new(format!("type-{index}"), capacity, Offerings::new(offerings)))
}

fn allows(constraint: Option<&BTreeSet<usize>>, value: usize) -> bool {
    constraint.map_or(true, |set| set.contains(&value))
}

/// Expected outcome computed from the generated data alone.
fn viable(
    spec: &TypeSpec,
    zones: Option<&BTreeSet<usize>>,
    capacity_types: Option<&BTreeSet<usize>>,
    cpu: i64,
) -> bool {
    let compatible = spec.offerings.iter().any(|o| allows(zones, o.zone))
        && spec.offerings.iter().any(|o| allows(capacity_types, o.capacity_type));
    let fits = cpu <= spec.cpu * 1000;
    let has_offering = spec
        .offerings
        .iter()
        .any(|o| o.available && allows(zones, o.zone) && allows(capacity_types, o.capacity_type));
    compatible && fits && has_offering
}

proptest! {
    #[test]
    fn filter_keeps_exactly_the_viable_types(
        specs in proptest::collection::vec(type_strategy(), 0..8),
        zones in subset_strategy(ZONES.len()),
        capacity_types in subset_strategy(CAPACITY_TYPES.len()),
        cpu in 0i64..20_000,
    ) {
        let instance_types: Vec<_> = specs.iter().enumerate().map(|(i, s)| build(i, s)).collect();

        let mut requirements = Requirements::new();
        if let Some(zones) = &zones {
            requirements.add_requirement(Requirement::in_values(LABEL_TOPOLOGY_ZONE, zones.iter().map(|z| ZONES[*z])));
        }
        if let Some(capacity_types) = &capacity_types {
            requirements.add_requirement(Requirement::in_values(
                LABEL_CAPACITY_TYPE,
                capacity_types.iter().map(|c| CAPACITY_TYPES[*c]),
            ));
        }
        let mut requests = ResourceList::new();
        requests.set_milli("cpu", cpu);

        let (kept, diagnostics) = filter_instance_types(&instance_types, &requirements, &requests);

        let expected: Vec<String> = specs
            .iter()
            .enumerate()
            .filter(|(_, s)| viable(s, zones.as_ref(), capacity_types.as_ref(), cpu))
            .map(|(i, _)| format!("type-{i}"))
            .collect();
        let actual: Vec<String> = kept.iter().map(|it| it.name.clone()).collect();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(diagnostics.candidates, specs.len());
        prop_assert!(diagnostics.incompatible <= specs.len());
        prop_assert!(diagnostics.insufficient_capacity <= specs.len());
        prop_assert!(diagnostics.no_offering <= specs.len());
    }

    #[test]
    fn listing_names_at_most_five(count in 0usize..12) {
        let specs = vec![TypeSpec {
            cpu: 1,
            offerings: vec![OfferingSpec { zone: 0, capacity_type: 0, available: true }],
        }; count];
        let instance_types: Vec<_> = specs.iter().enumerate().map(|(i, s)| build(i, s)).collect();

        let listing = instance_type_list(&instance_types);
        let shown = count.min(5);
        let names: Vec<String> = (0..shown).map(|i| format!("type-{i}")).collect();
        let mut expected = names.join(", ");
        if count > 5 {
            expected.push_str(&format!(" and {} other(s)", count - 5));
        }
        prop_assert_eq!(listing, expected);
    }

    #[test]
    fn admissions_only_narrow(
        cpus in proptest::collection::vec(1i64..6, 1..12),
        sizes in proptest::collection::vec(1i64..32, 1..6),
    ) {
        let catalog: Vec<_> = sizes
            .iter()
            .enumerate()
            .map(|(i, cpu)| build(i, &TypeSpec {
                cpu: *cpu,
                offerings: vec![OfferingSpec { zone: 0, capacity_type: 0, available: true }],
            }))
            .collect();
        let topology = Arc::new(Topology::from_instance_types(&catalog));
        let mut machine = Machine::new(&MachineTemplate::new("default"), topology, ResourceList::new(), catalog);

        let mut options = machine.instance_type_options().len();
        let mut requested = machine.requests().milli_value("cpu");
        for (i, cpu) in cpus.iter().enumerate() {
            let quantity = cpu.to_string();
            let pod = Arc::new(
                PodBuilder::new(&format!("pod-{i}"))
                    .container_requests(&[("cpu", quantity.as_str())])
                    .build(),
            );
            let before = machine.requests().clone();
            match machine.add(&pod) {
                Ok(()) => {
                    prop_assert!(machine.instance_type_options().len() <= options);
                    prop_assert!(machine.requests().milli_value("cpu") >= requested);
                    prop_assert!(!machine.instance_type_options().is_empty());
                }
                Err(_) => prop_assert_eq!(machine.requests(), &before),
            }
            options = machine.instance_type_options().len();
            requested = machine.requests().milli_value("cpu");
        }
    }
}
