//! Machine admission for the node provisioner.
//!
//! During a scheduling round the provisioner packs pending pods onto
//! in-flight [`Machine`]s. Each admission checks, in order:
//!
//! - **Taints**: the pod tolerates every machine taint
//! - **Host ports**: no requested host port is already claimed
//! - **Requirements**: the pod's node selection is compatible
//! - **Topology**: spread and pod (anti-)affinity leave an allowed domain
//! - **Resources**: some instance type still fits and can be launched
//!
//! An admission either applies completely or changes nothing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── scheduling round ────────────────────────┐
//! │                                                                  │
//! │   pod ──▶ Machine::add ──▶ taints ──▶ host ports ──▶ requirements │
//! │                                                        │         │
//! │                  ┌─────────────────────────────────────┘         │
//! │                  ▼                                               │
//! │          Topology (shared, locked) ──▶ instance type filter       │
//! │                  │                            │                  │
//! │                  └──────── record ◀── commit ◀┘                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use provisioner_cloudprovider::{InstanceType, Offering, Offerings};
//! use provisioner_core::fixtures::PodBuilder;
//! use provisioner_core::ResourceList;
//! use provisioner_scheduling::{Machine, MachineTemplate, Topology};
//!
//! let catalog = vec![Arc::new(InstanceType::new(
//!     "m5.large",
//!     ResourceList::parse([("cpu", "2"), ("memory", "8Gi")]).unwrap(),
//!     Offerings::new(vec![Offering::new("zone-a", "on-demand", 0.096)]),
//! ))];
//! let topology = Arc::new(Topology::from_instance_types(&catalog));
//! let template = MachineTemplate::new("default");
//! let mut machine = Machine::new(&template, topology, ResourceList::new(), catalog);
//!
//! let pod = Arc::new(PodBuilder::new("web").container_requests(&[("cpu", "1")]).build());
//! machine.add(&pod).unwrap();
//! assert_eq!(machine.pods().len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod filter;
pub mod machine;
pub mod template;
pub mod topology;

pub use error::{AdmissionError, Result, TopologyError};
pub use filter::{filter_instance_types, FilterDiagnostics};
pub use machine::{instance_type_list, Machine};
pub use template::MachineTemplate;
pub use topology::{domains_from_instance_types, Topology, TopologyKind, TopologyTransaction};
