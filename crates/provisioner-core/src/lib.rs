//! Scheduling primitives for the node provisioner.
//!
//! This crate provides the building blocks the machine admission algorithm
//! combines:
//!
//! - **Requirements**: label key → allowed value set algebra
//! - **Taints**: toleration matching against a machine's taints
//! - **Host ports**: per-node ledger of claimed host ports
//! - **Resources**: quantity parsing, merging and fitting
//! - **Identifiers**: pod keys and synthetic hostname sequences
//! - **Telemetry**: tracing subscriber setup
//!
//! # Example
//!
//! ```
//! use provisioner_core::labels::LABEL_TOPOLOGY_ZONE;
//! use provisioner_core::requirements::{Requirement, Requirements};
//!
//! let machine: Requirements = [Requirement::in_values(LABEL_TOPOLOGY_ZONE, ["zone-a", "zone-b"])]
//!     .into_iter()
//!     .collect();
//! let pod: Requirements = [Requirement::in_values(LABEL_TOPOLOGY_ZONE, ["zone-b"])]
//!     .into_iter()
//!     .collect();
//!
//! assert!(machine.compatible(&pod).is_ok());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod hostports;
pub mod ids;
pub mod labels;
pub mod requirements;
pub mod resources;
pub mod taints;
pub mod telemetry;

#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;

pub use error::{HostPortError, QuantityError, RequirementsError, TaintError, TelemetryError};
pub use hostports::HostPortUsage;
pub use ids::{HostnameSequence, PodKey};
pub use requirements::{Operator, Requirement, Requirements};
pub use resources::ResourceList;
pub use taints::Taints;
