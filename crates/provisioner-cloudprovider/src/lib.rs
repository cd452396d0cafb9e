//! Cloud provider catalog types for the node provisioner.
//!
//! An [`InstanceType`] describes a hardware shape: the labels it satisfies,
//! its capacity, the reservations taken out of that capacity, and the
//! [`Offerings`] (zone × capacity type) under which it can be launched.
//! Catalogs are produced by a provider integration and are read-only to
//! the scheduler.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod instance_type;
pub mod offering;

pub use instance_type::{InstanceType, InstanceTypeOverhead};
pub use offering::{Offering, Offerings};
