//! Error types for the scheduling primitives.
//!
//! Each collaborator reports its own error type; the admission layer wraps
//! them into a single taxonomy.

use thiserror::Error;

/// A resource quantity could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    /// The string is not a valid quantity.
    #[error("invalid quantity {value:?}")]
    Invalid {
        /// The offending string.
        value: String,
    },

    /// The quantity does not fit in 64-bit milli-units.
    #[error("quantity {value:?} is out of range")]
    Overflow {
        /// The offending string.
        value: String,
    },
}

/// Two requirement sets contradict, or a requirement could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequirementsError {
    /// No value satisfies both requirements on a key.
    #[error("key {key}, {incoming} not in {existing}")]
    Incompatible {
        /// The conflicting label key.
        key: String,
        /// The incoming requirement, rendered.
        incoming: String,
        /// The existing requirement, rendered.
        existing: String,
    },

    /// A custom label is required but the machine does not define it.
    #[error("label {key:?} does not have known values")]
    UndefinedLabel {
        /// The label key.
        key: String,
    },

    /// The selector operator is not one of the supported operators.
    #[error("unsupported operator {operator:?} for key {key}")]
    UnsupportedOperator {
        /// The label key.
        key: String,
        /// The operator as written.
        operator: String,
    },

    /// A `Gt`/`Lt` requirement has no single integer value.
    #[error("invalid bound {value:?} for key {key}")]
    InvalidBound {
        /// The label key.
        key: String,
        /// The bound as written.
        value: String,
    },
}

/// A pod does not tolerate a taint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaintError {
    /// No toleration on the pod matches the taint.
    #[error("did not tolerate {taint}")]
    Untolerated {
        /// The taint, rendered as `key=value:Effect`.
        taint: String,
    },
}

/// A pod requests a host port that is already claimed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostPortError {
    /// The requested port collides with an existing claim.
    #[error("{requested} conflicts with existing HostPort configuration {existing}")]
    Conflict {
        /// The requested entry, rendered.
        requested: String,
        /// The existing entry, rendered.
        existing: String,
    },
}

/// Tracing could not be initialized.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive did not parse.
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    /// A global subscriber was already installed.
    #[error("failed to install subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}
