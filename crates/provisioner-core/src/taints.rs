//! Taints and toleration matching.

use k8s_openapi::api::core::v1::{Pod, Taint, Toleration};
use serde::{Deserialize, Serialize};

use crate::error::TaintError;

/// `NoSchedule` taint effect.
pub const TAINT_EFFECT_NO_SCHEDULE: &str = "NoSchedule";

/// `PreferNoSchedule` taint effect.
pub const TAINT_EFFECT_PREFER_NO_SCHEDULE: &str = "PreferNoSchedule";

/// `NoExecute` taint effect.
pub const TAINT_EFFECT_NO_EXECUTE: &str = "NoExecute";

/// The taints a machine will carry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Taints(Vec<Taint>);

impl Taints {
    /// Wrap a list of taints.
    #[must_use]
    pub fn new(taints: Vec<Taint>) -> Self {
        Self(taints)
    }

    /// The taints, in declaration order.
    #[must_use]
    pub fn as_slice(&self) -> &[Taint] {
        &self.0
    }

    /// Check if there are no taints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that the pod tolerates every taint.
    ///
    /// # Errors
    ///
    /// Returns the first taint no toleration matches.
    pub fn tolerates(&self, pod: &Pod) -> Result<(), TaintError> {
        let tolerations = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.tolerations.as_deref())
            .unwrap_or_default();
        for taint in &self.0 {
            if !tolerations.iter().any(|t| tolerates_taint(t, taint)) {
                return Err(TaintError::Untolerated {
                    taint: format_taint(taint),
                });
            }
        }
        Ok(())
    }
}

impl From<Vec<Taint>> for Taints {
    fn from(taints: Vec<Taint>) -> Self {
        Self(taints)
    }
}

/// Build a taint.
#[must_use]
pub fn taint(key: &str, value: Option<&str>, effect: &str) -> Taint {
    Taint {
        key: key.to_string(),
        value: value.map(str::to_string),
        effect: effect.to_string(),
        ..Default::default()
    }
}

/// Kubernetes toleration semantics: an empty effect matches every effect, an
/// empty key with `Exists` matches every taint.
#[must_use]
pub fn tolerates_taint(toleration: &Toleration, taint: &Taint) -> bool {
    if let Some(effect) = toleration.effect.as_deref().filter(|e| !e.is_empty()) {
        if effect != taint.effect {
            return false;
        }
    }
    if let Some(key) = toleration.key.as_deref().filter(|k| !k.is_empty()) {
        if key != taint.key {
            return false;
        }
    }
    match toleration.operator.as_deref() {
        Some("Exists") => true,
        None | Some("" | "Equal") => {
            toleration.value.as_deref().unwrap_or_default() == taint.value.as_deref().unwrap_or_default()
        }
        Some(_) => false,
    }
}

/// Render as `key=value:Effect`.
#[must_use]
pub fn format_taint(taint: &Taint) -> String {
    match taint.value.as_deref() {
        Some(value) if !value.is_empty() => format!("{}={}:{}", taint.key, value, taint.effect),
        _ => format!("{}:{}", taint.key, taint.effect),
    }
}
