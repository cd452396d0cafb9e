//! Resource lists and quantity arithmetic.
//!
//! Quantities are held as signed 64-bit milli-units so that CPU (`500m`) and
//! memory (`2Gi`) share one exact representation.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use serde::{Deserialize, Serialize};

use crate::error::QuantityError;

/// CPU resource name.
pub const RESOURCE_CPU: &str = "cpu";

/// Memory resource name.
pub const RESOURCE_MEMORY: &str = "memory";

/// Pod count resource name.
pub const RESOURCE_PODS: &str = "pods";

/// Ephemeral storage resource name.
pub const RESOURCE_EPHEMERAL_STORAGE: &str = "ephemeral-storage";

const KI: i128 = 1 << 10;

/// A map of resource name to quantity in milli-units.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ResourceList(BTreeMap<String, i64>);

impl ResourceList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of quantity strings, e.g. `[("cpu", "2"), ("memory", "4Gi")]`.
    ///
    /// # Errors
    ///
    /// Returns an error if any quantity fails to parse.
    pub fn parse<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, QuantityError> {
        entries
            .into_iter()
            .map(|(name, value)| Ok((name.to_string(), parse_quantity(value)?)))
            .collect::<Result<BTreeMap<_, _>, _>>()
            .map(Self)
    }

    /// Convert a Kubernetes quantity map.
    ///
    /// # Errors
    ///
    /// Returns an error if any quantity fails to parse.
    pub fn from_quantities(quantities: &BTreeMap<String, Quantity>) -> Result<Self, QuantityError> {
        Self::parse(quantities.iter().map(|(k, v)| (k.as_str(), v.0.as_str())))
    }

    /// Quantity of a resource in milli-units, zero when absent.
    #[must_use]
    pub fn milli_value(&self, name: &str) -> i64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    /// Set a quantity in milli-units.
    pub fn set_milli(&mut self, name: impl Into<String>, milli: i64) {
        self.0.insert(name.into(), milli);
    }

    /// Iterate over `(name, milli-units)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Number of resources in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Add every quantity of `other` into this list.
    pub fn add(&mut self, other: &ResourceList) {
        for (name, value) in &other.0 {
            let entry = self.0.entry(name.clone()).or_insert(0);
            *entry = entry.saturating_add(*value);
        }
    }

    /// Raise each quantity to at least the one in `other`.
    pub fn max_with(&mut self, other: &ResourceList) {
        for (name, value) in &other.0 {
            let entry = self.0.entry(name.clone()).or_insert(*value);
            *entry = (*entry).max(*value);
        }
    }
}

impl TryFrom<BTreeMap<String, String>> for ResourceList {
    type Error = QuantityError;

    fn try_from(value: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        Self::parse(value.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

impl From<ResourceList> for BTreeMap<String, String> {
    fn from(list: ResourceList) -> Self {
        list.0
            .into_iter()
            .map(|(k, v)| (k, format_quantity(v)))
            .collect()
    }
}

impl fmt::Debug for ResourceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for ResourceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "\"{name}\":\"{}\"", format_quantity(*value))?;
        }
        f.write_str("}")
    }
}

/// Sum any number of resource lists.
#[must_use]
pub fn merge<'a>(lists: impl IntoIterator<Item = &'a ResourceList>) -> ResourceList {
    let mut merged = ResourceList::new();
    for list in lists {
        merged.add(list);
    }
    merged
}

/// Subtract `rhs` from `lhs`, keeping every key of `lhs`.
#[must_use]
pub fn subtract(lhs: &ResourceList, rhs: &ResourceList) -> ResourceList {
    let mut result = lhs.clone();
    for (name, value) in &mut result.0 {
        *value = value.saturating_sub(rhs.milli_value(name));
    }
    result
}

/// Check that every requested quantity is within the allocatable quantity.
///
/// A resource missing from `allocatable` counts as zero.
#[must_use]
pub fn fits(requested: &ResourceList, allocatable: &ResourceList) -> bool {
    requested
        .iter()
        .all(|(name, value)| value <= allocatable.milli_value(name))
}

/// Total effective requests of a set of pods.
///
/// # Errors
///
/// Returns an error if a pod carries an unparsable quantity.
pub fn requests_for_pods<'a>(
    pods: impl IntoIterator<Item = &'a Pod>,
) -> Result<ResourceList, QuantityError> {
    let mut total = ResourceList::new();
    for pod in pods {
        total.add(&pod_requests(pod)?);
    }
    Ok(total)
}

/// Effective requests of one pod: the larger of the summed app containers and
/// any single init container, plus the pod overhead.
fn pod_requests(pod: &Pod) -> Result<ResourceList, QuantityError> {
    let Some(spec) = pod.spec.as_ref() else {
        return Ok(ResourceList::new());
    };

    let mut requests = ResourceList::new();
    for container in &spec.containers {
        requests.add(&container_requests(container)?);
    }
    for container in spec.init_containers.iter().flatten() {
        requests.max_with(&container_requests(container)?);
    }
    if let Some(overhead) = spec.overhead.as_ref() {
        requests.add(&ResourceList::from_quantities(overhead)?);
    }
    Ok(requests)
}

/// Container requests, with limits standing in for any request left unset.
fn container_requests(container: &Container) -> Result<ResourceList, QuantityError> {
    let Some(resources) = container.resources.as_ref() else {
        return Ok(ResourceList::new());
    };

    let mut requests = match resources.requests.as_ref() {
        Some(r) => ResourceList::from_quantities(r)?,
        None => ResourceList::new(),
    };
    if let Some(limits) = resources.limits.as_ref() {
        for (name, value) in ResourceList::from_quantities(limits)?.iter() {
            if !requests.0.contains_key(name) {
                requests.set_milli(name, value);
            }
        }
    }
    Ok(requests)
}

/// Parse a Kubernetes quantity string into milli-units, rounding up.
///
/// # Errors
///
/// Returns an error if the string is malformed or out of range.
pub fn parse_quantity(value: &str) -> Result<i64, QuantityError> {
    let invalid = || QuantityError::Invalid {
        value: value.to_string(),
    };
    let overflow = || QuantityError::Overflow {
        value: value.to_string(),
    };

    let trimmed = value.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    let (negative, digits) = match number.as_bytes().first() {
        Some(b'-') => (true, &number[1..]),
        Some(b'+') => (false, &number[1..]),
        _ => (false, number),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) || fraction.len() > 18 {
        return Err(invalid());
    }

    // numerator / 10^scale is the bare number
    let numerator: i128 = format!("{whole}{fraction}").parse().map_err(|_| overflow())?;
    let scale = 10_i128.pow(u32::try_from(fraction.len()).map_err(|_| invalid())?);

    // multiplier is expressed in milli-units
    let (mul_num, mul_den): (i128, i128) = match suffix {
        "" => (1000, 1),
        "m" => (1, 1),
        "k" => (1000 * 1000, 1),
        "M" => (1000 * 1000_i128.pow(2), 1),
        "G" => (1000 * 1000_i128.pow(3), 1),
        "T" => (1000 * 1000_i128.pow(4), 1),
        "P" => (1000 * 1000_i128.pow(5), 1),
        "E" => (1000 * 1000_i128.pow(6), 1),
        "Ki" => (1000 * KI, 1),
        "Mi" => (1000 * KI.pow(2), 1),
        "Gi" => (1000 * KI.pow(3), 1),
        "Ti" => (1000 * KI.pow(4), 1),
        "Pi" => (1000 * KI.pow(5), 1),
        "Ei" => (1000 * KI.pow(6), 1),
        _ => return Err(invalid()),
    };

    let product = numerator.checked_mul(mul_num).ok_or_else(overflow)?;
    let denominator = scale * mul_den;
    let milli = product.checked_add(denominator - 1).ok_or_else(overflow)? / denominator;
    let milli = if negative { -milli } else { milli };
    i64::try_from(milli).map_err(|_| overflow())
}

/// Render milli-units in the shortest exact Kubernetes form.
#[must_use]
pub fn format_quantity(milli: i64) -> String {
    if milli % 1000 != 0 {
        return format!("{milli}m");
    }
    let base = milli / 1000;
    if base != 0 {
        for (suffix, unit) in [("Ti", 1_i64 << 40), ("Gi", 1 << 30), ("Mi", 1 << 20), ("Ki", 1 << 10)] {
            if base % unit == 0 {
                return format!("{}{suffix}", base / unit);
            }
        }
    }
    base.to_string()
}
