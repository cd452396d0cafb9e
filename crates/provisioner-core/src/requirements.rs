//! Label requirement algebra.
//!
//! A [`Requirement`] is the set of values a single label key may take. It is
//! stored either as an explicit set (`In`, `DoesNotExist`) or as the
//! complement of one (`NotIn`, `Exists`), optionally narrowed by integer
//! bounds (`Gt`, `Lt`). [`Requirements`] is the conjunction of requirements
//! over distinct keys.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::{NodeSelectorRequirement, Pod};
use serde::{Deserialize, Serialize};

use crate::error::RequirementsError;
use crate::labels;

/// Label selector operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Value is one of the listed values.
    In,
    /// Value is none of the listed values, or the label is absent.
    NotIn,
    /// The label is present with any value.
    Exists,
    /// The label is absent.
    DoesNotExist,
    /// Value is an integer greater than the bound.
    Gt,
    /// Value is an integer less than the bound.
    Lt,
}

impl Operator {
    /// The Kubernetes spelling of the operator.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::In => "In",
            Self::NotIn => "NotIn",
            Self::Exists => "Exists",
            Self::DoesNotExist => "DoesNotExist",
            Self::Gt => "Gt",
            Self::Lt => "Lt",
        }
    }

    /// `NotIn` and `DoesNotExist` tolerate an empty intersection.
    const fn is_negative(self) -> bool {
        matches!(self, Self::NotIn | Self::DoesNotExist)
    }
}

impl FromStr for Operator {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "In" => Ok(Self::In),
            "NotIn" => Ok(Self::NotIn),
            "Exists" => Ok(Self::Exists),
            "DoesNotExist" => Ok(Self::DoesNotExist),
            "Gt" => Ok(Self::Gt),
            "Lt" => Ok(Self::Lt),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The allowed values of a single label key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    key: String,
    complement: bool,
    values: BTreeSet<String>,
    greater_than: Option<i64>,
    less_than: Option<i64>,
}

impl Requirement {
    /// Build a requirement from an operator and its values.
    ///
    /// # Errors
    ///
    /// Returns an error if a `Gt`/`Lt` requirement does not carry exactly one
    /// integer value.
    pub fn new<I, S>(key: impl Into<String>, operator: Operator, values: I) -> Result<Self, RequirementsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let key = key.into();
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        let mut requirement = Self {
            key,
            complement: true,
            values: BTreeSet::new(),
            greater_than: None,
            less_than: None,
        };
        match operator {
            Operator::In => {
                requirement.complement = false;
                requirement.values = values.into_iter().collect();
            }
            Operator::NotIn => requirement.values = values.into_iter().collect(),
            Operator::Exists => {}
            Operator::DoesNotExist => requirement.complement = false,
            Operator::Gt | Operator::Lt => {
                let bound = match values.as_slice() {
                    [value] => value.parse::<i64>().ok(),
                    _ => None,
                }
                .ok_or_else(|| RequirementsError::InvalidBound {
                    key: requirement.key.clone(),
                    value: values.join(","),
                })?;
                if operator == Operator::Gt {
                    requirement.greater_than = Some(bound);
                } else {
                    requirement.less_than = Some(bound);
                }
            }
        }
        Ok(requirement)
    }

    /// `key In [values]`.
    pub fn in_values<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            complement: false,
            values: values.into_iter().map(Into::into).collect(),
            greater_than: None,
            less_than: None,
        }
    }

    /// `key NotIn [values]`.
    pub fn not_in<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            complement: true,
            ..Self::in_values(key, values)
        }
    }

    /// `key Exists`.
    pub fn exists(key: impl Into<String>) -> Self {
        Self::not_in(key, std::iter::empty::<String>())
    }

    /// `key DoesNotExist`.
    pub fn does_not_exist(key: impl Into<String>) -> Self {
        Self::in_values(key, std::iter::empty::<String>())
    }

    /// The label key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The operator this requirement is equivalent to.
    #[must_use]
    pub fn operator(&self) -> Operator {
        if self.complement {
            if !self.values.is_empty() {
                Operator::NotIn
            } else if self.greater_than.is_some() {
                Operator::Gt
            } else if self.less_than.is_some() {
                Operator::Lt
            } else {
                Operator::Exists
            }
        } else if self.values.is_empty() {
            Operator::DoesNotExist
        } else {
            Operator::In
        }
    }

    /// Check if `value` satisfies this requirement.
    #[must_use]
    pub fn has(&self, value: &str) -> bool {
        let listed = self.values.contains(value);
        (listed != self.complement) && self.within_bounds(value)
    }

    /// Insert values into the set (`In` grows, `NotIn` shrinks).
    pub fn insert<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            let value = value.into();
            if self.complement {
                self.values.remove(&value);
            } else {
                self.values.insert(value);
            }
        }
    }

    /// The values satisfying both requirements.
    #[must_use]
    pub fn intersection(&self, other: &Requirement) -> Requirement {
        let greater_than = max_option(self.greater_than, other.greater_than);
        let less_than = min_option(self.less_than, other.less_than);

        let (complement, values) = match (self.complement, other.complement) {
            (true, true) => (true, self.values.union(&other.values).cloned().collect()),
            (true, false) => (false, other.values.difference(&self.values).cloned().collect()),
            (false, true) => (false, self.values.difference(&other.values).cloned().collect()),
            (false, false) => (false, self.values.intersection(&other.values).cloned().collect()),
        };

        let mut result = Requirement {
            key: self.key.clone(),
            complement,
            values,
            greater_than,
            less_than,
        };
        if let (Some(gt), Some(lt)) = (greater_than, less_than) {
            if gt.saturating_add(1) >= lt {
                return Requirement::does_not_exist(self.key.clone());
            }
        }
        if !result.complement {
            let bounded: BTreeSet<String> = result
                .values
                .iter()
                .filter(|v| result.within_bounds(v))
                .cloned()
                .collect();
            result.values = bounded;
            result.greater_than = None;
            result.less_than = None;
        }
        result
    }

    /// Number of allowed values; `usize::MAX` for a complement.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.complement {
            usize::MAX
        } else {
            self.values.len()
        }
    }

    /// Check if no value is allowed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The listed values (allowed for `In`, excluded for `NotIn`).
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    /// An arbitrary allowed value, if the set is explicit and non-empty.
    #[must_use]
    pub fn any(&self) -> Option<&str> {
        if self.complement {
            None
        } else {
            self.values.iter().next().map(String::as_str)
        }
    }

    /// Render as Kubernetes node selector requirements.
    ///
    /// Bounds are emitted as separate `Gt`/`Lt` entries; they intersect back
    /// into one requirement when parsed.
    #[must_use]
    pub fn to_node_selector_requirements(&self) -> Vec<NodeSelectorRequirement> {
        let mut out = Vec::new();
        let bounded = self.greater_than.is_some() || self.less_than.is_some();
        if !(self.complement && self.values.is_empty() && bounded) {
            let operator = if self.complement {
                if self.values.is_empty() { Operator::Exists } else { Operator::NotIn }
            } else if self.values.is_empty() {
                Operator::DoesNotExist
            } else {
                Operator::In
            };
            out.push(NodeSelectorRequirement {
                key: self.key.clone(),
                operator: operator.as_str().to_string(),
                values: (!self.values.is_empty()).then(|| self.values.iter().cloned().collect()),
            });
        }
        for (operator, bound) in [(Operator::Gt, self.greater_than), (Operator::Lt, self.less_than)] {
            if let Some(bound) = bound {
                out.push(NodeSelectorRequirement {
                    key: self.key.clone(),
                    operator: operator.as_str().to_string(),
                    values: Some(vec![bound.to_string()]),
                });
            }
        }
        out
    }

    fn within_bounds(&self, value: &str) -> bool {
        if self.greater_than.is_none() && self.less_than.is_none() {
            return true;
        }
        let Ok(n) = value.parse::<i64>() else {
            return false;
        };
        self.greater_than.map_or(true, |gt| n > gt) && self.less_than.map_or(true, |lt| n < lt)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operator = self.operator();
        match operator {
            Operator::Exists | Operator::DoesNotExist => write!(f, "{} {operator}", self.key),
            Operator::Gt => write!(f, "{} Gt {}", self.key, self.greater_than.unwrap_or_default()),
            Operator::Lt => write!(f, "{} Lt {}", self.key, self.less_than.unwrap_or_default()),
            Operator::In | Operator::NotIn => {
                let values: Vec<&str> = self.values().collect();
                write!(f, "{} {operator} [{}]", self.key, values.join(" "))
            }
        }
    }
}

fn max_option(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn min_option(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// A conjunction of requirements keyed by label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<NodeSelectorRequirement>",
    into = "Vec<NodeSelectorRequirement>"
)]
pub struct Requirements(BTreeMap<String, Requirement>);

impl Requirements {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// One `In` requirement per label.
    #[must_use]
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        labels
            .iter()
            .map(|(k, v)| Requirement::in_values(k.clone(), [v.clone()]))
            .collect()
    }

    /// Parse Kubernetes node selector requirements.
    ///
    /// # Errors
    ///
    /// Returns an error on an unknown operator or a malformed bound.
    pub fn from_node_selector_requirements(
        requirements: &[NodeSelectorRequirement],
    ) -> Result<Self, RequirementsError> {
        let mut result = Self::new();
        for r in requirements {
            let operator: Operator =
                r.operator
                    .parse()
                    .map_err(|()| RequirementsError::UnsupportedOperator {
                        key: r.key.clone(),
                        operator: r.operator.clone(),
                    })?;
            result.add_requirement(Requirement::new(
                r.key.clone(),
                operator,
                r.values.iter().flatten().cloned(),
            )?);
        }
        Ok(result)
    }

    /// Requirements a pod places on its node.
    ///
    /// The node selector, the heaviest preferred node affinity term and the
    /// first required node selector term are combined.
    ///
    /// # Errors
    ///
    /// Returns an error if the affinity uses an unknown operator.
    pub fn from_pod(pod: &Pod) -> Result<Self, RequirementsError> {
        let Some(spec) = pod.spec.as_ref() else {
            return Ok(Self::new());
        };
        let mut requirements = spec
            .node_selector
            .as_ref()
            .map(Self::from_labels)
            .unwrap_or_default();

        let Some(node_affinity) = spec.affinity.as_ref().and_then(|a| a.node_affinity.as_ref()) else {
            return Ok(requirements);
        };

        // first of the heaviest, matching a stable sort by descending weight
        let heaviest = node_affinity
            .preferred_during_scheduling_ignored_during_execution
            .iter()
            .flatten()
            .rev()
            .max_by_key(|term| term.weight);
        if let Some(term) = heaviest {
            let expressions = term.preference.match_expressions.as_deref().unwrap_or_default();
            requirements.add(Self::from_node_selector_requirements(expressions)?);
        }

        let first_required = node_affinity
            .required_during_scheduling_ignored_during_execution
            .as_ref()
            .and_then(|selector| selector.node_selector_terms.first());
        if let Some(term) = first_required {
            let expressions = term.match_expressions.as_deref().unwrap_or_default();
            requirements.add(Self::from_node_selector_requirements(expressions)?);
        }
        Ok(requirements)
    }

    /// Merge another set into this one, intersecting shared keys.
    pub fn add(&mut self, other: Requirements) {
        for requirement in other.0.into_values() {
            self.add_requirement(requirement);
        }
    }

    /// Merge a single requirement, intersecting with any existing one.
    pub fn add_requirement(&mut self, requirement: Requirement) {
        match self.0.get_mut(&requirement.key) {
            Some(existing) => *existing = existing.intersection(&requirement),
            None => {
                self.0.insert(requirement.key.clone(), requirement);
            }
        }
    }

    /// Check if a key is constrained.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// The requirement on a key; `Exists` when unconstrained.
    #[must_use]
    pub fn get(&self, key: &str) -> Requirement {
        self.0
            .get(key)
            .cloned()
            .unwrap_or_else(|| Requirement::exists(key))
    }

    /// Remove the requirement on a key.
    pub fn remove(&mut self, key: &str) -> Option<Requirement> {
        self.0.remove(key)
    }

    /// The constrained keys, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// The requirements, in key order.
    pub fn values(&self) -> impl Iterator<Item = &Requirement> {
        self.0.values()
    }

    /// Number of constrained keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if no key is constrained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check that a pod's (or topology's) requirements can be satisfied here.
    ///
    /// Custom labels required by `incoming` must be defined on `self`, unless
    /// `incoming` only excludes values. Well-known labels may be undefined.
    ///
    /// # Errors
    ///
    /// Returns the first conflict found.
    pub fn compatible(&self, incoming: &Requirements) -> Result<(), RequirementsError> {
        for (key, requirement) in &incoming.0 {
            if labels::is_well_known(key) || self.has(key) || requirement.operator().is_negative() {
                continue;
            }
            return Err(RequirementsError::UndefinedLabel { key: key.clone() });
        }
        self.intersects(incoming)
    }

    /// Check that every shared key has a value satisfying both sides.
    ///
    /// # Errors
    ///
    /// Returns the first conflicting key.
    pub fn intersects(&self, incoming: &Requirements) -> Result<(), RequirementsError> {
        for (key, existing) in &self.0 {
            let Some(requirement) = incoming.0.get(key) else {
                continue;
            };
            if !existing.intersection(requirement).is_empty() {
                continue;
            }
            if requirement.operator().is_negative() && existing.operator().is_negative() {
                continue;
            }
            return Err(RequirementsError::Incompatible {
                key: key.clone(),
                incoming: requirement.to_string(),
                existing: existing.to_string(),
            });
        }
        Ok(())
    }
}

impl FromIterator<Requirement> for Requirements {
    fn from_iter<T: IntoIterator<Item = Requirement>>(iter: T) -> Self {
        let mut requirements = Self::new();
        for requirement in iter {
            requirements.add_requirement(requirement);
        }
        requirements
    }
}

impl TryFrom<Vec<NodeSelectorRequirement>> for Requirements {
    type Error = RequirementsError;

    fn try_from(value: Vec<NodeSelectorRequirement>) -> Result<Self, Self::Error> {
        Self::from_node_selector_requirements(&value)
    }
}

impl From<Requirements> for Vec<NodeSelectorRequirement> {
    fn from(requirements: Requirements) -> Self {
        requirements
            .values()
            .flat_map(Requirement::to_node_selector_requirements)
            .collect()
    }
}

impl fmt::Display for Requirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, requirement) in self.0.values().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{requirement}")?;
        }
        Ok(())
    }
}
