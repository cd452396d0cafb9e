//! Zone × capacity type availability of an instance type.

use serde::{Deserialize, Serialize};

/// One way an instance type can be obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    /// Availability zone.
    pub zone: String,
    /// Capacity type, e.g. `spot` or `on-demand`.
    pub capacity_type: String,
    /// Hourly price.
    #[serde(default)]
    pub price: f64,
    /// Whether the offering can currently be launched.
    #[serde(default = "Offering::default_available")]
    pub available: bool,
}

impl Offering {
    const fn default_available() -> bool {
        true
    }

    /// An available offering at the given price.
    #[must_use]
    pub fn new(zone: impl Into<String>, capacity_type: impl Into<String>, price: f64) -> Self {
        Self {
            zone: zone.into(),
            capacity_type: capacity_type.into(),
            price,
            available: true,
        }
    }

    /// Mark the offering unavailable, e.g. after an insufficient capacity error.
    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }
}

/// The offerings of an instance type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Offerings(Vec<Offering>);

impl Offerings {
    /// Wrap a list of offerings.
    #[must_use]
    pub fn new(offerings: Vec<Offering>) -> Self {
        Self(offerings)
    }

    /// Offerings that can currently be launched.
    pub fn available(&self) -> impl Iterator<Item = &Offering> {
        self.0.iter().filter(|o| o.available)
    }

    /// The cheapest available offering.
    #[must_use]
    pub fn cheapest(&self) -> Option<&Offering> {
        self.available().min_by(|a, b| a.price.total_cmp(&b.price))
    }

    /// All offerings, available or not.
    #[must_use]
    pub fn as_slice(&self) -> &[Offering] {
        &self.0
    }

    /// Check if there are no offerings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Offering>> for Offerings {
    fn from(offerings: Vec<Offering>) -> Self {
        Self(offerings)
    }
}
