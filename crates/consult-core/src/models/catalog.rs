//! Price catalog models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a catalog entry prices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKind {
    /// A drug, keyed by stock item id
    Drug,
    /// A lab test, keyed by test code
    LabTest,
}

impl CatalogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::Drug => "drug",
            CatalogKind::LabTest => "lab_test",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "drug" => Some(CatalogKind::Drug),
            "lab_test" => Some(CatalogKind::LabTest),
            _ => None,
        }
    }
}

/// Current unit price of a drug or lab test.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogPrice {
    pub kind: CatalogKind,
    /// Stock item id for drugs, test code for lab tests
    pub code: String,
    /// Description printed on billing items
    pub name: String,
    /// Unit price in minor currency units
    pub unit_price_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl CatalogPrice {
    pub fn new(kind: CatalogKind, code: String, name: String, unit_price_cents: i64) -> Self {
        Self {
            kind,
            code,
            name,
            unit_price_cents,
            updated_at: Utc::now(),
        }
    }

    /// Price for `quantity` units.
    pub fn total_for(&self, quantity: i64) -> i64 {
        self.unit_price_cents.saturating_mul(quantity)
    }
}
