//! Records emitted at consultation completion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::CatalogPrice;
use super::orders::{LabOrder, Prescription};

/// Permanent record that reserved stock was given to the patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Dispensation {
    pub id: String,
    pub prescription_id: String,
    pub encounter_id: String,
    pub item_id: String,
    pub quantity_dispensed: i64,
    pub dispensed_at: DateTime<Utc>,
}

impl Dispensation {
    pub fn for_prescription(prescription: &Prescription, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prescription_id: prescription.id.clone(),
            encounter_id: prescription.encounter_id.clone(),
            item_id: prescription.item_id.clone(),
            quantity_dispensed: prescription.quantity,
            dispensed_at: now,
        }
    }
}

/// Which order produced a billing item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingSource {
    Prescription,
    LabOrder,
}

impl BillingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingSource::Prescription => "prescription",
            BillingSource::LabOrder => "lab_order",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prescription" => Some(BillingSource::Prescription),
            "lab_order" => Some(BillingSource::LabOrder),
            _ => None,
        }
    }
}

/// A chargeable line handed to the billing service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BillingItem {
    pub id: String,
    pub encounter_id: String,
    pub patient_id: String,
    pub source: BillingSource,
    /// Prescription or lab order id
    pub source_id: String,
    /// Catalog code the price was read from
    pub code: String,
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
    pub emitted_at: DateTime<Utc>,
}

impl BillingItem {
    /// Price a prescription at the catalog's current rate.
    pub fn for_prescription(
        prescription: &Prescription,
        patient_id: &str,
        price: &CatalogPrice,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            encounter_id: prescription.encounter_id.clone(),
            patient_id: patient_id.to_string(),
            source: BillingSource::Prescription,
            source_id: prescription.id.clone(),
            code: price.code.clone(),
            description: price.name.clone(),
            quantity: prescription.quantity,
            unit_price_cents: price.unit_price_cents,
            total_cents: price.total_for(prescription.quantity),
            emitted_at: now,
        }
    }

    /// Price a lab order; one test per order.
    pub fn for_lab_order(
        order: &LabOrder,
        patient_id: &str,
        price: &CatalogPrice,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            encounter_id: order.encounter_id.clone(),
            patient_id: patient_id.to_string(),
            source: BillingSource::LabOrder,
            source_id: order.id.clone(),
            code: price.code.clone(),
            description: price.name.clone(),
            quantity: 1,
            unit_price_cents: price.unit_price_cents,
            total_cents: price.total_for(1),
            emitted_at: now,
        }
    }
}
