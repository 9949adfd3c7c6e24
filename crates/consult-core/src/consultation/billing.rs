//! Catalog pricing and billing item emission at completion.

use chrono::{DateTime, Utc};

use crate::db::Database;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{BillingItem, CatalogKind, CatalogPrice, Encounter, LabOrder, Prescription};

/// Current unit prices for drugs and lab tests.
pub struct PriceCatalog<'a> {
    db: &'a Database,
}

impl<'a> PriceCatalog<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Set the current price for a code.
    pub fn set_price(&self, price: &CatalogPrice) -> ClinicResult<()> {
        if price.code.trim().is_empty() {
            return Err(ClinicError::Validation("Catalog code cannot be empty".into()));
        }
        if price.unit_price_cents < 0 {
            return Err(ClinicError::Validation(format!(
                "Price for {} cannot be negative",
                price.code
            )));
        }
        self.db.upsert_catalog_price(price)?;
        tracing::debug!(
            kind = price.kind.as_str(),
            code = %price.code,
            unit_price_cents = price.unit_price_cents,
            "catalog price set"
        );
        Ok(())
    }

    /// Price in force right now. Never cached.
    pub fn current_price(&self, kind: CatalogKind, code: &str) -> ClinicResult<CatalogPrice> {
        self.db.get_catalog_price(kind, code)?.ok_or_else(|| {
            let entity = match kind {
                CatalogKind::Drug => "drug price",
                CatalogKind::LabTest => "lab test price",
            };
            ClinicError::not_found(entity, code)
        })
    }
}

/// Write one billing item per prescription and per lab order.
///
/// Runs inside the completion transaction; a missing price aborts it.
pub(crate) fn emit_billing(
    db: &Database,
    encounter: &Encounter,
    prescriptions: &[Prescription],
    lab_orders: &[LabOrder],
    now: DateTime<Utc>,
) -> ClinicResult<Vec<BillingItem>> {
    let catalog = PriceCatalog::new(db);
    let mut items = Vec::with_capacity(prescriptions.len() + lab_orders.len());

    for prescription in prescriptions {
        let price = catalog.current_price(CatalogKind::Drug, &prescription.item_id)?;
        let item = BillingItem::for_prescription(prescription, &encounter.patient_id, &price, now);
        db.insert_billing_item(&item)?;
        items.push(item);
    }

    for order in lab_orders {
        let price = catalog.current_price(CatalogKind::LabTest, &order.test_code)?;
        let item = BillingItem::for_lab_order(order, &encounter.patient_id, &price, now);
        db.insert_billing_item(&item)?;
        items.push(item);
    }

    Ok(items)
}
