//! Catalog price, dispensation and billing item database operations.

use rusqlite::{params, OptionalExtension};

use super::{from_db_time, to_db_time, Database, DbError, DbResult};
use crate::models::{BillingItem, BillingSource, CatalogKind, CatalogPrice, Dispensation};

impl Database {
    // ========================================================================
    // Catalog
    // ========================================================================

    /// Insert or replace a catalog price.
    pub fn upsert_catalog_price(&self, price: &CatalogPrice) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO catalog_prices (kind, code, name, unit_price_cents, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(kind, code) DO UPDATE SET
                name = excluded.name,
                unit_price_cents = excluded.unit_price_cents,
                updated_at = excluded.updated_at
            "#,
            params![
                price.kind.as_str(),
                price.code,
                price.name,
                price.unit_price_cents,
                to_db_time(&price.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Current price for a drug or lab test code.
    pub fn get_catalog_price(&self, kind: CatalogKind, code: &str) -> DbResult<Option<CatalogPrice>> {
        self.conn
            .query_row(
                r#"
                SELECT kind, code, name, unit_price_cents, updated_at
                FROM catalog_prices
                WHERE kind = ?1 AND code = ?2
                "#,
                params![kind.as_str(), code],
                |row| {
                    Ok(PriceRow {
                        kind: row.get(0)?,
                        code: row.get(1)?,
                        name: row.get(2)?,
                        unit_price_cents: row.get(3)?,
                        updated_at: row.get(4)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    // ========================================================================
    // Dispensations
    // ========================================================================

    /// Record a dispensation.
    pub fn insert_dispensation(&self, dispensation: &Dispensation) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO dispensations (
                id, prescription_id, encounter_id, item_id, quantity_dispensed, dispensed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                dispensation.id,
                dispensation.prescription_id,
                dispensation.encounter_id,
                dispensation.item_id,
                dispensation.quantity_dispensed,
                to_db_time(&dispensation.dispensed_at),
            ],
        )?;
        Ok(())
    }

    /// Dispensations recorded for an encounter.
    pub fn list_dispensations(&self, encounter_id: &str) -> DbResult<Vec<Dispensation>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, prescription_id, encounter_id, item_id, quantity_dispensed, dispensed_at
            FROM dispensations
            WHERE encounter_id = ?
            ORDER BY dispensed_at, id
            "#,
        )?;
        let rows = stmt.query_map([encounter_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut dispensations = Vec::new();
        for row in rows {
            let (id, prescription_id, encounter_id, item_id, quantity_dispensed, dispensed_at) = row?;
            dispensations.push(Dispensation {
                id,
                prescription_id,
                encounter_id,
                item_id,
                quantity_dispensed,
                dispensed_at: from_db_time(&dispensed_at)?,
            });
        }
        Ok(dispensations)
    }

    // ========================================================================
    // Billing
    // ========================================================================

    /// Record a billing item.
    pub fn insert_billing_item(&self, item: &BillingItem) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO billing_items (
                id, encounter_id, patient_id, source, source_id, code, description,
                quantity, unit_price_cents, total_cents, emitted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                item.id,
                item.encounter_id,
                item.patient_id,
                item.source.as_str(),
                item.source_id,
                item.code,
                item.description,
                item.quantity,
                item.unit_price_cents,
                item.total_cents,
                to_db_time(&item.emitted_at),
            ],
        )?;
        Ok(())
    }

    /// Billing items emitted for an encounter.
    pub fn list_billing_items(&self, encounter_id: &str) -> DbResult<Vec<BillingItem>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, encounter_id, patient_id, source, source_id, code, description,
                   quantity, unit_price_cents, total_cents, emitted_at
            FROM billing_items
            WHERE encounter_id = ?
            ORDER BY emitted_at, source, code
            "#,
        )?;
        let rows = stmt.query_map([encounter_id], |row| {
            Ok(BillingRow {
                id: row.get(0)?,
                encounter_id: row.get(1)?,
                patient_id: row.get(2)?,
                source: row.get(3)?,
                source_id: row.get(4)?,
                code: row.get(5)?,
                description: row.get(6)?,
                quantity: row.get(7)?,
                unit_price_cents: row.get(8)?,
                total_cents: row.get(9)?,
                emitted_at: row.get(10)?,
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }
}

/// Intermediate row struct for database mapping.
struct PriceRow {
    kind: String,
    code: String,
    name: String,
    unit_price_cents: i64,
    updated_at: String,
}

impl TryFrom<PriceRow> for CatalogPrice {
    type Error = DbError;

    fn try_from(row: PriceRow) -> Result<Self, Self::Error> {
        let kind = CatalogKind::parse(&row.kind)
            .ok_or_else(|| DbError::Constraint(format!("Unknown catalog kind: {}", row.kind)))?;
        Ok(CatalogPrice {
            kind,
            code: row.code,
            name: row.name,
            unit_price_cents: row.unit_price_cents,
            updated_at: from_db_time(&row.updated_at)?,
        })
    }
}

struct BillingRow {
    id: String,
    encounter_id: String,
    patient_id: String,
    source: String,
    source_id: String,
    code: String,
    description: String,
    quantity: i64,
    unit_price_cents: i64,
    total_cents: i64,
    emitted_at: String,
}

impl TryFrom<BillingRow> for BillingItem {
    type Error = DbError;

    fn try_from(row: BillingRow) -> Result<Self, Self::Error> {
        let source = BillingSource::parse(&row.source)
            .ok_or_else(|| DbError::Constraint(format!("Unknown billing source: {}", row.source)))?;
        Ok(BillingItem {
            id: row.id,
            encounter_id: row.encounter_id,
            patient_id: row.patient_id,
            source,
            source_id: row.source_id,
            code: row.code,
            description: row.description,
            quantity: row.quantity,
            unit_price_cents: row.unit_price_cents,
            total_cents: row.total_cents,
            emitted_at: from_db_time(&row.emitted_at)?,
        })
    }
}
