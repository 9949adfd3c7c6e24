//! Prescription and lab order database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{from_db_time, from_db_time_opt, to_db_time, Database, DbError, DbResult};
use crate::models::{
    LabOrder, LabOrderStatus, LabPriority, Prescription, PrescriptionStatus,
};

const PRESCRIPTION_COLUMNS: &str = "id, encounter_id, item_id, quantity, instructions, \
                                    instant_dispensing, stock_reserved, stock_reserved_at, \
                                    status, created_at";
const LAB_ORDER_COLUMNS: &str =
    "id, encounter_id, test_code, priority, clinical_notes, status, created_at, submitted_at";

impl Database {
    // ========================================================================
    // Prescriptions
    // ========================================================================

    /// Insert a new prescription.
    pub fn insert_prescription(&self, prescription: &Prescription) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO prescriptions (
                id, encounter_id, item_id, quantity, instructions, instant_dispensing,
                stock_reserved, stock_reserved_at, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                prescription.id,
                prescription.encounter_id,
                prescription.item_id,
                prescription.quantity,
                prescription.instructions,
                prescription.instant_dispensing,
                prescription.stock_reserved,
                prescription.stock_reserved_at.as_ref().map(to_db_time),
                prescription.status.as_str(),
                to_db_time(&prescription.created_at),
            ],
        )?;
        Ok(())
    }

    /// Get a prescription by ID.
    pub fn get_prescription(&self, id: &str) -> DbResult<Option<Prescription>> {
        let sql = format!("SELECT {} FROM prescriptions WHERE id = ?", PRESCRIPTION_COLUMNS);
        self.conn
            .query_row(&sql, [id], PrescriptionRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Prescriptions of an encounter in creation order.
    pub fn list_prescriptions(&self, encounter_id: &str) -> DbResult<Vec<Prescription>> {
        let sql = format!(
            "SELECT {} FROM prescriptions WHERE encounter_id = ? ORDER BY created_at, id",
            PRESCRIPTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([encounter_id], PrescriptionRow::from_row)?;

        let mut prescriptions = Vec::new();
        for row in rows {
            prescriptions.push(row?.try_into()?);
        }
        Ok(prescriptions)
    }

    /// Pending prescriptions currently holding stock, oldest reservation first.
    pub fn list_reserved_prescriptions(&self) -> DbResult<Vec<Prescription>> {
        let sql = format!(
            "SELECT {} FROM prescriptions WHERE stock_reserved = 1 AND status = 'pending' \
             ORDER BY stock_reserved_at",
            PRESCRIPTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], PrescriptionRow::from_row)?;

        let mut prescriptions = Vec::new();
        for row in rows {
            prescriptions.push(row?.try_into()?);
        }
        Ok(prescriptions)
    }

    /// Delete a prescription.
    pub fn delete_prescription(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM prescriptions WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Clear the reservation flag. Returns false if it was not set.
    pub fn mark_prescription_released(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE prescriptions SET stock_reserved = 0, stock_reserved_at = NULL
            WHERE id = ? AND stock_reserved = 1
            "#,
            [id],
        )?;
        Ok(rows_affected > 0)
    }

    /// Mark a pending prescription dispensed.
    pub fn mark_prescription_dispensed(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE prescriptions SET status = ?2 WHERE id = ?1 AND status = ?3",
            params![
                id,
                PrescriptionStatus::Dispensed.as_str(),
                PrescriptionStatus::Pending.as_str(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    // ========================================================================
    // Lab Orders
    // ========================================================================

    /// Insert a new lab order.
    pub fn insert_lab_order(&self, order: &LabOrder) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO lab_orders (
                id, encounter_id, test_code, priority, clinical_notes, status, created_at, submitted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                order.id,
                order.encounter_id,
                order.test_code,
                order.priority.as_str(),
                order.clinical_notes,
                order.status.as_str(),
                to_db_time(&order.created_at),
                order.submitted_at.as_ref().map(to_db_time),
            ],
        )?;
        Ok(())
    }

    /// Get a lab order by ID.
    pub fn get_lab_order(&self, id: &str) -> DbResult<Option<LabOrder>> {
        let sql = format!("SELECT {} FROM lab_orders WHERE id = ?", LAB_ORDER_COLUMNS);
        self.conn
            .query_row(&sql, [id], LabOrderRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Lab orders of an encounter in creation order.
    pub fn list_lab_orders(&self, encounter_id: &str) -> DbResult<Vec<LabOrder>> {
        let sql = format!(
            "SELECT {} FROM lab_orders WHERE encounter_id = ? ORDER BY created_at, id",
            LAB_ORDER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([encounter_id], LabOrderRow::from_row)?;

        let mut orders = Vec::new();
        for row in rows {
            orders.push(row?.try_into()?);
        }
        Ok(orders)
    }

    /// Delete a lab order.
    pub fn delete_lab_order(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute("DELETE FROM lab_orders WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Submit every pending lab order of an encounter. Returns how many moved.
    pub fn submit_lab_orders(&self, encounter_id: &str, at: DateTime<Utc>) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE lab_orders SET status = ?2, submitted_at = ?3
            WHERE encounter_id = ?1 AND status = ?4
            "#,
            params![
                encounter_id,
                LabOrderStatus::Submitted.as_str(),
                to_db_time(&at),
                LabOrderStatus::Pending.as_str(),
            ],
        )?;
        Ok(rows_affected)
    }
}

/// Intermediate row struct for database mapping.
struct PrescriptionRow {
    id: String,
    encounter_id: String,
    item_id: String,
    quantity: i64,
    instructions: Option<String>,
    instant_dispensing: bool,
    stock_reserved: bool,
    stock_reserved_at: Option<String>,
    status: String,
    created_at: String,
}

impl PrescriptionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            encounter_id: row.get(1)?,
            item_id: row.get(2)?,
            quantity: row.get(3)?,
            instructions: row.get(4)?,
            instant_dispensing: row.get(5)?,
            stock_reserved: row.get(6)?,
            stock_reserved_at: row.get(7)?,
            status: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

impl TryFrom<PrescriptionRow> for Prescription {
    type Error = DbError;

    fn try_from(row: PrescriptionRow) -> Result<Self, Self::Error> {
        let status = PrescriptionStatus::parse(&row.status).ok_or_else(|| {
            DbError::Constraint(format!("Unknown prescription status: {}", row.status))
        })?;
        Ok(Prescription {
            id: row.id,
            encounter_id: row.encounter_id,
            item_id: row.item_id,
            quantity: row.quantity,
            instructions: row.instructions,
            instant_dispensing: row.instant_dispensing,
            stock_reserved: row.stock_reserved,
            stock_reserved_at: from_db_time_opt(row.stock_reserved_at)?,
            status,
            created_at: from_db_time(&row.created_at)?,
        })
    }
}

struct LabOrderRow {
    id: String,
    encounter_id: String,
    test_code: String,
    priority: String,
    clinical_notes: Option<String>,
    status: String,
    created_at: String,
    submitted_at: Option<String>,
}

impl LabOrderRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            encounter_id: row.get(1)?,
            test_code: row.get(2)?,
            priority: row.get(3)?,
            clinical_notes: row.get(4)?,
            status: row.get(5)?,
            created_at: row.get(6)?,
            submitted_at: row.get(7)?,
        })
    }
}

impl TryFrom<LabOrderRow> for LabOrder {
    type Error = DbError;

    fn try_from(row: LabOrderRow) -> Result<Self, Self::Error> {
        let priority = LabPriority::parse(&row.priority)
            .ok_or_else(|| DbError::Constraint(format!("Unknown lab priority: {}", row.priority)))?;
        let status = LabOrderStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown lab order status: {}", row.status)))?;
        Ok(LabOrder {
            id: row.id,
            encounter_id: row.encounter_id,
            test_code: row.test_code,
            priority,
            clinical_notes: row.clinical_notes,
            status,
            created_at: from_db_time(&row.created_at)?,
            submitted_at: from_db_time_opt(row.submitted_at)?,
        })
    }
}
