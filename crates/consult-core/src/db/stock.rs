//! Stock item and stock movement database operations.

use rusqlite::{params, OptionalExtension};

use super::{from_db_time, to_db_time, Database, DbError, DbResult};
use crate::models::{MovementType, StockItem, StockMovement};

const ITEM_COLUMNS: &str = "id, name, stock_quantity, reorder_level, opening_quantity, created_at";
const MOVEMENT_COLUMNS: &str = "seq, id, item_id, movement_type, quantity, prescription_id, \
                                encounter_id, created_at, prev_hash, entry_hash";

impl Database {
    /// Insert a new stock item.
    pub fn insert_stock_item(&self, item: &StockItem) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO stock_items (id, name, stock_quantity, reorder_level, opening_quantity, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                item.id,
                item.name,
                item.stock_quantity,
                item.reorder_level,
                item.opening_quantity,
                to_db_time(&item.created_at),
            ],
        )?;
        Ok(())
    }

    /// Get a stock item by ID.
    pub fn get_stock_item(&self, id: &str) -> DbResult<Option<StockItem>> {
        let sql = format!("SELECT {} FROM stock_items WHERE id = ?", ITEM_COLUMNS);
        self.conn
            .query_row(&sql, [id], ItemRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all stock items by name.
    pub fn list_stock_items(&self) -> DbResult<Vec<StockItem>> {
        let sql = format!("SELECT {} FROM stock_items ORDER BY name", ITEM_COLUMNS);
        self.query_items(&sql)
    }

    /// Items whose quantity is at or below their reorder level.
    pub fn items_below_reorder_level(&self) -> DbResult<Vec<StockItem>> {
        let sql = format!(
            "SELECT {} FROM stock_items WHERE stock_quantity <= reorder_level ORDER BY name",
            ITEM_COLUMNS
        );
        self.query_items(&sql)
    }

    fn query_items(&self, sql: &str) -> DbResult<Vec<StockItem>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], ItemRow::from_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }

    /// Subtract `quantity` from the item if enough is on the shelf.
    ///
    /// The availability check and the write are one statement, so two
    /// connections can never both succeed against the same last units.
    /// Returns false when stock was insufficient or the item is unknown.
    pub fn decrement_stock(&self, item_id: &str, quantity: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE stock_items SET stock_quantity = stock_quantity - ?2
            WHERE id = ?1 AND stock_quantity >= ?2
            "#,
            params![item_id, quantity],
        )?;
        Ok(rows_affected > 0)
    }

    /// Return `quantity` units to the shelf.
    pub fn increment_stock(&self, item_id: &str, quantity: i64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE stock_items SET stock_quantity = stock_quantity + ?2 WHERE id = ?1",
            params![item_id, quantity],
        )?;
        Ok(rows_affected > 0)
    }

    /// Append a movement to the audit trail. Returns the assigned sequence number.
    ///
    /// The `seq` field of `movement` is ignored.
    pub fn insert_movement(&self, movement: &StockMovement) -> DbResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO stock_movements (
                id, item_id, movement_type, quantity, prescription_id, encounter_id,
                created_at, prev_hash, entry_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                movement.id,
                movement.item_id,
                movement.movement_type.as_str(),
                movement.quantity,
                movement.prescription_id,
                movement.encounter_id,
                to_db_time(&movement.created_at),
                movement.prev_hash,
                movement.entry_hash,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Hash of the newest movement, or None for an empty trail.
    pub fn last_movement_hash(&self) -> DbResult<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT entry_hash FROM stock_movements ORDER BY seq DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Movements for one item in chain order.
    pub fn movements_for_item(&self, item_id: &str) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {} FROM stock_movements WHERE item_id = ? ORDER BY seq",
            MOVEMENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([item_id], MovementRow::from_row)?;
        collect_movements(rows)
    }

    /// Movements recorded against one prescription in chain order.
    pub fn movements_for_prescription(&self, prescription_id: &str) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            "SELECT {} FROM stock_movements WHERE prescription_id = ? ORDER BY seq",
            MOVEMENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([prescription_id], MovementRow::from_row)?;
        collect_movements(rows)
    }

    /// The whole audit trail in chain order.
    pub fn all_movements(&self) -> DbResult<Vec<StockMovement>> {
        let sql = format!("SELECT {} FROM stock_movements ORDER BY seq", MOVEMENT_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], MovementRow::from_row)?;
        collect_movements(rows)
    }

    /// Sum of the balance-affecting movements for an item.
    pub fn balance_movement_total(&self, item_id: &str) -> DbResult<i64> {
        let total: i64 = self.conn.query_row(
            r#"
            SELECT COALESCE(SUM(quantity), 0) FROM stock_movements
            WHERE item_id = ?1 AND movement_type IN (?2, ?3)
            "#,
            params![
                item_id,
                MovementType::Reservation.as_str(),
                MovementType::Release.as_str(),
            ],
            |row| row.get(0),
        )?;
        Ok(total)
    }
}

fn collect_movements<F>(rows: rusqlite::MappedRows<'_, F>) -> DbResult<Vec<StockMovement>>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<MovementRow>,
{
    let mut movements = Vec::new();
    for row in rows {
        movements.push(row?.try_into()?);
    }
    Ok(movements)
}

/// Intermediate row struct for database mapping.
struct ItemRow {
    id: String,
    name: String,
    stock_quantity: i64,
    reorder_level: i64,
    opening_quantity: i64,
    created_at: String,
}

impl ItemRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            stock_quantity: row.get(2)?,
            reorder_level: row.get(3)?,
            opening_quantity: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

impl TryFrom<ItemRow> for StockItem {
    type Error = DbError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(StockItem {
            id: row.id,
            name: row.name,
            stock_quantity: row.stock_quantity,
            reorder_level: row.reorder_level,
            opening_quantity: row.opening_quantity,
            created_at: from_db_time(&row.created_at)?,
        })
    }
}

struct MovementRow {
    seq: i64,
    id: String,
    item_id: String,
    movement_type: String,
    quantity: i64,
    prescription_id: Option<String>,
    encounter_id: Option<String>,
    created_at: String,
    prev_hash: String,
    entry_hash: String,
}

impl MovementRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            id: row.get(1)?,
            item_id: row.get(2)?,
            movement_type: row.get(3)?,
            quantity: row.get(4)?,
            prescription_id: row.get(5)?,
            encounter_id: row.get(6)?,
            created_at: row.get(7)?,
            prev_hash: row.get(8)?,
            entry_hash: row.get(9)?,
        })
    }
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = DbError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let movement_type = MovementType::parse(&row.movement_type).ok_or_else(|| {
            DbError::Constraint(format!("Unknown movement type: {}", row.movement_type))
        })?;
        Ok(StockMovement {
            seq: row.seq,
            id: row.id,
            item_id: row.item_id,
            movement_type,
            quantity: row.quantity,
            prescription_id: row.prescription_id,
            encounter_id: row.encounter_id,
            created_at: from_db_time(&row.created_at)?,
            prev_hash: row.prev_hash,
            entry_hash: row.entry_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.insert_stock_item(&StockItem::new("AMOX-500".into(), "Amoxicillin 500mg".into(), 10, 3))
            .unwrap();
        db
    }

    fn movement(item_id: &str, movement_type: MovementType, quantity: i64, hash: &str) -> StockMovement {
        StockMovement {
            seq: 0,
            id: uuid::Uuid::new_v4().to_string(),
            item_id: item_id.into(),
            movement_type,
            quantity,
            prescription_id: None,
            encounter_id: None,
            created_at: Utc::now(),
            prev_hash: "0".repeat(64),
            entry_hash: hash.into(),
        }
    }

    #[test]
    fn test_insert_and_get_item() {
        let db = setup_db();
        let item = db.get_stock_item("AMOX-500").unwrap().unwrap();
        assert_eq!(item.stock_quantity, 10);
        assert_eq!(item.opening_quantity, 10);
        assert!(db.get_stock_item("missing").unwrap().is_none());
    }

    #[test]
    fn test_guarded_decrement() {
        let db = setup_db();
        assert!(db.decrement_stock("AMOX-500", 4).unwrap());
        assert!(!db.decrement_stock("AMOX-500", 7).unwrap());
        assert!(db.decrement_stock("AMOX-500", 6).unwrap());
        assert_eq!(db.get_stock_item("AMOX-500").unwrap().unwrap().stock_quantity, 0);
        assert!(!db.decrement_stock("missing", 1).unwrap());
    }

    #[test]
    fn test_increment_restores_stock() {
        let db = setup_db();
        db.decrement_stock("AMOX-500", 5).unwrap();
        assert!(db.increment_stock("AMOX-500", 5).unwrap());
        assert_eq!(db.get_stock_item("AMOX-500").unwrap().unwrap().stock_quantity, 10);
    }

    #[test]
    fn test_below_reorder_level() {
        let db = setup_db();
        db.insert_stock_item(&StockItem::new("PARA-500".into(), "Paracetamol".into(), 2, 5))
            .unwrap();
        let low = db.items_below_reorder_level().unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, "PARA-500");
        assert_eq!(db.list_stock_items().unwrap().len(), 2);
    }

    #[test]
    fn test_movements_keep_chain_order() {
        let db = setup_db();
        let first = db
            .insert_movement(&movement("AMOX-500", MovementType::Reservation, -3, "h1"))
            .unwrap();
        let second = db
            .insert_movement(&movement("AMOX-500", MovementType::Release, 3, "h2"))
            .unwrap();
        assert!(second > first);

        let movements = db.movements_for_item("AMOX-500").unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[0].seq, first);
        assert_eq!(movements[1].movement_type, MovementType::Release);
        assert_eq!(db.last_movement_hash().unwrap().as_deref(), Some("h2"));
    }

    #[test]
    fn test_balance_total_skips_dispensations() {
        let db = setup_db();
        db.insert_movement(&movement("AMOX-500", MovementType::Reservation, -4, "h1"))
            .unwrap();
        db.insert_movement(&movement("AMOX-500", MovementType::Dispensation, -4, "h2"))
            .unwrap();
        assert_eq!(db.balance_movement_total("AMOX-500").unwrap(), -4);
        assert_eq!(db.balance_movement_total("PARA-500").unwrap(), 0);
    }
}
