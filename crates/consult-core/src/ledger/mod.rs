//! Stock ledger: item quantities plus the append-only movement trail.
//!
//! Every change to `stock_quantity` goes through [`StockLedger`], which
//! writes the quantity change and its chained [`StockMovement`] together.
//! The ledger does not open transactions itself; callers wrap each
//! operation in [`Database::begin_immediate`] so the pair commits or rolls
//! back as one unit and the chain stays linear across connections.

mod chain;

pub use chain::*;

use chrono::{DateTime, Utc};

use crate::db::Database;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{MovementPayload, MovementType, StockItem, StockMovement};

/// Balance check for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub item_id: String,
    pub opening_quantity: i64,
    /// Sum of reservation and release movements
    pub movement_total: i64,
    /// `opening_quantity + movement_total`
    pub expected_quantity: i64,
    /// Stored `stock_quantity`
    pub actual_quantity: i64,
}

impl Reconciliation {
    pub fn is_balanced(&self) -> bool {
        self.expected_quantity == self.actual_quantity
    }
}

/// Stock ledger over one database connection.
pub struct StockLedger<'a> {
    db: &'a Database,
}

impl<'a> StockLedger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Seed a new item with its opening balance. Records no movement.
    pub fn register_item(&self, item: &StockItem) -> ClinicResult<()> {
        if item.id.trim().is_empty() {
            return Err(ClinicError::Validation("Stock item id cannot be empty".into()));
        }
        if item.opening_quantity < 0 || item.reorder_level < 0 {
            return Err(ClinicError::Validation(format!(
                "Stock item {} needs non-negative opening quantity and reorder level",
                item.id
            )));
        }
        if item.stock_quantity != item.opening_quantity {
            return Err(ClinicError::Validation(format!(
                "Stock item {} must start at its opening quantity",
                item.id
            )));
        }
        if self.db.get_stock_item(&item.id)?.is_some() {
            return Err(ClinicError::Validation(format!(
                "Stock item {} is already registered",
                item.id
            )));
        }

        self.db.insert_stock_item(item)?;
        tracing::info!(item_id = %item.id, quantity = item.opening_quantity, "stock item registered");
        Ok(())
    }

    pub fn get_item(&self, item_id: &str) -> ClinicResult<StockItem> {
        self.db
            .get_stock_item(item_id)?
            .ok_or_else(|| ClinicError::not_found("stock item", item_id))
    }

    pub fn list_items(&self) -> ClinicResult<Vec<StockItem>> {
        Ok(self.db.list_stock_items()?)
    }

    /// Items at or below their reorder level.
    pub fn items_below_reorder_level(&self) -> ClinicResult<Vec<StockItem>> {
        Ok(self.db.items_below_reorder_level()?)
    }

    /// Audit trail for one item, oldest first.
    pub fn movements_for_item(&self, item_id: &str) -> ClinicResult<Vec<StockMovement>> {
        Ok(self.db.movements_for_item(item_id)?)
    }

    /// Take `quantity` units off the shelf for a reservation.
    ///
    /// Fails with `NotFound` for an unknown item and `InsufficientStock`
    /// when fewer than `quantity` units remain; neither writes anything.
    pub fn withdraw(
        &self,
        item_id: &str,
        quantity: i64,
        prescription_id: &str,
        encounter_id: &str,
        now: DateTime<Utc>,
    ) -> ClinicResult<StockMovement> {
        let item = self.get_item(item_id)?;
        if item.stock_quantity < quantity {
            return Err(ClinicError::InsufficientStock {
                item_id: item_id.to_string(),
                requested: quantity,
                available: item.stock_quantity,
            });
        }

        // Guarded write; only misses if another process got in between
        if !self.db.decrement_stock(item_id, quantity)? {
            let available = self.get_item(item_id)?.stock_quantity;
            return Err(ClinicError::InsufficientStock {
                item_id: item_id.to_string(),
                requested: quantity,
                available,
            });
        }

        self.append(
            item_id,
            MovementType::Reservation,
            -quantity,
            Some(prescription_id),
            Some(encounter_id),
            now,
        )
    }

    /// Return `quantity` reserved units to the shelf.
    pub fn restore(
        &self,
        item_id: &str,
        quantity: i64,
        prescription_id: &str,
        encounter_id: &str,
        now: DateTime<Utc>,
    ) -> ClinicResult<StockMovement> {
        if !self.db.increment_stock(item_id, quantity)? {
            return Err(ClinicError::not_found("stock item", item_id));
        }
        self.append(
            item_id,
            MovementType::Release,
            quantity,
            Some(prescription_id),
            Some(encounter_id),
            now,
        )
    }

    /// Record that reserved units were permanently given out.
    ///
    /// The units left `stock_quantity` at reservation time, so only the
    /// movement is written.
    pub fn record_dispensation(
        &self,
        item_id: &str,
        quantity: i64,
        prescription_id: &str,
        encounter_id: &str,
        now: DateTime<Utc>,
    ) -> ClinicResult<StockMovement> {
        self.append(
            item_id,
            MovementType::Dispensation,
            -quantity,
            Some(prescription_id),
            Some(encounter_id),
            now,
        )
    }

    /// Append a movement linked to the current chain head.
    fn append(
        &self,
        item_id: &str,
        movement_type: MovementType,
        quantity: i64,
        prescription_id: Option<&str>,
        encounter_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> ClinicResult<StockMovement> {
        let payload = MovementPayload::new(
            item_id,
            movement_type,
            quantity,
            prescription_id,
            encounter_id,
            now,
        );
        let prev_hash = self
            .db
            .last_movement_hash()?
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let entry_hash = entry_hash(&prev_hash, &payload)?;

        let mut movement = StockMovement {
            seq: 0,
            id: payload.id,
            item_id: payload.item_id,
            movement_type,
            quantity,
            prescription_id: payload.prescription_id,
            encounter_id: payload.encounter_id,
            created_at: payload.created_at,
            prev_hash,
            entry_hash,
        };
        movement.seq = self.db.insert_movement(&movement)?;

        tracing::debug!(
            item_id,
            movement = movement_type.as_str(),
            quantity,
            seq = movement.seq,
            "stock movement recorded"
        );
        Ok(movement)
    }

    /// Recompute the whole chain and report the first broken entry.
    pub fn verify_chain(&self) -> ClinicResult<ChainVerification> {
        let movements = self.db.all_movements()?;
        let verification = verify_movements(&movements)?;
        if let Some(seq) = verification.broken_at {
            tracing::error!(seq, "stock movement chain broken");
        }
        Ok(verification)
    }

    /// Compare the stored quantity with opening balance plus movements.
    pub fn reconcile(&self, item_id: &str) -> ClinicResult<Reconciliation> {
        let item = self.get_item(item_id)?;
        let movement_total = self.db.balance_movement_total(item_id)?;
        Ok(Reconciliation {
            item_id: item.id,
            opening_quantity: item.opening_quantity,
            movement_total,
            expected_quantity: item.opening_quantity + movement_total,
            actual_quantity: item.stock_quantity,
        })
    }
}
