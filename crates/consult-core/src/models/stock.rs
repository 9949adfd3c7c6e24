//! Pharmacy stock models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A drug or consumable held in pharmacy stock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockItem {
    /// Item identifier (also the drug catalog code)
    pub id: String,
    /// Display name
    pub name: String,
    /// Units currently available, never negative
    pub stock_quantity: i64,
    /// Level at or below which the item needs reordering
    pub reorder_level: i64,
    /// Balance at registration, the base for reconciliation
    pub opening_quantity: i64,
    pub created_at: DateTime<Utc>,
}

impl StockItem {
    /// Create a new stock item with its opening balance.
    pub fn new(id: String, name: String, opening_quantity: i64, reorder_level: i64) -> Self {
        Self {
            id,
            name,
            stock_quantity: opening_quantity,
            reorder_level,
            opening_quantity,
            created_at: Utc::now(),
        }
    }

    pub fn needs_reorder(&self) -> bool {
        self.stock_quantity <= self.reorder_level
    }
}

/// Cause of a stock movement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Stock held against an instant-dispensing prescription
    Reservation,
    /// Held stock returned to the shelf
    Release,
    /// Held stock permanently given to the patient
    Dispensation,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Reservation => "reservation",
            MovementType::Release => "release",
            MovementType::Dispensation => "dispensation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reservation" => Some(MovementType::Reservation),
            "release" => Some(MovementType::Release),
            "dispensation" => Some(MovementType::Dispensation),
            _ => None,
        }
    }

    /// Whether movements of this type change `stock_quantity`.
    ///
    /// A dispensation converts an existing reservation into a permanent
    /// outflow; the units already left the shelf at reservation time.
    pub fn affects_balance(&self) -> bool {
        !matches!(self, MovementType::Dispensation)
    }
}

/// Append-only audit entry for a stock event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockMovement {
    /// Position in the audit chain
    pub seq: i64,
    pub id: String,
    pub item_id: String,
    pub movement_type: MovementType,
    /// Signed quantity: negative leaves the shelf, positive returns to it
    pub quantity: i64,
    pub prescription_id: Option<String>,
    pub encounter_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Hash of the previous entry in the chain
    pub prev_hash: String,
    /// SHA-256 over `prev_hash` and this entry's canonical payload
    pub entry_hash: String,
}

/// Movement fields covered by the chain hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovementPayload {
    pub id: String,
    pub item_id: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub prescription_id: Option<String>,
    pub encounter_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl MovementPayload {
    pub fn new(
        item_id: &str,
        movement_type: MovementType,
        quantity: i64,
        prescription_id: Option<&str>,
        encounter_id: Option<&str>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_id: item_id.to_string(),
            movement_type,
            quantity,
            prescription_id: prescription_id.map(str::to_string),
            encounter_id: encounter_id.map(str::to_string),
            created_at,
        }
    }

    /// Serialize to canonical JSON for chain hashing.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<&StockMovement> for MovementPayload {
    fn from(movement: &StockMovement) -> Self {
        Self {
            id: movement.id.clone(),
            item_id: movement.item_id.clone(),
            movement_type: movement.movement_type,
            quantity: movement.quantity,
            prescription_id: movement.prescription_id.clone(),
            encounter_id: movement.encounter_id.clone(),
            created_at: movement.created_at,
        }
    }
}
