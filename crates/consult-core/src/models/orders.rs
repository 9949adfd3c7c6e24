//! Clinical orders placed during a consultation: prescriptions and lab orders.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Prescription fulfilment status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    Pending,
    Dispensed,
}

impl PrescriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::Pending => "pending",
            PrescriptionStatus::Dispensed => "dispensed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PrescriptionStatus::Pending),
            "dispensed" => Some(PrescriptionStatus::Dispensed),
            _ => None,
        }
    }
}

/// Caller input for a new prescription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionDraft {
    pub encounter_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub instructions: Option<String>,
    /// Deduct stock now instead of at the pharmacy counter
    pub instant_dispensing: bool,
}

/// A drug order belonging to an encounter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: String,
    pub encounter_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub instructions: Option<String>,
    pub instant_dispensing: bool,
    /// Only ever true when `instant_dispensing` is true
    pub stock_reserved: bool,
    pub stock_reserved_at: Option<DateTime<Utc>>,
    pub status: PrescriptionStatus,
    pub created_at: DateTime<Utc>,
}

impl Prescription {
    /// Build an unreserved prescription from a draft.
    pub fn from_draft(draft: &PrescriptionDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            encounter_id: draft.encounter_id.clone(),
            item_id: draft.item_id.clone(),
            quantity: draft.quantity,
            instructions: draft.instructions.clone(),
            instant_dispensing: draft.instant_dispensing,
            stock_reserved: false,
            stock_reserved_at: None,
            status: PrescriptionStatus::Pending,
            created_at: now,
        }
    }

    /// Build a prescription holding a stock reservation taken at `now`.
    pub fn reserved(draft: &PrescriptionDraft, now: DateTime<Utc>) -> Self {
        Self {
            instant_dispensing: true,
            stock_reserved: true,
            stock_reserved_at: Some(now),
            ..Self::from_draft(draft, now)
        }
    }

    /// Whether completion turns this prescription into a dispensation.
    pub fn is_dispensable(&self) -> bool {
        self.instant_dispensing && self.stock_reserved
    }

    /// True when the reservation is older than `ttl`.
    ///
    /// Unreserved prescriptions never expire.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match (self.stock_reserved, self.stock_reserved_at) {
            (true, Some(reserved_at)) => now - reserved_at > ttl,
            _ => false,
        }
    }
}

/// Lab order urgency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabPriority {
    Urgent,
    Fast,
    Normal,
}

impl LabPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabPriority::Urgent => "urgent",
            LabPriority::Fast => "fast",
            LabPriority::Normal => "normal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "urgent" => Some(LabPriority::Urgent),
            "fast" => Some(LabPriority::Fast),
            "normal" => Some(LabPriority::Normal),
            _ => None,
        }
    }
}

/// Lab order status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabOrderStatus {
    /// Drafted during the consultation
    Pending,
    /// Sent to the laboratory at completion
    Submitted,
}

impl LabOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabOrderStatus::Pending => "pending",
            LabOrderStatus::Submitted => "submitted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(LabOrderStatus::Pending),
            "submitted" => Some(LabOrderStatus::Submitted),
            _ => None,
        }
    }
}

/// Caller input for a new lab order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabOrderDraft {
    pub encounter_id: String,
    /// Lab test catalog code
    pub test_code: String,
    pub priority: LabPriority,
    pub clinical_notes: Option<String>,
}

/// A lab test requested during an encounter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabOrder {
    pub id: String,
    pub encounter_id: String,
    pub test_code: String,
    pub priority: LabPriority,
    pub clinical_notes: Option<String>,
    pub status: LabOrderStatus,
    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl LabOrder {
    pub fn from_draft(draft: &LabOrderDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            encounter_id: draft.encounter_id.clone(),
            test_code: draft.test_code.clone(),
            priority: draft.priority,
            clinical_notes: draft.clinical_notes.clone(),
            status: LabOrderStatus::Pending,
            created_at: now,
            submitted_at: None,
        }
    }
}
