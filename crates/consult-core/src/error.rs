//! Domain error taxonomy for the consultation engine.
//!
//! Every rejection a caller can correct maps to one of five kinds with a
//! stable `kind()` string and an HTTP-equivalent `status_code()`. Storage
//! failures are the only non-correctable kind; they always leave the
//! database rolled back to the state before the call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DbError;

/// Rejection message for instant dispensing without an active emergency record.
pub const NOT_EMERGENCY_MESSAGE: &str = "Instant dispensing is only available for emergency patients";

/// Consultation engine errors.
#[derive(Error, Debug)]
pub enum ClinicError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Cannot {action} {entity} {id} while it is {state}")]
    InvalidState {
        entity: &'static str,
        id: String,
        state: String,
        action: &'static str,
    },

    #[error("Encounter {0} is completed and can no longer be modified")]
    EncounterClosed(String),

    #[error("{}", NOT_EMERGENCY_MESSAGE)]
    NotEmergencyPatient,

    #[error("Insufficient stock for {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: String,
        requested: i64,
        available: i64,
    },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] DbError),
}

pub type ClinicResult<T> = Result<T, ClinicError>;

impl From<rusqlite::Error> for ClinicError {
    fn from(e: rusqlite::Error) -> Self {
        ClinicError::Storage(DbError::Sqlite(e))
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(e: serde_json::Error) -> Self {
        ClinicError::Storage(DbError::Json(e))
    }
}

impl ClinicError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ClinicError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ClinicError::NotFound { .. } => "not_found",
            ClinicError::InvalidState { .. } => "invalid_state",
            ClinicError::EncounterClosed(_) => "encounter_closed",
            ClinicError::NotEmergencyPatient => "not_emergency_patient",
            ClinicError::InsufficientStock { .. } => "insufficient_stock",
            ClinicError::Validation(_) => "validation",
            ClinicError::Storage(_) => "storage",
        }
    }

    /// HTTP-equivalent status code.
    pub fn status_code(&self) -> u16 {
        match self {
            ClinicError::NotFound { .. } => 404,
            ClinicError::InvalidState { .. } => 409,
            ClinicError::EncounterClosed(_) => 409,
            ClinicError::NotEmergencyPatient => 422,
            ClinicError::InsufficientStock { .. } => 422,
            ClinicError::Validation(_) => 400,
            ClinicError::Storage(_) => 500,
        }
    }

    /// Whether the caller can fix the request and resubmit.
    pub fn is_caller_correctable(&self) -> bool {
        self.status_code() < 500
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::from(self)
    }
}

/// Structured `{kind, message}` pair surfaced to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&ClinicError> for ErrorBody {
    fn from(e: &ClinicError) -> Self {
        Self {
            kind: e.kind().to_string(),
            message: e.to_string(),
        }
    }
}
