//! Consult Core Library
//!
//! Outpatient consultation engine for a hospital department: encounter
//! lifecycle, prescriptions and lab orders, emergency-only instant
//! dispensing with time-limited stock reservations, and an all-or-nothing
//! completion step that dispenses, bills and submits in one transaction.
//!
//! # Architecture
//!
//! ```text
//!   intake ──► WAITING ──start──► IN_PROGRESS ──complete──► COMPLETED
//!                                      │                        │
//!                       prescriptions, lab orders,     dispensations, billing,
//!                       notes (draft sync)              lab submission
//!                                      │
//!                        instant dispensing (emergency only)
//!                                      │
//!                          ┌───────────▼────────────┐
//!                          │   Reservation Manager  │◄── expiry sweep
//!                          └───────────┬────────────┘
//!                                      │
//!                          ┌───────────▼────────────┐
//!                          │  Stock Ledger + chain  │
//!                          │  entry = H(prev ‖ mv)  │
//!                          └────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`db`]: SQLite storage layer
//! - [`models`]: Domain types (Encounter, Prescription, StockMovement, etc.)
//! - [`encounter`]: Encounter state machine and mutation guard
//! - [`ledger`]: Stock ledger with hash-chained audit trail
//! - [`reservation`]: Stock reservations, per-key locks, expiry sweeper
//! - [`consultation`]: Order entry, completion, pricing
//! - [`emergency`]: Patient registration and emergency admission
//! - [`export`]: Billing export

pub mod config;
pub mod consultation;
pub mod db;
pub mod emergency;
pub mod encounter;
pub mod error;
pub mod export;
pub mod ledger;
pub mod models;
pub mod reservation;

// Re-export commonly used types
pub use config::ClinicConfig;
pub use consultation::{CompletionResult, ConsultationService, ConsultationSummary, PriceCatalog};
pub use db::{Database, DbError};
pub use emergency::{EmergencyContext, EmergencyDesk, TriageInput};
pub use encounter::EncounterMachine;
pub use error::{ClinicError, ClinicResult, ErrorBody};
pub use ledger::{ChainVerification, Reconciliation, StockLedger};
pub use models::{
    BillingItem, ConsultationNotes, Encounter, EncounterStatus, LabOrder, LabOrderDraft,
    LabPriority, Patient, Prescription, PrescriptionDraft, StockItem, StockMovement,
};
pub use reservation::{LockRegistry, ReservationManager, ReservationSweeper, SweepReport, SweepTarget};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum ClinicFfiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Encounter closed: {0}")]
    EncounterClosed(String),

    #[error("{0}")]
    NotEmergencyPatient(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

impl From<ClinicError> for ClinicFfiError {
    fn from(e: ClinicError) -> Self {
        let message = e.to_string();
        match e {
            ClinicError::NotFound { .. } => ClinicFfiError::NotFound(message),
            ClinicError::InvalidState { .. } => ClinicFfiError::InvalidState(message),
            ClinicError::EncounterClosed(_) => ClinicFfiError::EncounterClosed(message),
            ClinicError::NotEmergencyPatient => ClinicFfiError::NotEmergencyPatient(message),
            ClinicError::InsufficientStock { .. } => ClinicFfiError::InsufficientStock(message),
            ClinicError::Validation(_) => ClinicFfiError::InvalidInput(message),
            ClinicError::Storage(_) => ClinicFfiError::StorageError(message),
        }
    }
}

impl From<DbError> for ClinicFfiError {
    fn from(e: DbError) -> Self {
        ClinicFfiError::StorageError(e.to_string())
    }
}

impl From<serde_json::Error> for ClinicFfiError {
    fn from(e: serde_json::Error) -> Self {
        ClinicFfiError::StorageError(e.to_string())
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a clinic database at the given path.
#[uniffi::export]
pub fn open_clinic(path: String) -> Result<Arc<ClinicCore>, ClinicFfiError> {
    let config = ClinicConfig::default().with_database_path(path);
    Ok(Arc::new(ClinicCore::with_config(config)?))
}

/// Open using `CONSULT_*` environment variables.
#[uniffi::export]
pub fn open_clinic_from_env() -> Result<Arc<ClinicCore>, ClinicFfiError> {
    let config = ClinicConfig::from_env()?;
    Ok(Arc::new(ClinicCore::with_config(config)?))
}

/// Create an in-memory clinic (for testing).
#[uniffi::export]
pub fn open_clinic_in_memory() -> Result<Arc<ClinicCore>, ClinicFfiError> {
    Ok(Arc::new(ClinicCore::with_config(ClinicConfig::default())?))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Connection source for the engine.
enum Store {
    /// File database; idle connections are reused across calls
    File {
        path: PathBuf,
        busy_timeout: Duration,
        idle: Mutex<Vec<Database>>,
    },
    /// Single shared in-memory connection
    Memory(Mutex<Database>),
}

/// Thread-safe engine handle for FFI.
///
/// Calls on different threads run on separate connections when file-backed;
/// the shared lock registry and IMMEDIATE transactions serialize conflicting
/// writes.
#[derive(uniffi::Object)]
pub struct ClinicCore {
    store: Store,
    locks: Arc<LockRegistry>,
    config: ClinicConfig,
}

impl ClinicCore {
    pub fn with_config(config: ClinicConfig) -> ClinicResult<Self> {
        config.validate()?;
        let store = match config.database_path() {
            Some(path) => {
                // Open once up front so schema errors surface here
                let db = Database::open_with_timeout(path, config.busy_timeout())?;
                Store::File {
                    path: path.to_path_buf(),
                    busy_timeout: config.busy_timeout(),
                    idle: Mutex::new(vec![db]),
                }
            }
            None => Store::Memory(Mutex::new(Database::open_in_memory()?)),
        };
        tracing::info!(
            database = ?config.database_path(),
            reservation_ttl_secs = config.reservation_ttl().as_secs(),
            "clinic engine opened"
        );
        Ok(Self {
            store,
            locks: Arc::new(LockRegistry::new()),
            config,
        })
    }

    pub fn config(&self) -> &ClinicConfig {
        &self.config
    }

    /// Run `f` on a connection.
    pub fn with_db<T>(&self, f: impl FnOnce(&Database) -> ClinicResult<T>) -> ClinicResult<T> {
        match &self.store {
            Store::Memory(db) => {
                let db = db
                    .lock()
                    .map_err(|e| DbError::LockPoisoned(e.to_string()))?;
                f(&*db)
            }
            Store::File {
                path,
                busy_timeout,
                idle,
            } => {
                let pooled = idle
                    .lock()
                    .map_err(|e| DbError::LockPoisoned(e.to_string()))?
                    .pop();
                let db = match pooled {
                    Some(db) => db,
                    None => Database::open_with_timeout(path, *busy_timeout)?,
                };
                let result = f(&db);
                if let Ok(mut idle) = idle.lock() {
                    idle.push(db);
                }
                result
            }
        }
    }

    fn consultation<T>(
        &self,
        f: impl FnOnce(&ConsultationService<'_>) -> ClinicResult<T>,
    ) -> ClinicResult<T> {
        let ttl = self.config.reservation_ttl_chrono()?;
        self.with_db(|db| {
            let service = ConsultationService::new(db, &self.locks, ttl);
            f(&service)
        })
    }

    /// Start the background expiry sweep on the current tokio runtime.
    pub fn spawn_sweeper(self: &Arc<Self>) -> ReservationSweeper {
        ReservationSweeper::spawn(Arc::clone(self), self.config.sweep_interval())
    }
}

impl SweepTarget for ClinicCore {
    fn sweep(&self, now: DateTime<Utc>) -> ClinicResult<SweepReport> {
        let ttl = self.config.reservation_ttl_chrono()?;
        self.with_db(|db| ReservationManager::new(db, &self.locks, ttl).release_expired(now))
    }
}

#[uniffi::export]
impl ClinicCore {
    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Register a new patient.
    pub fn register_patient(
        &self,
        name: String,
        medical_record_number: Option<String>,
        date_of_birth: Option<String>,
    ) -> Result<FfiPatient, ClinicFfiError> {
        let patient = Patient {
            medical_record_number,
            date_of_birth,
            ..Patient::new(name)
        };
        self.with_db(|db| EmergencyDesk::new(db).register_patient(&patient))?;
        Ok(patient.into())
    }

    pub fn get_patient(&self, patient_id: String) -> Result<FfiPatient, ClinicFfiError> {
        let patient = self.with_db(|db| EmergencyDesk::new(db).get_patient(&patient_id))?;
        Ok(patient.into())
    }

    /// Admit a patient to emergency care with an initial triage.
    pub fn admit_emergency(
        &self,
        patient_id: String,
        acuity_level: u8,
        chief_complaint: String,
        assessed_by: String,
    ) -> Result<FfiEmergency, ClinicFfiError> {
        let triage = TriageInput {
            acuity_level,
            chief_complaint,
            assessed_by,
        };
        let context = self.with_db(|db| EmergencyDesk::new(db).admit(&patient_id, &triage))?;
        Ok(context.into())
    }

    pub fn discharge_emergency(&self, patient_id: String) -> Result<(), ClinicFfiError> {
        Ok(self.with_db(|db| EmergencyDesk::new(db).discharge(&patient_id))?)
    }

    // =========================================================================
    // Stock and Catalog Operations
    // =========================================================================

    /// Register a stock item with its opening balance.
    pub fn register_stock_item(
        &self,
        item_id: String,
        name: String,
        opening_quantity: i64,
        reorder_level: i64,
    ) -> Result<FfiStockItem, ClinicFfiError> {
        let item = StockItem::new(item_id, name, opening_quantity, reorder_level);
        self.with_db(|db| StockLedger::new(db).register_item(&item))?;
        Ok(item.into())
    }

    pub fn get_stock_item(&self, item_id: String) -> Result<FfiStockItem, ClinicFfiError> {
        let item = self.with_db(|db| StockLedger::new(db).get_item(&item_id))?;
        Ok(item.into())
    }

    pub fn items_below_reorder_level(&self) -> Result<Vec<FfiStockItem>, ClinicFfiError> {
        let items = self.with_db(|db| StockLedger::new(db).items_below_reorder_level())?;
        Ok(items.into_iter().map(|i| i.into()).collect())
    }

    /// Recompute the audit chain. Returns the first broken sequence number, if any.
    pub fn verify_audit_chain(&self) -> Result<Option<i64>, ClinicFfiError> {
        let verification = self.with_db(|db| StockLedger::new(db).verify_chain())?;
        Ok(verification.broken_at)
    }

    /// Set the current price for a drug ("drug") or lab test ("lab_test").
    pub fn set_catalog_price(
        &self,
        kind: String,
        code: String,
        name: String,
        unit_price_cents: i64,
    ) -> Result<(), ClinicFfiError> {
        let kind = models::CatalogKind::parse(&kind)
            .ok_or_else(|| ClinicFfiError::InvalidInput(format!("Unknown catalog kind: {}", kind)))?;
        let price = models::CatalogPrice::new(kind, code, name, unit_price_cents);
        Ok(self.with_db(|db| PriceCatalog::new(db).set_price(&price))?)
    }

    // =========================================================================
    // Encounter Operations
    // =========================================================================

    /// Intake: open a WAITING encounter.
    pub fn open_encounter(&self, patient_id: String) -> Result<FfiEncounter, ClinicFfiError> {
        let encounter = self.with_db(|db| EncounterMachine::new(db).open(&patient_id))?;
        Ok(encounter.into())
    }

    pub fn get_encounter(&self, encounter_id: String) -> Result<FfiEncounter, ClinicFfiError> {
        let encounter = self.with_db(|db| EncounterMachine::new(db).get(&encounter_id))?;
        Ok(encounter.into())
    }

    pub fn start_consultation(
        &self,
        encounter_id: String,
        clinician_id: String,
    ) -> Result<FfiEncounter, ClinicFfiError> {
        let encounter = self.with_db(|db| {
            self.locks.with_encounter(&encounter_id, || {
                EncounterMachine::new(db).start(&encounter_id, &clinician_id)
            })
        })?;
        Ok(encounter.into())
    }

    // =========================================================================
    // Order Operations
    // =========================================================================

    pub fn create_prescription(
        &self,
        draft: FfiPrescriptionDraft,
    ) -> Result<FfiPrescription, ClinicFfiError> {
        let draft = draft.into();
        let prescription = self.consultation(|service| service.create_prescription(&draft))?;
        Ok(prescription.into())
    }

    pub fn delete_prescription(&self, prescription_id: String) -> Result<(), ClinicFfiError> {
        self.consultation(|service| service.delete_prescription(&prescription_id))?;
        Ok(())
    }

    pub fn create_lab_order(&self, draft: FfiLabOrderDraft) -> Result<FfiLabOrder, ClinicFfiError> {
        let draft = draft.try_into()?;
        let order = self.consultation(|service| service.create_lab_order(&draft))?;
        Ok(order.into())
    }

    pub fn delete_lab_order(&self, lab_order_id: String) -> Result<(), ClinicFfiError> {
        Ok(self.consultation(|service| service.delete_lab_order(&lab_order_id))?)
    }

    // =========================================================================
    // Consultation Operations
    // =========================================================================

    /// Dispense, bill, submit labs and close the encounter in one transaction.
    pub fn complete_consultation(
        &self,
        encounter_id: String,
    ) -> Result<FfiCompletion, ClinicFfiError> {
        let result = self.consultation(|service| service.complete_consultation(&encounter_id))?;
        Ok(result.into())
    }

    pub fn get_consultation_summary(
        &self,
        encounter_id: String,
    ) -> Result<FfiConsultationSummary, ClinicFfiError> {
        let summary = self.consultation(|service| service.consultation_summary(&encounter_id))?;
        Ok(summary.into())
    }

    /// Draft sync endpoint. Returns the server write time.
    pub fn save_notes(
        &self,
        encounter_id: String,
        notes: FfiNotes,
    ) -> Result<String, ClinicFfiError> {
        let notes = notes.into();
        let saved = self.consultation(|service| service.save_notes(&encounter_id, &notes))?;
        Ok(ts(saved.updated_at))
    }

    pub fn get_notes(&self, encounter_id: String) -> Result<Option<FfiNotes>, ClinicFfiError> {
        let saved = self.consultation(|service| service.get_notes(&encounter_id))?;
        Ok(saved.map(|s| s.notes.into()))
    }

    // =========================================================================
    // Reservation Operations
    // =========================================================================

    /// Run one expiry sweep now. Returns the released prescription ids.
    pub fn sweep_expired_reservations(&self) -> Result<Vec<String>, ClinicFfiError> {
        let report = self.sweep(Utc::now())?;
        Ok(report
            .released
            .into_iter()
            .map(|r| r.prescription_id)
            .collect())
    }

    // =========================================================================
    // Export Operations
    // =========================================================================

    pub fn export_billing_json(&self, encounter_id: String) -> Result<String, ClinicFfiError> {
        let export = self.with_db(|db| export::BillingExporter::new(db).export_encounter(&encounter_id))?;
        Ok(export.to_json()?)
    }

    pub fn export_patient_billing_csv(&self, patient_id: String) -> Result<String, ClinicFfiError> {
        let batch = self.with_db(|db| export::BillingExporter::new(db).export_patient(&patient_id))?;
        Ok(batch.to_csv())
    }
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe patient.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatient {
    pub id: String,
    pub name: String,
    pub medical_record_number: Option<String>,
    pub date_of_birth: Option<String>,
}

impl From<Patient> for FfiPatient {
    fn from(patient: Patient) -> Self {
        Self {
            id: patient.id,
            name: patient.name,
            medical_record_number: patient.medical_record_number,
            date_of_birth: patient.date_of_birth,
        }
    }
}

/// FFI-safe emergency record with latest triage.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEmergency {
    pub record_id: String,
    pub patient_id: String,
    pub status: String,
    pub admitted_at: String,
    pub acuity_level: Option<u8>,
    pub chief_complaint: Option<String>,
}

impl From<EmergencyContext> for FfiEmergency {
    fn from(context: EmergencyContext) -> Self {
        let record = context.record;
        Self {
            record_id: record.id,
            patient_id: record.patient_id,
            status: record.status.as_str().to_string(),
            admitted_at: ts(record.admitted_at),
            acuity_level: context.triage.as_ref().map(|t| t.acuity_level),
            chief_complaint: context.triage.map(|t| t.chief_complaint),
        }
    }
}

/// FFI-safe stock item.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStockItem {
    pub id: String,
    pub name: String,
    pub stock_quantity: i64,
    pub reorder_level: i64,
    pub needs_reorder: bool,
}

impl From<StockItem> for FfiStockItem {
    fn from(item: StockItem) -> Self {
        Self {
            needs_reorder: item.needs_reorder(),
            id: item.id,
            name: item.name,
            stock_quantity: item.stock_quantity,
            reorder_level: item.reorder_level,
        }
    }
}

/// FFI-safe encounter.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEncounter {
    pub id: String,
    pub patient_id: String,
    pub clinician_id: Option<String>,
    pub status: String,
    pub consultation_started_at: Option<String>,
    pub consultation_completed_at: Option<String>,
}

impl From<Encounter> for FfiEncounter {
    fn from(encounter: Encounter) -> Self {
        Self {
            id: encounter.id,
            patient_id: encounter.patient_id,
            clinician_id: encounter.clinician_id,
            status: encounter.status.as_str().to_string(),
            consultation_started_at: encounter.consultation_started_at.map(ts),
            consultation_completed_at: encounter.consultation_completed_at.map(ts),
        }
    }
}

/// FFI-safe prescription input.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescriptionDraft {
    pub encounter_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub instructions: Option<String>,
    pub instant_dispensing: bool,
}

impl From<FfiPrescriptionDraft> for PrescriptionDraft {
    fn from(draft: FfiPrescriptionDraft) -> Self {
        PrescriptionDraft {
            encounter_id: draft.encounter_id,
            item_id: draft.item_id,
            quantity: draft.quantity,
            instructions: draft.instructions,
            instant_dispensing: draft.instant_dispensing,
        }
    }
}

/// FFI-safe prescription.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPrescription {
    pub id: String,
    pub encounter_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub instructions: Option<String>,
    pub instant_dispensing: bool,
    pub stock_reserved: bool,
    pub stock_reserved_at: Option<String>,
    pub status: String,
}

impl From<Prescription> for FfiPrescription {
    fn from(rx: Prescription) -> Self {
        Self {
            id: rx.id,
            encounter_id: rx.encounter_id,
            item_id: rx.item_id,
            quantity: rx.quantity,
            instructions: rx.instructions,
            instant_dispensing: rx.instant_dispensing,
            stock_reserved: rx.stock_reserved,
            stock_reserved_at: rx.stock_reserved_at.map(ts),
            status: rx.status.as_str().to_string(),
        }
    }
}

/// FFI-safe lab order input. `priority` is "urgent", "fast" or "normal".
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLabOrderDraft {
    pub encounter_id: String,
    pub test_code: String,
    pub priority: String,
    pub clinical_notes: Option<String>,
}

impl TryFrom<FfiLabOrderDraft> for LabOrderDraft {
    type Error = ClinicFfiError;

    fn try_from(draft: FfiLabOrderDraft) -> Result<Self, Self::Error> {
        let priority = LabPriority::parse(&draft.priority).ok_or_else(|| {
            ClinicFfiError::InvalidInput(format!("Unknown lab priority: {}", draft.priority))
        })?;
        Ok(LabOrderDraft {
            encounter_id: draft.encounter_id,
            test_code: draft.test_code,
            priority,
            clinical_notes: draft.clinical_notes,
        })
    }
}

/// FFI-safe lab order.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiLabOrder {
    pub id: String,
    pub encounter_id: String,
    pub test_code: String,
    pub priority: String,
    pub status: String,
    pub submitted_at: Option<String>,
}

impl From<LabOrder> for FfiLabOrder {
    fn from(order: LabOrder) -> Self {
        Self {
            id: order.id,
            encounter_id: order.encounter_id,
            test_code: order.test_code,
            priority: order.priority.as_str().to_string(),
            status: order.status.as_str().to_string(),
            submitted_at: order.submitted_at.map(ts),
        }
    }
}

/// FFI-safe billing item.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBillingItem {
    pub source: String,
    pub source_id: String,
    pub code: String,
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

impl From<BillingItem> for FfiBillingItem {
    fn from(item: BillingItem) -> Self {
        Self {
            source: item.source.as_str().to_string(),
            source_id: item.source_id,
            code: item.code,
            description: item.description,
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            total_cents: item.total_cents,
        }
    }
}

/// FFI-safe completion result.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCompletion {
    pub encounter: FfiEncounter,
    pub prescriptions_processed: u32,
    pub lab_orders_submitted: u32,
    pub billing_items: Vec<FfiBillingItem>,
}

impl From<CompletionResult> for FfiCompletion {
    fn from(result: CompletionResult) -> Self {
        Self {
            encounter: result.encounter.into(),
            prescriptions_processed: result.prescriptions_processed,
            lab_orders_submitted: result.lab_orders_submitted,
            billing_items: result.billing_items.into_iter().map(|b| b.into()).collect(),
        }
    }
}

/// FFI-safe consultation summary.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiConsultationSummary {
    pub encounter: FfiEncounter,
    pub total_prescriptions: u32,
    pub total_lab_orders: u32,
    pub instant_prescriptions: Vec<FfiPrescription>,
    pub regular_prescriptions: Vec<FfiPrescription>,
    pub lab_orders: Vec<FfiLabOrder>,
    pub emergency: Option<FfiEmergency>,
    pub notes: Option<FfiNotes>,
}

impl From<ConsultationSummary> for FfiConsultationSummary {
    fn from(summary: ConsultationSummary) -> Self {
        Self {
            encounter: summary.encounter.into(),
            total_prescriptions: summary.total_prescriptions,
            total_lab_orders: summary.total_lab_orders,
            instant_prescriptions: summary.instant_prescriptions.into_iter().map(|p| p.into()).collect(),
            regular_prescriptions: summary.regular_prescriptions.into_iter().map(|p| p.into()).collect(),
            lab_orders: summary.lab_orders.into_iter().map(|o| o.into()).collect(),
            emergency: summary.emergency.map(|e| e.into()),
            notes: summary.notes.map(|n| n.notes.into()),
        }
    }
}

/// FFI-safe consultation notes.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiNotes {
    pub chief_complaint: String,
    pub history: String,
    pub examination: String,
    pub assessment: String,
    pub plan: String,
}

impl From<ConsultationNotes> for FfiNotes {
    fn from(notes: ConsultationNotes) -> Self {
        Self {
            chief_complaint: notes.chief_complaint,
            history: notes.history,
            examination: notes.examination,
            assessment: notes.assessment,
            plan: notes.plan,
        }
    }
}

impl From<FfiNotes> for ConsultationNotes {
    fn from(notes: FfiNotes) -> Self {
        ConsultationNotes {
            chief_complaint: notes.chief_complaint,
            history: notes.history,
            examination: notes.examination,
            assessment: notes.assessment,
            plan: notes.plan,
        }
    }
}
