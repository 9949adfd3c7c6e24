//! Consultation orchestrator.
//!
//! Coordinates order entry against the encounter state machine and the
//! reservation manager, and runs the all-or-nothing completion step:
//! dispensations, billing items, lab submission and the final status
//! change commit in one transaction or not at all.

mod billing;

pub use billing::*;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::emergency::{EmergencyContext, EmergencyDesk};
use crate::encounter::EncounterMachine;
use crate::error::{ClinicError, ClinicResult};
use crate::ledger::StockLedger;
use crate::models::{
    BillingItem, ConsultationNotes, Dispensation, Encounter, EncounterEvent, LabOrder,
    LabOrderDraft, Prescription, PrescriptionDraft, SavedNotes,
};
use crate::reservation::{LockRegistry, ReservationManager};

/// Outcome of a successful completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionResult {
    pub encounter: Encounter,
    /// Prescriptions turned into dispensations
    pub prescriptions_processed: u32,
    pub lab_orders_submitted: u32,
    pub dispensations: Vec<Dispensation>,
    pub billing_items: Vec<BillingItem>,
}

/// Read-only view of an encounter's orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsultationSummary {
    pub encounter: Encounter,
    pub total_prescriptions: u32,
    pub total_lab_orders: u32,
    pub instant_prescriptions: Vec<Prescription>,
    pub regular_prescriptions: Vec<Prescription>,
    pub lab_orders: Vec<LabOrder>,
    /// Present while the patient is in emergency care
    pub emergency: Option<EmergencyContext>,
    pub notes: Option<SavedNotes>,
}

/// Consultation workflow over one database connection.
pub struct ConsultationService<'a> {
    db: &'a Database,
    locks: &'a LockRegistry,
    reservation_ttl: Duration,
}

impl<'a> ConsultationService<'a> {
    pub fn new(db: &'a Database, locks: &'a LockRegistry, reservation_ttl: Duration) -> Self {
        Self {
            db,
            locks,
            reservation_ttl,
        }
    }

    fn machine(&self) -> EncounterMachine<'a> {
        EncounterMachine::new(self.db)
    }

    fn reservations(&self) -> ReservationManager<'a> {
        ReservationManager::new(self.db, self.locks, self.reservation_ttl)
    }

    // ========================================================================
    // Prescriptions
    // ========================================================================

    /// Add a drug order. Instant-dispensing orders reserve stock immediately.
    pub fn create_prescription(&self, draft: &PrescriptionDraft) -> ClinicResult<Prescription> {
        if draft.instant_dispensing {
            return self.reservations().reserve(draft);
        }

        if draft.quantity <= 0 {
            return Err(ClinicError::Validation(format!(
                "Prescription quantity must be positive, got {}",
                draft.quantity
            )));
        }

        self.locks.with_encounter(&draft.encounter_id, || {
            let tx = self.db.begin_immediate()?;
            let encounter = self.machine().get(&draft.encounter_id)?;
            EncounterMachine::guard_mutation(&encounter)?;
            if self.db.get_stock_item(&draft.item_id)?.is_none() {
                return Err(ClinicError::not_found("stock item", &draft.item_id));
            }

            let prescription = Prescription::from_draft(draft, Utc::now());
            self.db.insert_prescription(&prescription)?;
            tx.commit()?;

            tracing::debug!(
                encounter_id = %encounter.id,
                prescription_id = %prescription.id,
                item_id = %prescription.item_id,
                quantity = prescription.quantity,
                "prescription added"
            );
            Ok(prescription)
        })
    }

    /// Remove a drug order, releasing its reservation first if it holds one.
    pub fn delete_prescription(&self, prescription_id: &str) -> ClinicResult<Prescription> {
        let prescription = self.get_prescription(prescription_id)?;

        self.locks.with_encounter_and_item(
            &prescription.encounter_id,
            &prescription.item_id,
            || {
                let tx = self.db.begin_immediate()?;
                let prescription = self.get_prescription(prescription_id)?;
                let encounter = self.machine().get(&prescription.encounter_id)?;
                EncounterMachine::guard_mutation(&encounter)?;

                let prescription = if prescription.stock_reserved {
                    self.reservations().release_locked(prescription_id, Utc::now())?
                } else {
                    prescription
                };
                self.db.delete_prescription(prescription_id)?;
                tx.commit()?;

                tracing::info!(
                    encounter_id = %encounter.id,
                    prescription_id,
                    "prescription deleted"
                );
                Ok(prescription)
            },
        )
    }

    pub fn get_prescription(&self, prescription_id: &str) -> ClinicResult<Prescription> {
        self.db
            .get_prescription(prescription_id)?
            .ok_or_else(|| ClinicError::not_found("prescription", prescription_id))
    }

    pub fn list_prescriptions(&self, encounter_id: &str) -> ClinicResult<Vec<Prescription>> {
        self.machine().get(encounter_id)?;
        Ok(self.db.list_prescriptions(encounter_id)?)
    }

    // ========================================================================
    // Lab Orders
    // ========================================================================

    pub fn create_lab_order(&self, draft: &LabOrderDraft) -> ClinicResult<LabOrder> {
        if draft.test_code.trim().is_empty() {
            return Err(ClinicError::Validation("Lab order needs a test code".into()));
        }

        self.locks.with_encounter(&draft.encounter_id, || {
            let tx = self.db.begin_immediate()?;
            let encounter = self.machine().get(&draft.encounter_id)?;
            EncounterMachine::guard_mutation(&encounter)?;

            let order = LabOrder::from_draft(draft, Utc::now());
            self.db.insert_lab_order(&order)?;
            tx.commit()?;

            tracing::debug!(
                encounter_id = %encounter.id,
                lab_order_id = %order.id,
                test_code = %order.test_code,
                priority = order.priority.as_str(),
                "lab order added"
            );
            Ok(order)
        })
    }

    pub fn delete_lab_order(&self, lab_order_id: &str) -> ClinicResult<()> {
        let order = self.get_lab_order(lab_order_id)?;

        self.locks.with_encounter(&order.encounter_id, || {
            let tx = self.db.begin_immediate()?;
            let order = self.get_lab_order(lab_order_id)?;
            let encounter = self.machine().get(&order.encounter_id)?;
            EncounterMachine::guard_mutation(&encounter)?;

            self.db.delete_lab_order(lab_order_id)?;
            tx.commit()?;

            tracing::debug!(encounter_id = %encounter.id, lab_order_id, "lab order deleted");
            Ok(())
        })
    }

    pub fn get_lab_order(&self, lab_order_id: &str) -> ClinicResult<LabOrder> {
        self.db
            .get_lab_order(lab_order_id)?
            .ok_or_else(|| ClinicError::not_found("lab order", lab_order_id))
    }

    pub fn list_lab_orders(&self, encounter_id: &str) -> ClinicResult<Vec<LabOrder>> {
        self.machine().get(encounter_id)?;
        Ok(self.db.list_lab_orders(encounter_id)?)
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Finalize the consultation.
    ///
    /// Holds the encounter lock for the whole call, so a concurrent second
    /// completion waits and then fails the mutation guard.
    pub fn complete_consultation(&self, encounter_id: &str) -> ClinicResult<CompletionResult> {
        self.locks.with_encounter(encounter_id, || {
            let tx = self.db.begin_immediate()?;
            let result = self.complete_locked(encounter_id, Utc::now())?;
            tx.commit()?;

            tracing::info!(
                encounter_id,
                prescriptions_processed = result.prescriptions_processed,
                lab_orders_submitted = result.lab_orders_submitted,
                billing_items = result.billing_items.len(),
                "consultation completed"
            );
            Ok(result)
        })
    }

    fn complete_locked(
        &self,
        encounter_id: &str,
        now: DateTime<Utc>,
    ) -> ClinicResult<CompletionResult> {
        let machine = self.machine();
        let encounter = machine.get(encounter_id)?;
        EncounterMachine::ensure_completable(&encounter)?;

        let prescriptions = self.db.list_prescriptions(encounter_id)?;
        let lab_orders = self.db.list_lab_orders(encounter_id)?;

        // a. dispense reserved instant prescriptions
        let ledger = StockLedger::new(self.db);
        let mut dispensations = Vec::new();
        for prescription in prescriptions.iter().filter(|p| p.is_dispensable()) {
            let dispensation = Dispensation::for_prescription(prescription, now);
            self.db.insert_dispensation(&dispensation)?;
            if !self.db.mark_prescription_dispensed(&prescription.id)? {
                return Err(ClinicError::InvalidState {
                    entity: "prescription",
                    id: prescription.id.clone(),
                    state: prescription.status.as_str().to_string(),
                    action: "dispense",
                });
            }
            ledger.record_dispensation(
                &prescription.item_id,
                prescription.quantity,
                &prescription.id,
                encounter_id,
                now,
            )?;
            dispensations.push(dispensation);
        }

        // b. bill every prescription and lab order
        let billing_items = emit_billing(self.db, &encounter, &prescriptions, &lab_orders, now)?;

        // c. submit lab orders
        let lab_orders_submitted = self.db.submit_lab_orders(encounter_id, now)?;

        // d. close the encounter
        let encounter = machine.apply(&encounter, EncounterEvent::Complete, None, now)?;

        Ok(CompletionResult {
            encounter,
            prescriptions_processed: count(dispensations.len()),
            lab_orders_submitted: count(lab_orders_submitted),
            dispensations,
            billing_items,
        })
    }

    // ========================================================================
    // Reads and Notes
    // ========================================================================

    pub fn consultation_summary(&self, encounter_id: &str) -> ClinicResult<ConsultationSummary> {
        let encounter = self.machine().get(encounter_id)?;
        let prescriptions = self.db.list_prescriptions(encounter_id)?;
        let lab_orders = self.db.list_lab_orders(encounter_id)?;
        let emergency = EmergencyDesk::new(self.db).active_context(&encounter.patient_id)?;
        let notes = self.db.get_notes(encounter_id)?;

        let total_prescriptions = count(prescriptions.len());
        let (instant_prescriptions, regular_prescriptions): (Vec<_>, Vec<_>) =
            prescriptions.into_iter().partition(|p| p.instant_dispensing);

        Ok(ConsultationSummary {
            encounter,
            total_prescriptions,
            total_lab_orders: count(lab_orders.len()),
            instant_prescriptions,
            regular_prescriptions,
            lab_orders,
            emergency,
            notes,
        })
    }

    /// Persist free-text notes. Rejected once the encounter is completed.
    pub fn save_notes(
        &self,
        encounter_id: &str,
        notes: &ConsultationNotes,
    ) -> ClinicResult<SavedNotes> {
        self.locks.with_encounter(encounter_id, || {
            let tx = self.db.begin_immediate()?;
            let encounter = self.machine().get(encounter_id)?;
            EncounterMachine::guard_mutation(&encounter)?;

            let now = Utc::now();
            self.db.upsert_notes(encounter_id, notes, now)?;
            tx.commit()?;

            tracing::debug!(encounter_id, "consultation notes saved");
            Ok(SavedNotes {
                encounter_id: encounter_id.to_string(),
                notes: notes.clone(),
                updated_at: now,
            })
        })
    }

    pub fn get_notes(&self, encounter_id: &str) -> ClinicResult<Option<SavedNotes>> {
        self.machine().get(encounter_id)?;
        Ok(self.db.get_notes(encounter_id)?)
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emergency::TriageInput;
    use crate::models::{
        CatalogKind, CatalogPrice, EncounterStatus, LabOrderStatus, LabPriority, MovementType,
        Patient, PrescriptionStatus, StockItem,
    };

    struct Fixture {
        db: Database,
        locks: LockRegistry,
        encounter: Encounter,
    }

    impl Fixture {
        fn service(&self) -> ConsultationService<'_> {
            ConsultationService::new(&self.db, &self.locks, Duration::minutes(30))
        }

        fn rx(&self, item_id: &str, quantity: i64, instant: bool) -> PrescriptionDraft {
            PrescriptionDraft {
                encounter_id: self.encounter.id.clone(),
                item_id: item_id.into(),
                quantity,
                instructions: None,
                instant_dispensing: instant,
            }
        }

        fn lab(&self, code: &str) -> LabOrderDraft {
            LabOrderDraft {
                encounter_id: self.encounter.id.clone(),
                test_code: code.into(),
                priority: LabPriority::Fast,
                clinical_notes: None,
            }
        }

        fn stock(&self, item_id: &str) -> i64 {
            self.db.get_stock_item(item_id).unwrap().unwrap().stock_quantity
        }
    }

    /// Emergency patient, started encounter, priced drugs and tests.
    fn setup() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Elizabeth Blackwell".into());
        let desk = EmergencyDesk::new(&db);
        desk.register_patient(&patient).unwrap();
        desk.admit(
            &patient.id,
            &TriageInput {
                acuity_level: 3,
                chief_complaint: "Laceration".into(),
                assessed_by: "nurse-1".into(),
            },
        )
        .unwrap();

        let ledger = StockLedger::new(&db);
        let catalog = PriceCatalog::new(&db);
        for (id, name, qty, cents) in [("AMOX-500", "Amoxicillin", 10, 120), ("PARA-500", "Paracetamol", 50, 15)] {
            ledger.register_item(&StockItem::new(id.into(), name.into(), qty, 5)).unwrap();
            catalog
                .set_price(&CatalogPrice::new(CatalogKind::Drug, id.into(), name.into(), cents))
                .unwrap();
        }
        catalog
            .set_price(&CatalogPrice::new(CatalogKind::LabTest, "CBC".into(), "Full blood count".into(), 2500))
            .unwrap();

        let machine = EncounterMachine::new(&db);
        let encounter = machine.open(&patient.id).unwrap();
        let encounter = machine.start(&encounter.id, "dr-1").unwrap();
        Fixture {
            db,
            locks: LockRegistry::new(),
            encounter,
        }
    }

    #[test]
    fn test_regular_prescription_leaves_stock() {
        let fx = setup();
        let rx = fx.service().create_prescription(&fx.rx("PARA-500", 20, false)).unwrap();
        assert!(!rx.stock_reserved);
        assert_eq!(fx.stock("PARA-500"), 50);
        assert!(fx.db.movements_for_item("PARA-500").unwrap().is_empty());
    }

    #[test]
    fn test_regular_prescription_unknown_item() {
        let fx = setup();
        let err = fx.service().create_prescription(&fx.rx("NOPE", 1, false)).unwrap_err();
        assert!(matches!(err, ClinicError::NotFound { .. }));
    }

    #[test]
    fn test_delete_reserved_prescription_releases() {
        let fx = setup();
        let service = fx.service();
        let rx = service.create_prescription(&fx.rx("AMOX-500", 5, true)).unwrap();
        assert_eq!(fx.stock("AMOX-500"), 5);

        service.delete_prescription(&rx.id).unwrap();
        assert_eq!(fx.stock("AMOX-500"), 10);
        assert!(fx.db.get_prescription(&rx.id).unwrap().is_none());

        let movements = fx.db.movements_for_item("AMOX-500").unwrap();
        assert_eq!(movements.len(), 2);
        assert_eq!(movements[1].movement_type, MovementType::Release);
        assert_eq!(movements[1].quantity, 5);
    }

    #[test]
    fn test_completion_dispenses_bills_and_submits() {
        let fx = setup();
        let service = fx.service();
        let instant = service.create_prescription(&fx.rx("AMOX-500", 4, true)).unwrap();
        let regular = service.create_prescription(&fx.rx("PARA-500", 10, false)).unwrap();
        service.create_lab_order(&fx.lab("CBC")).unwrap();

        let result = service.complete_consultation(&fx.encounter.id).unwrap();
        assert_eq!(result.encounter.status, EncounterStatus::Completed);
        assert!(result.encounter.consultation_completed_at.is_some());
        assert_eq!(result.prescriptions_processed, 1);
        assert_eq!(result.lab_orders_submitted, 1);
        assert_eq!(result.billing_items.len(), 3);

        let total: i64 = result.billing_items.iter().map(|b| b.total_cents).sum();
        assert_eq!(total, 4 * 120 + 10 * 15 + 2500);

        let instant = fx.db.get_prescription(&instant.id).unwrap().unwrap();
        let regular = fx.db.get_prescription(&regular.id).unwrap().unwrap();
        assert_eq!(instant.status, PrescriptionStatus::Dispensed);
        assert_eq!(regular.status, PrescriptionStatus::Pending);

        let dispensations = fx.db.list_dispensations(&fx.encounter.id).unwrap();
        assert_eq!(dispensations.len(), 1);
        assert_eq!(dispensations[0].quantity_dispensed, 4);

        for order in fx.db.list_lab_orders(&fx.encounter.id).unwrap() {
            assert_eq!(order.status, LabOrderStatus::Submitted);
        }

        // Dispensing does not touch the shelf again
        assert_eq!(fx.stock("AMOX-500"), 6);
        assert!(StockLedger::new(&fx.db).reconcile("AMOX-500").unwrap().is_balanced());
    }

    #[test]
    fn test_missing_price_rolls_back_completion() {
        let fx = setup();
        let service = fx.service();
        let rx = service.create_prescription(&fx.rx("AMOX-500", 2, true)).unwrap();
        service.create_lab_order(&fx.lab("XRAY")).unwrap();

        let err = service.complete_consultation(&fx.encounter.id).unwrap_err();
        assert!(matches!(err, ClinicError::NotFound { .. }));

        let encounter = fx.db.get_encounter(&fx.encounter.id).unwrap().unwrap();
        assert_eq!(encounter.status, EncounterStatus::InProgress);
        assert!(encounter.consultation_completed_at.is_none());
        let rx = fx.db.get_prescription(&rx.id).unwrap().unwrap();
        assert_eq!(rx.status, PrescriptionStatus::Pending);
        assert!(fx.db.list_dispensations(&fx.encounter.id).unwrap().is_empty());
        assert!(fx.db.list_billing_items(&fx.encounter.id).unwrap().is_empty());
        assert_eq!(fx.db.movements_for_item("AMOX-500").unwrap().len(), 1);
    }

    #[test]
    fn test_closed_encounter_rejects_orders_and_notes() {
        let fx = setup();
        let service = fx.service();
        let rx = service.create_prescription(&fx.rx("PARA-500", 1, false)).unwrap();
        service.complete_consultation(&fx.encounter.id).unwrap();

        let closed = |e: ClinicError| matches!(e, ClinicError::EncounterClosed(_));
        assert!(closed(service.create_prescription(&fx.rx("PARA-500", 1, false)).unwrap_err()));
        assert!(closed(service.create_prescription(&fx.rx("AMOX-500", 1, true)).unwrap_err()));
        assert!(closed(service.create_lab_order(&fx.lab("CBC")).unwrap_err()));
        assert!(closed(service.delete_prescription(&rx.id).unwrap_err()));
        assert!(closed(service.save_notes(&fx.encounter.id, &ConsultationNotes::default()).unwrap_err()));
        assert!(closed(service.complete_consultation(&fx.encounter.id).unwrap_err()));
    }

    #[test]
    fn test_complete_waiting_encounter_is_invalid_state() {
        let fx = setup();
        let waiting = EncounterMachine::new(&fx.db).open(&fx.encounter.patient_id).unwrap();
        let err = fx.service().complete_consultation(&waiting.id).unwrap_err();
        assert!(matches!(err, ClinicError::InvalidState { .. }));
    }

    #[test]
    fn test_summary_partitions_prescriptions() {
        let fx = setup();
        let service = fx.service();
        service.create_prescription(&fx.rx("AMOX-500", 1, true)).unwrap();
        service.create_prescription(&fx.rx("PARA-500", 2, false)).unwrap();
        service.create_prescription(&fx.rx("PARA-500", 3, false)).unwrap();
        service.create_lab_order(&fx.lab("CBC")).unwrap();
        service
            .save_notes(
                &fx.encounter.id,
                &ConsultationNotes {
                    assessment: "Superficial wound".into(),
                    ..Default::default()
                },
            )
            .unwrap();

        let summary = service.consultation_summary(&fx.encounter.id).unwrap();
        assert_eq!(summary.total_prescriptions, 3);
        assert_eq!(summary.total_lab_orders, 1);
        assert_eq!(summary.instant_prescriptions.len(), 1);
        assert_eq!(summary.regular_prescriptions.len(), 2);
        assert!(summary.emergency.is_some());
        assert_eq!(summary.notes.unwrap().notes.assessment, "Superficial wound");
    }

    #[test]
    fn test_delete_lab_order() {
        let fx = setup();
        let service = fx.service();
        let order = service.create_lab_order(&fx.lab("CBC")).unwrap();
        service.delete_lab_order(&order.id).unwrap();
        assert!(service.list_lab_orders(&fx.encounter.id).unwrap().is_empty());
        assert!(matches!(
            service.delete_lab_order(&order.id),
            Err(ClinicError::NotFound { .. })
        ));
    }
}
