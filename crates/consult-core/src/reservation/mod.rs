//! Reservation manager: instant-dispensing stock holds and their release.
//!
//! A reservation takes the encounter lock, then the stock item lock, then an
//! IMMEDIATE transaction. Inside it the encounter guard, the emergency
//! check, the stock decrement, the prescription row and the movement all
//! commit together or not at all.

mod locks;
mod sweeper;

pub use locks::*;
pub use sweeper::*;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::encounter::EncounterMachine;
use crate::error::{ClinicError, ClinicResult};
use crate::ledger::StockLedger;
use crate::models::{Prescription, PrescriptionDraft, PrescriptionStatus};

/// A reservation returned to the shelf by the expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleasedReservation {
    pub prescription_id: String,
    pub encounter_id: String,
    pub item_id: String,
    pub quantity: i64,
    pub reserved_at: DateTime<Utc>,
    pub released_at: DateTime<Utc>,
}

/// A reservation the sweep could not release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepFailure {
    pub prescription_id: String,
    pub error: String,
}

/// Result of one expiry sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SweepReport {
    pub released: Vec<ReleasedReservation>,
    pub failed: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.released.is_empty() && self.failed.is_empty()
    }
}

/// Reserves and releases stock on behalf of prescriptions.
pub struct ReservationManager<'a> {
    db: &'a Database,
    locks: &'a LockRegistry,
    ttl: Duration,
}

impl<'a> ReservationManager<'a> {
    pub fn new(db: &'a Database, locks: &'a LockRegistry, ttl: Duration) -> Self {
        Self { db, locks, ttl }
    }

    /// Create an instant-dispensing prescription and hold its stock.
    pub fn reserve(&self, draft: &PrescriptionDraft) -> ClinicResult<Prescription> {
        validate_reservation(draft)?;
        self.locks
            .with_encounter_and_item(&draft.encounter_id, &draft.item_id, || {
                let tx = self.db.begin_immediate()?;
                let prescription = self.reserve_locked(draft, Utc::now())?;
                tx.commit()?;
                Ok(prescription)
            })
    }

    /// Reservation body. Caller holds both locks and an open transaction.
    fn reserve_locked(
        &self,
        draft: &PrescriptionDraft,
        now: DateTime<Utc>,
    ) -> ClinicResult<Prescription> {
        let machine = EncounterMachine::new(self.db);
        let encounter = machine.get(&draft.encounter_id)?;
        EncounterMachine::guard_mutation(&encounter)?;

        if !self.db.has_active_emergency(&encounter.patient_id)? {
            tracing::debug!(
                encounter_id = %encounter.id,
                patient_id = %encounter.patient_id,
                "instant dispensing refused for non-emergency patient"
            );
            return Err(ClinicError::NotEmergencyPatient);
        }

        let prescription = Prescription::reserved(draft, now);
        StockLedger::new(self.db).withdraw(
            &draft.item_id,
            draft.quantity,
            &prescription.id,
            &encounter.id,
            now,
        )?;
        self.db.insert_prescription(&prescription)?;

        tracing::info!(
            encounter_id = %encounter.id,
            prescription_id = %prescription.id,
            item_id = %prescription.item_id,
            quantity = prescription.quantity,
            "stock reserved"
        );
        Ok(prescription)
    }

    /// Return a reserved prescription's stock to the shelf.
    pub fn release(&self, prescription_id: &str) -> ClinicResult<Prescription> {
        let prescription = self.get_prescription(prescription_id)?;
        self.locks.with_encounter_and_item(
            &prescription.encounter_id,
            &prescription.item_id,
            || {
                let tx = self.db.begin_immediate()?;
                let released = self.release_locked(prescription_id, Utc::now())?;
                tx.commit()?;
                Ok(released)
            },
        )
    }

    /// Release body. Caller holds both locks and an open transaction.
    pub(crate) fn release_locked(
        &self,
        prescription_id: &str,
        now: DateTime<Utc>,
    ) -> ClinicResult<Prescription> {
        let prescription = self.get_prescription(prescription_id)?;
        let encounter = EncounterMachine::new(self.db).get(&prescription.encounter_id)?;
        EncounterMachine::guard_mutation(&encounter)?;

        if !prescription.stock_reserved || prescription.status != PrescriptionStatus::Pending {
            let state = if prescription.stock_reserved {
                prescription.status.as_str()
            } else {
                "unreserved"
            };
            return Err(ClinicError::InvalidState {
                entity: "prescription",
                id: prescription.id,
                state: state.to_string(),
                action: "release",
            });
        }

        StockLedger::new(self.db).restore(
            &prescription.item_id,
            prescription.quantity,
            &prescription.id,
            &prescription.encounter_id,
            now,
        )?;
        if !self.db.mark_prescription_released(&prescription.id)? {
            return Err(ClinicError::InvalidState {
                entity: "prescription",
                id: prescription.id,
                state: "unreserved".to_string(),
                action: "release",
            });
        }

        tracing::info!(
            encounter_id = %prescription.encounter_id,
            prescription_id = %prescription.id,
            item_id = %prescription.item_id,
            quantity = prescription.quantity,
            "stock released"
        );
        Ok(Prescription {
            stock_reserved: false,
            stock_reserved_at: None,
            ..prescription
        })
    }

    /// True when the reservation has outlived the TTL.
    pub fn is_expired(&self, prescription: &Prescription, now: DateTime<Utc>) -> bool {
        prescription.is_expired(now, self.ttl)
    }

    /// Release every reservation older than the TTL on an open encounter.
    ///
    /// Each release runs in its own transaction, so one failure does not
    /// hold back the rest.
    pub fn release_expired(&self, now: DateTime<Utc>) -> ClinicResult<SweepReport> {
        let candidates: Vec<Prescription> = self
            .db
            .list_reserved_prescriptions()?
            .into_iter()
            .filter(|p| self.is_expired(p, now))
            .collect();

        let mut report = SweepReport::default();
        for candidate in candidates {
            let outcome = self.locks.with_encounter_and_item(
                &candidate.encounter_id,
                &candidate.item_id,
                || self.release_if_expired(&candidate.id, now),
            );
            match outcome {
                Ok(Some(released)) => {
                    tracing::warn!(
                        encounter_id = %released.encounter_id,
                        prescription_id = %released.prescription_id,
                        item_id = %released.item_id,
                        quantity = released.quantity,
                        reserved_at = %released.reserved_at,
                        "expired reservation released"
                    );
                    report.released.push(released);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(prescription_id = %candidate.id, error = %e, "expiry sweep failed");
                    report.failed.push(SweepFailure {
                        prescription_id: candidate.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            released = report.released.len(),
            failed = report.failed.len(),
            "reservation sweep finished"
        );
        Ok(report)
    }

    /// Re-check one candidate under its locks and release it if still due.
    fn release_if_expired(
        &self,
        prescription_id: &str,
        now: DateTime<Utc>,
    ) -> ClinicResult<Option<ReleasedReservation>> {
        let tx = self.db.begin_immediate()?;

        // State may have moved since the candidate list was read
        let prescription = match self.db.get_prescription(prescription_id)? {
            Some(p) => p,
            None => return Ok(None),
        };
        let reserved_at = match prescription.stock_reserved_at {
            Some(at) if prescription.status == PrescriptionStatus::Pending => at,
            _ => return Ok(None),
        };
        if !self.is_expired(&prescription, now) {
            return Ok(None);
        }
        let encounter = EncounterMachine::new(self.db).get(&prescription.encounter_id)?;
        if encounter.is_closed() {
            return Ok(None);
        }

        self.release_locked(prescription_id, now)?;
        tx.commit()?;

        Ok(Some(ReleasedReservation {
            prescription_id: prescription.id,
            encounter_id: prescription.encounter_id,
            item_id: prescription.item_id,
            quantity: prescription.quantity,
            reserved_at,
            released_at: now,
        }))
    }

    fn get_prescription(&self, prescription_id: &str) -> ClinicResult<Prescription> {
        self.db
            .get_prescription(prescription_id)?
            .ok_or_else(|| ClinicError::not_found("prescription", prescription_id))
    }
}

/// Input checks that need no database access.
pub(crate) fn validate_reservation(draft: &PrescriptionDraft) -> ClinicResult<()> {
    if draft.quantity <= 0 {
        return Err(ClinicError::Validation(format!(
            "Prescription quantity must be positive, got {}",
            draft.quantity
        )));
    }
    if draft.item_id.trim().is_empty() {
        return Err(ClinicError::Validation("Prescription needs a stock item".into()));
    }
    if !draft.instant_dispensing {
        return Err(ClinicError::Validation(
            "Only instant-dispensing prescriptions reserve stock".into(),
        ));
    }
    Ok(())
}
