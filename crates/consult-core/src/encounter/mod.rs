//! Encounter state machine.
//!
//! [`EncounterMachine::apply`] is the only code path that writes
//! `encounters.status`. Every other component asks the machine whether an
//! encounter may be touched ([`EncounterMachine::guard_mutation`]) instead of
//! comparing statuses itself.

use chrono::{DateTime, Utc};

use crate::db::Database;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{Encounter, EncounterEvent, EncounterStatus};

/// Encounter lifecycle operations over one database connection.
pub struct EncounterMachine<'a> {
    db: &'a Database,
}

impl<'a> EncounterMachine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Intake: create a WAITING encounter for an existing patient.
    pub fn open(&self, patient_id: &str) -> ClinicResult<Encounter> {
        if self.db.get_patient(patient_id)?.is_none() {
            return Err(ClinicError::not_found("patient", patient_id));
        }
        let encounter = Encounter::new(patient_id.to_string());
        self.db.insert_encounter(&encounter)?;
        tracing::info!(encounter_id = %encounter.id, patient_id, "encounter opened");
        Ok(encounter)
    }

    pub fn get(&self, encounter_id: &str) -> ClinicResult<Encounter> {
        self.db
            .get_encounter(encounter_id)?
            .ok_or_else(|| ClinicError::not_found("encounter", encounter_id))
    }

    /// WAITING -> IN_PROGRESS, assigning the clinician.
    pub fn start(&self, encounter_id: &str, clinician_id: &str) -> ClinicResult<Encounter> {
        if clinician_id.trim().is_empty() {
            return Err(ClinicError::Validation("Clinician id cannot be empty".into()));
        }

        let tx = self.db.begin_immediate()?;
        let encounter = self.get(encounter_id)?;
        if self.db.get_patient(&encounter.patient_id)?.is_none() {
            return Err(ClinicError::not_found("patient", &encounter.patient_id));
        }
        let started = self.apply(&encounter, EncounterEvent::Start, Some(clinician_id), Utc::now())?;
        tx.commit()?;

        tracing::info!(encounter_id, clinician_id, "consultation started");
        Ok(started)
    }

    /// Fail with `EncounterClosed` if the encounter is COMPLETED.
    pub fn guard_mutation(encounter: &Encounter) -> ClinicResult<()> {
        if encounter.is_closed() {
            return Err(ClinicError::EncounterClosed(encounter.id.clone()));
        }
        Ok(())
    }

    /// Precondition for completion: open and IN_PROGRESS.
    ///
    /// A COMPLETED encounter fails the mutation guard first, so a repeated
    /// completion reports `EncounterClosed` rather than `InvalidState`.
    pub fn ensure_completable(encounter: &Encounter) -> ClinicResult<()> {
        Self::guard_mutation(encounter)?;
        if encounter.status.next(EncounterEvent::Complete).is_none() {
            return Err(invalid_transition(encounter, EncounterEvent::Complete));
        }
        Ok(())
    }

    /// Apply `event` to `encounter` and persist the new status.
    ///
    /// The write is a compare-and-set on the status read by the caller; if
    /// another writer moved the encounter first the call fails with
    /// `InvalidState` for the status it actually holds.
    pub fn apply(
        &self,
        encounter: &Encounter,
        event: EncounterEvent,
        clinician_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> ClinicResult<Encounter> {
        let next = encounter
            .status
            .next(event)
            .ok_or_else(|| invalid_transition(encounter, event))?;

        let applied = self
            .db
            .transition_encounter(&encounter.id, encounter.status, next, clinician_id, at)?;
        let current = self.get(&encounter.id)?;
        if !applied {
            return Err(invalid_transition(&current, event));
        }

        tracing::debug!(
            encounter_id = %encounter.id,
            from = encounter.status.as_str(),
            to = next.as_str(),
            "encounter transitioned"
        );
        Ok(current)
    }
}

fn invalid_transition(encounter: &Encounter, event: EncounterEvent) -> ClinicError {
    ClinicError::InvalidState {
        entity: "encounter",
        id: encounter.id.clone(),
        state: encounter.status.to_string(),
        action: event.as_str(),
    }
}

/// True if moving from `from` to `to` is a single legal step.
pub fn is_legal_step(from: EncounterStatus, to: EncounterStatus) -> bool {
    [EncounterEvent::Start, EncounterEvent::Complete]
        .into_iter()
        .any(|event| from.next(event) == Some(to))
}
