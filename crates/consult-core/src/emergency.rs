//! Patient registration and emergency status.
//!
//! An active (non-discharged) emergency record is the only thing that
//! authorizes instant dispensing.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{EmergencyRecord, Patient, TriageAssessment};

/// Triage details captured at emergency admission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriageInput {
    /// 1 (resuscitation) to 5 (non-urgent)
    pub acuity_level: u8,
    pub chief_complaint: String,
    pub assessed_by: String,
}

/// Emergency record with its most recent triage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmergencyContext {
    pub record: EmergencyRecord,
    pub triage: Option<TriageAssessment>,
}

pub struct EmergencyDesk<'a> {
    db: &'a Database,
}

impl<'a> EmergencyDesk<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn register_patient(&self, patient: &Patient) -> ClinicResult<()> {
        if patient.name.trim().is_empty() {
            return Err(ClinicError::Validation("Patient name cannot be empty".into()));
        }
        self.db.insert_patient(patient)?;
        tracing::debug!(patient_id = %patient.id, "patient registered");
        Ok(())
    }

    pub fn get_patient(&self, patient_id: &str) -> ClinicResult<Patient> {
        self.db
            .get_patient(patient_id)?
            .ok_or_else(|| ClinicError::not_found("patient", patient_id))
    }

    /// Admit a patient to the emergency department with an initial triage.
    pub fn admit(&self, patient_id: &str, triage: &TriageInput) -> ClinicResult<EmergencyContext> {
        if !(1..=5).contains(&triage.acuity_level) {
            return Err(ClinicError::Validation(format!(
                "Acuity level must be between 1 and 5, got {}",
                triage.acuity_level
            )));
        }

        let tx = self.db.begin_immediate()?;
        self.get_patient(patient_id)?;
        if let Some(active) = self.db.get_active_emergency_record(patient_id)? {
            return Err(ClinicError::InvalidState {
                entity: "emergency record",
                id: active.id,
                state: active.status.as_str().to_string(),
                action: "admit",
            });
        }

        let record = EmergencyRecord::admit(patient_id.to_string());
        self.db.insert_emergency_record(&record)?;
        let assessment = TriageAssessment::new(
            record.id.clone(),
            triage.acuity_level,
            triage.chief_complaint.clone(),
            triage.assessed_by.clone(),
        );
        self.db.insert_triage(&assessment)?;
        tx.commit()?;

        tracing::info!(
            patient_id,
            emergency_record_id = %record.id,
            acuity_level = triage.acuity_level,
            "emergency admission"
        );
        Ok(EmergencyContext {
            record,
            triage: Some(assessment),
        })
    }

    /// Discharge the patient's active emergency record.
    pub fn discharge(&self, patient_id: &str) -> ClinicResult<()> {
        self.get_patient(patient_id)?;
        if !self.db.discharge_emergency(patient_id, Utc::now())? {
            return Err(ClinicError::InvalidState {
                entity: "patient",
                id: patient_id.to_string(),
                state: "not in emergency care".into(),
                action: "discharge",
            });
        }
        tracing::info!(patient_id, "emergency discharge");
        Ok(())
    }

    /// Active emergency record and latest triage, if the patient has one.
    pub fn active_context(&self, patient_id: &str) -> ClinicResult<Option<EmergencyContext>> {
        let record = match self.db.get_active_emergency_record(patient_id)? {
            Some(record) => record,
            None => return Ok(None),
        };
        let triage = self.db.get_latest_triage(&record.id)?;
        Ok(Some(EmergencyContext { record, triage }))
    }
}
