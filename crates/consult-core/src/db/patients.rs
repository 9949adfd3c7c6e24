//! Patient, emergency record and triage database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{from_db_time, from_db_time_opt, to_db_time, Database, DbError, DbResult};
use crate::models::{EmergencyRecord, EmergencyStatus, Patient, TriageAssessment};

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO patients (id, name, medical_record_number, date_of_birth, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                patient.id,
                patient.name,
                patient.medical_record_number,
                patient.date_of_birth,
                to_db_time(&patient.created_at),
            ],
        )?;
        Ok(())
    }

    /// Get a patient by ID.
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        self.conn
            .query_row(
                r#"
                SELECT id, name, medical_record_number, date_of_birth, created_at
                FROM patients
                WHERE id = ?
                "#,
                [id],
                |row| {
                    Ok(PatientRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        medical_record_number: row.get(2)?,
                        date_of_birth: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Insert an emergency record.
    pub fn insert_emergency_record(&self, record: &EmergencyRecord) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO emergency_records (id, patient_id, status, admitted_at, discharged_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.id,
                record.patient_id,
                record.status.as_str(),
                to_db_time(&record.admitted_at),
                record.discharged_at.as_ref().map(to_db_time),
            ],
        )?;
        Ok(())
    }

    /// Get the patient's non-discharged emergency record, if any.
    pub fn get_active_emergency_record(&self, patient_id: &str) -> DbResult<Option<EmergencyRecord>> {
        self.conn
            .query_row(
                r#"
                SELECT id, patient_id, status, admitted_at, discharged_at
                FROM emergency_records
                WHERE patient_id = ? AND status <> 'discharged'
                "#,
                [patient_id],
                |row| {
                    Ok(EmergencyRow {
                        id: row.get(0)?,
                        patient_id: row.get(1)?,
                        status: row.get(2)?,
                        admitted_at: row.get(3)?,
                        discharged_at: row.get(4)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Whether the patient currently holds an active emergency record.
    pub fn has_active_emergency(&self, patient_id: &str) -> DbResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM emergency_records WHERE patient_id = ? AND status <> 'discharged'",
            [patient_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Move an active emergency record to a new non-discharged status.
    pub fn update_emergency_status(&self, record_id: &str, status: EmergencyStatus) -> DbResult<bool> {
        if !status.is_active() {
            return Err(DbError::Constraint(
                "Use discharge_emergency to discharge a patient".into(),
            ));
        }
        let rows_affected = self.conn.execute(
            "UPDATE emergency_records SET status = ?2 WHERE id = ?1 AND status <> 'discharged'",
            params![record_id, status.as_str()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Discharge the patient's active emergency record.
    pub fn discharge_emergency(&self, patient_id: &str, at: DateTime<Utc>) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE emergency_records SET status = 'discharged', discharged_at = ?2
            WHERE patient_id = ?1 AND status <> 'discharged'
            "#,
            params![patient_id, to_db_time(&at)],
        )?;
        Ok(rows_affected > 0)
    }

    /// Insert a triage assessment.
    pub fn insert_triage(&self, triage: &TriageAssessment) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO triage_assessments (
                id, emergency_record_id, acuity_level, chief_complaint, assessed_by, assessed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                triage.id,
                triage.emergency_record_id,
                triage.acuity_level,
                triage.chief_complaint,
                triage.assessed_by,
                to_db_time(&triage.assessed_at),
            ],
        )?;
        Ok(())
    }

    /// Most recent triage assessment for an emergency record.
    pub fn get_latest_triage(&self, emergency_record_id: &str) -> DbResult<Option<TriageAssessment>> {
        self.conn
            .query_row(
                r#"
                SELECT id, emergency_record_id, acuity_level, chief_complaint, assessed_by, assessed_at
                FROM triage_assessments
                WHERE emergency_record_id = ?
                ORDER BY assessed_at DESC
                LIMIT 1
                "#,
                [emergency_record_id],
                |row| {
                    Ok(TriageRow {
                        id: row.get(0)?,
                        emergency_record_id: row.get(1)?,
                        acuity_level: row.get(2)?,
                        chief_complaint: row.get(3)?,
                        assessed_by: row.get(4)?,
                        assessed_at: row.get(5)?,
                    })
                },
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }
}

/// Intermediate row struct for database mapping.
struct PatientRow {
    id: String,
    name: String,
    medical_record_number: Option<String>,
    date_of_birth: Option<String>,
    created_at: String,
}

impl TryFrom<PatientRow> for Patient {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        Ok(Patient {
            id: row.id,
            name: row.name,
            medical_record_number: row.medical_record_number,
            date_of_birth: row.date_of_birth,
            created_at: from_db_time(&row.created_at)?,
        })
    }
}

struct EmergencyRow {
    id: String,
    patient_id: String,
    status: String,
    admitted_at: String,
    discharged_at: Option<String>,
}

impl TryFrom<EmergencyRow> for EmergencyRecord {
    type Error = DbError;

    fn try_from(row: EmergencyRow) -> Result<Self, Self::Error> {
        let status = EmergencyStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown emergency status: {}", row.status)))?;
        Ok(EmergencyRecord {
            id: row.id,
            patient_id: row.patient_id,
            status,
            admitted_at: from_db_time(&row.admitted_at)?,
            discharged_at: from_db_time_opt(row.discharged_at)?,
        })
    }
}

struct TriageRow {
    id: String,
    emergency_record_id: String,
    acuity_level: u8,
    chief_complaint: String,
    assessed_by: String,
    assessed_at: String,
}

impl TryFrom<TriageRow> for TriageAssessment {
    type Error = DbError;

    fn try_from(row: TriageRow) -> Result<Self, Self::Error> {
        Ok(TriageAssessment {
            id: row.id,
            emergency_record_id: row.emergency_record_id,
            acuity_level: row.acuity_level,
            chief_complaint: row.chief_complaint,
            assessed_by: row.assessed_by,
            assessed_at: from_db_time(&row.assessed_at)?,
        })
    }
}
