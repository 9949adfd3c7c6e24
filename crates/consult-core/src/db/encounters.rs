//! Encounter and consultation-note database operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::{from_db_time, from_db_time_opt, to_db_time, Database, DbError, DbResult};
use crate::models::{ConsultationNotes, Encounter, EncounterStatus, SavedNotes};

const ENCOUNTER_COLUMNS: &str = "id, patient_id, clinician_id, status, consultation_started_at, \
                                 consultation_completed_at, created_at";

impl Database {
    /// Insert a new encounter.
    pub fn insert_encounter(&self, encounter: &Encounter) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO encounters (
                id, patient_id, clinician_id, status, consultation_started_at,
                consultation_completed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                encounter.id,
                encounter.patient_id,
                encounter.clinician_id,
                encounter.status.as_str(),
                encounter.consultation_started_at.as_ref().map(to_db_time),
                encounter.consultation_completed_at.as_ref().map(to_db_time),
                to_db_time(&encounter.created_at),
            ],
        )?;
        Ok(())
    }

    /// Get an encounter by ID.
    pub fn get_encounter(&self, id: &str) -> DbResult<Option<Encounter>> {
        let sql = format!("SELECT {} FROM encounters WHERE id = ?", ENCOUNTER_COLUMNS);
        self.conn
            .query_row(&sql, [id], EncounterRow::from_row)
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List encounters for a patient, oldest first.
    pub fn list_encounters_for_patient(&self, patient_id: &str) -> DbResult<Vec<Encounter>> {
        let sql = format!(
            "SELECT {} FROM encounters WHERE patient_id = ? ORDER BY created_at",
            ENCOUNTER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], EncounterRow::from_row)?;

        let mut encounters = Vec::new();
        for row in rows {
            encounters.push(row?.try_into()?);
        }
        Ok(encounters)
    }

    /// Compare-and-set the encounter status.
    ///
    /// Writes only if the stored status still equals `from`. Moving to
    /// `InProgress` stamps `consultation_started_at` and the clinician;
    /// moving to `Completed` stamps `consultation_completed_at`.
    /// Returns false when the row was not in `from`.
    pub(crate) fn transition_encounter(
        &self,
        id: &str,
        from: EncounterStatus,
        to: EncounterStatus,
        clinician_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let at = to_db_time(&at);
        let rows_affected = match to {
            EncounterStatus::InProgress => self.conn.execute(
                r#"
                UPDATE encounters
                SET status = ?3, consultation_started_at = ?4,
                    clinician_id = COALESCE(?5, clinician_id)
                WHERE id = ?1 AND status = ?2
                "#,
                params![id, from.as_str(), to.as_str(), at, clinician_id],
            )?,
            EncounterStatus::Completed => self.conn.execute(
                r#"
                UPDATE encounters SET status = ?3, consultation_completed_at = ?4
                WHERE id = ?1 AND status = ?2
                "#,
                params![id, from.as_str(), to.as_str(), at],
            )?,
            EncounterStatus::Waiting => {
                return Err(DbError::Constraint(
                    "Encounters cannot move back to waiting".into(),
                ))
            }
        };
        Ok(rows_affected > 0)
    }

    /// Insert or replace the notes for an encounter.
    pub fn upsert_notes(
        &self,
        encounter_id: &str,
        notes: &ConsultationNotes,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO consultation_notes (
                encounter_id, chief_complaint, history, examination, assessment, plan, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(encounter_id) DO UPDATE SET
                chief_complaint = excluded.chief_complaint,
                history = excluded.history,
                examination = excluded.examination,
                assessment = excluded.assessment,
                plan = excluded.plan,
                updated_at = excluded.updated_at
            "#,
            params![
                encounter_id,
                notes.chief_complaint,
                notes.history,
                notes.examination,
                notes.assessment,
                notes.plan,
                to_db_time(&at),
            ],
        )?;
        Ok(())
    }

    /// Get the stored notes for an encounter.
    pub fn get_notes(&self, encounter_id: &str) -> DbResult<Option<SavedNotes>> {
        self.conn
            .query_row(
                r#"
                SELECT encounter_id, chief_complaint, history, examination, assessment, plan, updated_at
                FROM consultation_notes
                WHERE encounter_id = ?
                "#,
                [encounter_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        ConsultationNotes {
                            chief_complaint: row.get(1)?,
                            history: row.get(2)?,
                            examination: row.get(3)?,
                            assessment: row.get(4)?,
                            plan: row.get(5)?,
                        },
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?
            .map(|(encounter_id, notes, updated_at)| {
                Ok(SavedNotes {
                    encounter_id,
                    notes,
                    updated_at: from_db_time(&updated_at)?,
                })
            })
            .transpose()
    }
}

/// Intermediate row struct for database mapping.
struct EncounterRow {
    id: String,
    patient_id: String,
    clinician_id: Option<String>,
    status: String,
    consultation_started_at: Option<String>,
    consultation_completed_at: Option<String>,
    created_at: String,
}

impl EncounterRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            clinician_id: row.get(2)?,
            status: row.get(3)?,
            consultation_started_at: row.get(4)?,
            consultation_completed_at: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl TryFrom<EncounterRow> for Encounter {
    type Error = DbError;

    fn try_from(row: EncounterRow) -> Result<Self, Self::Error> {
        let status = EncounterStatus::parse(&row.status)
            .ok_or_else(|| DbError::Constraint(format!("Unknown encounter status: {}", row.status)))?;
        Ok(Encounter {
            id: row.id,
            patient_id: row.patient_id,
            clinician_id: row.clinician_id,
            status,
            consultation_started_at: from_db_time_opt(row.consultation_started_at)?,
            consultation_completed_at: from_db_time_opt(row.consultation_completed_at)?,
            created_at: from_db_time(&row.created_at)?,
        })
    }
}
