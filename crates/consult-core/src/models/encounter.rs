//! Encounter models: lifecycle status and consultation notes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Encounter lifecycle status. Only ever advances forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EncounterStatus {
    /// Checked in, waiting for a clinician
    Waiting,
    /// Consultation under way
    InProgress,
    /// Consultation finalized, encounter closed to modification
    Completed,
}

/// Events that drive the encounter lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncounterEvent {
    /// Clinician starts the consultation
    Start,
    /// Clinician finalizes the consultation
    Complete,
}

impl EncounterEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncounterEvent::Start => "start",
            EncounterEvent::Complete => "complete",
        }
    }
}

impl EncounterStatus {
    /// The transition table. `None` means the event is illegal in this state.
    pub fn next(self, event: EncounterEvent) -> Option<EncounterStatus> {
        match (self, event) {
            (EncounterStatus::Waiting, EncounterEvent::Start) => Some(EncounterStatus::InProgress),
            (EncounterStatus::InProgress, EncounterEvent::Complete) => {
                Some(EncounterStatus::Completed)
            }
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, EncounterStatus::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EncounterStatus::Waiting => "waiting",
            EncounterStatus::InProgress => "in_progress",
            EncounterStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(EncounterStatus::Waiting),
            "in_progress" => Some(EncounterStatus::InProgress),
            "completed" => Some(EncounterStatus::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for EncounterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outpatient visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Encounter {
    /// Unique encounter ID
    pub id: String,
    /// Patient local ID
    pub patient_id: String,
    /// Clinician assigned when the consultation starts
    pub clinician_id: Option<String>,
    /// Lifecycle status
    pub status: EncounterStatus,
    /// Set when the consultation starts
    pub consultation_started_at: Option<DateTime<Utc>>,
    /// Set if and only if status is Completed
    pub consultation_completed_at: Option<DateTime<Utc>>,
    /// Intake timestamp
    pub created_at: DateTime<Utc>,
}

impl Encounter {
    /// Create a new encounter at intake.
    pub fn new(patient_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            clinician_id: None,
            status: EncounterStatus::Waiting,
            consultation_started_at: None,
            consultation_completed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }
}

/// Free-text clinical note fields persisted by the draft sync endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConsultationNotes {
    pub chief_complaint: String,
    pub history: String,
    pub examination: String,
    pub assessment: String,
    pub plan: String,
}

/// Stored notes plus their last write time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedNotes {
    pub encounter_id: String,
    pub notes: ConsultationNotes,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert_eq!(
            EncounterStatus::Waiting.next(EncounterEvent::Start),
            Some(EncounterStatus::InProgress)
        );
        assert_eq!(
            EncounterStatus::InProgress.next(EncounterEvent::Complete),
            Some(EncounterStatus::Completed)
        );
    }

    #[test]
    fn test_no_skips_or_reversals() {
        assert_eq!(EncounterStatus::Waiting.next(EncounterEvent::Complete), None);
        assert_eq!(EncounterStatus::InProgress.next(EncounterEvent::Start), None);
        assert_eq!(EncounterStatus::Completed.next(EncounterEvent::Start), None);
        assert_eq!(EncounterStatus::Completed.next(EncounterEvent::Complete), None);
    }

    #[test]
    fn test_transitions_only_move_forward() {
        let states = [
            EncounterStatus::Waiting,
            EncounterStatus::InProgress,
            EncounterStatus::Completed,
        ];
        for state in states {
            for event in [EncounterEvent::Start, EncounterEvent::Complete] {
                if let Some(next) = state.next(event) {
                    assert!(next > state, "{state} -> {next} moved backward");
                }
            }
        }
    }

    #[test]
    fn test_new_encounter_is_waiting() {
        let encounter = Encounter::new("patient-1".into());
        assert_eq!(encounter.status, EncounterStatus::Waiting);
        assert!(encounter.consultation_completed_at.is_none());
        assert!(!encounter.is_closed());
    }
}
