//! Patient and emergency-status models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// Local UUID
    pub id: String,
    /// Full name
    pub name: String,
    /// Hospital medical record number
    pub medical_record_number: Option<String>,
    /// Date of birth (YYYY-MM-DD)
    pub date_of_birth: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Patient {
    /// Create a new patient with required fields.
    pub fn new(name: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            medical_record_number: None,
            date_of_birth: None,
            created_at: Utc::now(),
        }
    }
}

/// Where a patient stands in the emergency department flow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStatus {
    /// Triaged, waiting for a bed or clinician
    Triaged,
    /// Actively being treated
    InTreatment,
    /// Held for observation
    Observation,
    /// Left the emergency department
    Discharged,
}

impl EmergencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyStatus::Triaged => "triaged",
            EmergencyStatus::InTreatment => "in_treatment",
            EmergencyStatus::Observation => "observation",
            EmergencyStatus::Discharged => "discharged",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "triaged" => Some(EmergencyStatus::Triaged),
            "in_treatment" => Some(EmergencyStatus::InTreatment),
            "observation" => Some(EmergencyStatus::Observation),
            "discharged" => Some(EmergencyStatus::Discharged),
            _ => None,
        }
    }

    /// Any status other than discharged authorizes instant dispensing.
    pub fn is_active(&self) -> bool {
        !matches!(self, EmergencyStatus::Discharged)
    }
}

/// Emergency companion record for a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmergencyRecord {
    pub id: String,
    pub patient_id: String,
    pub status: EmergencyStatus,
    pub admitted_at: DateTime<Utc>,
    pub discharged_at: Option<DateTime<Utc>>,
}

impl EmergencyRecord {
    /// Create an active record for a freshly admitted patient.
    pub fn admit(patient_id: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            status: EmergencyStatus::Triaged,
            admitted_at: Utc::now(),
            discharged_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Triage assessment attached to an emergency record. Read-only for the
/// consultation engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriageAssessment {
    pub id: String,
    pub emergency_record_id: String,
    /// Acuity level, 1 (resuscitation) to 5 (non-urgent)
    pub acuity_level: u8,
    pub chief_complaint: String,
    pub assessed_by: String,
    pub assessed_at: DateTime<Utc>,
}

impl TriageAssessment {
    pub fn new(
        emergency_record_id: String,
        acuity_level: u8,
        chief_complaint: String,
        assessed_by: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            emergency_record_id,
            acuity_level,
            chief_complaint,
            assessed_by,
            assessed_at: Utc::now(),
        }
    }
}
