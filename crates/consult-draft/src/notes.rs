//! Free-text note fields edited during a consultation.

use serde::{Deserialize, Serialize};

/// One editable note field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NoteField {
    ChiefComplaint,
    History,
    Examination,
    Assessment,
    Plan,
}

impl NoteField {
    pub const ALL: [NoteField; 5] = [
        NoteField::ChiefComplaint,
        NoteField::History,
        NoteField::Examination,
        NoteField::Assessment,
        NoteField::Plan,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteField::ChiefComplaint => "chief_complaint",
            NoteField::History => "history",
            NoteField::Examination => "examination",
            NoteField::Assessment => "assessment",
            NoteField::Plan => "plan",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == s)
    }
}

/// The note buffer sent to the server on save.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteFields {
    pub chief_complaint: String,
    pub history: String,
    pub examination: String,
    pub assessment: String,
    pub plan: String,
}

impl NoteFields {
    pub fn get(&self, field: NoteField) -> &str {
        match field {
            NoteField::ChiefComplaint => &self.chief_complaint,
            NoteField::History => &self.history,
            NoteField::Examination => &self.examination,
            NoteField::Assessment => &self.assessment,
            NoteField::Plan => &self.plan,
        }
    }

    pub fn set(&mut self, field: NoteField, text: String) {
        let slot = match field {
            NoteField::ChiefComplaint => &mut self.chief_complaint,
            NoteField::History => &mut self.history,
            NoteField::Examination => &mut self.examination,
            NoteField::Assessment => &mut self.assessment,
            NoteField::Plan => &mut self.plan,
        };
        *slot = text;
    }

    pub fn is_empty(&self) -> bool {
        NoteField::ALL.iter().all(|f| self.get(*f).is_empty())
    }
}
