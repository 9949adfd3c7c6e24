//! Billing export for the downstream billing system.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::{ClinicError, ClinicResult};
use crate::models::{BillingItem, Encounter};

/// Billing export for a single completed encounter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingExport {
    pub metadata: BillingMetadata,
    pub line_items: Vec<BillingLineItem>,
    /// Sum of all line totals
    pub total_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingMetadata {
    pub encounter_id: String,
    pub patient_id: String,
    pub clinician_id: Option<String>,
    pub completed_at: Option<String>,
    pub exported_at: String,
    /// Head of the stock audit chain when the export was taken
    pub audit_chain_head: Option<String>,
}

/// Single line item for billing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingLineItem {
    /// "prescription" or "lab_order"
    pub source: String,
    pub source_id: String,
    pub code: String,
    pub description: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub total_cents: i64,
}

impl From<&BillingItem> for BillingLineItem {
    fn from(item: &BillingItem) -> Self {
        Self {
            source: item.source.as_str().to_string(),
            source_id: item.source_id.clone(),
            code: item.code.clone(),
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price_cents: item.unit_price_cents,
            total_cents: item.total_cents,
        }
    }
}

impl BillingExport {
    pub fn from_items(
        encounter: &Encounter,
        items: &[BillingItem],
        audit_chain_head: Option<String>,
        exported_at: DateTime<Utc>,
    ) -> Self {
        let line_items: Vec<BillingLineItem> = items.iter().map(BillingLineItem::from).collect();
        let total_cents = line_items.iter().map(|item| item.total_cents).sum();

        Self {
            metadata: BillingMetadata {
                encounter_id: encounter.id.clone(),
                patient_id: encounter.patient_id.clone(),
                clinician_id: encounter.clinician_id.clone(),
                completed_at: encounter
                    .consultation_completed_at
                    .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
                exported_at: exported_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                audit_chain_head,
            },
            line_items,
            total_cents,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut csv = String::from(CSV_HEADER);
        self.write_csv_rows(&mut csv);
        csv
    }

    fn write_csv_rows(&self, csv: &mut String) {
        for item in &self.line_items {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{},{},{}\n",
                escape_csv(&self.metadata.encounter_id),
                escape_csv(&self.metadata.patient_id),
                escape_csv(&item.source),
                escape_csv(&item.source_id),
                escape_csv(&item.code),
                escape_csv(&item.description),
                item.quantity,
                item.unit_price_cents,
                item.total_cents,
            ));
        }
    }
}

const CSV_HEADER: &str =
    "encounter_id,patient_id,source,source_id,code,description,quantity,unit_price_cents,total_cents\n";

/// All completed encounters for one patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchBillingExport {
    pub exported_at: String,
    pub encounters: Vec<BillingExport>,
    pub total_items: usize,
    pub total_cents: i64,
}

impl BatchBillingExport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut csv = String::from(CSV_HEADER);
        for export in &self.encounters {
            export.write_csv_rows(&mut csv);
        }
        csv
    }
}

pub struct BillingExporter<'a> {
    db: &'a Database,
}

impl<'a> BillingExporter<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Export the billing items emitted when the encounter completed.
    pub fn export_encounter(&self, encounter_id: &str) -> ClinicResult<BillingExport> {
        let encounter = self
            .db
            .get_encounter(encounter_id)?
            .ok_or_else(|| ClinicError::not_found("encounter", encounter_id))?;
        if !encounter.is_closed() {
            return Err(ClinicError::InvalidState {
                entity: "encounter",
                id: encounter.id,
                state: encounter.status.to_string(),
                action: "export billing",
            });
        }

        let items = self.db.list_billing_items(encounter_id)?;
        let head = self.db.last_movement_hash()?;
        Ok(BillingExport::from_items(&encounter, &items, head, Utc::now()))
    }

    /// Export every completed encounter of a patient, oldest first.
    pub fn export_patient(&self, patient_id: &str) -> ClinicResult<BatchBillingExport> {
        if self.db.get_patient(patient_id)?.is_none() {
            return Err(ClinicError::not_found("patient", patient_id));
        }

        let head = self.db.last_movement_hash()?;
        let now = Utc::now();
        let mut encounters = Vec::new();
        for encounter in self.db.list_encounters_for_patient(patient_id)? {
            if !encounter.is_closed() {
                continue;
            }
            let items = self.db.list_billing_items(&encounter.id)?;
            encounters.push(BillingExport::from_items(&encounter, &items, head.clone(), now));
        }

        Ok(BatchBillingExport {
            exported_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            total_items: encounters.iter().map(|e| e.line_items.len()).sum(),
            total_cents: encounters.iter().map(|e| e.total_cents).sum(),
            encounters,
        })
    }
}

/// Escape a string for CSV output.
fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
