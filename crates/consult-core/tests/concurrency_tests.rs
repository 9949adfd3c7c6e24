//! File-backed concurrency tests through the engine facade.

use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{Duration, Utc};
use consult_core::{
    ClinicConfig, ClinicCore, ClinicFfiError, FfiPrescriptionDraft, StockLedger, SweepTarget,
};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn open_core(dir: &TempDir) -> Arc<ClinicCore> {
    init_tracing();
    let config = ClinicConfig::default().with_database_path(dir.path().join("clinic.db"));
    Arc::new(ClinicCore::with_config(config).unwrap())
}

/// Emergency patient plus `count` started encounters.
fn started_encounters(core: &ClinicCore, count: usize) -> Vec<String> {
    let patient = core.register_patient("Concurrent Patient".into(), None, None).unwrap();
    core.admit_emergency(patient.id.clone(), 1, "Polytrauma".into(), "nurse".into())
        .unwrap();
    (0..count)
        .map(|_| {
            let encounter = core.open_encounter(patient.id.clone()).unwrap();
            core.start_consultation(encounter.id.clone(), "dr-1".into()).unwrap();
            encounter.id
        })
        .collect()
}

fn reserve(core: &ClinicCore, encounter_id: &str, item_id: &str, quantity: i64) -> Result<String, ClinicFfiError> {
    core.create_prescription(FfiPrescriptionDraft {
        encounter_id: encounter_id.to_string(),
        item_id: item_id.to_string(),
        quantity,
        instructions: None,
        instant_dispensing: true,
    })
    .map(|rx| rx.id)
}

#[test]
fn test_parallel_reservations_never_oversell() {
    let dir = TempDir::new().unwrap();
    let core = open_core(&dir);
    core.register_stock_item("EPI-1MG".into(), "Epinephrine 1mg".into(), 10, 2).unwrap();
    let encounters = started_encounters(&core, 8);

    let barrier = Arc::new(Barrier::new(encounters.len()));
    let handles: Vec<_> = encounters
        .into_iter()
        .map(|encounter_id| {
            let core = Arc::clone(&core);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                reserve(&core, &encounter_id, "EPI-1MG", 3)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let granted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(granted, 3);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(result, Err(ClinicFfiError::InsufficientStock(_))));
    }

    assert_eq!(core.get_stock_item("EPI-1MG".into()).unwrap().stock_quantity, 1);
    assert_eq!(core.verify_audit_chain().unwrap(), None);
}

#[test]
fn test_separate_engines_on_one_file_never_oversell() {
    let dir = TempDir::new().unwrap();
    let first = open_core(&dir);
    let second = open_core(&dir);
    first.register_stock_item("ADEN-6".into(), "Adenosine 6mg".into(), 5, 0).unwrap();
    let encounters = started_encounters(&first, 6);

    let handles: Vec<_> = encounters
        .into_iter()
        .enumerate()
        .map(|(i, encounter_id)| {
            // No shared lock registry between the two engines
            let core = if i % 2 == 0 { Arc::clone(&first) } else { Arc::clone(&second) };
            thread::spawn(move || reserve(&core, &encounter_id, "ADEN-6", 2))
        })
        .collect();

    let granted = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|r| r.is_ok())
        .count();
    assert_eq!(granted, 2);
    assert_eq!(second.get_stock_item("ADEN-6".into()).unwrap().stock_quantity, 1);

    let reconciliation = first
        .with_db(|db| StockLedger::new(db).reconcile("ADEN-6"))
        .unwrap();
    assert!(reconciliation.is_balanced());
}

#[test]
fn test_concurrent_completion_runs_once() {
    let dir = TempDir::new().unwrap();
    let core = open_core(&dir);
    core.register_stock_item("KET-50".into(), "Ketamine 50mg".into(), 20, 0).unwrap();
    core.set_catalog_price("drug".into(), "KET-50".into(), "Ketamine 50mg".into(), 850)
        .unwrap();
    let encounter_id = started_encounters(&core, 1).remove(0);
    reserve(&core, &encounter_id, "KET-50", 4).unwrap();

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let core = Arc::clone(&core);
            let barrier = Arc::clone(&barrier);
            let encounter_id = encounter_id.clone();
            thread::spawn(move || {
                barrier.wait();
                core.complete_consultation(encounter_id)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(matches!(result, Err(ClinicFfiError::EncounterClosed(_))));
    }

    let dispensations = core
        .with_db(|db| Ok(db.list_dispensations(&encounter_id)?))
        .unwrap();
    assert_eq!(dispensations.len(), 1);
    // Dispensing consumed the reservation; the shelf was decremented once
    assert_eq!(core.get_stock_item("KET-50".into()).unwrap().stock_quantity, 16);
}

#[test]
fn test_sweep_releases_expired_reservations() {
    let dir = TempDir::new().unwrap();
    let core = open_core(&dir);
    core.register_stock_item("TXA-1G".into(), "Tranexamic acid 1g".into(), 10, 0).unwrap();
    let encounters = started_encounters(&core, 2);
    let stale = reserve(&core, &encounters[0], "TXA-1G", 4).unwrap();
    let other = reserve(&core, &encounters[1], "TXA-1G", 1).unwrap();

    // Nothing is old enough yet
    assert!(core.sweep_expired_reservations().unwrap().is_empty());

    let report = core.sweep(Utc::now() + Duration::minutes(31)).unwrap();
    let released: Vec<_> = report.released.iter().map(|r| r.prescription_id.clone()).collect();
    assert!(released.contains(&stale));
    assert!(released.contains(&other));
    assert!(report.failed.is_empty());
    assert_eq!(core.get_stock_item("TXA-1G".into()).unwrap().stock_quantity, 10);

    // Second sweep finds nothing left
    let again = core.sweep(Utc::now() + Duration::minutes(31)).unwrap();
    assert!(again.is_empty());
}

#[test]
fn test_sweep_skips_completed_encounters() {
    let dir = TempDir::new().unwrap();
    let core = open_core(&dir);
    core.register_stock_item("TXA-1G".into(), "Tranexamic acid 1g".into(), 10, 0).unwrap();
    core.set_catalog_price("drug".into(), "TXA-1G".into(), "Tranexamic acid 1g".into(), 1200)
        .unwrap();
    let encounter_id = started_encounters(&core, 1).remove(0);
    reserve(&core, &encounter_id, "TXA-1G", 2).unwrap();
    core.complete_consultation(encounter_id).unwrap();

    let report = core.sweep(Utc::now() + Duration::hours(2)).unwrap();
    assert!(report.is_empty());
    assert_eq!(core.get_stock_item("TXA-1G".into()).unwrap().stock_quantity, 8);
}

#[test]
fn test_state_survives_reopen() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let encounter_id = {
        let core = open_core(&dir);
        core.register_stock_item("NAL-04".into(), "Naloxone 0.4mg".into(), 6, 1)?;
        let encounter_id = started_encounters(&core, 1).remove(0);
        reserve(&core, &encounter_id, "NAL-04", 2)?;
        encounter_id
    };

    let core = open_core(&dir);
    let summary = core.get_consultation_summary(encounter_id)?;
    assert_eq!(summary.encounter.status, "in_progress");
    assert_eq!(summary.instant_prescriptions.len(), 1);
    assert!(summary.emergency.is_some());
    assert_eq!(core.get_stock_item("NAL-04".into())?.stock_quantity, 4);
    assert_eq!(core.verify_audit_chain()?, None);
    Ok(())
}
