//! Stock ledger integration tests: conservation and the append-only trail.

use chrono::Duration;
use consult_core::db::Database;
use consult_core::emergency::{EmergencyDesk, TriageInput};
use consult_core::encounter::EncounterMachine;
use consult_core::ledger::StockLedger;
use consult_core::models::{
    CatalogKind, CatalogPrice, Encounter, Patient, PrescriptionDraft, StockItem,
};
use consult_core::{ConsultationService, LockRegistry, PriceCatalog};
use proptest::prelude::*;

const ITEMS: [&str; 3] = ["SAL-NEB", "HYD-100", "ONDA-4"];
const OPENING: i64 = 20;

fn setup() -> (Database, Encounter) {
    let db = Database::open_in_memory().unwrap();
    let patient = Patient::new("Ledger Patient".into());
    let desk = EmergencyDesk::new(&db);
    desk.register_patient(&patient).unwrap();
    desk.admit(
        &patient.id,
        &TriageInput {
            acuity_level: 3,
            chief_complaint: "Asthma".into(),
            assessed_by: "nurse".into(),
        },
    )
    .unwrap();

    let ledger = StockLedger::new(&db);
    for item in ITEMS {
        ledger
            .register_item(&StockItem::new(item.into(), item.into(), OPENING, 5))
            .unwrap();
        PriceCatalog::new(&db)
            .set_price(&CatalogPrice::new(CatalogKind::Drug, item.into(), item.into(), 100))
            .unwrap();
    }

    let machine = EncounterMachine::new(&db);
    let encounter = machine.open(&patient.id).unwrap();
    let encounter = machine.start(&encounter.id, "dr-1").unwrap();
    (db, encounter)
}

fn draft(encounter: &Encounter, item: usize, quantity: i64) -> PrescriptionDraft {
    PrescriptionDraft {
        encounter_id: encounter.id.clone(),
        item_id: ITEMS[item].into(),
        quantity,
        instructions: None,
        instant_dispensing: true,
    }
}

#[derive(Debug, Clone)]
enum Op {
    Reserve { item: usize, quantity: i64 },
    /// Release the n-th live reservation, modulo the live count
    Release(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..ITEMS.len(), 1i64..12).prop_map(|(item, quantity)| Op::Reserve { item, quantity }),
        any::<usize>().prop_map(Op::Release),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stock_is_conserved(ops in prop::collection::vec(op(), 1..40), complete in any::<bool>()) {
        let (db, encounter) = setup();
        let locks = LockRegistry::new();
        let service = ConsultationService::new(&db, &locks, Duration::minutes(30));
        let ledger = StockLedger::new(&db);

        // (prescription id, item index, quantity)
        let mut live: Vec<(String, usize, i64)> = Vec::new();

        for op in ops {
            match op {
                Op::Reserve { item, quantity } => {
                    let held: i64 = live.iter().filter(|l| l.1 == item).map(|l| l.2).sum();
                    let result = service.create_prescription(&draft(&encounter, item, quantity));
                    if held + quantity <= OPENING {
                        let rx = result.unwrap();
                        live.push((rx.id, item, quantity));
                    } else {
                        prop_assert!(result.is_err());
                    }
                }
                Op::Release(n) => {
                    if live.is_empty() {
                        continue;
                    }
                    let (id, _, _) = live.remove(n % live.len());
                    service.delete_prescription(&id).unwrap();
                }
            }

            for (index, item) in ITEMS.iter().enumerate() {
                let held: i64 = live.iter().filter(|l| l.1 == index).map(|l| l.2).sum();
                let stock = ledger.get_item(item).unwrap().stock_quantity;
                prop_assert!(stock >= 0);
                prop_assert_eq!(stock, OPENING - held);
                prop_assert!(ledger.reconcile(item).unwrap().is_balanced());
            }
        }

        if complete {
            let result = service.complete_consultation(&encounter.id).unwrap();
            prop_assert_eq!(result.prescriptions_processed as usize, live.len());
            for item in ITEMS {
                prop_assert!(ledger.reconcile(item).unwrap().is_balanced());
            }
        }

        prop_assert!(ledger.verify_chain().unwrap().is_intact());
    }
}

#[test]
fn test_movements_are_append_only() {
    let (db, encounter) = setup();
    let locks = LockRegistry::new();
    let service = ConsultationService::new(&db, &locks, Duration::minutes(30));
    let rx = service.create_prescription(&draft(&encounter, 0, 2)).unwrap();

    let movement = db.movements_for_prescription(&rx.id).unwrap().remove(0);
    assert!(db
        .conn()
        .execute("UPDATE stock_movements SET quantity = 0 WHERE seq = ?", [movement.seq])
        .is_err());
    assert!(db
        .conn()
        .execute("DELETE FROM stock_movements WHERE seq = ?", [movement.seq])
        .is_err());
    assert_eq!(db.movements_for_prescription(&rx.id).unwrap(), vec![movement]);
}

#[test]
fn test_chain_links_across_items() {
    let (db, encounter) = setup();
    let locks = LockRegistry::new();
    let service = ConsultationService::new(&db, &locks, Duration::minutes(30));

    let first = service.create_prescription(&draft(&encounter, 0, 1)).unwrap();
    service.create_prescription(&draft(&encounter, 1, 2)).unwrap();
    service.delete_prescription(&first.id).unwrap();
    service.complete_consultation(&encounter.id).unwrap();

    let movements = db.all_movements().unwrap();
    assert_eq!(movements.len(), 4);
    for pair in movements.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].entry_hash);
    }
    let verification = StockLedger::new(&db).verify_chain().unwrap();
    assert!(verification.is_intact());
    assert_eq!(verification.entries, 4);
}
