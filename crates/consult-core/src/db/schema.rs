//! SQLite schema definition.

/// Complete database schema for the consultation engine.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Patients and Emergency Status
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    medical_record_number TEXT,
    date_of_birth TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_patients_mrn ON patients(medical_record_number);

CREATE TABLE IF NOT EXISTS emergency_records (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    status TEXT NOT NULL CHECK (status IN ('triaged', 'in_treatment', 'observation', 'discharged')),
    admitted_at TEXT NOT NULL,
    discharged_at TEXT
);

-- At most one non-discharged record per patient
CREATE UNIQUE INDEX IF NOT EXISTS idx_emergency_active
    ON emergency_records(patient_id) WHERE status <> 'discharged';

CREATE TABLE IF NOT EXISTS triage_assessments (
    id TEXT PRIMARY KEY,
    emergency_record_id TEXT NOT NULL REFERENCES emergency_records(id),
    acuity_level INTEGER NOT NULL CHECK (acuity_level BETWEEN 1 AND 5),
    chief_complaint TEXT NOT NULL,
    assessed_by TEXT NOT NULL,
    assessed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_triage_record ON triage_assessments(emergency_record_id);

-- ============================================================================
-- Encounters
-- ============================================================================

CREATE TABLE IF NOT EXISTS encounters (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    clinician_id TEXT,
    status TEXT NOT NULL DEFAULT 'waiting' CHECK (status IN ('waiting', 'in_progress', 'completed')),
    consultation_started_at TEXT,
    consultation_completed_at TEXT,
    created_at TEXT NOT NULL,
    CHECK ((status = 'completed') = (consultation_completed_at IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_encounters_patient ON encounters(patient_id);
CREATE INDEX IF NOT EXISTS idx_encounters_status ON encounters(status);

CREATE TABLE IF NOT EXISTS consultation_notes (
    encounter_id TEXT PRIMARY KEY REFERENCES encounters(id),
    chief_complaint TEXT NOT NULL DEFAULT '',
    history TEXT NOT NULL DEFAULT '',
    examination TEXT NOT NULL DEFAULT '',
    assessment TEXT NOT NULL DEFAULT '',
    plan TEXT NOT NULL DEFAULT '',
    updated_at TEXT NOT NULL
);

-- ============================================================================
-- Price Catalog
-- ============================================================================

CREATE TABLE IF NOT EXISTS catalog_prices (
    kind TEXT NOT NULL CHECK (kind IN ('drug', 'lab_test')),
    code TEXT NOT NULL,
    name TEXT NOT NULL,
    unit_price_cents INTEGER NOT NULL CHECK (unit_price_cents >= 0),
    updated_at TEXT NOT NULL,
    PRIMARY KEY (kind, code)
);

-- ============================================================================
-- Stock Ledger
-- ============================================================================

CREATE TABLE IF NOT EXISTS stock_items (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    stock_quantity INTEGER NOT NULL CHECK (stock_quantity >= 0),
    reorder_level INTEGER NOT NULL DEFAULT 0,
    opening_quantity INTEGER NOT NULL CHECK (opening_quantity >= 0),
    created_at TEXT NOT NULL
);

-- Append-only audit trail, hash chained in seq order
CREATE TABLE IF NOT EXISTS stock_movements (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    item_id TEXT NOT NULL REFERENCES stock_items(id),
    movement_type TEXT NOT NULL CHECK (movement_type IN ('reservation', 'release', 'dispensation')),
    quantity INTEGER NOT NULL,
    prescription_id TEXT,
    encounter_id TEXT,
    created_at TEXT NOT NULL,
    prev_hash TEXT NOT NULL,
    entry_hash TEXT NOT NULL UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_movements_item ON stock_movements(item_id);
CREATE INDEX IF NOT EXISTS idx_movements_prescription ON stock_movements(prescription_id);

CREATE TRIGGER IF NOT EXISTS stock_movements_no_update BEFORE UPDATE ON stock_movements
BEGIN
    SELECT RAISE(ABORT, 'Stock movements are append-only');
END;

CREATE TRIGGER IF NOT EXISTS stock_movements_no_delete BEFORE DELETE ON stock_movements
BEGIN
    SELECT RAISE(ABORT, 'Stock movements are append-only');
END;

-- ============================================================================
-- Orders
-- ============================================================================

CREATE TABLE IF NOT EXISTS prescriptions (
    id TEXT PRIMARY KEY,
    encounter_id TEXT NOT NULL REFERENCES encounters(id),
    item_id TEXT NOT NULL REFERENCES stock_items(id),
    quantity INTEGER NOT NULL CHECK (quantity > 0),
    instructions TEXT,
    instant_dispensing INTEGER NOT NULL DEFAULT 0,
    stock_reserved INTEGER NOT NULL DEFAULT 0,
    stock_reserved_at TEXT,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'dispensed')),
    created_at TEXT NOT NULL,
    CHECK (stock_reserved = 0 OR instant_dispensing = 1),
    CHECK ((stock_reserved = 1) = (stock_reserved_at IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_encounter ON prescriptions(encounter_id);
CREATE INDEX IF NOT EXISTS idx_prescriptions_reserved ON prescriptions(stock_reserved);

CREATE TABLE IF NOT EXISTS lab_orders (
    id TEXT PRIMARY KEY,
    encounter_id TEXT NOT NULL REFERENCES encounters(id),
    test_code TEXT NOT NULL,
    priority TEXT NOT NULL CHECK (priority IN ('urgent', 'fast', 'normal')),
    clinical_notes TEXT,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'submitted')),
    created_at TEXT NOT NULL,
    submitted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_lab_orders_encounter ON lab_orders(encounter_id);

-- ============================================================================
-- Completion Records (Immutable after creation)
-- ============================================================================

CREATE TABLE IF NOT EXISTS dispensations (
    id TEXT PRIMARY KEY,
    prescription_id TEXT NOT NULL UNIQUE REFERENCES prescriptions(id),
    encounter_id TEXT NOT NULL REFERENCES encounters(id),
    item_id TEXT NOT NULL REFERENCES stock_items(id),
    quantity_dispensed INTEGER NOT NULL CHECK (quantity_dispensed > 0),
    dispensed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_dispensations_encounter ON dispensations(encounter_id);

CREATE TRIGGER IF NOT EXISTS dispensations_no_update BEFORE UPDATE ON dispensations
BEGIN
    SELECT RAISE(ABORT, 'Dispensations are immutable');
END;

CREATE TRIGGER IF NOT EXISTS dispensations_no_delete BEFORE DELETE ON dispensations
BEGIN
    SELECT RAISE(ABORT, 'Dispensations are immutable');
END;

CREATE TABLE IF NOT EXISTS billing_items (
    id TEXT PRIMARY KEY,
    encounter_id TEXT NOT NULL REFERENCES encounters(id),
    patient_id TEXT NOT NULL REFERENCES patients(id),
    source TEXT NOT NULL CHECK (source IN ('prescription', 'lab_order')),
    source_id TEXT NOT NULL,
    code TEXT NOT NULL,
    description TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    unit_price_cents INTEGER NOT NULL,
    total_cents INTEGER NOT NULL,
    emitted_at TEXT NOT NULL,
    UNIQUE (source, source_id)
);

CREATE INDEX IF NOT EXISTS idx_billing_encounter ON billing_items(encounter_id);

CREATE TRIGGER IF NOT EXISTS billing_items_no_update BEFORE UPDATE ON billing_items
BEGIN
    SELECT RAISE(ABORT, 'Billing items are immutable');
END;

CREATE TRIGGER IF NOT EXISTS billing_items_no_delete BEFORE DELETE ON billing_items
BEGIN
    SELECT RAISE(ABORT, 'Billing items are immutable');
END;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO stock_items (id, name, stock_quantity, opening_quantity, created_at)
             VALUES ('AMOX-500', 'Amoxicillin', 10, 10, '2024-01-15T10:00:00Z')",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_stock_cannot_go_negative() {
        let conn = seeded();
        let result = conn.execute(
            "UPDATE stock_items SET stock_quantity = stock_quantity - 11 WHERE id = 'AMOX-500'",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_movements_are_append_only() {
        let conn = seeded();
        conn.execute(
            "INSERT INTO stock_movements (id, item_id, movement_type, quantity, created_at, prev_hash, entry_hash)
             VALUES ('m1', 'AMOX-500', 'reservation', -5, '2024-01-15T10:00:00Z', 'p', 'h')",
            [],
        )
        .unwrap();

        let update = conn.execute("UPDATE stock_movements SET quantity = -1 WHERE id = 'm1'", []);
        assert!(update.is_err());

        let delete = conn.execute("DELETE FROM stock_movements WHERE id = 'm1'", []);
        assert!(delete.is_err());
    }

    #[test]
    fn test_completed_encounter_requires_timestamp() {
        let conn = seeded();
        conn.execute(
            "INSERT INTO patients (id, name, created_at) VALUES ('p1', 'Ada', '2024-01-15T10:00:00Z')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO encounters (id, patient_id, status, created_at)
             VALUES ('e1', 'p1', 'completed', '2024-01-15T10:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_reservation_requires_instant_flag() {
        let conn = seeded();
        conn.execute(
            "INSERT INTO patients (id, name, created_at) VALUES ('p1', 'Ada', '2024-01-15T10:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO encounters (id, patient_id, created_at) VALUES ('e1', 'p1', '2024-01-15T10:00:00Z')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO prescriptions (id, encounter_id, item_id, quantity, instant_dispensing,
                                        stock_reserved, stock_reserved_at, created_at)
             VALUES ('rx1', 'e1', 'AMOX-500', 2, 0, 1, '2024-01-15T10:00:00Z', '2024-01-15T10:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_one_active_emergency_record_per_patient() {
        let conn = seeded();
        conn.execute(
            "INSERT INTO patients (id, name, created_at) VALUES ('p1', 'Ada', '2024-01-15T10:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO emergency_records (id, patient_id, status, admitted_at)
             VALUES ('er1', 'p1', 'triaged', '2024-01-15T10:00:00Z')",
            [],
        )
        .unwrap();

        let second = conn.execute(
            "INSERT INTO emergency_records (id, patient_id, status, admitted_at)
             VALUES ('er2', 'p1', 'in_treatment', '2024-01-15T11:00:00Z')",
            [],
        );
        assert!(second.is_err());
    }
}
