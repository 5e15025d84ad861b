/// `slots.is_enabled` is the admin on/off switch; availability is derived
/// as `is_enabled AND booked_count < capacity` at read time, never stored.
/// The CHECK on `booked_count` backs the capacity invariant at the store
/// level; the unique index on `payments.transaction_id` backs
/// reconciliation idempotency.
pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS slots (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT NOT NULL,
    capacity INTEGER NOT NULL CHECK (capacity >= 1),
    booked_count INTEGER NOT NULL DEFAULT 0
        CHECK (booked_count >= 0 AND booked_count <= capacity),
    is_enabled INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_slots_date ON slots(date);

CREATE TABLE IF NOT EXISTS appointments (
    id TEXT PRIMARY KEY,
    slot_id INTEGER NOT NULL REFERENCES slots(id),
    patient_id TEXT NOT NULL,
    date TEXT NOT NULL,
    start_time TEXT NOT NULL,
    duration_minutes INTEGER NOT NULL,
    fee_cents INTEGER NOT NULL,
    reason TEXT NOT NULL,
    status TEXT NOT NULL,
    payment_status TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_appointments_slot ON appointments(slot_id);
CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(patient_id);

CREATE TABLE IF NOT EXISTS payments (
    id TEXT PRIMARY KEY,
    amount_cents INTEGER NOT NULL,
    method TEXT NOT NULL,
    state TEXT NOT NULL,
    transaction_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    appointment_id TEXT REFERENCES appointments(id),
    product_order_ref TEXT,
    patient_id TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_transaction
    ON payments(transaction_id);
";
