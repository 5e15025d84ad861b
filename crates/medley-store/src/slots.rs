use chrono::{NaiveDate, NaiveTime};
use medley_model::{AppointmentSlot, NewSlot, SlotId, SlotSummary};
use rusqlite::{params, Connection, OptionalExtension};

use crate::{BookingStore, StoreError};

const SLOT_COLUMNS: &str = "id, date, start_time, end_time, capacity, booked_count, is_enabled";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotFilter {
    pub date: Option<NaiveDate>,
    pub show_all: bool,
    /// Caller-supplied clock; the store itself never reads wall time.
    pub today: NaiveDate,
    pub window_days: u32,
}

pub(crate) fn date_text(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn time_text(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, StoreError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| StoreError::Corrupt(format!("date '{raw}': {e}")))
}

pub(crate) fn parse_time(raw: &str) -> Result<NaiveTime, StoreError> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .map_err(|e| StoreError::Corrupt(format!("time '{raw}': {e}")))
}

type SlotRow = (i64, String, String, String, u32, u32, bool);

fn slot_from_row(row: SlotRow) -> Result<AppointmentSlot, StoreError> {
    let (id, date, start_time, end_time, capacity, booked_count, is_enabled) = row;
    Ok(AppointmentSlot {
        id: SlotId::new(id),
        date: parse_date(&date)?,
        start_time: parse_time(&start_time)?,
        end_time: parse_time(&end_time)?,
        capacity,
        booked_count,
        is_available: is_enabled && booked_count < capacity,
    })
}

pub(crate) fn load_slot(conn: &Connection, id: SlotId) -> Result<AppointmentSlot, StoreError> {
    let row: Option<SlotRow> = conn
        .query_row(
            &format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = ?1"),
            params![id.as_i64()],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            },
        )
        .optional()?;
    row.map_or(Err(StoreError::SlotNotFound(id)), slot_from_row)
}

/// Guarded compare-and-swap seat claim. Zero rows changed means the slot is
/// full, disabled, or missing; the follow-up probe tells the cases apart.
/// Runs inside the caller's transaction.
pub(crate) fn claim_seat(conn: &Connection, slot_id: SlotId) -> Result<(), StoreError> {
    let changed = conn.execute(
        "UPDATE slots SET booked_count = booked_count + 1
         WHERE id = ?1 AND is_enabled = 1 AND booked_count < capacity",
        params![slot_id.as_i64()],
    )?;
    if changed == 1 {
        return Ok(());
    }
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM slots WHERE id = ?1",
            params![slot_id.as_i64()],
            |r| r.get(0),
        )
        .optional()?;
    match exists {
        Some(_) => Err(StoreError::SlotUnavailable(slot_id)),
        None => Err(StoreError::SlotNotFound(slot_id)),
    }
}

/// Cancellation decrement. Guarded so a stray double-cancel can never drive
/// the counter below zero.
pub(crate) fn release_seat(conn: &Connection, slot_id: SlotId) -> Result<(), StoreError> {
    conn.execute(
        "UPDATE slots SET booked_count = booked_count - 1
         WHERE id = ?1 AND booked_count > 0",
        params![slot_id.as_i64()],
    )?;
    Ok(())
}

impl BookingStore {
    pub async fn create_slot(&self, slot: &NewSlot) -> Result<AppointmentSlot, StoreError> {
        let conn = self.lock().await;
        conn.execute(
            "INSERT INTO slots (date, start_time, end_time, capacity) VALUES (?1, ?2, ?3, ?4)",
            params![
                date_text(slot.date),
                time_text(slot.start_time),
                time_text(slot.end_time),
                slot.capacity,
            ],
        )?;
        let id = SlotId::new(conn.last_insert_rowid());
        load_slot(&conn, id)
    }

    pub async fn get_slot(&self, id: SlotId) -> Result<AppointmentSlot, StoreError> {
        let conn = self.lock().await;
        load_slot(&conn, id)
    }

    /// Admin switch; a disabled slot is never offered or reservable even
    /// with seats free.
    pub async fn set_slot_enabled(&self, id: SlotId, enabled: bool) -> Result<(), StoreError> {
        let conn = self.lock().await;
        let changed = conn.execute(
            "UPDATE slots SET is_enabled = ?2 WHERE id = ?1",
            params![id.as_i64(), enabled],
        )?;
        if changed == 0 {
            return Err(StoreError::SlotNotFound(id));
        }
        Ok(())
    }

    /// Slots with seats remaining, restricted to a rolling future window
    /// unless `show_all` is set. Read-only.
    pub async fn list_available(&self, filter: &SlotFilter) -> Result<Vec<SlotSummary>, StoreError> {
        let window_end = filter.today + chrono::Days::new(u64::from(filter.window_days));
        let conn = self.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SLOT_COLUMNS} FROM slots
             WHERE is_enabled = 1 AND booked_count < capacity
               AND (?1 IS NULL OR date = ?1)
               AND (?2 OR (date >= ?3 AND date <= ?4))
             ORDER BY date, start_time, id"
        ))?;
        let rows = stmt.query_map(
            params![
                filter.date.map(date_text),
                filter.show_all,
                date_text(filter.today),
                date_text(window_end),
            ],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            },
        )?;
        let mut slots = Vec::new();
        for row in rows {
            slots.push(slot_from_row(row?)?.summary());
        }
        Ok(slots)
    }
}
