// SPDX-License-Identifier: Apache-2.0

use crate::ids::{ParseError, SlotId};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

pub const CAPACITY_MAX: u32 = 500;

/// A bookable appointment window with finite capacity.
///
/// `booked_count <= capacity` holds at all times; `is_available` tracks
/// `booked_count < capacity` unless an admin has forced the slot closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppointmentSlot {
    pub id: SlotId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: u32,
    pub booked_count: u32,
    pub is_available: bool,
}

impl AppointmentSlot {
    #[must_use]
    pub fn remaining_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.booked_count)
    }

    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.is_available && self.booked_count < self.capacity
    }

    #[must_use]
    pub fn summary(&self) -> SlotSummary {
        SlotSummary {
            id: self.id,
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            capacity: self.capacity,
            remaining_capacity: self.remaining_capacity(),
        }
    }
}

/// Read-side projection of a slot, decorated with remaining capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlotSummary {
    pub id: SlotId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: u32,
    pub remaining_capacity: u32,
}

/// Admin-side slot creation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewSlot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub capacity: u32,
}

impl NewSlot {
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.capacity == 0 {
            return Err(ParseError::InvalidFormat("capacity must be at least 1"));
        }
        if self.capacity > CAPACITY_MAX {
            return Err(ParseError::InvalidFormat("capacity exceeds maximum"));
        }
        if self.end_time <= self.start_time {
            return Err(ParseError::InvalidFormat(
                "end_time must be after start_time",
            ));
        }
        Ok(())
    }
}
