// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub const ID_MAX_LEN: usize = 64;
pub const PATIENT_ID_MAX_LEN: usize = 128;
pub const TRANSACTION_ID_MAX_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    Empty(&'static str),
    Trimmed(&'static str),
    TooLong(&'static str, usize),
    InvalidFormat(&'static str),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty(name) => write!(f, "{name} must not be empty"),
            Self::Trimmed(name) => {
                write!(f, "{name} must not contain leading/trailing whitespace")
            }
            Self::TooLong(name, max) => write!(f, "{name} exceeds max length {max}"),
            Self::InvalidFormat(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for ParseError {}

fn parse_opaque(
    input: &str,
    field: &'static str,
    max_len: usize,
) -> Result<String, ParseError> {
    if input.is_empty() {
        return Err(ParseError::Empty(field));
    }
    if input.trim() != input {
        return Err(ParseError::Trimmed(field));
    }
    if input.len() > max_len {
        return Err(ParseError::TooLong(field, max_len));
    }
    Ok(input.to_string())
}

/// Numeric row id of an [`crate::slot::AppointmentSlot`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SlotId(i64);

impl SlotId {
    #[must_use]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl Display for SlotId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque appointment token, minted as `apt_<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct AppointmentId(String);

impl AppointmentId {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let raw = parse_opaque(input, "appointment_id", ID_MAX_LEN)?;
        if !raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(ParseError::InvalidFormat(
                "appointment_id must be alphanumeric with '_' or '-'",
            ));
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn mint() -> Self {
        Self(medley_core::opaque_token("apt"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AppointmentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct PatientId(String);

impl PatientId {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        Ok(Self(parse_opaque(input, "patient_id", PATIENT_ID_MAX_LEN)?))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PatientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque payment row token, minted as `pay_<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct PaymentId(String);

impl PaymentId {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        Ok(Self(parse_opaque(input, "payment_id", ID_MAX_LEN)?))
    }

    #[must_use]
    pub fn mint() -> Self {
        Self(medley_core::opaque_token("pay"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PaymentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gateway-issued charge identifier. Globally unique per real-world charge;
/// the idempotency key for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(transparent)]
#[non_exhaustive]
pub struct TransactionId(String);

impl TransactionId {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        Ok(Self(parse_opaque(
            input,
            "transaction_id",
            TRANSACTION_ID_MAX_LEN,
        )?))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
