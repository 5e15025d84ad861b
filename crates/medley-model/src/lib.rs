// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

pub mod appointment;
pub mod ids;
pub mod order;
pub mod payment;
pub mod slot;

pub use appointment::{
    Appointment, AppointmentStatus, NewAppointment, PaymentStatus, TransitionError,
};
pub use ids::{AppointmentId, ParseError, PatientId, PaymentId, SlotId, TransactionId};
pub use order::{AppointmentOrder, OrderDecodeError, OrderDetails, ProductOrder};
pub use payment::{Payment, PaymentKind, PaymentState, UnknownPaymentState};
pub use slot::{AppointmentSlot, NewSlot, SlotSummary};

pub const CRATE_NAME: &str = "medley-model";
