// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

pub mod dto;
pub mod error_mapping;
pub mod errors;
pub mod params;

pub use dto::{
    AppointmentResponseDto, CheckoutSessionResponseDto, ConfirmRequestDto,
    CreateCheckoutRequestDto, ReconcileResponseDto, ReserveRequestDto, SlotsResponseDto,
};
pub use error_mapping::{map_error, ApiErrorMapping};
pub use errors::{ApiError, ApiErrorCode};
pub use params::{parse_list_slots_params, ListSlotsParams};

pub const CRATE_NAME: &str = "medley-api";
pub const API_VERSION: &str = "1";
