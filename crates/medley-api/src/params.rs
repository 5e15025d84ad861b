// SPDX-License-Identifier: Apache-2.0

use crate::errors::ApiError;
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSlotsParams {
    pub date: Option<NaiveDate>,
    pub show_all: bool,
}

pub fn parse_list_slots_params(
    query: &BTreeMap<String, String>,
) -> Result<ListSlotsParams, ApiError> {
    let date = if let Some(raw) = query.get("date") {
        Some(
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| ApiError::invalid_param("date", raw))?,
        )
    } else {
        None
    };

    Ok(ListSlotsParams {
        date,
        show_all: query
            .get("show_all")
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true")),
    })
}
