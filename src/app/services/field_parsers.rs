//! Field parsing utilities for receipt rows
//!
//! This module converts the locale-specific text of receipt exports into
//! exact values: `DD.MM.YYYY hh:mm` timestamps and arbitrary-precision
//! decimals. Amounts never pass through binary floating point.

use crate::config::DateFallback;
use crate::constants::DATE_TIME_FORMAT;
use crate::{Error, Result};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use tracing::warn;

/// Parse a receipt timestamp in `DD.MM.YYYY hh:mm` form
pub fn parse_date_time(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), DATE_TIME_FORMAT).map_err(|source| {
        Error::DateTimeParsing {
            value: text.to_string(),
            source,
        }
    })
}

/// Parse a receipt timestamp, applying the fallback policy on failure
///
/// With [`DateFallback::ZeroValue`] an unparsable value yields `Ok(None)`.
pub fn parse_optional_date_time(
    text: &str,
    policy: DateFallback,
) -> Result<Option<NaiveDateTime>> {
    match parse_date_time(text) {
        Ok(date) => Ok(Some(date)),
        Err(e) => match policy {
            DateFallback::ZeroValue => {
                warn!("{}; storing empty timestamp", e);
                Ok(None)
            }
            DateFallback::Reject => Err(e),
        },
    }
}

/// Parse an exact decimal literal such as `7.00` or `-0.5`
///
/// Currency symbols and thousands separators are not accepted.
pub fn parse_decimal(text: &str) -> Result<Decimal> {
    Decimal::from_str_exact(text.trim()).map_err(|source| Error::DecimalParsing {
        value: text.to_string(),
        source,
    })
}
