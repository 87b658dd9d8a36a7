// src/time_codec.rs
//
// Conversions between the "HH:MM" strings operators see and the decimal
// hour values the GTR backend speaks, plus the clock-mark display
// formatter. Everything downstream (clamps, totals) works on whole
// minutes so comparisons stay exact.

use chrono::{DateTime, Local};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const INVALID_MARK: &str = "Fecha inválida";
pub const MISSING_MARK: &str = "N/A";

/// Decimal hours to "HH:MM", rounded to the nearest minute.
/// NaN, infinities and negatives all render as "00:00". Hour counts are
/// not wrapped: 27.25 renders as "27:15".
pub fn decimal_to_hhmm(hours: f64) -> String {
    if !hours.is_finite() || hours < 0.0 {
        return "00:00".to_string();
    }
    let total_minutes = (hours * 60.0).round() as i64;
    format!("{:02}:{:02}", total_minutes / 60, total_minutes % 60)
}

/// "HH:MM" to decimal hours. Malformed input (empty, no ':' separator,
/// non-integer parts) normalizes to 0.0 rather than failing.
pub fn hhmm_to_decimal(value: &str) -> f64 {
    hhmm_to_minutes(value) as f64 / 60.0
}

/// "HH:MM" to whole minutes; 0 on malformed input.
pub fn hhmm_to_minutes(value: &str) -> i64 {
    let mut parts = value.trim().split(':');
    let (Some(h), Some(m)) = (parts.next(), parts.next()) else {
        return 0;
    };
    match (h.trim().parse::<u32>(), m.trim().parse::<u32>()) {
        (Ok(h), Ok(m)) => i64::from(h) * 60 + i64::from(m),
        _ => 0,
    }
}

/// Quantizes a backend decimal-hours value to whole minutes.
/// NaN and negatives (both seen on partially loaded days) become 0.
pub fn api_hours_to_minutes(hours: f64) -> i64 {
    if !hours.is_finite() || hours < 0.0 {
        return 0;
    }
    (hours * 60.0).round() as i64
}

/// Exact minutes-to-hours as a Decimal, for summing.
pub fn minutes_to_decimal(minutes: i64) -> Decimal {
    Decimal::from(minutes) / dec!(60)
}

pub fn minutes_to_hhmm(minutes: i64) -> String {
    if minutes < 0 {
        return "00:00".to_string();
    }
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub fn decimal_hours_to_hhmm(hours: Decimal) -> String {
    minutes_to_hhmm((hours * dec!(60)).round().to_i64().unwrap_or(0))
}

/// Renders a backend clock mark for display, converted to local time.
///
/// The backend emits UTC instants but not always with a zone marker; a
/// bare "2024-03-10T15:30:00" is treated as UTC by appending 'Z' before
/// parsing. If some endpoint ever emits local-time strings they will
/// render shifted -- the interpretation is centralized here on purpose.
pub fn format_marca(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return MISSING_MARK.to_string();
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return MISSING_MARK.to_string();
    }

    let candidate = if raw.contains('Z') || raw.contains('+') {
        raw.to_string()
    } else {
        format!("{raw}Z")
    };

    match DateTime::parse_from_rfc3339(&candidate) {
        Ok(instant) => instant
            .with_timezone(&Local)
            .format("%d/%m/%Y, %H:%M:%S")
            .to_string(),
        Err(_) => format!("{INVALID_MARK} ({raw})"),
    }
}
