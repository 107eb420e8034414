//! Display helpers for list rows. None of these fail: missing or blank
//! values render as [`PLACEHOLDER`].

use std::fmt::Display;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CountryRef, Locality};

pub const PLACEHOLDER: &str = "—";
pub const UNNAMED_LOCALITY: &str = "(Unnamed locality)";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

pub fn locality_name(locality: &Locality) -> String {
    non_empty(locality.name_en.as_deref())
        .or_else(|| non_empty(locality.name.as_deref()))
        .unwrap_or(UNNAMED_LOCALITY)
        .to_string()
}

pub fn country_label(country: Option<&CountryRef>) -> String {
    match country {
        None => PLACEHOLDER.to_string(),
        Some(CountryRef::Id(id)) => format!("#{}", id.0),
        Some(CountryRef::Expanded(country)) => non_empty(country.name_en.as_deref())
            .or_else(|| non_empty(country.name.as_deref()))
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{}", country.id.0)),
    }
}

pub fn coordinate(value: Option<f64>) -> String {
    finite(value).map_or_else(|| PLACEHOLDER.to_string(), |v| v.to_string())
}

pub fn display_value<V: Display>(value: Option<V>) -> String {
    match value {
        None => PLACEHOLDER.to_string(),
        Some(value) => {
            let rendered = value.to_string();
            if rendered.trim().is_empty() {
                PLACEHOLDER.to_string()
            } else {
                rendered
            }
        }
    }
}

pub fn display_text(value: Option<&str>) -> String {
    display_value(value)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Reformats an ISO-8601 timestamp as `YYYY-MM-DD HH:MM:SS.mmm UTC`.
/// Unparseable input is returned as-is.
pub fn date_value(value: Option<&str>) -> String {
    let Some(raw) = non_empty(value) else {
        return PLACEHOLDER.to_string();
    };
    match parse_timestamp(raw) {
        Some(timestamp) => timestamp.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string(),
        None => raw.to_string(),
    }
}

pub fn map_coordinates(locality: &Locality) -> Option<Coordinates> {
    Some(Coordinates {
        lat: finite(locality.latitude)?,
        lng: finite(locality.longitude)?,
    })
}

#[cfg(test)]
#[path = "tests/format_tests.rs"]
mod tests;
