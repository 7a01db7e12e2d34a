//! Characteristics parsing: sectioned key/value specs and dimension attributes
//!
//! The long-characteristics widget groups free-text `key: value` entries by
//! section; dimension and weight entries carry their unit either in the key
//! ("Длина, мм") or in the value ("170 см") and must be normalized. The
//! companion data service instead ships dimensions under fixed numeric
//! attribute ids, which take precedence over free-text parsing.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::domain::product::PartialProduct;

use super::units::{length_to_cm, mass_to_g, parse_locale_number, parse_measure};

/// Dimension attribute ids used by the companion data service: mm for the
/// three dimensions, grams for weight.
const ATTR_LENGTH_MM: &str = "9454";
const ATTR_WIDTH_MM: &str = "9455";
const ATTR_HEIGHT_MM: &str = "9456";
const ATTR_WEIGHT_G: &str = "4497";

/// One `key: value` characteristics entry, section-agnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicEntry {
    pub name: String,
    pub value: String,
}

/// Flatten a characteristics widget into its entries. Sections and entry
/// shapes vary between the long and short widget variants; anything that
/// does not look like an entry is skipped, never an error.
pub fn parse_sections(widget: &Value) -> Vec<CharacteristicEntry> {
    let mut entries = Vec::new();
    let Some(sections) = widget
        .pointer("/characteristics")
        .and_then(Value::as_array)
    else {
        return entries;
    };

    for section in sections {
        // Long variant: {"title": ..., "short": [entry, ...]}
        if let Some(shorts) = section.pointer("/short").and_then(Value::as_array) {
            for entry in shorts {
                if let Some(parsed) = parse_entry(entry) {
                    entries.push(parsed);
                }
            }
            continue;
        }
        // Short variant: the section itself is the entry
        if let Some(parsed) = parse_entry(section) {
            entries.push(parsed);
        }
    }
    entries
}

fn parse_entry(entry: &Value) -> Option<CharacteristicEntry> {
    let name = entry
        .pointer("/name")
        .or_else(|| entry.pointer("/title"))
        .and_then(Value::as_str)?
        .trim()
        .to_string();
    if name.is_empty() {
        return None;
    }

    let value = match entry.pointer("/values").and_then(Value::as_array) {
        Some(values) => values
            .iter()
            .filter_map(|v| v.pointer("/text").and_then(Value::as_str).or(v.as_str()))
            .collect::<Vec<_>>()
            .join(", "),
        None => entry
            .pointer("/value")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };
    if value.is_empty() {
        return None;
    }
    Some(CharacteristicEntry { name, value })
}

/// Fill dimension/weight/volume/brand fields from characteristics entries.
/// Entries that fail to parse are skipped; earlier entries win.
pub fn apply_entries(partial: &mut PartialProduct, entries: &[CharacteristicEntry]) {
    for entry in entries {
        let name = entry.name.to_lowercase();
        if partial.length_cm == 0.0 && (name.contains("длина") || name.contains("length")) {
            if let Some(cm) = length_with_key_unit(&entry.value, &name) {
                partial.length_cm = cm;
            }
        } else if partial.width_cm == 0.0 && (name.contains("ширина") || name.contains("width")) {
            if let Some(cm) = length_with_key_unit(&entry.value, &name) {
                partial.width_cm = cm;
            }
        } else if partial.height_cm == 0.0 && (name.contains("высота") || name.contains("height"))
        {
            if let Some(cm) = length_with_key_unit(&entry.value, &name) {
                partial.height_cm = cm;
            }
        } else if partial.weight_g == 0.0 && (name.contains("вес") || name.contains("weight")) {
            if let Some(g) = mass_with_key_unit(&entry.value, &name) {
                partial.weight_g = g;
            }
        } else if partial.volume_liters == 0.0
            && (name.contains("объем") || name.contains("объём") || name.contains("volume"))
        {
            if let Some(liters) = parse_locale_number(&entry.value) {
                partial.volume_liters = liters;
            }
        } else if partial.brand.is_empty() && (name.contains("бренд") || name.contains("brand")) {
            partial.brand = entry.value.clone();
        }
    }
}

/// The unit for a measure lives in the value text when present, otherwise
/// in the key suffix ("Длина, мм"); bare numbers are already canonical.
fn length_with_key_unit(value: &str, key: &str) -> Option<f64> {
    let (number, unit) = parse_measure(value)?;
    let unit = if unit.is_empty() { key_unit(key) } else { unit };
    length_to_cm(number, &unit)
}

fn mass_with_key_unit(value: &str, key: &str) -> Option<f64> {
    let (number, unit) = parse_measure(value)?;
    let unit = if unit.is_empty() { key_unit(key) } else { unit };
    mass_to_g(number, &unit)
}

fn key_unit(key: &str) -> String {
    key.rsplit([',', ' '])
        .next()
        .map(|token| token.trim().to_string())
        .unwrap_or_default()
}

/// Fill mm/g dimensions from a companion attribute list
/// (`[{"key": "9454", "value": 1700}, ...]`).
pub fn apply_dimension_attributes(partial: &mut PartialProduct, payload: &Value) {
    let Some(attributes) = payload.pointer("/attributes").and_then(Value::as_array) else {
        return;
    };
    for attribute in attributes {
        let Some(key) = attribute
            .pointer("/key")
            .map(|k| k.as_str().map_or_else(|| k.to_string(), str::to_string))
        else {
            continue;
        };
        let Some(value) = attribute.pointer("/value").and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => parse_locale_number(s),
            _ => None,
        }) else {
            continue;
        };
        match key.as_str() {
            ATTR_LENGTH_MM => partial.length_cm = value / 10.0,
            ATTR_WIDTH_MM => partial.width_cm = value / 10.0,
            ATTR_HEIGHT_MM => partial.height_cm = value / 10.0,
            ATTR_WEIGHT_G => partial.weight_g = value,
            _ => {}
        }
    }
}

/// Parse a listing creation date, date-only or full ISO timestamp.
pub fn parse_creation_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
