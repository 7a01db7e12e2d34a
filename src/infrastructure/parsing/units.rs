//! Unit normalization and locale-aware numeric parsing
//!
//! The marketplace emits measures in mixed units ("1700 мм", "1,7 м",
//! "2 кг") and numbers with comma decimal separators and space/NBSP digit
//! grouping. Everything funnels through the conversion tables here: lengths
//! normalize to centimeters, masses to grams, volumes stay in liters.

use once_cell::sync::Lazy;
use regex::Regex;

/// Length unit markers and their factor into centimeters
const LENGTH_UNITS: &[(&str, f64)] = &[
    ("мм", 0.1),
    ("mm", 0.1),
    ("см", 1.0),
    ("cm", 1.0),
    ("м", 100.0),
    ("m", 100.0),
];

/// Mass unit markers and their factor into grams
const MASS_UNITS: &[(&str, f64)] = &[("кг", 1000.0), ("kg", 1000.0), ("г", 1.0), ("g", 1.0)];

static MEASURE_RE: Lazy<Regex> = Lazy::new(|| {
    // number followed by an optional unit token, e.g. "1 700,5 мм"
    Regex::new(r"(?i)([\d\s\u{a0}]+(?:[.,]\d+)?)\s*([a-zа-я]*)").unwrap()
});

/// Parse a number the way the source locale writes it: NBSP/space digit
/// grouping, comma or dot decimal separator, currency markers stripped.
pub fn parse_locale_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    // A single comma acts as the decimal separator; commas used as
    // thousands grouping alongside a dot are dropped.
    let normalized = if cleaned.contains(',') && !cleaned.contains('.') {
        cleaned.replace(',', ".")
    } else {
        cleaned.replace(',', "")
    };
    normalized.parse::<f64>().ok()
}

/// Convert a length value with a unit marker into centimeters.
/// Unknown markers return `None`; an empty marker passes through as cm.
pub fn length_to_cm(value: f64, unit: &str) -> Option<f64> {
    let unit = unit.trim().to_lowercase();
    if unit.is_empty() {
        return Some(value);
    }
    LENGTH_UNITS
        .iter()
        .find(|(marker, _)| *marker == unit)
        .map(|(_, factor)| value * factor)
}

/// Convert a mass value with a unit marker into grams.
pub fn mass_to_g(value: f64, unit: &str) -> Option<f64> {
    let unit = unit.trim().to_lowercase();
    if unit.is_empty() {
        return Some(value);
    }
    MASS_UNITS
        .iter()
        .find(|(marker, _)| *marker == unit)
        .map(|(_, factor)| value * factor)
}

/// Split free text like "1700 мм" into its numeric part and unit token.
pub fn parse_measure(text: &str) -> Option<(f64, String)> {
    let caps = MEASURE_RE.captures(text.trim())?;
    let value = parse_locale_number(caps.get(1)?.as_str())?;
    let unit = caps.get(2).map_or(String::new(), |m| m.as_str().to_string());
    Some((value, unit))
}

/// Normalize a free-text length measure ("1700 мм", "170 см", "1,7 м") to cm.
pub fn normalize_length_text(text: &str) -> Option<f64> {
    let (value, unit) = parse_measure(text)?;
    length_to_cm(value, &unit)
}

/// Normalize a free-text mass measure ("2 кг", "240 г") to grams.
pub fn normalize_mass_text(text: &str) -> Option<f64> {
    let (value, unit) = parse_measure(text)?;
    mass_to_g(value, &unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_numbers() {
        assert_eq!(parse_locale_number("1 699,5"), Some(1699.5));
        assert_eq!(parse_locale_number("1\u{a0}234"), Some(1234.0));
        assert_eq!(parse_locale_number("2 999 ₽"), Some(2999.0));
        assert_eq!(parse_locale_number("4.8"), Some(4.8));
        assert_eq!(parse_locale_number("нет"), None);
    }

    #[test]
    fn millimeters_normalize_to_cm() {
        assert_eq!(normalize_length_text("1700 мм"), Some(170.0));
        assert_eq!(normalize_length_text("1700 mm"), Some(170.0));
    }

    #[test]
    fn kilograms_normalize_to_grams() {
        assert_eq!(normalize_mass_text("2 кг"), Some(2000.0));
        assert_eq!(normalize_mass_text("240 г"), Some(240.0));
    }

    #[test]
    fn canonical_units_pass_through() {
        assert_eq!(normalize_length_text("170 см"), Some(170.0));
        assert_eq!(normalize_length_text("42"), Some(42.0));
        assert_eq!(normalize_mass_text("500 g"), Some(500.0));
    }

    #[test]
    fn meters_scale_up() {
        assert_eq!(normalize_length_text("1,7 м"), Some(170.0));
    }

    #[test]
    fn unknown_unit_is_rejected() {
        assert_eq!(normalize_length_text("12 дюймов"), None);
    }
}
