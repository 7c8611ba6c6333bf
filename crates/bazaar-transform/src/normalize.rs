//! Text and specification normalization.
//!
//! Upstream text mixes Persian, Arabic-Indic and ASCII digits and writes
//! units in either script. Everything numeric is read only after the digits
//! have been folded to ASCII.

use std::collections::BTreeMap;

use bazaar_store::{ProductFeatures, Specifications};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Fold Persian (`۰-۹`) and Arabic-Indic (`٠-٩`) digits to ASCII.
pub fn normalize_digits(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{06F0}'..='\u{06F9}' => char::from(b'0' + (c as u32 - 0x06F0) as u8),
            '\u{0660}'..='\u{0669}' => char::from(b'0' + (c as u32 - 0x0660) as u8),
            _ => c,
        })
        .collect()
}

// ---------------------------------------------------------------
// Specification table
// ---------------------------------------------------------------

/// Read a specification table.
///
/// The detail endpoint sends `[{title, attributes: [{title, values}]}]`;
/// that form is flattened to group → attribute → values with digits
/// normalized, the first occurrence of a repeated attribute winning. An
/// object that already has the flattened shape is taken as is. Anything
/// else is unreadable and yields `None`.
pub fn flatten_specifications(value: &Value) -> Option<Specifications> {
    match value {
        Value::Array(groups) => {
            let mut out: Specifications = BTreeMap::new();
            for group in groups {
                let title = text_field(group, "title").unwrap_or_default();
                let entry = out.entry(title).or_default();
                let attributes = group.get("attributes").and_then(Value::as_array);
                for attr in attributes.into_iter().flatten() {
                    let Some(name) = text_field(attr, "title") else {
                        continue;
                    };
                    if entry.contains_key(&name) {
                        continue;
                    }
                    entry.insert(name, attribute_values(attr.get("values")));
                }
            }
            Some(out)
        }
        Value::Object(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

fn text_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(|s| normalize_digits(s.trim()))
        .filter(|s| !s.is_empty())
}

fn attribute_values(values: Option<&Value>) -> Vec<String> {
    let scalar = |v: &Value| match v {
        Value::String(s) => Some(normalize_digits(s.trim())),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    };
    match values {
        Some(Value::Array(items)) => items.iter().filter_map(scalar).collect(),
        Some(other) => scalar(other).into_iter().collect(),
        None => Vec::new(),
    }
}

// ---------------------------------------------------------------
// Feature extraction
// ---------------------------------------------------------------

const SIZE_KEYS: &[&str] = &["ابعاد", "size", "dimension", "dimensions"];
const WEIGHT_KEYS: &[&str] = &["وزن", "weight"];
const YEAR_KEYS: &[&str] = &["تاریخ معرفی", "زمان معرفی", "introduce date", "introduction date"];
const SCREEN_KEYS: &[&str] = &["اندازه", "اندازه صفحه", "اندازه صفحه نمایش", "display size"];
const STORAGE_KEYS: &[&str] = &["حافظه داخلی", "storage", "internal storage"];
const RAM_KEYS: &[&str] = &["مقدار ram", "ram", "حافظه رم"];
const BATTERY_KEYS: &[&str] = &["ظرفیت باتری", "battery capacity", "مشخصات باتری"];

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+(?:\.[0-9]+)?").unwrap());
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b((?:19|20)[0-9]{2})\b").unwrap());
static INCH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([0-9]+(?:\.[0-9]+)?)\s*(?:inch|in\b|'|"|اینچ)"#).unwrap());
static SIZE_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*میلی[\x{200C}\s]*متر\s*|[\x{200E}\x{200F}\x{202A}-\x{202E}]|\bmm\b").unwrap()
});
static TB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([0-9]{1,2})\s*(?:tb|tib|terabytes?|ترابایت|ترابايت)").unwrap()
});
static GB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([0-9]{1,4})\s*(?:gb|gib|gigabytes?|گیگابایت|گيگابايت)").unwrap()
});
static MB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([0-9]{1,5})\s*(?:mb|mib|مگابایت|مگابايت)").unwrap());

/// Pull numeric facts out of a flattened specification table.
pub fn extract_features(specs: &Specifications) -> ProductFeatures {
    let lookup = AttributeLookup::new(specs);

    let dimensions_mm = lookup.find(SIZE_KEYS).and_then(|s| dimensions_mm(&s));
    let (thickness_mm, volume_cm3) = match dimensions_mm {
        Some([a, b, c]) => (Some(a.min(b).min(c)), Some(round3(a * b * c / 1000.0))),
        None => (None, None),
    };

    ProductFeatures {
        storage_gb: lookup.find(STORAGE_KEYS).and_then(|s| storage_gb(&s)),
        ram_gb: lookup.find(RAM_KEYS).and_then(|s| storage_gb(&s)),
        screen_inch: lookup.find(SCREEN_KEYS).and_then(|s| screen_inch(&s)),
        weight_g: lookup.find(WEIGHT_KEYS).and_then(|s| first_number(&s)),
        dimensions_mm,
        thickness_mm,
        volume_cm3,
        battery_mah: lookup.find(BATTERY_KEYS).and_then(|s| first_number(&s)),
        release_year: lookup.find(YEAR_KEYS).and_then(|s| release_year(&s)),
    }
}

/// Attribute name (trimmed, lowercased, ZWNJ removed) → joined values.
/// First occurrence across groups wins.
struct AttributeLookup {
    values: BTreeMap<String, String>,
}

impl AttributeLookup {
    fn new(specs: &Specifications) -> Self {
        let mut values = BTreeMap::new();
        for group in specs.values() {
            for (name, vals) in group {
                let joined = vals.join(", ");
                if joined.is_empty() {
                    continue;
                }
                values.entry(lookup_key(name)).or_insert(joined);
            }
        }
        Self { values }
    }

    fn find(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .find_map(|k| self.values.get(&lookup_key(k)))
            .cloned()
    }
}

fn lookup_key(name: &str) -> String {
    name.replace('\u{200c}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

pub fn first_number(text: &str) -> Option<f64> {
    let text = normalize_digits(text);
    NUMBER.find(&text).and_then(|m| m.as_str().parse().ok())
}

pub fn release_year(text: &str) -> Option<i32> {
    let text = normalize_digits(text);
    YEAR.captures(&text).and_then(|c| c[1].parse().ok())
}

/// Screen diagonal: a number followed by an inch marker, else the first number.
pub fn screen_inch(text: &str) -> Option<f64> {
    let text = normalize_digits(text).to_lowercase();
    INCH.captures(&text)
        .and_then(|c| c[1].parse().ok())
        .or_else(|| first_number(&text))
}

/// Exactly three numbers separated by `x`, `×` or `*`, in millimetres.
pub fn dimensions_mm(text: &str) -> Option<[f64; 3]> {
    let text = normalize_digits(text);
    let text = SIZE_NOISE.replace_all(&text, " ");
    let nums: Vec<f64> = NUMBER
        .find_iter(&text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    match nums.as_slice() {
        [a, b, c] => Some([*a, *b, *c]),
        _ => None,
    }
}

/// Capacity in GB from a TB/GB/MB figure in either script.
///
/// Without an explicit unit, a Persian unit prefix or a bare `t`/`g`/`m`
/// letter decides the scale of the first number.
pub fn storage_gb(text: &str) -> Option<f64> {
    let ascii = normalize_digits(text).to_lowercase();

    if let Some(c) = TB.captures(&ascii) {
        return c[1].parse::<f64>().ok().map(|n| n * 1024.0);
    }
    if let Some(c) = GB.captures(&ascii) {
        return c[1].parse::<f64>().ok();
    }
    if let Some(c) = MB.captures(&ascii) {
        return c[1].parse::<f64>().ok().map(|n| round3(n / 1024.0));
    }

    let n = first_number(&ascii)?;
    if ascii.contains("گیگ") || ascii.contains('g') {
        Some(n)
    } else if ascii.contains("مگ") || ascii.contains('m') {
        Some(round3(n / 1024.0))
    } else if ascii.contains("ترا") || ascii.contains('t') {
        Some(n * 1024.0)
    } else {
        None
    }
}
