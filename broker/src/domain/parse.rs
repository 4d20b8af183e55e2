//! Field-specific parsers, failure counting, and the bundle / wrong-field guards (C5).

use serde_json::Map;
use serde_json::Value;
use std::collections::HashMap;

/// Strips NBSP/ZWSP, normalizes NFC-equivalent whitespace, collapses runs of whitespace. We don't
/// pull in a full Unicode-normalization crate for this; inbound text is expected to already be
/// NFC-normalized by the messaging provider, so this focuses on the invisible-character classes
/// that actually show up in pasted phone-keyboard text.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| *c != '\u{200B}')
        .map(|c| if c == '\u{00A0}' { ' ' } else { c })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Only these fields are parser-backed / three-strikes-counted per §4.5 and §9.
pub const PARSEABLE_FIELDS: &[&str] = &["dimensions", "budget", "location_city", "slot"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DimensionsCm {
    pub width_cm: f64,
    pub height_cm: f64,
}

/// `<w>[x×]<h>?<unit>?`; single dimension -> square; inches -> cm via 2.54; reject when either
/// side > 100cm.
pub fn parse_dimensions(text: &str) -> Option<DimensionsCm> {
    let text = normalize(text).to_lowercase();
    let text = text.replace('×', "x");

    let unit_cm = text.contains("cm");
    let unit_in = text.contains("inch") || text.contains('"') || text.ends_with("in");

    let stripped: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == 'x')
        .collect();

    if stripped.is_empty() {
        return None;
    }

    let parts: Vec<&str> = stripped.splitn(2, 'x').collect();
    let w: f64 = parts.first()?.parse().ok()?;
    let h: f64 = match parts.get(1) {
        Some(s) if !s.is_empty() => s.parse().ok()?,
        _ => w,
    };

    let (w_cm, h_cm) = if unit_in && !unit_cm {
        (w * 2.54, h * 2.54)
    } else {
        (w, h)
    };

    if w_cm > 100.0 || h_cm > 100.0 {
        return None;
    }
    if w_cm <= 0.0 || h_cm <= 0.0 {
        return None;
    }

    Some(DimensionsCm {
        width_cm: w_cm,
        height_cm: h_cm,
    })
}

/// Strips currency symbols/words/commas, extracts the leading non-negative number, applies a `k`
/// suffix multiplier, returns pence. Values below 5000 pence (£50) are treated as parse failure.
pub fn parse_budget_pence(text: &str) -> Option<i64> {
    let lowered = normalize(text).to_lowercase();
    if lowered.contains('-') && lowered.trim_start().starts_with('-') {
        return None;
    }

    let cleaned: String = lowered
        .replace('£', "")
        .replace('$', "")
        .replace('€', "")
        .replace("pounds", "")
        .replace("gbp", "")
        .replace("quid", "")
        .replace(',', "");

    let mut digits = String::new();
    let mut has_k = false;
    let mut seen_digit = false;
    for c in cleaned.chars() {
        if c.is_ascii_digit() || (c == '.' && seen_digit) {
            digits.push(c);
            seen_digit = true;
        } else if c == 'k' && seen_digit {
            has_k = true;
            break;
        } else if seen_digit {
            break;
        }
    }

    if digits.is_empty() {
        return None;
    }

    let value: f64 = digits.parse().ok()?;
    if value <= 0.0 {
        return None;
    }
    let value = if has_k { value * 1000.0 } else { value };
    let pence = (value * 100.0).round() as i64;

    if pence < 5_000 {
        return None;
    }

    Some(pence)
}

const FLEXIBLE_KEYWORDS: &[&str] = &["flexible", "anywhere", "any", "wherever"];

const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("uk", "United Kingdom"),
    ("gb", "United Kingdom"),
    ("england", "United Kingdom"),
    ("scotland", "United Kingdom"),
    ("wales", "United Kingdom"),
    ("usa", "United States"),
    ("us", "United States"),
];

/// City-only text falls back to this static table to infer a country.
const CITY_TO_COUNTRY: &[(&str, &str)] = &[
    ("london", "United Kingdom"),
    ("manchester", "United Kingdom"),
    ("edinburgh", "United Kingdom"),
    ("glasgow", "United Kingdom"),
    ("berlin", "Germany"),
    ("paris", "France"),
    ("madrid", "Spain"),
    ("new york", "United States"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct LocationParsed {
    pub city: String,
    pub country: String,
}

/// Recognizes "<city> <country>" and country aliases; city-only attempts a static lookup;
/// flexible keywords are explicit failures.
pub fn parse_location(text: &str) -> Option<LocationParsed> {
    let normalized = normalize(text);
    let lowered = normalized.to_lowercase();

    if FLEXIBLE_KEYWORDS.iter().any(|kw| lowered == *kw || lowered.contains(kw)) {
        return None;
    }
    if lowered.is_empty() {
        return None;
    }

    if let Some((_, country)) = COUNTRY_ALIASES.iter().find(|(alias, _)| lowered.ends_with(alias)) {
        let city_part = lowered
            .trim_end_matches(|c: char| c.is_alphanumeric())
            .trim();
        let city = if city_part.is_empty() {
            // the alias was the whole message; fall back to the original text as city
            normalized.clone()
        } else {
            title_case(city_part)
        };
        return Some(LocationParsed {
            city,
            country: country.to_string(),
        });
    }

    let words: Vec<&str> = lowered.split_whitespace().collect();
    if words.len() >= 2 {
        let last_word = *words.last().unwrap();
        if let Some((_, country)) = COUNTRY_ALIASES.iter().find(|(alias, _)| *alias == last_word) {
            let city = title_case(&words[..words.len() - 1].join(" "));
            return Some(LocationParsed {
                city,
                country: country.to_string(),
            });
        }
    }

    if let Some((city, country)) = CITY_TO_COUNTRY.iter().find(|(city, _)| lowered == *city) {
        return Some(LocationParsed {
            city: title_case(city),
            country: country.to_string(),
        });
    }

    None
}

fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Accepts bare digit `1..N`, or natural phrases containing an ordinal/digit `<=N`.
pub fn parse_slot_selection(text: &str, n_slots: usize) -> Option<usize> {
    if n_slots == 0 {
        return None;
    }
    let lowered = normalize(text).to_lowercase();

    let digits: String = lowered.chars().filter(|c| c.is_ascii_digit()).collect();
    if !digits.is_empty() {
        let n: usize = digits.parse().ok()?;
        if n >= 1 && n <= n_slots {
            return Some(n);
        }
        return None;
    }

    const ORDINALS: &[&str] = &[
        "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth",
        "tenth",
    ];
    for (idx, word) in ORDINALS.iter().enumerate() {
        if lowered.contains(word) {
            let n = idx + 1;
            if n <= n_slots {
                return Some(n);
            }
            return None;
        }
    }

    None
}

/// `parse_failure_counts[field]` bookkeeping, stored as a JSON object on `Lead`.
pub fn failure_count(counts: &Value, field: &str) -> i64 {
    counts
        .get(field)
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
}

pub fn record_failure(counts: &Value, field: &str) -> Value {
    let mut map: Map<String, Value> = counts.as_object().cloned().unwrap_or_default();
    let next = failure_count(counts, field) + 1;
    map.insert(field.to_string(), Value::from(next));
    Value::Object(map)
}

pub fn reset_failure(counts: &Value, field: &str) -> Value {
    let mut map: Map<String, Value> = counts.as_object().cloned().unwrap_or_default();
    map.insert(field.to_string(), Value::from(0));
    Value::Object(map)
}

pub const MAX_PARSE_FAILURES: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairVariant {
    Gentle,
    ShortWithExample,
    Handover,
}

/// Copy-variant selection per §4.5: attempt 1 -> gentle, attempt 2 -> short+example+boundary,
/// attempt >= 3 -> handover.
pub fn repair_variant(failures_after_this_one: i64) -> RepairVariant {
    match failures_after_this_one {
        1 => RepairVariant::Gentle,
        2 => RepairVariant::ShortWithExample,
        _ => RepairVariant::Handover,
    }
}

/// The bundle guard (§4.5): looks for >= 2 signals among dimension / budget-with-currency-or->=50
/// / style keyword / instagram handle. Instagram-handle + style at the reference_images /
/// instagram_handle step counts as one coherent signal (not two).
pub fn bundle_guard_triggered(text: &str, current_step_key: &str) -> bool {
    let lowered = normalize(text).to_lowercase();

    let has_dimension = parse_dimensions(&lowered).is_some();
    let has_budget_signal = (lowered.contains('£') || lowered.contains('$') || lowered.contains('€'))
        || parse_budget_pence(&lowered).map(|p| p >= 5_000).unwrap_or(false);
    let has_style_keyword = ["traditional", "realism", "blackwork", "fineline", "geometric", "watercolor"]
        .iter()
        .any(|kw| lowered.contains(kw));
    let has_instagram_handle = lowered.contains('@') || lowered.contains("instagram");

    let coherent_step = current_step_key == "reference_images" || current_step_key == "instagram_handle";
    let signals = if coherent_step && has_instagram_handle && has_style_keyword {
        [has_dimension, has_budget_signal, true].iter().filter(|b| **b).count()
    } else {
        [has_dimension, has_budget_signal, has_style_keyword, has_instagram_handle]
            .iter()
            .filter(|b| **b)
            .count()
    };

    signals >= 2
}

/// Wrong-field guard (§4.5): at `idea`/`placement` steps, low alphabetic-ratio messages are
/// reprompted rather than saved, since they're probably a budget or dimension answer typed into
/// the wrong question.
pub fn wrong_field_guard_triggered(text: &str, current_step_key: &str) -> bool {
    if current_step_key != "idea" && current_step_key != "placement" {
        return false;
    }
    let normalized = normalize(text);
    if normalized.is_empty() {
        return false;
    }
    let alpha_count = normalized.chars().filter(|c| c.is_alphabetic()).count();
    let total = normalized.chars().filter(|c| !c.is_whitespace()).count().max(1);
    let ratio = alpha_count as f64 / total as f64;

    let looks_like_budget = parse_budget_pence(&normalized).is_some();
    let looks_like_dimensions = parse_dimensions(&normalized).is_some();

    if looks_like_budget && ratio < 0.30 {
        return true;
    }
    if looks_like_dimensions && ratio < 0.50 {
        return true;
    }
    false
}

pub fn parse_failure_counts_map(counts: &Value) -> HashMap<String, i64> {
    counts
        .as_object()
        .map(|m| m.iter().filter_map(|(k, v)| v.as_i64().map(|n| (k.clone(), n))).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_basic() {
        assert_eq!(
            parse_dimensions("10x15cm"),
            Some(DimensionsCm { width_cm: 10.0, height_cm: 15.0 })
        );
        assert_eq!(
            parse_dimensions("10cm"),
            Some(DimensionsCm { width_cm: 10.0, height_cm: 10.0 })
        );
    }

    #[test]
    fn dimensions_reject_over_100cm() {
        assert_eq!(parse_dimensions("120x50cm"), None);
    }

    #[test]
    fn dimensions_inches_converted() {
        let d = parse_dimensions("4x4 inches").unwrap();
        assert!((d.width_cm - 10.16).abs() < 0.01);
    }

    #[test]
    fn budget_strips_symbols_and_k_suffix() {
        assert_eq!(parse_budget_pence("£500"), Some(50_000));
        assert_eq!(parse_budget_pence("1.5k"), Some(150_000));
    }

    #[test]
    fn budget_below_minimum_band_is_failure() {
        assert_eq!(parse_budget_pence("£49"), None);
        assert_eq!(parse_budget_pence("£50"), Some(5_000));
    }

    #[test]
    fn budget_negative_is_failure() {
        assert_eq!(parse_budget_pence("-50"), None);
    }

    #[test]
    fn location_city_country() {
        let loc = parse_location("London UK").unwrap();
        assert_eq!(loc.country, "United Kingdom");
    }

    #[test]
    fn location_flexible_is_failure() {
        assert_eq!(parse_location("anywhere"), None);
    }

    #[test]
    fn slot_selection_bounds() {
        assert_eq!(parse_slot_selection("10", 8), None);
        assert_eq!(parse_slot_selection("option 3", 8), Some(3));
        assert_eq!(parse_slot_selection("3", 8), Some(3));
    }

    #[test]
    fn bundle_guard_two_signals() {
        assert!(bundle_guard_triggered("10x15cm and £500 budget", "dimensions"));
        assert!(!bundle_guard_triggered("10x15cm", "dimensions"));
    }

    #[test]
    fn wrong_field_guard_catches_budget_in_idea() {
        assert!(wrong_field_guard_triggered("500", "idea"));
        assert!(!wrong_field_guard_triggered("a small rose on my arm", "idea"));
    }
}
