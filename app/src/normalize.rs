use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const DEFAULT_CATEGORY: &str = "General";

static JSON_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.(json|JSON)$").unwrap());
static GENRE_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,/|]\s*").unwrap());
static CAST_NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\n\s*,?\s*").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TITLE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{4})\)").unwrap());

pub fn value_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

pub fn first_present<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn title_case(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_alpha = false;
    for c in input.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

pub fn clean_category_name(name: &str) -> String {
    if name.trim().is_empty() {
        return DEFAULT_CATEGORY.to_string();
    }
    let spaced = name.replace('_', " ");
    let stripped = JSON_SUFFIX.replace(&spaced, "");
    let cleaned = title_case(stripped.trim());
    if cleaned.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        cleaned
    }
}

pub fn category_from_location(location: &str) -> String {
    let without_query = location.split(['?', '#']).next().unwrap_or_default();
    let base = without_query
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    clean_category_name(&JSON_SUFFIX.replace(base, ""))
}

pub fn normalize_genres(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(value_text).collect(),
        Some(Value::String(s)) => GENRE_SPLIT
            .split(s)
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

pub fn clean_cast(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(value_text).collect(),
        Some(Value::String(s)) => split_cast(s),
        _ => Vec::new(),
    }
}

pub fn split_cast(raw: &str) -> Vec<String> {
    let joined = CAST_NEWLINE.replace_all(raw, ",");
    let collapsed = WHITESPACE_RUN.replace_all(&joined, " ");
    collapsed
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn year_in_title(title: &str) -> Option<String> {
    TITLE_YEAR
        .captures(title)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn resolve_year(explicit: Option<&str>, title: &str) -> String {
    first_present([explicit])
        .or_else(|| year_in_title(title))
        .unwrap_or_default()
}

fn is_zero_sentinel(rating: &str) -> bool {
    matches!(rating.trim(), "" | "0" | "0.0")
}

pub fn decimal_text(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

/// Scales a 10-point rating string onto the 5-point scale players expect.
pub fn rating_5based(rating: &str) -> String {
    if is_zero_sentinel(rating) {
        return "0.0".to_string();
    }
    match rating.trim().parse::<f64>() {
        Ok(value) if value == 0.0 => "0.0".to_string(),
        Ok(value) if value.is_finite() => decimal_text(value / 2.0),
        _ => "0.0".to_string(),
    }
}
