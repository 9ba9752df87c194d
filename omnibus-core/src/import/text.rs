//! format-agnostic normalization of the free text feeds carry: shouting
//! names, placeholder values, and the summary strings built from operating
//! profiles.

use std::sync::OnceLock;

use regex::Regex;

/// words kept as-is when title-casing an all-caps name
const INITIALISMS: &[&str] = &["YMCA", "PH"];

const SMALL_WORDS: &[&str] = &["a", "an", "and", "at", "by", "in", "of", "on", "or", "the", "to", "via"];

/// title-cases a name that arrived in all capitals, leaving known
/// initialisms and joining words alone
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, word) in text.split(' ').enumerate() {
        if i > 0 {
            out.push(' ');
        }
        if INITIALISMS.contains(&word) {
            out.push_str(word);
        } else if i > 0 && SMALL_WORDS.contains(&word.to_lowercase().as_str()) {
            out.push_str(&word.to_lowercase());
        } else {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str().to_lowercase().as_str());
            }
        }
    }
    out
}

/// values some publishers put where a real value should be
pub fn strip_placeholder(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    let placeholder = trimmed.is_empty()
        || ["unknown", "n/a", "tba", "tbc", "none"]
            .iter()
            .any(|p| trimmed.eq_ignore_ascii_case(p));
    (!placeholder).then_some(trimmed)
}

/// tidies the summary string assembled from an operating profile's named
/// clauses, collapsing the stutters the upstream composition produces
pub fn normalize_summary(summary: &str) -> String {
    static SCHOOL: OnceLock<Regex> = OnceLock::new();

    if summary == "not School vacation in free public holidays regulation holidays" {
        return "not school holidays".to_string();
    }
    let summary = summary
        .replace(" days days", " days")
        .replace("olidays holidays", "olidays")
        .replace("AnySchool", "school");
    SCHOOL
        .get_or_init(|| Regex::new(r"(?i)school(day)?s").unwrap())
        .replace_all(&summary, "school")
        .into_owned()
}

/// shortens the "Bus Station bay 5,Blyth - Grange Road turning circle,
/// Widdrington Station" style of description some regions publish down to
/// "Blyth - Widdrington Station"
pub fn sanitize_description(description: &str) -> String {
    static PART: OnceLock<Regex> = OnceLock::new();
    let part_re = PART.get_or_init(|| Regex::new(r"(?s).+,([^ ].+)$").unwrap());

    description
        .split(" - ")
        .map(|part| {
            part_re
                .captures(part.trim())
                .and_then(|c| c.get(1))
                .map(|m| m.as_str())
                .unwrap_or(part)
                .to_string()
        })
        .collect::<Vec<String>>()
        .join(" - ")
}
