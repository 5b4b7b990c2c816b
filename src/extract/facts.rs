//! Best-effort single-field extractions. Each returns `None` on no match.

use super::contacts::is_common_noun;
use super::patterns::{
    AGE, BREED, CARE, CHIPPED, DATE, LITTER, LOCATION_TRIGGER, NAME_AFTER_NOUN, NAME_MARKER,
    SPACE, STATUS, STERILIZED, TIME, VACCINATED,
};
use super::{dedupe_keep_order, title_case};
use crate::post::Extras;

/// Characters after a date searched for a time of day.
const TIME_LOOKAHEAD: usize = 30;
const STATUS_MAX_CHARS: usize = 140;

pub fn extract_breed(text: &str) -> Option<String> {
    BREED.find(text).map(|m| title_case(m.as_str()))
}

/// Age as "<value> <unit>", e.g. "2 месяцев" or "1.5 года".
pub fn extract_age(text: &str) -> Option<String> {
    let caps = AGE.captures(text)?;
    let value = caps[1].replace(',', ".");
    let value = SPACE.replace_all(&value, "");
    Some(format!("{} {}", value, caps[2].to_lowercase()))
}

/// First date, with a nearby time of day appended as `HH:MM`.
pub fn extract_when(text: &str) -> Option<String> {
    let date = DATE.find(text)?;
    let after: String = text[date.end()..].chars().take(TIME_LOOKAHEAD).collect();

    let time = TIME.captures_iter(&after).find_map(|caps| {
        let whole = caps.get(0)?;
        // "27.08.2025" is another date, not a time
        let mut rest = after[whole.end()..].chars();
        if rest.next() == Some('.') && rest.next().is_some_and(|c| c.is_ascii_digit()) {
            return None;
        }
        let hours: u32 = caps[1].parse().ok()?;
        let minutes: u32 = caps[2].parse().ok()?;
        (hours < 24 && minutes < 60).then(|| format!("{:02}:{:02}", hours, minutes))
    });

    Some(match time {
        Some(time) => format!("{} {}", date.as_str(), time),
        None => date.as_str().to_string(),
    })
}

/// Shortest comma-separated segment containing a street or district
/// trigger. A following numeric segment is appended as the house number.
pub fn extract_location(text: &str) -> Option<String> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    let mut best: Option<String> = None;

    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() || !LOCATION_TRIGGER.is_match(part) {
            continue;
        }
        let mut candidate = part.to_string();
        if let Some(next) = parts.get(i + 1) {
            if is_numeric_like(next) {
                candidate = format!("{} {}", candidate, next);
            }
        }
        let shorter = best
            .as_ref()
            .map_or(true, |b| candidate.chars().count() < b.chars().count());
        if shorter {
            best = Some(candidate);
        }
    }

    best
}

fn is_numeric_like(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
}

/// Distinct temperament and care words, lowercased, comma separated.
pub fn extract_status_details(text: &str) -> Option<String> {
    let words = STATUS
        .find_iter(text)
        .map(|m| SPACE.replace_all(&m.as_str().to_lowercase(), " ").into_owned())
        .collect();
    let words = dedupe_keep_order(words);
    if words.is_empty() {
        return None;
    }
    Some(words.join(", ").chars().take(STATUS_MAX_CHARS).collect())
}

/// Pet name after "кличка"/"зовут", or a capitalized word right after
/// an animal noun ("Кошка Мася").
pub fn extract_pet_name(text: &str) -> Option<String> {
    let by_marker = NAME_MARKER.captures(text).map(|caps| caps[1].to_string());
    let name = by_marker.or_else(|| {
        NAME_AFTER_NOUN
            .captures_iter(text)
            .map(|caps| caps[1].to_string())
            .find(|word| !is_common_noun(word))
    })?;
    Some(title_case(&name))
}

pub fn extract_extras(text: &str) -> Extras {
    Extras {
        sterilized: CARE.is_match(text) && STERILIZED.is_match(text),
        vaccinated: VACCINATED.is_match(text),
        chipped: CHIPPED.is_match(text),
        litter_ok: LITTER.is_match(text),
    }
}
