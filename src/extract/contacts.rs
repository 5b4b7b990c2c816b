//! Phones, VK account mentions and contact names.

use super::patterns::{
    CAPITALIZED_WORD, CAT, DOG, LOCATION_TRIGGER, PHONE, VK_BRACKET, VK_CONTENT_PATH, VK_URL,
};
use super::dedupe_keep_order;

/// Characters of context on each side of a phone number searched for names.
const NAME_WINDOW: usize = 25;

const STOP_WORDS: &[&str] = &[
    "телефон", "тел", "звоните", "пишите", "связь", "имя", "район", "районы", "улица",
    "проспект", "бульвар", "кошка", "кошечка", "собака", "срочно", "лоток", "сумма",
];

/// Russian mobile numbers normalized to `+7XXXXXXXXXX`, first-seen order.
pub fn extract_phones(text: &str) -> Vec<String> {
    let phones = PHONE
        .find_iter(text)
        .filter_map(|m| normalize_phone(m.as_str()))
        .collect();
    dedupe_keep_order(phones)
}

fn normalize_phone(raw: &str) -> Option<String> {
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 11 && digits.starts_with('8') {
        digits.replace_range(..1, "7");
    }
    match digits.len() {
        11 if digits.starts_with('7') => Some(format!("+{digits}")),
        10 if digits.starts_with('9') => Some(format!("+7{digits}")),
        _ => None,
    }
}

/// Bracketed `[id123|Name]` mentions first, then account URLs.
///
/// URLs that point at walls, photos and other content are not accounts.
pub fn extract_vk_accounts(text: &str) -> Vec<String> {
    let mut accounts: Vec<String> = VK_BRACKET
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();

    for caps in VK_URL.captures_iter(text) {
        let path = caps
            .get(1)
            .map_or("", |m| m.as_str())
            .trim_end_matches(['.', '/']);
        if path.is_empty() || VK_CONTENT_PATH.is_match(path) {
            continue;
        }
        accounts.push(format!("vk.com/{path}"));
    }

    dedupe_keep_order(accounts)
}

/// Capitalized words near phone numbers plus first names from mentions.
pub fn extract_contact_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();

    for phone in PHONE.find_iter(text) {
        let start = char_offset(text, phone.start()).saturating_sub(NAME_WINDOW);
        let end = char_offset(text, phone.end()) + NAME_WINDOW;

        for word in CAPITALIZED_WORD.find_iter(text) {
            let word_start = char_offset(text, word.start());
            let word_end = char_offset(text, word.end());
            if word_start < start || word_end > end {
                continue;
            }
            if is_common_noun(word.as_str()) {
                continue;
            }
            names.push(word.as_str().to_string());
        }
    }

    names.extend(names_from_mentions(text));
    dedupe_keep_order(names)
}

fn names_from_mentions(text: &str) -> Vec<String> {
    VK_BRACKET
        .captures_iter(text)
        .filter_map(|caps| caps.get(2))
        .filter_map(|m| m.as_str().split_whitespace().next())
        .map(str::to_string)
        .collect()
}

pub(crate) fn is_common_noun(word: &str) -> bool {
    let lower = word.to_lowercase();
    STOP_WORDS.contains(&lower.as_str())
        || LOCATION_TRIGGER.is_match(word)
        || CAT.is_match(word)
        || DOG.is_match(word)
}

fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}
