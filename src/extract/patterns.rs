//! Compiled patterns shared by the extraction passes.
//!
//! Rust's `\b` is Unicode-aware, so word boundaries behave correctly
//! around Cyrillic letters.

use regex::Regex;
use std::sync::LazyLock;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern must compile")
}

pub static SPACE: LazyLock<Regex> = LazyLock::new(|| re(r"\s+"));

// Links and mentions
pub static URL: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)https?://\S+"));
pub static VK_URL: LazyLock<Regex> = LazyLock::new(|| {
    re(r#"(?i)(?:https?://)?(?:m\.)?vk\.com/([^\s\[\]<>()«»"',;!?]*)"#)
});
pub static VK_BRACKET: LazyLock<Regex> =
    LazyLock::new(|| re(r"\[((?:id|club|public)\d+)\|([^\]]+)\]"));
/// URL paths that point at content rather than an account.
pub static VK_CONTENT_PATH: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)^(?:(?:wall|photo|video|album|topic|doc|clip|note|market|board|page)-?\d|away\.php)")
});

// Post type markers
pub static LOST: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)пропал|потерял|убежал|сбежал"));
pub static FOUND: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)найден|нашл[аи]|подобрал"));
pub static SIGHTING: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)замечен|видел|бегает|появил(?:ся|ась|ись)"));
pub static ADOPTION: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)ищет\s+дом|в\s+добрые\s+руки|отда[её]м|пристраива")
});
pub static CARE: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)стерилиз|кастрир|вакц|привит|чипир|лото?к"));
pub static FUNDRAISING: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(?:сбор|оплатить|перевод|передержк\p{L}*|карт[аеуы]?)\b")
});
/// "Found" followed somewhere later by an animal noun.
pub static FOUND_SPECIFIC: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)найден\S*.*(?:кот|собак|п[её]с|кобел|щен|живот)"));

// Animal and sex
pub static CAT: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)кошечк|кошк|\bкот(?:а|у|ом|е|ы|ов|ик\p{L}*)?\b|кот[её]н|кис[ао]ньк|бенгальск")
});
pub static DOG: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)собак|собач|\bп[её]с(?:ик\p{L}*)?\b|\bпсин|кобел|\bщен")
});
pub static MALE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)кобел[её]к|кобел[ья]|мальчик"));
pub static FEMALE: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)девочк|\bсук[аи]\b|\bсучк"));

// Phones
pub static PHONE: LazyLock<Regex> = LazyLock::new(|| {
    re(concat!(
        r"(?:\+7|\b8)[\s-]*\(?\d{3}\)?[\s-]*\d{3}[\s-]?\d{2}[\s-]?\d{2}",
        r"|\b9\d{2}[\s-]?\d{3}[\s-]?\d{2}[\s-]?\d{2}\b",
        r"|\b7\d{10}\b",
    ))
});
pub static CAPITALIZED_WORD: LazyLock<Regex> = LazyLock::new(|| re(r"\b[А-ЯЁ][а-яё]{2,}\b"));

// Facts
pub static BREED: LazyLock<Regex> = LazyLock::new(|| {
    re(concat!(
        r"(?i)бенгальск\p{L}*|йорк(?:шир\p{L}*)?|лабрадор\p{L}*|овчарк\p{L}*|\bхаск\p{L}*",
        r"|\bтакс(?:а|ы|у|ой|ик\p{L}*)?\b|спаниел\p{L}*|метис\p{L}*",
    ))
});
pub static AGE: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?i)\b(\d+(?:[.,]\d+)?(?:\s*-\s*\d+)?)\s*[xх]?\s*(месяц(?:ев|а)?|мес|недел[ьия]|год(?:а|ик\p{L}*)?|лет)\b")
});
pub static DATE: LazyLock<Regex> =
    LazyLock::new(|| re(r"\b\d{1,2}\.\d{1,2}\.(?:\d{4}|\d{2})\b"));
pub static TIME: LazyLock<Regex> = LazyLock::new(|| re(r"\b(\d{1,2})[:.](\d{2})\b"));
pub static LOCATION_TRIGGER: LazyLock<Regex> = LazyLock::new(|| {
    re(concat!(
        r"(?i)улиц|шосс|просп|пер(?:е)?ул|площад|бульвар|район|\bснт\b|город|деревн|пос(?:е)?лок",
        r"|ижевск|закирова|первомайск|люкшудья|шабердино|воткинск",
    ))
});
pub static STATUS: LazyLock<Regex> = LazyLock::new(|| {
    re(concat!(
        r"(?i)\b(?:рыж|белоснежн|пуглив|ласков|игрив|домашн|кастрир|стерилиз|вакцин|чипир)\p{L}*",
        r"|\bлото?к\p{L}*|\bбез\s+ошейник\p{L}*",
    ))
});
pub static NAME_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    re(r#"(?i)(?:кличк[аеуи]|зовут|по\s+имени)\s*[:\-–]?\s*["«]?(\p{L}[\p{L}-]+)"#)
});
pub static NAME_AFTER_NOUN: LazyLock<Regex> = LazyLock::new(|| {
    re(r"\b(?i:кошечк[аи]|кошк[аи]|котик|кот[её]нок|кот|п[её]сик|п[её]с|собак[аи]|кобел[её]к|щенок)\s+([А-ЯЁ][а-яё]+)")
});

// Care flags
pub static STERILIZED: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)стерилиз|кастрир"));
pub static VACCINATED: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)вакцин|привит"));
pub static CHIPPED: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)чипир|\bчип\b"));
pub static LITTER: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)лото?к"));
