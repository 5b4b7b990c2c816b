//! Rule-based classification of free-form post text.
//!
//! [`classify`] is pure and total: any input yields a [`Post`], possibly
//! with nothing but `type = unknown`. Degenerate inputs short-circuit to
//! `empty` or `link`. Every other field is filled by an independent pass
//! in [`kind`], [`contacts`] or [`facts`], so each can be tested on its own.

pub mod contacts;
pub mod facts;
pub mod kind;
mod patterns;

use std::collections::HashSet;

use crate::post::{Post, PostKey, PostType};
use patterns::{SPACE, URL, VK_BRACKET, VK_URL};

/// Posts with at most this many non-space characters left after removing
/// links and mentions are treated as bare links.
const LINK_ONLY_MAX_CHARS: usize = 20;

/// Classify raw post text into a structured record.
pub fn classify(key: PostKey, raw: &str) -> Post {
    let text = normalize(raw);
    let mut post = Post {
        owner_id: key.owner_id,
        post_id: key.post_id,
        raw: raw.to_string(),
        text: text.clone(),
        ..Default::default()
    };

    if text.is_empty() {
        post.post_type = PostType::Empty;
        return post;
    }

    post.vk_accounts = contacts::extract_vk_accounts(&text);
    if is_link_only(&text) {
        post.post_type = PostType::Link;
        return post;
    }

    post.post_type = kind::detect_type(&text);
    post.animal = kind::detect_animal(&text);
    post.sex = kind::detect_sex(&text);
    post.phones = contacts::extract_phones(&text);
    post.contact_names = contacts::extract_contact_names(&text);
    post.breed = facts::extract_breed(&text);
    post.age = facts::extract_age(&text);
    post.when = facts::extract_when(&text);
    post.location = facts::extract_location(&text);
    post.status_details = facts::extract_status_details(&text);
    post.name = facts::extract_pet_name(&text);
    post.extras = facts::extract_extras(&text);
    post
}

/// Collapse runs of whitespace (including non-breaking spaces) and trim.
pub fn normalize(raw: &str) -> String {
    let replaced = raw.replace('\u{00A0}', " ");
    SPACE.replace_all(&replaced, " ").trim().to_string()
}

/// True when the text is essentially a link or mention with a short caption.
pub fn is_link_only(text: &str) -> bool {
    let stripped = URL.replace_all(text, "");
    let stripped = VK_URL.replace_all(&stripped, "");
    let stripped = VK_BRACKET.replace_all(&stripped, "");
    if stripped.len() == text.len() {
        return false;
    }
    stripped.chars().filter(|c| !c.is_whitespace()).count() <= LINK_ONLY_MAX_CHARS
}

pub(crate) fn dedupe_keep_order(items: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| !item.is_empty() && seen.insert(item.clone()))
        .collect()
}

pub(crate) fn title_case(s: &str) -> String {
    let lower = s.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::post::{Animal, Sex};

    fn parse(text: &str) -> Post {
        classify(PostKey::new(-1, 1), text)
    }

    fn has_all(haystack: &[String], needles: &[&str]) -> bool {
        needles.iter().all(|n| haystack.iter().any(|h| h == n))
    }

    #[test]
    fn test_lost_cat_with_address_and_phone() {
        let post = parse(
            "Пропала кошка! Срочно нужна помощь. Пушкинская улица, 283, Ижевск. Телефон: 79120281683. Имя хозяина: Юрий. Кошка Мася",
        );
        assert_eq!(post.post_type, PostType::Lost);
        assert_eq!(post.animal, Animal::Cat);
        assert_eq!(post.phones, ["+79120281683"]);
        let location = post.location.unwrap();
        assert!(location.contains("Пушкинская улица") && location.contains("283"), "{location}");
        assert!(has_all(&post.contact_names, &["Юрий"]), "{:?}", post.contact_names);
        assert_eq!(post.name.as_deref(), Some("Мася"));
    }

    #[test]
    fn test_sighting_dog_without_phone() {
        let post = parse("Бегает на Закирова и Первомайской кобелек, похож на Йорка, поймать не смогли");
        assert_eq!(post.post_type, PostType::Sighting);
        assert_eq!(post.animal, Animal::Dog);
        assert_eq!(post.sex, Sex::M);
        assert!(post.breed.unwrap().to_lowercase().contains("йорк"));
        let location = post.location.unwrap();
        assert!(location.contains("Закирова") && location.contains("Первомайск"), "{location}");
        assert!(post.phones.is_empty());
    }

    #[test]
    fn test_found_cat_with_phone_and_name() {
        let post = parse("Найден кот. Район Заречное шоссе 49. 89127500184 Александр");
        assert_eq!(post.post_type, PostType::Found);
        assert_eq!(post.animal, Animal::Cat);
        assert_eq!(post.phones, ["+79127500184"]);
        assert!(has_all(&post.contact_names, &["Александр"]));
        let location = post.location.unwrap();
        assert!(location.contains("Заречное шоссе") && location.contains("49"));
    }

    #[test]
    fn test_adoption_with_care_flags() {
        let post = parse("Красивая кошечка, стерилизована, обработана. Лоток на отлично. 8-912-762-92-39 Ольга");
        assert_eq!(post.post_type, PostType::Adoption);
        assert_eq!(post.animal, Animal::Cat);
        assert!(post.extras.sterilized);
        assert!(post.extras.litter_ok);
        assert_eq!(post.phones, ["+79127629239"]);
        assert!(has_all(&post.contact_names, &["Ольга"]));
    }

    #[test]
    fn test_fundraising() {
        let post = parse("Помочь оплатить передержку. Сумма к сбору. 📞 8912 4586329 Анна");
        assert_eq!(post.post_type, PostType::Fundraising);
        assert_eq!(post.phones, ["+79124586329"]);
        assert!(has_all(&post.contact_names, &["Анна"]));
    }

    #[test]
    fn test_lost_with_date_and_time() {
        let post = parse("Потерялась кошка. Воткинское шоссе 39 26.08.2025 примерно в 22:00. 89120216801");
        assert_eq!(post.post_type, PostType::Lost);
        assert!(post.when.unwrap().contains("26.08.2025"));
        let location = post.location.unwrap();
        assert!(location.contains("Воткинское шоссе") && location.contains("39"));
        assert_eq!(post.phones, ["+79120216801"]);
    }

    #[test]
    fn test_adoption_kitten_age() {
        let post = parse("Малышу около 2х месяцев, лотком пользуется, пишите Юлии 89501684430");
        assert_eq!(post.post_type, PostType::Adoption);
        assert!(post.age.unwrap().contains('2'));
        assert_eq!(post.phones, ["+79501684430"]);
    }

    #[test]
    fn test_lost_multiple_areas() {
        let post = parse("Мы потеряли кота. Районы Люкшудья и Шабердино. 8 922 405 26 12 - Татьяна");
        assert_eq!(post.post_type, PostType::Lost);
        assert_eq!(post.phones, ["+79224052612"]);
        assert!(has_all(&post.contact_names, &["Татьяна"]));
        let location = post.location.unwrap();
        assert!(location.contains("Люкшудья") && location.contains("Шабердино"));
    }

    #[test]
    fn test_adoption_extras_only() {
        let post = parse("стерилизована, вакцинирована. Лоток на отлично");
        assert_eq!(post.post_type, PostType::Adoption);
        assert!(post.extras.sterilized);
        assert!(post.extras.vaccinated);
        assert!(post.extras.litter_ok);
    }

    #[test]
    fn test_adoption_looking_for_home() {
        let post = parse("Кошечка ищет дом, ласковая, 8 906 816 84 18");
        assert_eq!(post.post_type, PostType::Adoption);
        assert_eq!(post.animal, Animal::Cat);
        assert_eq!(post.phones, ["+79068168418"]);
        assert_eq!(post.status_details.as_deref(), Some("ласковая"));
    }

    #[test]
    fn test_link_only() {
        let post = parse("https://vk.com/wall107929440_36");
        let expected = Post {
            owner_id: -1,
            post_id: 1,
            raw: "https://vk.com/wall107929440_36".to_string(),
            text: "https://vk.com/wall107929440_36".to_string(),
            post_type: PostType::Link,
            ..Default::default()
        };
        assert_eq!(post, expected);
    }

    #[test]
    fn test_link_with_mention_keeps_accounts() {
        let post = parse("Репост [id55|Ирина Ли] https://vk.com/wall-1_2");
        assert_eq!(post.post_type, PostType::Link);
        assert_eq!(post.vk_accounts, ["[id55|Ирина Ли]"]);
        assert!(post.contact_names.is_empty());
    }

    #[test]
    fn test_short_text_without_links_is_not_link() {
        assert_eq!(parse("Найден кот у подъезда").post_type, PostType::Found);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse("").post_type, PostType::Empty);
        let post = parse(" \u{00A0}\n\t ");
        assert_eq!(post.post_type, PostType::Empty);
        assert_eq!(post.text, "");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  Пропала\u{00A0}\u{00A0}кошка\n\n во дворе "), "Пропала кошка во дворе");
    }

    #[test]
    fn test_classify_is_deterministic() {
        let text = "Найден кот, потом потерялся. Кличка Барс. 8 922 405 26 12 Татьяна, улица Ленина, 5";
        let a = parse(text);
        let b = parse(text);
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
    }

    #[test]
    fn test_unknown_has_no_facts() {
        let post = parse("Привет всем! Отличный день. Погода сегодня просто прекрасная.");
        assert_eq!(post.post_type, PostType::Unknown);
        assert_eq!(post.animal, Animal::Unknown);
        assert!(post.phones.is_empty());
        assert_eq!(post.location, None);
        assert_eq!(post.when, None);
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("йорк"), "Йорк");
        assert_eq!(title_case(" МАСЯ "), "Мася");
        assert_eq!(title_case(""), "");
    }
}
