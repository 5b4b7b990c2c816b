//! Post type, animal and sex detection.

use super::patterns::{
    ADOPTION, CARE, CAT, DOG, FEMALE, FOUND, FOUND_SPECIFIC, FUNDRAISING, LOST, MALE, SIGHTING,
};
use crate::post::{Animal, PostType, Sex};

/// Resolve the post type from independent marker tests.
///
/// When both "found" and "lost" markers are present the post is `Found`
/// only if a "found" word is followed by an animal noun.
pub fn detect_type(text: &str) -> PostType {
    let lost = LOST.is_match(text);
    let found = FOUND.is_match(text);

    if found && lost {
        if FOUND_SPECIFIC.is_match(text) {
            return PostType::Found;
        }
        return PostType::Lost;
    }
    if found {
        return PostType::Found;
    }
    if lost {
        return PostType::Lost;
    }
    if SIGHTING.is_match(text) {
        return PostType::Sighting;
    }
    if ADOPTION.is_match(text) || CARE.is_match(text) {
        return PostType::Adoption;
    }
    if FUNDRAISING.is_match(text) {
        return PostType::Fundraising;
    }
    PostType::Unknown
}

/// Cat wins over dog when both are mentioned.
pub fn detect_animal(text: &str) -> Animal {
    if CAT.is_match(text) {
        Animal::Cat
    } else if DOG.is_match(text) {
        Animal::Dog
    } else {
        Animal::Unknown
    }
}

pub fn detect_sex(text: &str) -> Sex {
    if MALE.is_match(text) {
        Sex::M
    } else if FEMALE.is_match(text) {
        Sex::F
    } else {
        Sex::Unknown
    }
}
