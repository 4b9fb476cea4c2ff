//! The closed cast vocabulary.
//!
//! Every character identity that leaves the normalizer, lands in a document,
//! or appears in an attribution result is one of these variants.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A canonical character identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CanonicalCharacter {
    // Main cast
    Sheldon,
    Leonard,
    Penny,
    Howard,
    Raj,
    Amy,
    Bernadette,
    Stuart,

    // Sheldon's family
    #[serde(rename = "Mary Cooper")]
    MaryCooper,
    #[serde(rename = "George Cooper")]
    GeorgeCooper,
    #[serde(rename = "Missy Cooper")]
    MissyCooper,
    Meemaw,

    // Leonard's family
    #[serde(rename = "Beverly Hofstadter")]
    BeverlyHofstadter,
    #[serde(rename = "Alfred Hofstadter")]
    AlfredHofstadter,

    // Penny's family
    Susan,
    Wyatt,

    // Howard's family
    #[serde(rename = "Debbie Wolowitz")]
    DebbieWolowitz,

    // Raj's family
    #[serde(rename = "Mrs. Koothrappali")]
    MrsKoothrappali,
    #[serde(rename = "Dr. Koothrappali")]
    DrKoothrappali,

    // Amy's family
    #[serde(rename = "Mrs. Fowler")]
    MrsFowler,
    #[serde(rename = "Mr. Fowler")]
    MrFowler,

    // Bernadette's family
    #[serde(rename = "Mrs. Rostenkowski")]
    MrsRostenkowski,
    #[serde(rename = "Mr. Rostenkowski")]
    MrRostenkowski,
}

/// Principal cast members, eligible for the short-query boost
pub const MAIN_CHARACTERS: [CanonicalCharacter; 8] = [
    CanonicalCharacter::Sheldon,
    CanonicalCharacter::Leonard,
    CanonicalCharacter::Penny,
    CanonicalCharacter::Howard,
    CanonicalCharacter::Raj,
    CanonicalCharacter::Amy,
    CanonicalCharacter::Bernadette,
    CanonicalCharacter::Stuart,
];

/// Relatives and close family
pub const RELATIVES: [CanonicalCharacter; 15] = [
    CanonicalCharacter::MaryCooper,
    CanonicalCharacter::GeorgeCooper,
    CanonicalCharacter::MissyCooper,
    CanonicalCharacter::Meemaw,
    CanonicalCharacter::BeverlyHofstadter,
    CanonicalCharacter::AlfredHofstadter,
    CanonicalCharacter::Susan,
    CanonicalCharacter::Wyatt,
    CanonicalCharacter::DebbieWolowitz,
    CanonicalCharacter::MrsKoothrappali,
    CanonicalCharacter::DrKoothrappali,
    CanonicalCharacter::MrsFowler,
    CanonicalCharacter::MrFowler,
    CanonicalCharacter::MrsRostenkowski,
    CanonicalCharacter::MrRostenkowski,
];

impl CanonicalCharacter {
    /// Every allowed character, main cast first
    pub fn all() -> impl Iterator<Item = CanonicalCharacter> {
        MAIN_CHARACTERS.into_iter().chain(RELATIVES)
    }

    /// Display name as it appears in documents and results
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sheldon => "Sheldon",
            Self::Leonard => "Leonard",
            Self::Penny => "Penny",
            Self::Howard => "Howard",
            Self::Raj => "Raj",
            Self::Amy => "Amy",
            Self::Bernadette => "Bernadette",
            Self::Stuart => "Stuart",
            Self::MaryCooper => "Mary Cooper",
            Self::GeorgeCooper => "George Cooper",
            Self::MissyCooper => "Missy Cooper",
            Self::Meemaw => "Meemaw",
            Self::BeverlyHofstadter => "Beverly Hofstadter",
            Self::AlfredHofstadter => "Alfred Hofstadter",
            Self::Susan => "Susan",
            Self::Wyatt => "Wyatt",
            Self::DebbieWolowitz => "Debbie Wolowitz",
            Self::MrsKoothrappali => "Mrs. Koothrappali",
            Self::DrKoothrappali => "Dr. Koothrappali",
            Self::MrsFowler => "Mrs. Fowler",
            Self::MrFowler => "Mr. Fowler",
            Self::MrsRostenkowski => "Mrs. Rostenkowski",
            Self::MrRostenkowski => "Mr. Rostenkowski",
        }
    }

    /// Whether this character belongs to the principal cast
    pub fn is_main(&self) -> bool {
        MAIN_CHARACTERS.contains(self)
    }

    /// Filesystem/URL friendly slug ("Mrs. Fowler" -> "mrs_fowler")
    pub fn slug(&self) -> String {
        let mut slug = String::new();
        let mut pending_sep = false;
        for c in self.as_str().chars() {
            if c.is_ascii_alphanumeric() {
                if pending_sep && !slug.is_empty() {
                    slug.push('_');
                }
                pending_sep = false;
                slug.push(c.to_ascii_lowercase());
            } else {
                pending_sep = true;
            }
        }
        slug
    }
}

impl fmt::Display for CanonicalCharacter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for names outside the cast vocabulary
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Not a canonical character: {0}")]
pub struct UnknownCharacter(pub String);

impl FromStr for CanonicalCharacter {
    type Err = UnknownCharacter;

    /// Exact match on the display name only. Raw transcript labels go through
    /// the normalizer instead.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCharacter(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        for character in CanonicalCharacter::all() {
            let parsed: CanonicalCharacter = character.as_str().parse().unwrap();
            assert_eq!(parsed, character);
        }
    }

    #[test]
    fn test_serde_uses_display_name() {
        let json = serde_json::to_string(&CanonicalCharacter::MrsKoothrappali).unwrap();
        assert_eq!(json, "\"Mrs. Koothrappali\"");

        let parsed: CanonicalCharacter = serde_json::from_str("\"Debbie Wolowitz\"").unwrap();
        assert_eq!(parsed, CanonicalCharacter::DebbieWolowitz);
    }

    #[test]
    fn test_from_str_is_exact() {
        assert!("sheldon".parse::<CanonicalCharacter>().is_err());
        assert!("Kripke".parse::<CanonicalCharacter>().is_err());
    }

    #[test]
    fn test_main_cast() {
        assert!(CanonicalCharacter::Penny.is_main());
        assert!(!CanonicalCharacter::MaryCooper.is_main());
        assert_eq!(CanonicalCharacter::all().count(), 23);
    }

    #[test]
    fn test_slug() {
        assert_eq!(CanonicalCharacter::Sheldon.slug(), "sheldon");
        assert_eq!(CanonicalCharacter::MrsFowler.slug(), "mrs_fowler");
        assert_eq!(CanonicalCharacter::MaryCooper.slug(), "mary_cooper");
    }
}
