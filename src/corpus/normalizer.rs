//! Speaker label normalization.
//!
//! Maps raw transcript labels ("Sehldon", "PENNY(voice)", "leonard:") onto the
//! closed cast vocabulary. Stage directions, crowd labels and generic roles are
//! rejected before any lookup happens.

use std::collections::{HashMap, HashSet};

use crate::config::ConfigError;
use crate::domain::CanonicalCharacter;

/// Known raw-label variants for each canonical character
pub const BUILTIN_RULES: &[(CanonicalCharacter, &[&str])] = &[
    (
        CanonicalCharacter::Sheldon,
        &["sheldon", "sehldon", "shedon", "shldon", "sheldon)", "sheldon-bot"],
    ),
    (
        CanonicalCharacter::Leonard,
        &["leonard", "leoanard", "leonard)", "leonard:", "leonard-warrior"],
    ),
    (
        CanonicalCharacter::Penny,
        &["penny", "penny)", "penny(voice)", "penny-warrior"],
    ),
    (CanonicalCharacter::Howard, &["howard", "howard)", "howatd"]),
    (CanonicalCharacter::Raj, &["raj", "raj)", "rajj"]),
    (CanonicalCharacter::Amy, &["amy", "amy(off)", "amy farrah fowler"]),
    (
        CanonicalCharacter::Bernadette,
        &["bernadette", "bermadette", "bernedette"],
    ),
    (CanonicalCharacter::Stuart, &["stuart"]),
    (CanonicalCharacter::MaryCooper, &["mary"]),
    (CanonicalCharacter::BeverlyHofstadter, &["beverly", "beverley"]),
    (CanonicalCharacter::DebbieWolowitz, &["debbie"]),
    (CanonicalCharacter::Wyatt, &["wyatt"]),
    (CanonicalCharacter::Susan, &["susan"]),
];

/// Labels that never denote a character
pub const BUILTIN_BANNED: &[&str] = &[
    "scene", "voice", "voiceover", "crowd", "staff", "woman", "man", "waiter", "waitress",
    "doctor", "nurse", "announcer", "mother", "father", "dad", "mom", "child", "children",
];

/// Raw label -> canonical character lookup
#[derive(Debug, Clone)]
pub struct CharacterNormalizer {
    lookup: HashMap<String, CanonicalCharacter>,
    banned: HashSet<String>,
}

impl Default for CharacterNormalizer {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CharacterNormalizer {
    /// Normalizer over the built-in rule and banned tables
    pub fn builtin() -> Self {
        let lookup = BUILTIN_RULES
            .iter()
            .flat_map(|(character, variants)| {
                variants.iter().map(move |v| (v.to_string(), *character))
            })
            .collect();
        let banned = BUILTIN_BANNED.iter().map(|s| s.to_string()).collect();

        Self { lookup, banned }
    }

    /// Build a normalizer from custom tables
    ///
    /// Variants and banned labels are trimmed and lower-cased. Fails if a
    /// variant is also banned, or if one variant maps to two characters.
    pub fn new<'a, R, B>(rules: R, banned: B) -> Result<Self, ConfigError>
    where
        R: IntoIterator<Item = (CanonicalCharacter, &'a [&'a str])>,
        B: IntoIterator<Item = &'a str>,
    {
        let banned: HashSet<String> = banned.into_iter().map(fold).collect();
        let mut lookup: HashMap<String, CanonicalCharacter> = HashMap::new();

        for (character, variants) in rules {
            for variant in variants {
                let key = fold(variant);
                if banned.contains(&key) {
                    return Err(ConfigError::BannedAlias {
                        label: key,
                        character,
                    });
                }
                if let Some(&existing) = lookup.get(&key) {
                    if existing != character {
                        return Err(ConfigError::ConflictingAlias {
                            label: key,
                            first: existing,
                            second: character,
                        });
                    }
                }
                lookup.insert(key, character);
            }
        }

        Ok(Self { lookup, banned })
    }

    /// Map a raw speaker label to its canonical character
    ///
    /// Returns `None` for stage directions like "(laughing)", banned labels,
    /// and anything not in the variant table.
    pub fn normalize(&self, raw: &str) -> Option<CanonicalCharacter> {
        let name = fold(raw);

        if name.starts_with('(') && name.ends_with(')') {
            return None;
        }

        if self.banned.contains(&name) {
            return None;
        }

        self.lookup.get(&name).copied()
    }

    /// Whether a label is in the banned set (after trim + lower-case)
    pub fn is_banned(&self, raw: &str) -> bool {
        self.banned.contains(&fold(raw))
    }

    /// Number of known variants
    pub fn variant_count(&self) -> usize {
        self.lookup.len()
    }
}

fn fold(raw: &str) -> String {
    raw.trim().to_lowercase()
}
