//! Name normalization: turning free-text item names into comparable keys.
//!
//! Every function here is pure and total. Garbage in yields an empty key, never
//! an error; callers decide whether an empty key is acceptable.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::catalog::{Kind, KindUnit, Unit};

/// Grams deducted for one full plate of a gram-unit food.
pub const FULL_PORTION_GRAMS: u64 = 350;

/// Grams deducted for an "extra" or "half" portion.
pub const REDUCED_PORTION_GRAMS: u64 = 175;

/// Portion modifiers collapsed onto the base item.
const PORTION_TOKENS: [&str; 2] = ["extra", "half"];

/// Foods counted in pieces rather than grams. `plastic` is how staff often
/// write takeaway packs.
const PIECE_FOOD_TOKENS: &[&str] = &[
    "moimoi", "moimo", "moi", "plantain", "dodo", "pack", "packs", "plastic", "plastics",
];

const PROTEIN_TOKENS: &[&str] = &[
    "chicken", "beef", "goat", "turkey", "fish", "meat", "protein", "gizzard", "ponmo", "shaki",
    "kote", "cowleg", "egg",
];

const DRINK_TOKENS: &[&str] = &[
    "coke", "cola", "fanta", "sprite", "pepsi", "7up", "malt", "water", "juice", "zobo", "chapman",
    "soda", "smoothie", "yoghurt", "yogurt", "drink",
];

/// Canonical slug: lowercase, diacritics stripped, only `[a-z0-9]` kept.
///
/// `"Jollof Rice"` and `"jollof-rice"` both become `"jollofrice"`; `"Dodó"`
/// becomes `"dodo"`.
pub fn normalize_slug(s: &str) -> String {
    fold(s.chars())
}

/// Slug with every `extra`/`half` token removed, so portion variants share
/// the base item's stock.
///
/// Tokens are removed in one left-to-right pass over the slug.
pub fn base_food_slug(s: &str) -> String {
    strip_portion_tokens(&normalize_slug(s))
}

/// Last-resort fuzzy key. Separators (whitespace, `-`, `_`) are dropped before
/// the alphanumeric filter. Never used as a primary identity.
pub fn loose_key(s: &str) -> String {
    fold(s.chars().filter(|c| !(c.is_whitespace() || *c == '-' || *c == '_')))
}

/// True when the name carries an `extra`/`half` portion modifier.
pub fn is_portion_variant(name: &str) -> bool {
    let slug = normalize_slug(name);
    PORTION_TOKENS.iter().any(|t| slug.contains(t))
}

/// Fixed portion weight for gram-unit foods: 175g for extra/half, else 350g.
pub fn grams_for_name(name: &str) -> u64 {
    if is_portion_variant(name) {
        REDUCED_PORTION_GRAMS
    } else {
        FULL_PORTION_GRAMS
    }
}

/// Fallback classification for names with no catalog entry.
///
/// Checked in order: piece-counted foods, proteins, drinks; anything else is a
/// gram-weighed food. Never consulted when a catalog entry exists.
pub fn infer_kind_unit(name: &str) -> KindUnit {
    let slug = normalize_slug(name);
    let has_any = |tokens: &[&str]| tokens.iter().any(|t| slug.contains(t));

    if has_any(PIECE_FOOD_TOKENS) {
        KindUnit::new(Kind::Food, Unit::Piece)
    } else if has_any(PROTEIN_TOKENS) {
        KindUnit::new(Kind::Protein, Unit::Piece)
    } else if has_any(DRINK_TOKENS) {
        KindUnit::new(Kind::Drink, Unit::Piece)
    } else {
        KindUnit::new(Kind::Food, Unit::Gram)
    }
}

/// Display name for an auto-created base item: portion words removed
/// (case-insensitive) and whitespace collapsed. Falls back to the trimmed input
/// when nothing would be left.
pub fn strip_portion_words(name: &str) -> String {
    let trimmed = name.trim();
    let mut out = String::with_capacity(trimmed.len());

    let mut i = 0;
    while i < trimmed.len() {
        let portion = PORTION_TOKENS.iter().find(|t| {
            trimmed
                .get(i..i + t.len())
                .is_some_and(|window| window.eq_ignore_ascii_case(t))
        });
        if let Some(token) = portion {
            i += token.len();
            continue;
        }
        let Some(ch) = trimmed[i..].chars().next() else {
            break;
        };
        out.push(ch);
        i += ch.len_utf8();
    }

    let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        trimmed.to_string()
    } else {
        collapsed
    }
}

fn fold(chars: impl Iterator<Item = char>) -> String {
    chars
        .flat_map(char::to_lowercase)
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

fn strip_portion_tokens(slug: &str) -> String {
    let mut out = String::with_capacity(slug.len());
    let mut rest = slug;
    while !rest.is_empty() {
        if let Some(token) = PORTION_TOKENS.iter().find(|t| rest.starts_with(*t)) {
            rest = &rest[token.len()..];
            continue;
        }
        // Slugs are ASCII, so one byte is one char.
        out.push_str(&rest[..1]);
        rest = &rest[1..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalize_slug_strips_case_spacing_and_diacritics() {
        assert_eq!(normalize_slug("Jollof Rice"), "jollofrice");
        assert_eq!(normalize_slug("  fried-rice_EXTRA "), "friedriceextra");
        assert_eq!(normalize_slug("Dodó & Égg!"), "dodoegg");
        assert_eq!(normalize_slug(""), "");
        assert_eq!(normalize_slug("!!!"), "");
    }

    #[test]
    fn base_food_slug_drops_portion_tokens() {
        assert_eq!(base_food_slug("Fried Rice Extra"), "friedrice");
        assert_eq!(base_food_slug("Half Jollof Rice"), "jollofrice");
        assert_eq!(base_food_slug("Extra"), "");
        assert_eq!(base_food_slug("Ofada"), "ofada");
    }

    #[test]
    fn base_food_slug_is_a_single_pass() {
        // Removing "extra" exposes "half" but the pass has already moved on.
        assert_eq!(base_food_slug("halextraf"), "half");
    }

    #[test]
    fn loose_key_ignores_separators() {
        assert_eq!(loose_key("Moi - Moi"), "moimoi");
        assert_eq!(loose_key("coca_cola"), "cocacola");
    }

    #[test]
    fn grams_for_name_uses_fixed_portions() {
        assert_eq!(grams_for_name("Fried Rice Extra"), 175);
        assert_eq!(grams_for_name("Half Ofada"), 175);
        assert_eq!(grams_for_name("Fried Rice"), 350);
    }

    #[test]
    fn infer_kind_unit_checks_families_in_order() {
        assert_eq!(infer_kind_unit("Moi Moi"), KindUnit::new(Kind::Food, Unit::Piece));
        assert_eq!(infer_kind_unit("Dodo"), KindUnit::new(Kind::Food, Unit::Piece));
        assert_eq!(infer_kind_unit("Takeaway Pack"), KindUnit::new(Kind::Food, Unit::Piece));
        assert_eq!(infer_kind_unit("Fried Chicken"), KindUnit::new(Kind::Protein, Unit::Piece));
        assert_eq!(infer_kind_unit("Boiled Egg"), KindUnit::new(Kind::Protein, Unit::Piece));
        assert_eq!(infer_kind_unit("Coke"), KindUnit::new(Kind::Drink, Unit::Piece));
        assert_eq!(infer_kind_unit("Bottled Water"), KindUnit::new(Kind::Drink, Unit::Piece));
        assert_eq!(infer_kind_unit("Jollof Rice"), KindUnit::new(Kind::Food, Unit::Gram));
        assert_eq!(infer_kind_unit(""), KindUnit::new(Kind::Food, Unit::Gram));
    }

    #[test]
    fn piece_foods_win_over_proteins() {
        // "Plantain and Fish" reads as a plantain portion first.
        assert_eq!(infer_kind_unit("Plantain and Fish"), KindUnit::new(Kind::Food, Unit::Piece));
    }

    #[test]
    fn strip_portion_words_keeps_readable_name() {
        assert_eq!(strip_portion_words("Fried Rice Extra"), "Fried Rice");
        assert_eq!(strip_portion_words("HALF Jollof"), "Jollof");
        assert_eq!(strip_portion_words("  Extra  "), "Extra");
    }

    proptest! {
        #[test]
        fn normalize_of_base_slug_is_idempotent(name in ".{0,40}") {
            let once = normalize_slug(&base_food_slug(&name));
            let twice = normalize_slug(&normalize_slug(&base_food_slug(&name)));
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn slugs_only_contain_ascii_alphanumerics(name in ".{0,40}") {
            let slug = normalize_slug(&name);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }

        #[test]
        fn base_slug_never_longer_than_slug(name in "[a-zA-Z ]{0,30}") {
            prop_assert!(base_food_slug(&name).len() <= normalize_slug(&name).len());
        }
    }
}
