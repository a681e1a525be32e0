//! Canonical player keys.
//!
//! The same player shows up on several regional boards and on the
//! aggregate board, sometimes with different casing, accents, or stray
//! zero-width characters pasted into their display name. [`player_key`]
//! folds all of those to one comparable string.

use unicode_normalization::UnicodeNormalization as _;
use unicode_normalization::char::is_combining_mark;

/// Zero-width and invisible formatting characters seen in display names.
const ZERO_WIDTH: &[char] = &[
    '\u{200B}', // zero width space
    '\u{200C}', // zero width non-joiner
    '\u{200D}', // zero width joiner
    '\u{2060}', // word joiner
    '\u{FEFF}', // byte order mark
    '\u{00AD}', // soft hyphen
];

/// Decomposes `input` (NFKD) and drops combining marks and zero-width
/// characters. Case and whitespace are left alone.
#[must_use]
pub fn strip_marks(input: &str) -> String {
    input
        .nfkd()
        .filter(|c| !is_combining_mark(*c) && !ZERO_WIDTH.contains(c))
        .collect()
}

/// Trims and collapses every run of whitespace to a single space.
#[must_use]
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical key for a player display name.
///
/// NFKD-normalized, diacritics and zero-width characters removed,
/// whitespace collapsed, lower-cased. May be empty.
#[must_use]
pub fn player_key(name: &str) -> String {
    collapse_whitespace(&strip_marks(name)).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_and_accents() {
        assert_eq!(player_key("Zéd"), "zed");
        assert_eq!(player_key("ZED"), "zed");
        assert_eq!(player_key("Ñandú"), "nandu");
    }

    #[test]
    fn drops_zero_width_characters() {
        assert_eq!(player_key("Z\u{200B}ed"), "zed");
        assert_eq!(player_key("\u{FEFF}Zed\u{200D}"), "zed");
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(player_key("  Big \t  Zed \n"), "big zed");
        assert_eq!(collapse_whitespace("  a   b  "), "a b");
    }

    #[test]
    fn compatibility_forms_fold() {
        // Fullwidth letters decompose to ASCII under NFKD.
        assert_eq!(player_key("\u{FF3A}ed"), "zed");
    }

    #[test]
    fn invisible_only_names_are_empty() {
        assert_eq!(player_key("\u{200B}\u{200C} \u{2060}"), "");
        assert_eq!(player_key("   "), "");
    }

    #[test]
    fn strip_marks_keeps_case() {
        assert_eq!(strip_marks("Éric"), "Eric");
    }
}
