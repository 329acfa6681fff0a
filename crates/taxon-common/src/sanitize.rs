//! ASCII-safe vector ID sanitization (§4.3). Shared by the chunker, which
//! assigns IDs, and tests that assert on them.

use std::sync::LazyLock;

/// Fixed table of diacritic/ligature replacements applied before Unicode
/// decomposition. Keyed on the lowercase form.
const REPLACEMENTS: &[(&str, &str)] = &[
    ("×", "x"),
    ("é", "e"),
    ("è", "e"),
    ("ê", "e"),
    ("ë", "e"),
    ("à", "a"),
    ("á", "a"),
    ("â", "a"),
    ("ä", "a"),
    ("ù", "u"),
    ("ú", "u"),
    ("û", "u"),
    ("ü", "u"),
    ("ö", "o"),
    ("ó", "o"),
    ("ò", "o"),
    ("ô", "o"),
    ("ç", "c"),
    ("ñ", "n"),
    ("ß", "ss"),
];

static NON_ALNUM: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"[^a-z0-9]+").unwrap());

/// lowercase → diacritic/ligature table → NFKD decomposition → drop
/// non-ASCII → collapse non-`[a-z0-9]` runs to `_` → trim `_` →
/// `"unknown"` if empty.
pub fn sanitize_id(name: &str) -> String {
    let mut s = name.to_lowercase();
    for (from, to) in REPLACEMENTS {
        s = s.replace(from, to);
    }

    let decomposed: String = unicode_normalization::UnicodeNormalization::nfkd(s.as_str())
        .filter(|c| c.is_ascii())
        .collect();

    let collapsed = NON_ALNUM.replace_all(&decomposed, "_");
    let trimmed = collapsed.trim_matches('_');

    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_multiplication_sign() {
        assert_eq!(sanitize_id("Mentha × piperita"), "mentha_x_piperita");
    }

    #[test]
    fn sanitizes_diacritics() {
        assert_eq!(sanitize_id("Caféier arabica"), "cafeier_arabica");
    }

    #[test]
    fn empty_input_is_unknown() {
        assert_eq!(sanitize_id(""), "unknown");
    }

    #[test]
    fn all_punctuation_is_unknown() {
        assert_eq!(sanitize_id("***"), "unknown");
    }

    #[test]
    fn collapses_runs_and_trims() {
        assert_eq!(sanitize_id("  Quercus   robur!! "), "quercus_robur");
    }
}
