//! Column identifier sanitization.

use std::sync::LazyLock;

use regex::Regex;

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").unwrap());

/// Convert arbitrary text into a lowercase ASCII column name.
///
/// The text is lowercased, transliterated to ASCII, trimmed, has whitespace
/// runs replaced by `_` and every remaining non-word character removed. A
/// leading run of non-letters is then moved to the end, so `"123 Revenue"`
/// becomes `"revenue123_"`.
///
/// The result only contains `[a-z0-9_]` and may be empty.
///
/// Symbols and emoji are spelled out by the transliteration table rather
/// than dropped: `"emoji 🚀 launch"` becomes `"emoji_rocket_launch"`.
///
/// ```
/// use snowpoll_core::to_column_name;
///
/// assert_eq!(to_column_name("Café Sales #1"), "cafe_sales_1");
/// assert_eq!(to_column_name("123 Revenue"), "revenue123_");
/// ```
pub fn to_column_name(s: &str) -> String {
    let lowered = s.to_lowercase();
    // Transliteration may produce capitals (e.g. for some ligatures).
    let ascii = deunicode::deunicode(&lowered).to_ascii_lowercase();
    let joined = WHITESPACE_RUN.replace_all(ascii.trim(), "_");
    let word = NON_WORD.replace_all(&joined, "");

    let split = word
        .find(|c: char| c.is_ascii_lowercase())
        .unwrap_or(word.len());
    let (lead, rest) = word.split_at(split);
    format!("{rest}{lead}")
}
