use once_cell::sync::Lazy;
use regex::Regex;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]").unwrap());

/// Maximum length of a normalized title key. Long titles sharing a 60-char
/// prefix collide; this is a known approximation inherited from the merge
/// heuristics, biased towards merging near-identical citations.
pub const TITLE_KEY_LEN: usize = 60;

/// Normalize a document title into its grouping key: lowercase, strip all
/// non-alphanumeric characters, truncate to [`TITLE_KEY_LEN`].
pub fn title_key(title: &str) -> String {
    let mut key = NON_ALNUM.replace_all(title, "").to_lowercase();
    key.truncate(TITLE_KEY_LEN);
    key
}

/// Normalize a document reference number into its identity key: lowercase,
/// strip all non-alphanumeric characters. Absent numbers key to "".
pub fn number_key(number: &str) -> String {
    NON_ALNUM.replace_all(number, "").to_lowercase()
}
