//! Locale-tolerant number normalization.
//!
//! The upstream site renders the same value as `25,000`, `25.000`, or
//! `25 000` (sometimes with stray NBSP characters) depending on which layout
//! revision happens to be live. Everything here must accept all of those and
//! reject pure noise without panicking.

/// Turn a free-text token into a non-negative integer, or `None` when the
/// token carries no usable number.
///
/// Commas are always thousands separators, never decimal. Periods are
/// separators too, regardless of how many appear: the domain's values are
/// integral, so `"25.000"` is twenty-five thousand, not a fraction.
pub fn normalize_number(token: &str) -> Option<u64> {
    // Keep digits and the separator classes the site is known to emit.
    // `char::is_whitespace` covers NBSP (U+00A0).
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.') || c.is_whitespace())
        .collect();
    if cleaned.trim().is_empty() {
        return None;
    }

    let digits: String = cleaned.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    // Absurdly long digit runs overflow u64; they were never a real value.
    digits.parse::<u64>().ok()
}
