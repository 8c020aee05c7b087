//! Phone number normalisation for transfer targets.

/// Longest national significant number we treat as lacking a country code.
const MAX_NATIONAL_DIGITS: usize = 9;

/// Normalise a dialable number to E.164 (`+<digits>`).
///
/// Formatting characters are stripped. A number that already starts with `+`
/// keeps its country code. A bare number of at most nine digits is treated as
/// national and gets `country_code` prepended; longer bare numbers are assumed
/// to carry their country code already.
///
/// Returns `None` when no digits remain.
pub fn normalize_e164(raw: &str, country_code: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    if raw.trim_start().starts_with('+') || digits.len() > MAX_NATIONAL_DIGITS {
        return Some(format!("+{digits}"));
    }

    let cc: String = country_code.chars().filter(|c| c.is_ascii_digit()).collect();
    Some(format!("+{cc}{digits}"))
}
