//! Phone-number and email comparison predicates.
//!
//! The store compares phone numbers on a canonical key rather than the raw
//! string, so "+1 (415) 555-1111" and "415-555-1111" land in the same
//! bucket. The key is the trailing seven digits: long enough to distinguish
//! local numbers, short enough to survive country-code and area-code
//! formatting differences.

/// Number of trailing digits that participate in phone matching.
const PHONE_KEY_DIGITS: usize = 7;

/// Strip everything but digits.
pub fn normalize_number(number: &str) -> String {
    number.chars().filter(char::is_ascii_digit).collect()
}

/// Canonical comparison key for a phone number: the last seven digits, or
/// all of them when fewer. Empty when the input has no digits.
pub fn lookup_key(number: &str) -> String {
    let digits = normalize_number(number);
    let skip = digits.len().saturating_sub(PHONE_KEY_DIGITS);
    digits[skip..].to_string()
}

/// True when two numbers agree on their comparison key.
pub fn numbers_match(a: &str, b: &str) -> bool {
    let ka = lookup_key(a);
    !ka.is_empty() && ka == lookup_key(b)
}

/// Case-insensitive canonical form of an email address.
pub fn fold_email(address: &str) -> String {
    address.trim().to_lowercase()
}
