//! Local format checks for phone numbers and one-time passwords.
//!
//! These run before any network call so obviously bad input is reported
//! inline and never costs an OTP send.

use std::ops::RangeInclusive;

use crate::ProtocolError;

/// Minimum digits in a phone number (national numbers without a prefix).
const MIN_PHONE_DIGITS: usize = 10;
/// E.164 caps a full international number at 15 digits.
const MAX_PHONE_DIGITS: usize = 15;

/// Normalizes a user-typed phone number.
///
/// Spaces, dashes, dots and parentheses are removed. A single leading `+`
/// is kept. What remains must be 10 to 15 ASCII digits.
///
/// # Errors
/// Returns [`ProtocolError::InvalidPhone`] describing the first problem.
pub fn normalize_phone(raw: &str) -> Result<String, ProtocolError> {
    let trimmed = raw.trim();
    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            other => {
                return Err(ProtocolError::InvalidPhone(format!(
                    "unexpected character '{other}'"
                )));
            }
        }
    }

    if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        return Err(ProtocolError::InvalidPhone(format!(
            "expected {MIN_PHONE_DIGITS} to {MAX_PHONE_DIGITS} digits, got {}",
            digits.len()
        )));
    }

    Ok(if plus { format!("+{digits}") } else { digits })
}

/// Checks that an OTP is all digits and its length is in `length`.
///
/// Surrounding whitespace is trimmed (pasted codes often carry a newline).
///
/// # Errors
/// Returns [`ProtocolError::InvalidOtp`].
pub fn normalize_otp(raw: &str, length: RangeInclusive<usize>) -> Result<String, ProtocolError> {
    let code = raw.trim();
    if code.is_empty() {
        return Err(ProtocolError::InvalidOtp("code is empty".into()));
    }
    if !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ProtocolError::InvalidOtp("code must be digits only".into()));
    }
    if !length.contains(&code.len()) {
        return Err(ProtocolError::InvalidOtp(format!(
            "code must be {} to {} digits",
            length.start(),
            length.end()
        )));
    }
    Ok(code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_phone_strips_separators() {
        assert_eq!(normalize_phone("(555) 010-0199").unwrap(), "5550100199");
        assert_eq!(normalize_phone(" +91 98765 43210 ").unwrap(), "+919876543210");
    }

    #[test]
    fn test_normalize_phone_rejects_letters() {
        let result = normalize_phone("555-CALL-NOW");
        assert!(matches!(result, Err(ProtocolError::InvalidPhone(_))));
    }

    #[test]
    fn test_normalize_phone_rejects_wrong_length() {
        assert!(normalize_phone("12345").is_err());
        assert!(normalize_phone("+1234567890123456").is_err());
    }

    #[test]
    fn test_normalize_phone_rejects_inner_plus() {
        assert!(normalize_phone("98765+43210").is_err());
    }

    #[test]
    fn test_normalize_otp_accepts_trimmed_digits() {
        assert_eq!(normalize_otp(" 123456\n", 4..=8).unwrap(), "123456");
    }

    #[test]
    fn test_normalize_otp_rejects_bad_codes() {
        assert!(normalize_otp("", 4..=8).is_err());
        assert!(normalize_otp("12a4", 4..=8).is_err());
        assert!(normalize_otp("123", 4..=8).is_err());
        assert!(normalize_otp("123456789", 4..=8).is_err());
    }
}
