//! Input rules for the phone/OTP sign-in flow.
//!
//! Checks run before any call to the SMS provider.

/// Why a phone number or code was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Phone number is required")]
    PhoneRequired,
    #[error("Please enter a valid phone number")]
    PhoneInvalid,
    #[error("Phone number must be at least 6 digits")]
    PhoneTooShort,
    #[error("Phone number is too long")]
    PhoneTooLong,
    #[error("OTP must be 6 digits")]
    OtpLength,
    #[error("OTP must contain only numbers")]
    OtpNotNumeric,
}

const PHONE_MIN_CHARS: usize = 6;
const PHONE_MAX_CHARS: usize = 20;
const OTP_LEN: usize = 6;

/// Accepts digits, spaces, `-`, `(` and `)` with an optional leading `+`.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    if phone.is_empty() {
        return Err(ValidationError::PhoneRequired);
    }
    let body = phone.strip_prefix('+').unwrap_or(phone);
    let allowed = |c: char| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')');
    if body.is_empty() || !body.chars().all(allowed) {
        return Err(ValidationError::PhoneInvalid);
    }
    let len = phone.chars().count();
    if len < PHONE_MIN_CHARS {
        return Err(ValidationError::PhoneTooShort);
    }
    if len > PHONE_MAX_CHARS {
        return Err(ValidationError::PhoneTooLong);
    }
    Ok(())
}

/// Exactly six ASCII digits.
pub fn validate_otp(code: &str) -> Result<(), ValidationError> {
    if code.chars().count() != OTP_LEN {
        return Err(ValidationError::OtpLength);
    }
    if !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::OtpNotNumeric);
    }
    Ok(())
}

fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

/// `+<country digits><number digits>`, with country code 1 when the
/// dial code has no digits.
pub fn format_e164(dial_code: &str, phone: &str) -> String {
    let country = digits(dial_code);
    let country = if country.is_empty() { "1".to_string() } else { country };
    format!("+{country}{}", digits(phone))
}

/// Normalize user input to E.164. Numbers already starting with `+` keep
/// their own country code.
pub fn normalize_phone(phone: &str, dial_code: Option<&str>) -> String {
    let phone = phone.trim();
    if phone.starts_with('+') {
        format!("+{}", digits(phone))
    } else {
        format_e164(dial_code.unwrap_or_default(), phone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+1 (555) 123-4567").is_ok());
        assert!(validate_phone("5551234").is_ok());
        assert_eq!(validate_phone(""), Err(ValidationError::PhoneRequired));
        assert_eq!(validate_phone("555-abc-1234"), Err(ValidationError::PhoneInvalid));
        assert_eq!(validate_phone("+"), Err(ValidationError::PhoneInvalid));
        assert_eq!(validate_phone("12345"), Err(ValidationError::PhoneTooShort));
        assert_eq!(
            validate_phone("123456789012345678901"),
            Err(ValidationError::PhoneTooLong)
        );
    }

    #[test]
    fn test_validate_otp() {
        assert!(validate_otp("000000").is_ok());
        assert_eq!(validate_otp("12345"), Err(ValidationError::OtpLength));
        assert_eq!(validate_otp("12a456"), Err(ValidationError::OtpNotNumeric));
    }

    #[test]
    fn test_e164() {
        assert_eq!(format_e164("+44", "07700 900123"), "+4407700900123");
        assert_eq!(format_e164("", "(555) 123-4567"), "+15551234567");
        assert_eq!(normalize_phone(" +1 555 123 4567", Some("+91")), "+15551234567");
        assert_eq!(normalize_phone("98765 43210", Some("+91")), "+919876543210");
        assert_eq!(normalize_phone("5551234567", None), "+15551234567");
    }
}
