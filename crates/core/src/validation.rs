//! Field format rules for user records.
//!
//! - user name: 3..=30 chars, ASCII lowercase letters, digits, `.`, `_`, `-`;
//!   must start with a letter (checked after lowercasing).
//! - first/last name: 1..=50 chars, letters, spaces, `-` and `'`; must start
//!   with a letter.

use crate::error::{DomainError, DomainResult};

const USER_NAME_MIN: usize = 3;
const USER_NAME_MAX: usize = 30;
const NAME_MAX: usize = 50;

/// Canonical stored form of a user name.
pub fn normalize_user_name(user_name: &str) -> String {
    user_name.trim().to_lowercase()
}

pub fn is_valid_user_name(user_name: &str) -> bool {
    let len = user_name.chars().count();
    if !(USER_NAME_MIN..=USER_NAME_MAX).contains(&len) {
        return false;
    }
    let mut chars = user_name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

pub fn is_valid_name(name: &str) -> bool {
    let len = name.chars().count();
    if len == 0 || len > NAME_MAX {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphabetic() || matches!(c, ' ' | '-' | '\''))
}

/// Validate whichever name fields are present, collecting every failure.
pub fn validate_names(
    user_name: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> DomainResult<()> {
    let mut errors = Vec::new();

    if let Some(user_name) = user_name {
        if !is_valid_user_name(user_name) {
            errors.push("Invalid user name");
        }
    }
    if let Some(first_name) = first_name {
        if !is_valid_name(first_name) {
            errors.push("Invalid first name");
        }
    }
    if let Some(last_name) = last_name {
        if !is_valid_name(last_name) {
            errors.push("Invalid last name");
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DomainError::validation(errors.join(", ")))
    }
}

pub fn validate_email(email: &str) -> DomainResult<()> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(DomainError::validation("Invalid email"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn user_name_rules() {
        assert!(is_valid_user_name("alice"));
        assert!(is_valid_user_name("a.l_i-c3"));
        assert!(!is_valid_user_name("al"));
        assert!(!is_valid_user_name("1alice"));
        assert!(!is_valid_user_name("Alice"));
        assert!(!is_valid_user_name("ali ce"));
    }

    #[test]
    fn name_rules() {
        assert!(is_valid_name("Alice"));
        assert!(is_valid_name("Anne-Marie O'Neil"));
        assert!(is_valid_name("Zoë"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("-Alice"));
        assert!(!is_valid_name("R2D2"));
    }

    #[test]
    fn validate_names_collects_all_errors() {
        let err = validate_names(Some("x"), Some("1"), Some("ok")).unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("Invalid user name, Invalid first name")
        );
    }

    #[test]
    fn absent_fields_are_not_checked() {
        assert!(validate_names(None, None, None).is_ok());
        assert!(validate_names(None, Some("Bob"), None).is_ok());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("a@x.com").is_ok());
        assert!(validate_email("a@x").is_err());
        assert!(validate_email("@x.com").is_err());
        assert!(validate_email("a b@x.com").is_err());
        assert!(validate_email("a@@x.com").is_err());
    }

    proptest! {
        #[test]
        fn normalized_valid_names_stay_valid(name in "[a-z][a-z0-9._-]{2,29}") {
            prop_assert!(is_valid_user_name(&normalize_user_name(&name.to_uppercase())));
        }

        #[test]
        fn names_with_digits_are_rejected(prefix in "[A-Za-z]{1,10}", digit in 0u8..10) {
            let candidate = format!("{prefix}{digit}");
            prop_assert!(!is_valid_name(&candidate));
        }
    }
}
