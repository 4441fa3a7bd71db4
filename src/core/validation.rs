use std::sync::OnceLock;
use regex::Regex;
use crate::core::errors::FieldErrors;

pub const REQUIRED: &str = "This field is required.";

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Regex should compile")
    })
}

/// The form user text is stored in. Bodies are JSON, so nothing is escaped.
pub fn clean_text(text: &str) -> String {
    text.trim().to_string()
}

/// Lowercases the domain part, as mail domains are case-insensitive.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.to_string(),
    }
}

pub fn check_email(errors: &mut FieldErrors, field: &str, email: &str) {
    if email.is_empty() {
        errors.add(field, REQUIRED);
    } else if !email_regex().is_match(email) {
        errors.add(field, "Enter a valid email address.");
    }
}

/// Checks a required text field; `value` is `None` when the field was absent.
pub fn check_text(errors: &mut FieldErrors, field: &str, value: Option<&str>, max: usize) {
    match value.map(str::trim) {
        None | Some("") => errors.add(field, REQUIRED),
        Some(text) if text.chars().count() > max => {
            errors.add(field, format!("Ensure this field has no more than {} characters.", max))
        }
        Some(_) => {}
    }
}

/// Like [`check_text`] but an absent field is fine (partial updates).
pub fn check_optional_text(errors: &mut FieldErrors, field: &str, value: Option<&str>, max: usize) {
    if value.is_some() {
        check_text(errors, field, value, max);
    }
}

pub fn check_password(errors: &mut FieldErrors, field: &str, password: &str, min: usize) {
    if password.is_empty() {
        errors.add(field, REQUIRED);
    } else if password.chars().count() < min {
        errors.add(field, format!("Ensure this field has at least {} characters.", min));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("user@example.com", true)]
    #[case("first.last@sub.example.org", true)]
    #[case("invalidemail", false)]
    #[case("two@@example.com", false)]
    #[case("spaces in@example.com", false)]
    fn email_shapes(#[case] email: &str, #[case] valid: bool) {
        let mut errors = FieldErrors::new();
        check_email(&mut errors, "email", email);
        assert_eq!(errors.is_empty(), valid);
    }

    #[test]
    fn normalize_lowercases_domain_only() {
        assert_eq!(normalize_email(" John@Example.COM "), "John@example.com");
    }

    #[test]
    fn text_limits_count_characters() {
        let mut errors = FieldErrors::new();
        check_text(&mut errors, "username", Some(&"é".repeat(25)), 25);
        assert!(errors.is_empty());

        check_text(&mut errors, "username", Some(&"é".repeat(26)), 25);
        check_text(&mut errors, "bio", Some("   "), 200);
        check_optional_text(&mut errors, "image", None, 10);
        assert_eq!(errors.get("username").map(|m| m.len()), Some(1));
        assert_eq!(errors.get("bio"), Some(&[REQUIRED.to_string()][..]));
        assert!(errors.get("image").is_none());
    }

    #[test]
    fn clean_text_keeps_markup_characters() {
        assert_eq!(clean_text("  Tom & Jerry "), "Tom & Jerry");
        assert_eq!(clean_text("if a < b && c > d"), "if a < b && c > d");
    }
}
