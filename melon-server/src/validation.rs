use once_cell::sync::Lazy;
use regex::Regex;

/// Username shape shared by onboarding and profile editing:
/// 3-20 chars, ASCII letters, digits and underscores only
static USERNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_]{3,20}$").expect("Failed to compile username regex"));

pub const MAX_DISPLAY_NAME_CHARS: usize = 50;
pub const MAX_BIO_CHARS: usize = 200;
pub const MAX_INTERESTS: usize = 5;
pub const MAX_POST_CONTENT_CHARS: usize = 500;

pub fn validate_username(username: &str) -> Result<(), String> {
    if USERNAME_REGEX.is_match(username) {
        Ok(())
    } else {
        Err("Username must be 3-20 characters using letters, numbers and underscores".to_string())
    }
}

/// Lengths are counted in characters, not bytes, since display text is
/// largely Japanese
pub fn validate_display_name(display_name: &str) -> Result<(), String> {
    let len = display_name.trim().chars().count();
    if len == 0 {
        Err("Display name cannot be empty".to_string())
    } else if len > MAX_DISPLAY_NAME_CHARS {
        Err(format!(
            "Display name cannot exceed {} characters",
            MAX_DISPLAY_NAME_CHARS
        ))
    } else {
        Ok(())
    }
}

pub fn validate_bio(bio: &str) -> Result<(), String> {
    if bio.chars().count() > MAX_BIO_CHARS {
        Err(format!("Bio cannot exceed {} characters", MAX_BIO_CHARS))
    } else {
        Ok(())
    }
}

pub fn validate_interests(interests: &[String]) -> Result<(), String> {
    let non_empty = interests.iter().filter(|i| !i.trim().is_empty()).count();
    if non_empty == 0 {
        Err("Pick at least one interest".to_string())
    } else if non_empty > MAX_INTERESTS {
        Err(format!("Pick at most {} interests", MAX_INTERESTS))
    } else {
        Ok(())
    }
}

pub fn validate_post_content(content: &str) -> Result<(), String> {
    let len = content.trim().chars().count();
    if len == 0 {
        Err("Post content cannot be empty".to_string())
    } else if len > MAX_POST_CONTENT_CHARS {
        Err(format!(
            "Post content cannot exceed {} characters",
            MAX_POST_CONTENT_CHARS
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_usernames() {
        assert!(validate_username("sakura").is_ok());
        assert!(validate_username("kenta_42").is_ok());
        assert!(validate_username("abc").is_ok());
        assert!(validate_username("a2345678901234567890").is_ok());
    }

    #[test]
    fn test_username_length_bounds() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username("a23456789012345678901").is_err());
        assert!(validate_username("").is_err());
    }

    #[test]
    fn test_username_rejects_other_characters() {
        assert!(validate_username("saku ra").is_err());
        assert!(validate_username("saku-ra").is_err());
        assert!(validate_username("さくら").is_err());
        assert!(validate_username("sakura!").is_err());
        assert!(validate_username("saku.ra").is_err());
    }

    #[test]
    fn test_display_name_counts_characters_not_bytes() {
        // 50 Japanese characters is far more than 50 bytes but still valid
        let name = "あ".repeat(50);
        assert!(validate_display_name(&name).is_ok());
        let too_long = "あ".repeat(51);
        assert!(validate_display_name(&too_long).is_err());
    }

    #[test]
    fn test_display_name_rejects_blank() {
        assert!(validate_display_name("").is_err());
        assert!(validate_display_name("   ").is_err());
    }

    #[test]
    fn test_bio_bounds() {
        assert!(validate_bio("").is_ok());
        assert!(validate_bio(&"x".repeat(200)).is_ok());
        assert!(validate_bio(&"x".repeat(201)).is_err());
        assert!(validate_bio(&"絵".repeat(200)).is_ok());
    }

    #[test]
    fn test_interests_bounds() {
        assert!(validate_interests(&[]).is_err());
        assert!(validate_interests(&["".to_string(), "  ".to_string()]).is_err());
        assert!(validate_interests(&["art".to_string()]).is_ok());
        let five: Vec<String> = (1..=5).map(|i| format!("i{}", i)).collect();
        assert!(validate_interests(&five).is_ok());
        let six: Vec<String> = (1..=6).map(|i| format!("i{}", i)).collect();
        assert!(validate_interests(&six).is_err());
    }

    #[test]
    fn test_post_content_bounds() {
        assert!(validate_post_content("こんにちは").is_ok());
        assert!(validate_post_content("").is_err());
        assert!(validate_post_content("   \n  ").is_err());
        assert!(validate_post_content(&"字".repeat(500)).is_ok());
        assert!(validate_post_content(&"字".repeat(501)).is_err());
    }

    #[test]
    fn test_post_content_trims_before_counting() {
        let padded = format!("  {}  ", "x".repeat(500));
        assert!(validate_post_content(&padded).is_ok());
    }
}
