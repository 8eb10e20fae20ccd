// Write-path validation rules. The store calls these inside its create/update
// operations, so every write path is covered regardless of the caller.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, AppResult};
use crate::models::{NewGroup, NewUser};

pub const EMPTY_TEXT: &str = "empty text";
pub const SELF_FOLLOW: &str = "self-follow";
pub const DUPLICATE_FOLLOW: &str = "duplicate follow";

pub const SLUG_MAX_LENGTH: usize = 100;
pub const TITLE_MAX_LENGTH: usize = 200;
pub const USERNAME_MAX_LENGTH: usize = 150;

static SLUG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug pattern is valid")
});

static USERNAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\w.@+-]+$").expect("username pattern is valid")
});

/// Only the exact empty string is rejected; whitespace-only text passes.
pub fn validate_post_text(text: &str) -> AppResult<()> {
    if text.is_empty() {
        return Err(AppError::Validation(EMPTY_TEXT.to_string()));
    }
    Ok(())
}

pub fn validate_comment_text(text: &str) -> AppResult<()> {
    if text.is_empty() {
        return Err(AppError::Validation(EMPTY_TEXT.to_string()));
    }
    Ok(())
}

pub fn validate_follow(user_id: i64, author_id: i64) -> AppResult<()> {
    if user_id == author_id {
        return Err(AppError::Validation(SELF_FOLLOW.to_string()));
    }
    Ok(())
}

pub fn validate_slug(slug: &str) -> AppResult<()> {
    if slug.chars().count() > SLUG_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "slug longer than {} characters",
            SLUG_MAX_LENGTH
        )));
    }
    if !SLUG_PATTERN.is_match(slug) {
        return Err(AppError::Validation(format!("invalid slug {:?}", slug)));
    }
    Ok(())
}

pub fn validate_title(title: &str) -> AppResult<()> {
    if title.is_empty() {
        return Err(AppError::Validation("empty title".to_string()));
    }
    if title.chars().count() > TITLE_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "title longer than {} characters",
            TITLE_MAX_LENGTH
        )));
    }
    Ok(())
}

pub fn validate_new_group(group: &NewGroup) -> AppResult<()> {
    validate_title(&group.title)?;
    validate_slug(&group.slug)
}

pub fn validate_username(username: &str) -> AppResult<()> {
    if username.is_empty() || username.chars().count() > USERNAME_MAX_LENGTH {
        return Err(AppError::Validation(format!(
            "username must be 1 to {} characters",
            USERNAME_MAX_LENGTH
        )));
    }
    if !USERNAME_PATTERN.is_match(username) {
        return Err(AppError::Validation(format!("invalid username {:?}", username)));
    }
    Ok(())
}

pub fn validate_new_user(user: &NewUser) -> AppResult<()> {
    validate_username(&user.username)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(result: AppResult<()>) -> String {
        match result {
            Err(AppError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_post_text_rules() {
        assert_eq!(message(validate_post_text("")), EMPTY_TEXT);
        assert!(validate_post_text("   ").is_ok());
        assert!(validate_post_text("hello").is_ok());
        assert_eq!(message(validate_comment_text("")), EMPTY_TEXT);
    }

    #[test]
    fn test_self_follow_rejected() {
        assert_eq!(message(validate_follow(7, 7)), SELF_FOLLOW);
        assert!(validate_follow(7, 8).is_ok());
    }

    #[test]
    fn test_slug_rules() {
        assert!(validate_slug("test-slug").is_ok());
        assert!(validate_slug("snake_case_42").is_ok());
        assert!(validate_slug("with space").is_err());
        assert!(validate_slug("Тестовый").is_err());
        assert!(validate_slug("").is_err());
        assert!(validate_slug(&"a".repeat(SLUG_MAX_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_group_title_rules() {
        assert!(validate_new_group(&NewGroup::new("Cats", "cats")).is_ok());
        assert!(validate_new_group(&NewGroup::new("", "cats")).is_err());
        assert!(validate_new_group(&NewGroup::new(&"t".repeat(201), "cats")).is_err());
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_new_user(&NewUser::new("author")).is_ok());
        assert!(validate_new_user(&NewUser::new("first.last+tag@host")).is_ok());
        assert!(validate_new_user(&NewUser::new("")).is_err());
        assert!(validate_new_user(&NewUser::new("has space")).is_err());
    }
}
