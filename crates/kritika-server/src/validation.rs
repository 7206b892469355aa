//! Field validation shared by the write paths.

use chrono::{Datelike, Utc};
use regex::Regex;

use crate::error::ApiError;

/// Allowed slug alphabet, shared by categories and genres.
const SLUG_PATTERN: &str = r"^[-a-zA-Z0-9_]+$";

pub const MAX_SLUG_LEN: usize = 50;
pub const MAX_NAME_LEN: usize = 256;

/// The first known work of art.
pub const MINIMUM_TITLE_YEAR: i32 = -500_000;

pub const MIN_SCORE: i16 = 1;
pub const MAX_SCORE: i16 = 10;

pub fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() {
        return Err(ApiError::Validation("name must not be empty".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_slug(slug: &str) -> Result<(), ApiError> {
    if slug.is_empty() {
        return Err(ApiError::Validation("slug must not be empty".into()));
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(ApiError::Validation(format!(
            "slug must be at most {MAX_SLUG_LEN} characters"
        )));
    }
    let re = Regex::new(SLUG_PATTERN)
        .map_err(|e| ApiError::Internal(format!("invalid slug regex: {e}")))?;
    if !re.is_match(slug) {
        return Err(ApiError::Validation(
            "slug may only contain letters, digits, hyphens and underscores".into(),
        ));
    }
    Ok(())
}

/// Upper bound for a title's creation year, recomputed from the wall clock
/// on every call so the window moves with the calendar.
pub fn max_title_year() -> i32 {
    Utc::now().year()
}

pub fn validate_year(year: i32) -> Result<(), ApiError> {
    let max = max_title_year();
    if year < MINIMUM_TITLE_YEAR || year > max {
        return Err(ApiError::Validation(format!(
            "year must be between {MINIMUM_TITLE_YEAR} and {max}"
        )));
    }
    Ok(())
}

pub fn validate_score(score: i16) -> Result<(), ApiError> {
    if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(ApiError::Validation(format!(
            "score must be between {MIN_SCORE} and {MAX_SCORE}"
        )));
    }
    Ok(())
}

pub fn validate_text(text: &str) -> Result<(), ApiError> {
    if text.trim().is_empty() {
        return Err(ApiError::Validation("text must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_slugs() {
        for slug in ["films", "sci-fi", "rock_n_roll", "Top-10", "a"] {
            assert!(validate_slug(slug).is_ok(), "expected {slug:?} to pass");
        }
    }

    #[test]
    fn test_slug_rejects_bad_characters() {
        for slug in ["with space", "période", "semi;colon", "slash/", "dot."] {
            assert!(validate_slug(slug).is_err(), "expected {slug:?} to fail");
        }
    }

    #[test]
    fn test_slug_length_limits() {
        assert!(validate_slug(&"a".repeat(50)).is_ok());
        assert!(validate_slug(&"a".repeat(51)).is_err());
        assert!(validate_slug("").is_err());
    }

    #[test]
    fn test_name_length_limits() {
        assert!(validate_name(&"n".repeat(256)).is_ok());
        assert!(validate_name(&"n".repeat(257)).is_err());
        assert!(validate_name("").is_err());
    }

    #[test]
    fn test_year_window() {
        let current = max_title_year();
        assert!(validate_year(1994).is_ok());
        assert!(validate_year(current).is_ok());
        assert!(validate_year(current + 1).is_err());
        assert!(validate_year(MINIMUM_TITLE_YEAR).is_ok());
        assert!(validate_year(-600_000).is_err());
    }

    #[test]
    fn test_year_upper_bound_is_dynamic() {
        // The bound must come from the wall clock, not a baked-in constant.
        assert!(max_title_year() >= 2025);
    }

    #[test]
    fn test_score_bounds() {
        assert!(validate_score(0).is_err());
        assert!(validate_score(1).is_ok());
        assert!(validate_score(10).is_ok());
        assert!(validate_score(11).is_err());
    }

    #[test]
    fn test_text_must_not_be_blank() {
        assert!(validate_text("").is_err());
        assert!(validate_text("   \n\t").is_err());
        assert!(validate_text("worth watching").is_ok());
    }
}
