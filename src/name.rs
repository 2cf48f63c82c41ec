//! Name Validator.
//!
//! Applied to package names at admission, and to each colon-separated
//! segment of every dependency key.

use crate::errors::RegistryError;

/// Validate a single name segment: length >= 1, ASCII `[A-Za-z0-9_-]` only.
pub fn validate(name: &str) -> Result<(), RegistryError> {
    if !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        Ok(())
    } else {
        Err(RegistryError::InvalidName(name.to_string()))
    }
}

/// Validate a dependency key, which may be colon-separated
/// (e.g. `org:pkg`); every segment must pass [`validate`].
pub fn validate_dependency_key(key: &str) -> Result<(), RegistryError> {
    for segment in key.split(':') {
        validate(segment)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_alnum_dash_underscore() {
        assert!(validate("foo").is_ok());
        assert!(validate("foo-bar").is_ok());
        assert!(validate("foo_bar2").is_ok());
        assert!(validate("A1").is_ok());
    }

    #[test]
    fn rejects_empty() {
        assert!(validate("").is_err());
    }

    #[test]
    fn rejects_illegal_characters() {
        assert!(validate("foo bar").is_err());
        assert!(validate("foo.bar").is_err());
        assert!(validate("foo/bar").is_err());
        assert!(validate("föo").is_err());
    }

    #[test]
    fn dependency_key_splits_on_colon() {
        assert!(validate_dependency_key("org:pkg").is_ok());
        assert!(validate_dependency_key("pkg").is_ok());
        assert!(validate_dependency_key("org:pk g").is_err());
        assert!(validate_dependency_key(":pkg").is_err());
    }
}
