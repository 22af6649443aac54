//! Ref name validation following git-style conventions.
//!
//! Valid ref names:
//! - Must be non-empty
//! - Must not contain whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..`
//! - Must not start or end with `/`, and components must be non-empty
//! - Components must not start with `.` or end with `.lock`

use crate::error::{RefError, Result};

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidRefName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a ref name such as `refs/heads/master`.
///
/// Ref names map directly onto paths inside the git directory, so anything
/// that could escape it or collide with a lock file is rejected.
///
/// # Examples
///
/// ```
/// use raoa_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("refs/heads/master").is_ok());
/// assert!(validate_ref_name("refs/../HEAD").is_err());
/// assert!(validate_ref_name("refs/heads/master.lock").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "ref name must not be empty"));
    }
    if let Some(ch) = FORBIDDEN_CHARS.iter().find(|ch| name.contains(**ch)) {
        return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid(name, "must not start or end with '/'"));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid(name, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid(
                name,
                format!("component must not start with '.': {component:?}"),
            ));
        }
        if component.ends_with(".lock") {
            return Err(invalid(name, "must not end with '.lock'"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_ref_name("refs/heads/master").is_ok());
        assert!(validate_ref_name("HEAD").is_ok());
        assert!(validate_ref_name("refs/heads/v1.0").is_ok());
    }

    #[test]
    fn reject_empty_and_traversal() {
        assert!(validate_ref_name("").is_err());
        assert!(validate_ref_name("refs/../../etc").is_err());
        assert!(validate_ref_name("/refs/heads/master").is_err());
        assert!(validate_ref_name("refs//heads").is_err());
    }

    #[test]
    fn reject_forbidden_chars() {
        for name in ["a b", "a~b", "a^b", "a:b", "a?b", "a*b", "a[b", "a\\b"] {
            assert!(validate_ref_name(name).is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn reject_hidden_and_lock_components() {
        assert!(validate_ref_name("refs/.hidden").is_err());
        assert!(validate_ref_name("refs/heads/master.lock").is_err());
    }
}
