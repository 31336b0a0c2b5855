//! Ref name validation following git-style conventions.
//!
//! Valid names:
//! - Must be non-empty
//! - Must not contain whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..` (double dot) or `@{`
//! - Must not start or end with `.` or `/`
//! - Must not end with `.lock`
//! - Components between slashes must be non-empty and not start with `.`
//!
//! Full ref names additionally live under `refs/`, except for all-caps
//! pseudo refs such as `HEAD` or `MERGE_HEAD`.

use crate::error::{RefError, Result};
use crate::types::{HEADS_PREFIX, REFS_PREFIX};

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a short branch name such as `main` or `feature/auth`.
///
/// # Examples
///
/// ```
/// use stow_refs::names::validate_branch_name;
///
/// assert!(validate_branch_name("main").is_ok());
/// assert!(validate_branch_name("feature/auth").is_ok());
/// assert!(validate_branch_name("").is_err());
/// assert!(validate_branch_name("bad..name").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "name must not be empty"));
    }

    if let Some(ch) = FORBIDDEN_CHARS.iter().find(|ch| name.contains(**ch)) {
        return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
    }

    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }

    // Reflog selector syntax.
    if name.contains("@{") {
        return Err(invalid(name, "must not contain '@{'"));
    }

    if name.starts_with('.') || name.ends_with('.') {
        return Err(invalid(name, "must not start or end with '.'"));
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid(name, "must not start or end with '/'"));
    }

    if name.ends_with(".lock") {
        return Err(invalid(name, "must not end with '.lock'"));
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
    }

    Ok(())
}

/// Whether `name` is an all-caps pseudo ref like `HEAD` or `ORIG_HEAD`.
pub fn is_pseudo_ref(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase() || c == '_')
}

/// Validate a full ref name (`refs/...` or a pseudo ref).
pub fn validate_ref_name(name: &str) -> Result<()> {
    if is_pseudo_ref(name) {
        return Ok(());
    }
    let Some(rest) = name.strip_prefix(REFS_PREFIX) else {
        return Err(invalid(name, "must start with 'refs/'"));
    };
    validate_branch_name(rest).map_err(|_| invalid(name, "invalid component"))
}

/// Full ref name of a branch.
pub fn branch_ref(branch: &str) -> String {
    format!("{HEADS_PREFIX}{branch}")
}
