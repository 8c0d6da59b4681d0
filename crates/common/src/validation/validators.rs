// Field validators for untrusted identifiers and log text
use once_cell::sync::Lazy;

use super::{Provider, ValidationError, ValidationResult, MAX_LOG_SIZE};

static REPOSITORY_NAME_REGEX: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9._-]+$")
        .expect("REPOSITORY_NAME_REGEX pattern is valid and well-formed")
});

/// Validate and sanitize a log or text input against [`MAX_LOG_SIZE`].
///
/// Literal newlines are replaced with the two-character sequence `\n`; every
/// other character, including other control characters, passes through.
///
/// # Examples
///
/// ```
/// use healer_common::validation::validate;
///
/// assert_eq!(validate("step 1\nstep 2").unwrap(), "step 1\\nstep 2");
/// assert!(validate("   ").is_err());
/// ```
pub fn validate(input: &str) -> ValidationResult<String> {
    validate_with_limit(input, MAX_LOG_SIZE)
}

/// Same contract as [`validate`] with a caller-supplied size limit in bytes.
pub fn validate_with_limit(input: &str, limit: usize) -> ValidationResult<String> {
    if input.trim().is_empty() {
        return Err(ValidationError::EmptyInput);
    }

    if input.len() > limit {
        return Err(ValidationError::InputTooLarge { size: input.len(), limit });
    }

    Ok(input.replace('\n', "\\n"))
}

/// Validate a workflow run identifier; it must be strictly positive.
pub fn validate_run_id(id: i64) -> ValidationResult<i64> {
    if id <= 0 {
        return Err(ValidationError::invalid("run_id", format!("must be positive, got {id}")));
    }
    Ok(id)
}

/// Validate repository coordinates.
///
/// Both parts must be non-empty, and the repository name may only contain
/// ASCII letters, digits, `.`, `_` and `-`.
pub fn validate_repository_owner_and_name(owner: &str, name: &str) -> ValidationResult<()> {
    if owner.is_empty() {
        return Err(ValidationError::invalid("repository owner", "cannot be empty"));
    }

    if name.is_empty() {
        return Err(ValidationError::invalid("repository name", "cannot be empty"));
    }

    if !REPOSITORY_NAME_REGEX.is_match(name) {
        return Err(ValidationError::invalid(
            "repository name",
            format!("'{name}' contains characters outside [A-Za-z0-9._-]"),
        ));
    }

    Ok(())
}

/// Validate a provider name against the supported set (exact match).
pub fn validate_provider_name(name: &str) -> ValidationResult<Provider> {
    name.parse()
}
