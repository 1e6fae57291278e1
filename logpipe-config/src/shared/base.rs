use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A field holds a value outside of its allowed range.
    #[error("Invalid value for `{field}`: {constraint}")]
    InvalidFieldValue {
        field: &'static str,
        constraint: &'static str,
    },
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
}

/// Returns an error if `value` is empty or only whitespace.
pub(crate) fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::InvalidFieldValue {
            field,
            constraint: "must not be empty",
        });
    }

    Ok(())
}
