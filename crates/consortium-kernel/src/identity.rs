//! Object naming rules and id generation.

use crate::error::KernelError;

const MAX_NAME_LEN: usize = 63;

/// Checks that `value` is a DNS-1123 label: lowercase alphanumerics and `-`,
/// starting and ending with an alphanumeric, at most 63 characters.
pub fn validate_name(value: &str, field: &str) -> Result<(), KernelError> {
    if value.is_empty() {
        return Err(KernelError::validation(format!("{field} can't be empty")));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(KernelError::validation(format!(
            "{field} {value:?} must be no more than {MAX_NAME_LEN} characters"
        )));
    }
    let valid_chars = value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let bytes = value.as_bytes();
    let valid_edges = bytes[0].is_ascii_alphanumeric() && bytes[bytes.len() - 1].is_ascii_alphanumeric();
    if !valid_chars || !valid_edges {
        return Err(KernelError::validation(format!(
            "{field} {value:?} must consist of lower case alphanumeric characters or '-', \
             and must start and end with an alphanumeric character"
        )));
    }
    Ok(())
}

/// Generates `<prefix>-<uuid v4>`, which is itself a valid name.
pub fn generate_name(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}
