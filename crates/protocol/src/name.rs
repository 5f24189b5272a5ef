use std::fmt;

use crate::error::ProtocolError;

/// Longest accepted file name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// A file name that is safe to join onto a storage root.
///
/// Rejects:
/// - Empty names and names longer than [`MAX_NAME_LEN`]
/// - Non-ASCII bytes and control characters (`\n`, `\r`, NUL, ...)
/// - Path separators (`/` and `\`)
/// - The special entries `.` and `..`
/// - Leading or trailing whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileName(String);

impl FileName {
    pub fn new(name: impl Into<String>) -> Result<Self, ProtocolError> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn validate_name(name: &str) -> Result<(), ProtocolError> {
    if name.is_empty() {
        return Err(ProtocolError::InvalidName("empty name".into()));
    }

    if name.len() > MAX_NAME_LEN {
        return Err(ProtocolError::InvalidName(format!(
            "name too long: {} bytes (max {MAX_NAME_LEN})",
            name.len()
        )));
    }

    if !name.is_ascii() {
        return Err(ProtocolError::InvalidName(format!(
            "non-ASCII name not allowed: {name:?}"
        )));
    }

    if let Some(c) = name.chars().find(|c| c.is_ascii_control()) {
        return Err(ProtocolError::InvalidName(format!(
            "control character {c:?} not allowed"
        )));
    }

    if name.contains(['/', '\\']) {
        return Err(ProtocolError::InvalidName(format!(
            "path separator not allowed: {name}"
        )));
    }

    if name == "." || name == ".." {
        return Err(ProtocolError::InvalidName(format!(
            "special entry not allowed: {name}"
        )));
    }

    if name.trim() != name {
        return Err(ProtocolError::InvalidName(format!(
            "leading or trailing whitespace not allowed: {name:?}"
        )));
    }

    Ok(())
}
