//! Identification of a single remote archive.

use std::fmt;

/// Leading character reserved for in-flight files under the storage root.
///
/// The hosting service never allows it in owner or repository names.
pub const RESERVED_PREFIX: char = '~';

/// Errors that can occur when constructing an [`ArchiveTarget`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TargetError {
    /// A required name is empty.
    #[error("Empty field: {0}")]
    EmptyField(&'static str),

    /// A name contains a character or form that cannot be used as a single
    /// path component.
    #[error("Invalid {field} '{value}': {reason}")]
    InvalidName {
        /// Which name was rejected ("owner" or "name").
        field: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// A remote repository archive to retrieve: `owner/name` plus the resolved
/// source URL.
///
/// Immutable once built. Both names are validated so that the resource name
/// can be used directly as one component under the storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveTarget {
    owner: String,
    name: String,
    source_url: String,
}

impl ArchiveTarget {
    /// Build a target, validating `owner` and `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError`] if either name is empty or is not a plain
    /// path component (separators, `.`/`..`, NUL, [`RESERVED_PREFIX`]).
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Result<Self, TargetError> {
        let owner = owner.into();
        let name = name.into();
        validate_component("owner", &owner)?;
        validate_component("name", &name)?;
        Ok(Self {
            owner,
            name,
            source_url: source_url.into(),
        })
    }

    /// Owner or organization.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository (resource) name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL the archive is fetched from.
    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    /// File name of the packaged artifact (`<name>.zip`).
    pub fn zip_file_name(&self) -> String {
        format!("{}.zip", self.name)
    }
}

impl fmt::Display for ArchiveTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Check that `value` can be used as a single path component.
///
/// # Errors
///
/// Returns [`TargetError`] naming `field` when the value is rejected.
pub fn validate_component(field: &'static str, value: &str) -> Result<(), TargetError> {
    let invalid = |reason| TargetError::InvalidName {
        field,
        value: value.to_string(),
        reason,
    };

    if value.is_empty() {
        return Err(TargetError::EmptyField(field));
    }
    if value.contains(['/', '\\']) {
        return Err(invalid("path separators are not allowed"));
    }
    if value.contains('\0') {
        return Err(invalid("NUL bytes are not allowed"));
    }
    if value == "." || value == ".." {
        return Err(invalid("'.' and '..' are not allowed"));
    }
    if value.starts_with(RESERVED_PREFIX) {
        return Err(invalid("must not start with '~'"));
    }
    Ok(())
}
