//! Error types for manifest parsing.

use std::fmt;

use thiserror::Error;

/// Result type alias for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;

/// One of the three fields every version record must supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionField {
    Title,
    Server,
    Tag,
}

impl VersionField {
    /// All fields in the order they are reported when missing.
    pub const ALL: [VersionField; 3] = [VersionField::Title, VersionField::Server, VersionField::Tag];

    /// Key name as it appears in the manifest.
    pub fn key(&self) -> &'static str {
        match self {
            VersionField::Title => "title",
            VersionField::Server => "server",
            VersionField::Tag => "tag",
        }
    }

    /// Parse a manifest key into a field.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "title" => Some(VersionField::Title),
            "server" => Some(VersionField::Server),
            "tag" => Some(VersionField::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for VersionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Fatal manifest parse errors.
///
/// Line numbers are 1-based and refer to the raw manifest text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    /// The first non-empty line is not `[versions]`.
    #[error("The first line of the manifest was not [versions] (line {line_number}: {found:?})")]
    MalformedHeader { found: String, line_number: usize },

    /// A versions line that is not `title=`, `server=` or `tag=`.
    #[error("Invalid line found in versions section at line {line_number}: {line}")]
    InvalidVersionLine { line: String, line_number: usize },

    /// A record supplies the same field twice.
    #[error("Duplicate {field} value found at line {line_number}")]
    DuplicateField {
        field: VersionField,
        line_number: usize,
    },

    /// Two records declare the same tag.
    #[error("Non-unique tag value '{tag}' found at line {line_number}")]
    DuplicateTag { tag: String, line_number: usize },

    #[error(
        "Version record starting at line {line_number} is missing: {}",
        .missing.iter().map(|f| f.key()).collect::<Vec<_>>().join(", ")
    )]
    IncompleteVersionRecord {
        missing: Vec<VersionField>,
        line_number: usize,
    },

    #[error("Version contains invalid {field} value {value:?} at line {line_number}")]
    InvalidVersionValue {
        field: VersionField,
        value: String,
        line_number: usize,
    },

    /// A `[...]` header that is malformed or names an invalid tag.
    #[error("Section contains invalid tag name at line {line_number}: {line}")]
    InvalidSectionHeader { line: String, line_number: usize },

    /// A file section names a tag that was never declared.
    #[error("Section at line {line_number} references undeclared tag '{tag}'")]
    UnknownTagReference { tag: String, line_number: usize },

    #[error("Invalid line found in file list section at line {line_number}: {line}")]
    InvalidFileLine { line: String, line_number: usize },

    /// A file path that would escape the install directory.
    #[error("Unsafe file path {path:?} at line {line_number}")]
    UnsafePath { path: String, line_number: usize },

    #[error("Duplicate file '{path}' found for tag '{tag}' (line {line_number})")]
    DuplicateFileEntry {
        path: String,
        tag: String,
        line_number: usize,
    },
}

impl ManifestError {
    /// Line of the manifest the error was detected on.
    pub fn line_number(&self) -> usize {
        match self {
            ManifestError::MalformedHeader { line_number, .. }
            | ManifestError::InvalidVersionLine { line_number, .. }
            | ManifestError::DuplicateField { line_number, .. }
            | ManifestError::DuplicateTag { line_number, .. }
            | ManifestError::IncompleteVersionRecord { line_number, .. }
            | ManifestError::InvalidVersionValue { line_number, .. }
            | ManifestError::InvalidSectionHeader { line_number, .. }
            | ManifestError::UnknownTagReference { line_number, .. }
            | ManifestError::InvalidFileLine { line_number, .. }
            | ManifestError::UnsafePath { line_number, .. }
            | ManifestError::DuplicateFileEntry { line_number, .. } => *line_number,
        }
    }
}
