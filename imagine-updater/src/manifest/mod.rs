//! Version manifest (`VersionData.txt`) model and parser.
//!
//! The manifest declares release tags in a leading `[versions]` section and
//! then lists the files of each tag in a section named after it. Parsing is
//! strict: the first grammar or validation error aborts with a
//! [`ManifestError`] carrying the offending line, and no partial manifest is
//! ever returned.

mod error;
mod parser;
mod path;
mod types;

pub use error::{ManifestError, ManifestResult, VersionField};
pub use parser::{parse, VERSIONS_HEADER};
pub use path::{normalize_relative_path, resolve_in};
pub use types::{FileEntry, Manifest, Tag};

/// File name of the manifest on the patch server.
pub const MANIFEST_FILE_NAME: &str = "VersionData.txt";
