//! Record encoding for `hashlist.dat` and the `hashlist.ver` stamp.
//!
//! The hash list is an append-only journal, one record per line:
//!
//! ```text
//! put<TAB><size><TAB><hash><TAB><path>
//! del<TAB><path>
//! ```
//!
//! The path is the last field so it never needs escaping; paths and hashes
//! are validated to be free of tabs and newlines before they are written.

use crate::manifest::normalize_relative_path;

/// Current on-disk catalog format. Bump when the record layout changes.
pub const CATALOG_FORMAT_VERSION: u32 = 1;

const STAMP_PREFIX: &str = "imagine-hashlist";

/// One journal record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Record {
    Put { path: String, hash: String, size: u64 },
    Delete { path: String },
}

impl Record {
    /// Encode as a single newline-terminated line.
    pub(crate) fn encode(&self) -> String {
        match self {
            Record::Put { path, hash, size } => format!("put\t{size}\t{hash}\t{path}\n"),
            Record::Delete { path } => format!("del\t{path}\n"),
        }
    }

    /// Decode one line (without its terminator).
    pub(crate) fn decode(line: &str) -> Result<Record, String> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let (kind, rest) = line
            .split_once('\t')
            .ok_or_else(|| format!("missing record type in {line:?}"))?;

        match kind {
            "put" => {
                let mut fields = rest.splitn(3, '\t');
                let size = fields
                    .next()
                    .and_then(|s| s.parse::<u64>().ok())
                    .ok_or_else(|| "invalid size".to_string())?;
                let hash = fields.next().ok_or_else(|| "missing hash".to_string())?;
                let path = fields.next().ok_or_else(|| "missing path".to_string())?;
                if !is_valid_hash(hash) {
                    return Err(format!("invalid hash {hash:?}"));
                }
                Ok(Record::Put {
                    path: checked_path(path)?,
                    hash: hash.to_string(),
                    size,
                })
            }
            "del" => Ok(Record::Delete {
                path: checked_path(rest)?,
            }),
            other => Err(format!("unknown record type {other:?}")),
        }
    }
}

fn checked_path(path: &str) -> Result<String, String> {
    match normalize_relative_path(path) {
        Some(normalized) if normalized == path => Ok(normalized),
        _ => Err(format!("invalid path {path:?}")),
    }
}

/// Hashes must not contain the field or record separators.
pub(crate) fn is_valid_hash(hash: &str) -> bool {
    !hash.chars().any(|c| c.is_whitespace() || c.is_control())
}

/// Contents of `hashlist.ver`.
pub(crate) fn encode_stamp() -> String {
    format!("{STAMP_PREFIX} {CATALOG_FORMAT_VERSION}\n")
}

/// Parse `hashlist.ver`, returning the format version it declares.
pub(crate) fn decode_stamp(text: &str) -> Option<u32> {
    text.trim()
        .strip_prefix(STAMP_PREFIX)?
        .trim()
        .parse::<u32>()
        .ok()
}
