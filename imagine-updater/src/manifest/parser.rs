//! Line-oriented parser for `VersionData.txt`.
//!
//! # Format
//!
//! ```text
//! [versions]
//! title=Live Server
//! server=http://patch.example.com/live
//! tag=Live
//!
//! title=Test Server
//! server=http://patch.example.com/test
//! tag=Test
//!
//! [Live]
//! data/a.dat=9f86d081884c7d65,1024
//! data/b.dat=60303ae22b998861
//! ```
//!
//! A version record is closed as soon as it has all three fields, at a blank
//! line, or at the next section header. A field that follows a complete record
//! without a blank line starts the next record; if that record never
//! completes, the field is reported as a duplicate of the record before it.
//!
//! File lines split at the first `=`: the path is the key and everything after
//! it is the hash and optional size. File sections must name a tag declared
//! in `[versions]`. The first error stops parsing.

use std::collections::HashSet;

use tracing::debug;

use super::error::{ManifestError, ManifestResult, VersionField};
use super::path::normalize_relative_path;
use super::types::{FileEntry, Manifest, Tag};

/// Literal header every manifest must open with.
pub const VERSIONS_HEADER: &str = "[versions]";

/// Parse a complete manifest document.
pub fn parse(text: &str) -> ManifestResult<Manifest> {
    ManifestParser::new().parse(text)
}

/// Fields collected for the version record currently being read.
#[derive(Debug, Default)]
struct PendingRecord {
    title: Option<String>,
    server: Option<String>,
    tag: Option<String>,
    start_line: usize,
    first_field: Option<VersionField>,
    /// Opened directly after a complete record, with no blank line between.
    follows_complete: bool,
}

impl PendingRecord {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.server.is_none() && self.tag.is_none()
    }

    fn slot(&mut self, field: VersionField) -> &mut Option<String> {
        match field {
            VersionField::Title => &mut self.title,
            VersionField::Server => &mut self.server,
            VersionField::Tag => &mut self.tag,
        }
    }

    fn missing(&self) -> Vec<VersionField> {
        VersionField::ALL
            .into_iter()
            .filter(|field| match field {
                VersionField::Title => self.title.is_none(),
                VersionField::Server => self.server.is_none(),
                VersionField::Tag => self.tag.is_none(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum Section {
    Versions,
    /// File list of the tag at this index.
    Files(usize),
}

struct ManifestParser {
    tags: Vec<Tag>,
    seen_paths: Vec<HashSet<String>>,
    pending: PendingRecord,
    section: Section,
    just_completed: bool,
}

impl ManifestParser {
    fn new() -> Self {
        Self {
            tags: Vec::new(),
            seen_paths: Vec::new(),
            pending: PendingRecord::default(),
            section: Section::Versions,
            just_completed: false,
        }
    }

    fn parse(mut self, text: &str) -> ManifestResult<Manifest> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l.trim()));

        let (header_line, first) = lines
            .by_ref()
            .find(|(_, line)| !line.is_empty())
            .unwrap_or((1, ""));
        if first != VERSIONS_HEADER {
            return Err(ManifestError::MalformedHeader {
                found: first.to_string(),
                line_number: header_line,
            });
        }

        for (line_number, line) in lines {
            match self.section {
                Section::Versions => self.versions_line(line, line_number)?,
                Section::Files(index) => self.file_line(index, line, line_number)?,
            }
        }

        if let Section::Versions = self.section {
            self.close_record()?;
        }

        debug!(
            tags = self.tags.len(),
            files = self.tags.iter().map(|t| t.files.len()).sum::<usize>(),
            "Parsed manifest"
        );
        Ok(Manifest::from_tags(self.tags))
    }

    fn versions_line(&mut self, line: &str, line_number: usize) -> ManifestResult<()> {
        if line.is_empty() {
            self.just_completed = false;
            return self.close_record();
        }
        if line.starts_with('[') {
            self.close_record()?;
            return self.enter_section(line, line_number);
        }

        let invalid = || ManifestError::InvalidVersionLine {
            line: line.to_string(),
            line_number,
        };
        let (key, value) = line.split_once('=').ok_or_else(invalid)?;
        let field = VersionField::from_key(key.trim()).ok_or_else(invalid)?;
        let value = value.trim();

        if self.pending.is_empty() {
            self.pending.start_line = line_number;
            self.pending.first_field = Some(field);
            self.pending.follows_complete = std::mem::take(&mut self.just_completed);
        }
        if self.pending.slot(field).is_some() {
            return Err(ManifestError::DuplicateField { field, line_number });
        }
        validate_version_value(field, value, line_number)?;
        if field == VersionField::Tag && self.tags.iter().any(|t| t.name == value) {
            return Err(ManifestError::DuplicateTag {
                tag: value.to_string(),
                line_number,
            });
        }

        *self.pending.slot(field) = Some(value.to_string());

        if self.pending.missing().is_empty() {
            self.close_record()?;
            self.just_completed = true;
        }
        Ok(())
    }

    /// Flush the pending record, if any.
    fn close_record(&mut self) -> ManifestResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let missing = self.pending.missing();
        let record = std::mem::take(&mut self.pending);
        match (record.title, record.server, record.tag) {
            (Some(title), Some(server), Some(name)) => {
                self.tags.push(Tag {
                    name,
                    title,
                    server,
                    files: Vec::new(),
                });
                self.seen_paths.push(HashSet::new());
                Ok(())
            }
            _ => match record.first_field {
                Some(field) if record.follows_complete => Err(ManifestError::DuplicateField {
                    field,
                    line_number: record.start_line,
                }),
                _ => Err(ManifestError::IncompleteVersionRecord {
                    missing,
                    line_number: record.start_line,
                }),
            },
        }
    }

    fn enter_section(&mut self, line: &str, line_number: usize) -> ManifestResult<()> {
        let name = line
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .map(str::trim)
            .filter(|name| is_valid_tag_name(name))
            .ok_or_else(|| ManifestError::InvalidSectionHeader {
                line: line.to_string(),
                line_number,
            })?;

        let index = self
            .tags
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| ManifestError::UnknownTagReference {
                tag: name.to_string(),
                line_number,
            })?;

        self.section = Section::Files(index);
        Ok(())
    }

    fn file_line(&mut self, index: usize, line: &str, line_number: usize) -> ManifestResult<()> {
        if line.is_empty() {
            return Ok(());
        }
        if line.starts_with('[') {
            return self.enter_section(line, line_number);
        }

        let invalid = || ManifestError::InvalidFileLine {
            line: line.to_string(),
            line_number,
        };
        let (raw_path, value) = line.split_once('=').ok_or_else(invalid)?;
        let raw_path = raw_path.trim();
        let (hash, size) = match value.split_once(',') {
            Some((hash, size)) => {
                let size = size.trim();
                let size = if size.is_empty() {
                    None
                } else {
                    Some(size.parse::<u64>().map_err(|_| invalid())?)
                };
                (hash.trim(), size)
            }
            None => (value.trim(), None),
        };
        if raw_path.is_empty() || !is_valid_hash(hash) {
            return Err(invalid());
        }

        let path = normalize_relative_path(raw_path).ok_or_else(|| ManifestError::UnsafePath {
            path: raw_path.to_string(),
            line_number,
        })?;

        if !self.seen_paths[index].insert(path.clone()) {
            return Err(ManifestError::DuplicateFileEntry {
                path,
                tag: self.tags[index].name.clone(),
                line_number,
            });
        }

        self.tags[index].files.push(FileEntry::new(path, hash, size));
        Ok(())
    }
}

fn validate_version_value(
    field: VersionField,
    value: &str,
    line_number: usize,
) -> ManifestResult<()> {
    let valid = match field {
        VersionField::Title => is_printable(value),
        VersionField::Server => is_http_url(value),
        VersionField::Tag => is_valid_tag_name(value),
    };
    if valid {
        Ok(())
    } else {
        Err(ManifestError::InvalidVersionValue {
            field,
            value: value.to_string(),
            line_number,
        })
    }
}

fn is_printable(value: &str) -> bool {
    !value.is_empty() && !value.chars().any(char::is_control)
}

fn is_http_url(value: &str) -> bool {
    reqwest::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
        .unwrap_or(false)
}

/// Tag names have to survive being written back as `[name]`.
fn is_valid_tag_name(value: &str) -> bool {
    is_printable(value) && !value.contains(['[', ']', '='])
}

/// Hashes are opaque tokens; an empty hash is allowed.
fn is_valid_hash(value: &str) -> bool {
    !value.chars().any(|c| c.is_whitespace() || c.is_control() || c == ',')
}
