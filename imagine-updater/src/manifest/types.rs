//! Parsed manifest model.

/// One file a tag expects to be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Relative path with `/` separators.
    pub path: String,
    /// Opaque content hash used for change detection.
    pub hash: String,
    /// Declared size in bytes, if the manifest supplied one.
    pub size: Option<u64>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, hash: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            path: path.into(),
            hash: hash.into(),
            size,
        }
    }
}

/// A named release stream with its own server and file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Identifier, unique across the manifest.
    pub name: String,
    /// Human readable title.
    pub title: String,
    /// Base URL files of this tag are served from.
    pub server: String,
    /// Files in manifest order.
    pub files: Vec<FileEntry>,
}

impl Tag {
    /// Look up a file entry by path.
    pub fn file(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Sum of all declared file sizes. Entries without a size count as zero.
    pub fn declared_bytes(&self) -> u64 {
        self.files.iter().filter_map(|f| f.size).sum()
    }
}

/// A parsed `VersionData.txt` document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    tags: Vec<Tag>,
}

impl Manifest {
    pub(crate) fn from_tags(tags: Vec<Tag>) -> Self {
        Self { tags }
    }

    /// Tags in declaration order.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Find a tag by name.
    pub fn tag(&self, name: &str) -> Option<&Tag> {
        self.tags.iter().find(|t| t.name == name)
    }

    /// Names of all declared tags, in declaration order.
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(|t| t.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}
