//! Temporary files that become installed files on commit.

use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::download::DownloadSink;

/// File name prefix of staged files.
pub const STAGING_PREFIX: &str = ".imagine-";

/// File name suffix of staged files.
pub const STAGING_SUFFIX: &str = ".part";

/// A download in progress, written next to its final destination.
///
/// Dropping a `StagedFile` without committing it deletes the temporary file
/// and leaves the destination untouched.
pub struct StagedFile {
    relative: String,
    destination: PathBuf,
    writer: BufWriter<NamedTempFile>,
    hasher: Sha256,
    bytes: u64,
}

impl StagedFile {
    pub(crate) fn new(relative: &str, destination: PathBuf, temp: NamedTempFile) -> Self {
        Self {
            relative: relative.to_string(),
            destination,
            writer: BufWriter::new(temp),
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    /// Manifest path this file will be installed as.
    pub fn relative_path(&self) -> &str {
        &self.relative
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Location of the temporary file.
    pub fn temp_path(&self) -> &Path {
        self.writer.get_ref().path()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Lowercase hex SHA-256 of everything written so far.
    pub fn digest(&self) -> String {
        format!("{:x}", self.hasher.clone().finalize())
    }

    /// Flush buffered data and hand back the temp file.
    pub(crate) fn finish(self) -> io::Result<(String, PathBuf, NamedTempFile)> {
        let temp = self.writer.into_inner().map_err(|e| e.into_error())?;
        Ok((self.relative, self.destination, temp))
    }
}

impl std::fmt::Debug for StagedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedFile")
            .field("relative", &self.relative)
            .field("temp_path", &self.temp_path())
            .field("bytes", &self.bytes)
            .finish()
    }
}

impl Write for StagedFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.bytes += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl DownloadSink for StagedFile {
    fn reset(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        let temp = self.writer.get_mut();
        temp.as_file_mut().set_len(0)?;
        temp.seek(SeekFrom::Start(0))?;
        self.hasher = Sha256::new();
        self.bytes = 0;
        Ok(())
    }
}
