//! Destinations for streamed response bodies.

use std::io::{self, Write};

/// A writer the downloader streams body bytes into.
///
/// A retried download starts over, so the sink must be able to discard
/// whatever an earlier attempt wrote.
pub trait DownloadSink: Write {
    /// Discard all bytes written so far.
    fn reset(&mut self) -> io::Result<()>;
}

impl DownloadSink for Vec<u8> {
    fn reset(&mut self) -> io::Result<()> {
        self.clear();
        Ok(())
    }
}
