//! Capabilities the engine expects from its collaborators.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::parser::mime::MimePart;

/// Where message bytes come from.
///
/// `locator` is opaque to the engine; mbox sources use the byte offset of
/// the record's `From ` line. Fetch failures must be reported as transport
/// errors ([`crate::MailError::is_transport`]) so callers can tell them
/// apart from content problems.
pub trait MessageSource {
    /// Raw header block of the record, starting at its first line.
    fn load_header(&mut self, locator: u64) -> Result<Vec<u8>>;

    /// Decoded MIME part tree of the record.
    fn load_body(&mut self, locator: u64) -> Result<MimePart>;

    /// Header block exactly as stored.
    fn raw_header(&mut self, locator: u64) -> Result<Vec<u8>>;

    /// Whole record exactly as stored.
    fn raw_full_message(&mut self, locator: u64) -> Result<Vec<u8>>;

    /// The source is permanently unavailable.
    fn broken(&self) -> bool {
        false
    }

    /// Human-readable reason for [`MessageSource::broken`].
    fn broken_message(&self) -> String {
        String::new()
    }
}

/// Opens attachments outside the engine.
///
/// Attachment chunks only carry a [`crate::model::chunk::PartRef`]; a UI
/// resolves it with [`MimePart::part_at`] and hands the part to a viewer.
pub trait AttachmentViewer {
    /// Write the part somewhere a viewer can read it and return the path.
    fn materialize(&mut self, part: &MimePart) -> Result<PathBuf>;

    /// Show a materialized file.
    fn view(&mut self, path: &Path) -> Result<()>;
}
