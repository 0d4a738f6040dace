//! MBOX-file-backed message source: reads records by byte offset with LRU
//! caching of decoded part trees.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use tracing::{debug, warn};

use crate::error::{MailError, Result};
use crate::parser::mbox;
use crate::parser::mime::{self, MimePart};
use crate::source::MessageSource;

/// Default number of decoded part trees to keep in the LRU cache.
const DEFAULT_CACHE_SIZE: usize = 50;

/// Reads records from an mbox stream. The locator of a record is the byte
/// offset of its `From ` line.
///
/// Keeps an LRU cache of decoded part trees so re-chunking a message (after
/// [`crate::Message::invalidate`]) does not repeat MIME decoding.
pub struct MboxSource<R> {
    path: PathBuf,
    reader: BufReader<R>,
    cache: LruCache<u64, MimePart>,
    broken: Option<String>,
}

impl MboxSource<File> {
    /// Open an mbox file for random-access reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| MailError::io(&path, e))?;
        Ok(Self::from_reader(path, file))
    }
}

impl<R: Read + Seek> MboxSource<R> {
    /// Wrap any seekable stream; `path` is only used in error messages.
    pub fn from_reader(path: impl Into<PathBuf>, reader: R) -> Self {
        let cache_size = NonZeroUsize::new(DEFAULT_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            path: path.into(),
            reader: BufReader::new(reader),
            cache: LruCache::new(cache_size),
            broken: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the source offline; every later load fails with a
    /// [`MailError::BrokenSource`].
    pub fn mark_broken(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(path = %self.path.display(), reason = %reason, "Marking source as broken");
        self.broken = Some(reason);
        self.cache.clear();
    }

    fn check_available(&self) -> Result<()> {
        match &self.broken {
            Some(reason) => Err(MailError::BrokenSource(reason.clone())),
            None => Ok(()),
        }
    }

    /// Seek to `offset` and make sure a record starts there.
    fn seek_record(&mut self, offset: u64) -> Result<()> {
        self.check_available()?;
        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| MailError::io(&self.path, e))?;
        // offset 0 may hold a bare message without a From_ line
        if offset > 0 && !mbox::at_separator(&mut self.reader).map_err(|e| self.relabel(e))? {
            return Err(MailError::Transport(format!(
                "no mbox record at offset {offset} in '{}'",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Header lines of the record at `offset`, up to (not including) the
    /// blank separator line.
    fn read_header_block(&mut self, offset: u64) -> Result<Vec<u8>> {
        self.seek_record(offset)?;
        let mut block = Vec::with_capacity(2048);
        let mut line = Vec::with_capacity(256);
        let mut first = true;
        while mbox::next_record_line(&mut self.reader, &mut line, first)
            .map_err(|e| self.relabel(e))?
        {
            first = false;
            if mbox::is_blank_line(&line) {
                break;
            }
            block.extend_from_slice(&line);
        }
        if block.is_empty() {
            return Err(MailError::Transport(format!(
                "empty record at offset {offset} in '{}'",
                self.path.display()
            )));
        }
        Ok(block)
    }

    fn read_full_record(&mut self, offset: u64) -> Result<Vec<u8>> {
        debug!(offset, path = %self.path.display(), "Reading record from mbox");
        self.seek_record(offset)?;
        let record = mbox::read_record(&mut self.reader, mbox::MAX_RECORD_SIZE)
            .map_err(|e| self.relabel(e))?;
        if record.is_empty() {
            return Err(MailError::Transport(format!(
                "empty record at offset {offset} in '{}'",
                self.path.display()
            )));
        }
        Ok(record)
    }

    /// Attach our path to stream errors raised by the framing helpers.
    fn relabel(&self, e: MailError) -> MailError {
        match e {
            MailError::Io { source, .. } => MailError::io(&self.path, source),
            other => other,
        }
    }
}

impl<R: Read + Seek> MessageSource for MboxSource<R> {
    fn load_header(&mut self, locator: u64) -> Result<Vec<u8>> {
        self.read_header_block(locator)
    }

    fn load_body(&mut self, locator: u64) -> Result<MimePart> {
        self.check_available()?;
        if let Some(tree) = self.cache.get(&locator) {
            return Ok(tree.clone());
        }
        let raw = self.read_full_record(locator)?;
        let tree = mime::parse_part_tree(&raw);
        self.cache.put(locator, tree.clone());
        Ok(tree)
    }

    fn raw_header(&mut self, locator: u64) -> Result<Vec<u8>> {
        self.read_header_block(locator)
    }

    fn raw_full_message(&mut self, locator: u64) -> Result<Vec<u8>> {
        self.read_full_record(locator)
    }

    fn broken(&self) -> bool {
        self.broken.is_some()
    }

    fn broken_message(&self) -> String {
        self.broken.clone().unwrap_or_default()
    }
}
