//! The in-memory message record.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::address::Address;
use super::chunk::Chunk;
use crate::config::{ChunkingConfig, HeaderConfig};
use crate::error::{MailError, Result};
use crate::parser::chunker::{soft_wrap, SnippetBuilder};
use crate::parser::{header, mime, scanner};
use crate::source::MessageSource;

/// Label seeded on records the source has not marked as read.
pub const UNREAD_LABEL: &str = "unread";

/// Typed header fields of one record.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct MessageIdentity {
    /// Bare message-id, without angle brackets. Never empty.
    pub message_id: String,
    pub date: DateTime<Utc>,
    /// Whitespace-collapsed subject, or the configured placeholder.
    pub subject: String,
    pub from: Option<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    /// Message-ids from `References:`, oldest first.
    pub references: Vec<String>,
    pub in_reply_to: Vec<String>,
    pub reply_to: Option<Address>,
    /// Posting address from `List-Post:`.
    pub list_address: Option<Address>,
    pub list_subscribe: Option<String>,
    pub list_unsubscribe: Option<String>,
    /// First of `Envelope-To`, `X-Original-To`, `Delivered-To`.
    pub recipient_email: Option<String>,
    /// The mbox `Status:` flag says the message was read.
    pub source_marked_read: bool,
}

/// A message: its identity plus lazily derived content.
///
/// Chunks and snippet are cached; [`Message::invalidate`] drops the chunk
/// cache so the next [`Message::chunks`] call re-parses. A snippet, once
/// present, is never recomputed.
#[derive(Debug, Clone)]
pub struct Message {
    /// Where the source finds this record (byte offset for mbox sources).
    pub locator: u64,
    pub identity: MessageIdentity,
    labels: BTreeSet<String>,
    snippet: Option<String>,
    chunks: Option<Vec<Chunk>>,
}

impl Message {
    /// Build a message from an already normalized identity.
    pub fn new(locator: u64, identity: MessageIdentity) -> Self {
        let mut labels = BTreeSet::new();
        if !identity.source_marked_read {
            labels.insert(UNREAD_LABEL.to_string());
        }
        Self {
            locator,
            identity,
            labels,
            snippet: None,
            chunks: None,
        }
    }

    /// Load and normalize the headers of the record at `locator`.
    ///
    /// Fails on transport errors and on records without a usable
    /// message-id or date.
    pub fn load<S: MessageSource + ?Sized>(
        source: &mut S,
        locator: u64,
        cfg: &HeaderConfig,
    ) -> Result<Self> {
        let raw = source.load_header(locator)?;
        let headers = scanner::scan_header_bytes(&raw)?;
        let identity = header::normalize_headers(&headers, cfg)?;
        debug!(
            locator,
            message_id = %identity.message_id,
            "Loaded message headers"
        );
        Ok(Self::new(locator, identity))
    }

    /// Restore a snippet kept from an earlier session.
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.identity.message_id
    }

    pub fn snippet(&self) -> Option<&str> {
        self.snippet.as_deref()
    }

    /// Cached chunks, if the body has been parsed.
    pub fn cached_chunks(&self) -> Option<&[Chunk]> {
        self.chunks.as_deref()
    }

    /// Body chunks, parsing the body on first use.
    ///
    /// Never fails: if the body cannot be fetched or decoded, a single
    /// explanatory Text chunk is returned instead.
    pub fn chunks<S: MessageSource + ?Sized>(
        &mut self,
        source: &mut S,
        cfg: &ChunkingConfig,
    ) -> &[Chunk] {
        if self.chunks.is_none() {
            let chunks = self.parse_body(source, cfg);
            self.chunks = Some(chunks);
        }
        self.chunks.as_deref().unwrap_or_default()
    }

    /// Forget the parsed body so it is re-read on next access.
    pub fn invalidate(&mut self) {
        self.chunks = None;
    }

    fn parse_body<S: MessageSource + ?Sized>(
        &mut self,
        source: &mut S,
        cfg: &ChunkingConfig,
    ) -> Vec<Chunk> {
        if source.broken() {
            let reason = source.broken_message();
            warn!(message_id = %self.id(), reason = %reason, "Source is broken");
            return vec![self.error_chunk(&reason, cfg.wrap_width)];
        }

        let mut snippet = if self.snippet.is_some() {
            SnippetBuilder::disabled()
        } else {
            SnippetBuilder::new(cfg.snippet_len)
        };

        let result = source
            .load_body(self.locator)
            .and_then(|tree| mime::walk(&tree, cfg, &mut snippet));

        match result {
            Ok(chunks) => {
                if let Some(derived) = snippet.finish() {
                    self.snippet = Some(derived);
                }
                chunks
            }
            Err(e) => {
                warn!(message_id = %self.id(), error = %e, "Could not load message body");
                vec![self.error_chunk(&explain(&e), cfg.wrap_width)]
            }
        }
    }

    /// Text shown in place of an unreadable body: the cached snippet, then
    /// the reason, wrapped like any other text chunk.
    fn error_chunk(&self, reason: &str, wrap_width: usize) -> Chunk {
        let mut lines = Vec::new();
        if let Some(snippet) = self.snippet.as_deref().filter(|s| !s.is_empty()) {
            lines.push(format!("{snippet}..."));
            lines.push(String::new());
        }
        lines.push(String::from("*** An error occurred while loading this message. ***"));
        lines.extend(reason.lines().map(str::to_string));
        Chunk::Text(
            lines
                .iter()
                .flat_map(|l| soft_wrap(l, wrap_width))
                .collect(),
        )
    }

    // ── Labels ──────────────────────────────────────────────────

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Returns `true` if the label was not already set.
    pub fn add_label(&mut self, label: &str) -> bool {
        self.labels.insert(label.to_string())
    }

    /// Returns `true` if the label was set.
    pub fn remove_label(&mut self, label: &str) -> bool {
        self.labels.remove(label)
    }

    // ── Derived views ───────────────────────────────────────────

    /// Lines worth quoting in a reply: Text and Quote chunks, in order.
    pub fn quotable_body_lines<S: MessageSource + ?Sized>(
        &mut self,
        source: &mut S,
        cfg: &ChunkingConfig,
    ) -> Vec<String> {
        self.chunks(source, cfg)
            .iter()
            .filter(|c| c.is_quotable())
            .flat_map(|c| c.lines().iter().cloned())
            .collect()
    }

    /// Body text for full-text indexing: Text chunks only.
    pub fn indexable_body<S: MessageSource + ?Sized>(
        &mut self,
        source: &mut S,
        cfg: &ChunkingConfig,
    ) -> String {
        self.chunks(source, cfg)
            .iter()
            .filter(|c| matches!(c, Chunk::Text(_)))
            .flat_map(|c| c.lines().iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Subject without reply markers, for indexing and thread grouping.
    pub fn indexable_subject(&self) -> String {
        header::normalize_subj(&self.identity.subject)
    }

    /// Raw header block as stored by the source.
    pub fn raw_header<S: MessageSource + ?Sized>(&self, source: &mut S) -> Result<Vec<u8>> {
        source.raw_header(self.locator)
    }

    /// Full raw record as stored by the source.
    pub fn raw_message<S: MessageSource + ?Sized>(&self, source: &mut S) -> Result<Vec<u8>> {
        source.raw_full_message(self.locator)
    }
}

fn explain(e: &MailError) -> String {
    if e.is_transport() {
        format!("The message source reported: {e}")
    } else {
        format!("The message content could not be read: {e}")
    }
}
