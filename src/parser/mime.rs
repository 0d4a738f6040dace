//! MIME part tree and its depth-first walker.
//!
//! The walker takes an already decoded part tree (transfer encodings
//! removed) and flattens it into body chunks: `text/plain` leaves go through
//! the [`BodyChunker`], `multipart/*` nodes recurse, everything else becomes
//! an [`Attachment`] that points back at its part.

use mail_parser::{MessageParser, MimeHeaders, PartType};
use tracing::{debug, warn};

use crate::config::ChunkingConfig;
use crate::error::{MailError, Result};
use crate::model::chunk::{Attachment, Chunk, PartRef};
use crate::parser::chunker::{split_lines, BodyChunker, SnippetBuilder};
use crate::parser::mbox;

/// Maximum nesting depth followed by the walker (guards against adversarial input).
const MAX_DEPTH: usize = 32;

/// Content of a part: a payload for leaves, children for containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartBody {
    Payload(Vec<u8>),
    Children(Vec<MimePart>),
}

/// One node of a decoded MIME tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MimePart {
    /// Lower-cased `type/subtype`; `None` when the part declares nothing.
    pub content_type: Option<String>,
    /// Declared charset label of a text payload.
    pub charset: Option<String>,
    /// Raw `Content-Disposition` value.
    pub disposition: Option<String>,
    pub filename: Option<String>,
    pub body: PartBody,
}

impl MimePart {
    /// A leaf with the given declared type and payload.
    pub fn leaf(content_type: Option<&str>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            content_type: content_type.map(|t| t.trim().to_ascii_lowercase()),
            charset: None,
            disposition: None,
            filename: None,
            body: PartBody::Payload(payload.into()),
        }
    }

    /// A `text/plain` leaf.
    pub fn text(body: &str) -> Self {
        Self::leaf(Some("text/plain"), body.as_bytes())
    }

    /// A container node, e.g. `multipart/mixed`.
    pub fn multipart(content_type: &str, children: Vec<MimePart>) -> Self {
        Self {
            content_type: Some(content_type.trim().to_ascii_lowercase()),
            charset: None,
            disposition: None,
            filename: None,
            body: PartBody::Children(children),
        }
    }

    pub fn with_charset(mut self, charset: &str) -> Self {
        self.charset = Some(charset.to_string());
        self
    }

    pub fn with_disposition(mut self, disposition: &str) -> Self {
        self.disposition = Some(disposition.to_string());
        self
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.filename = Some(filename.to_string());
        self
    }

    pub fn payload(&self) -> &[u8] {
        match &self.body {
            PartBody::Payload(bytes) => bytes,
            PartBody::Children(_) => &[],
        }
    }

    pub fn children(&self) -> &[MimePart] {
        match &self.body {
            PartBody::Children(children) => children,
            PartBody::Payload(_) => &[],
        }
    }

    /// Resolve a child-index path, as stored in an attachment's [`PartRef`].
    pub fn part_at(&self, path: &[usize]) -> Option<&MimePart> {
        path.iter()
            .try_fold(self, |part, &idx| part.children().get(idx))
    }

    pub fn kind(&self) -> PartKind {
        match (&self.body, PartKind::of(self.content_type.as_deref())) {
            // a container without a multipart type is still walked
            (PartBody::Children(_), _) => PartKind::Multipart,
            (PartBody::Payload(_), PartKind::Multipart) => PartKind::Other,
            (_, kind) => kind,
        }
    }

    /// Build a tree from a message parsed by `mail-parser`.
    ///
    /// Text parts arrive already decoded to UTF-8, so their charset is
    /// reported as `utf-8` whatever the part declared. An unknown declared
    /// label is only logged.
    pub fn from_message(message: &mail_parser::Message<'_>) -> Option<Self> {
        message
            .parts
            .first()
            .map(|root| Self::from_parsed_part(message, root, 0))
    }

    fn from_parsed_part(
        message: &mail_parser::Message<'_>,
        part: &mail_parser::MessagePart<'_>,
        depth: usize,
    ) -> Self {
        let content_type = part.content_type().map(|ct| match ct.subtype() {
            Some(sub) => format!("{}/{}", ct.ctype(), sub).to_ascii_lowercase(),
            None => ct.ctype().to_ascii_lowercase(),
        });
        let disposition = part.content_disposition().map(|d| {
            let mut value = d.ctype().to_string();
            if let Some(name) = d.attribute("filename") {
                value.push_str(&format!("; filename=\"{name}\""));
            }
            value
        });
        let filename = part.attachment_name().map(str::to_string);

        let (charset, body) = match &part.body {
            PartType::Multipart(ids) if depth < MAX_DEPTH => {
                let children = ids
                    .iter()
                    .filter_map(|&id| message.parts.get(id))
                    .map(|child| Self::from_parsed_part(message, child, depth + 1))
                    .collect();
                (None, PartBody::Children(children))
            }
            PartType::Multipart(_) => {
                warn!(depth, "MIME nesting too deep, dropping children");
                (None, PartBody::Children(Vec::new()))
            }
            PartType::Text(text) => {
                let declared = part.content_type().and_then(|ct| ct.attribute("charset"));
                if let Some(label) = declared {
                    if encoding_rs::Encoding::for_label(label.as_bytes()).is_none() {
                        warn!(charset = label, "Unknown charset, keeping best-effort decode");
                    }
                }
                (
                    Some("utf-8".to_string()),
                    PartBody::Payload(text.as_bytes().to_vec()),
                )
            }
            _ => (None, PartBody::Payload(part.contents().to_vec())),
        };

        Self {
            content_type,
            charset,
            disposition,
            filename,
            body,
        }
    }
}

/// How the walker treats a part, decided once from its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartKind {
    PlainText,
    Multipart,
    Other,
}

impl PartKind {
    pub fn of(content_type: Option<&str>) -> Self {
        let Some(ct) = content_type else {
            return Self::PlainText;
        };
        let ct = ct.trim();
        if ct.is_empty() || ct.eq_ignore_ascii_case("text/plain") {
            Self::PlainText
        } else if ct
            .get(..10)
            .is_some_and(|p| p.eq_ignore_ascii_case("multipart/"))
        {
            Self::Multipart
        } else {
            Self::Other
        }
    }
}

/// Parse a raw record (optionally starting with its `From ` line) into a
/// part tree. Unparseable input becomes a single `text/plain` leaf holding
/// everything after the header block.
pub fn parse_part_tree(raw: &[u8]) -> MimePart {
    let data = mbox::skip_from_line(raw);
    let parsed = MessageParser::default().parse(data);
    match parsed.as_ref().and_then(MimePart::from_message) {
        Some(tree) => tree,
        None => {
            debug!(len = data.len(), "MIME parse failed, using raw body as text");
            let (_, body) = mbox::split_header_body(data);
            MimePart::leaf(None, body)
        }
    }
}

/// Decode a text payload using its declared charset.
///
/// Without a charset the payload is read as UTF-8. Malformed sequences are
/// replaced; an unknown charset label is an error.
pub fn decode_text(payload: &[u8], charset: Option<&str>) -> Result<String> {
    let Some(label) = charset.map(str::trim).filter(|l| !l.is_empty()) else {
        return Ok(String::from_utf8_lossy(payload).into_owned());
    };
    let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
        .ok_or_else(|| MailError::UnsupportedEncoding(label.to_string()))?;
    let (text, _, had_errors) = encoding.decode(payload);
    if had_errors {
        debug!(charset = label, "Replaced malformed bytes while decoding");
    }
    Ok(text.into_owned())
}

/// Flatten a part tree into chunks, depth-first, in sibling order.
///
/// Text lines from every `text/plain` leaf are fed to `snippet`.
pub fn walk(
    root: &MimePart,
    cfg: &ChunkingConfig,
    snippet: &mut SnippetBuilder,
) -> Result<Vec<Chunk>> {
    let mut walker = Walker {
        chunker: BodyChunker::new(cfg),
        snippet,
        path: Vec::new(),
        out: Vec::new(),
    };
    walker.visit(root)?;
    Ok(walker.out)
}

struct Walker<'a, 's> {
    chunker: BodyChunker<'a>,
    snippet: &'s mut SnippetBuilder,
    path: Vec<usize>,
    out: Vec<Chunk>,
}

impl Walker<'_, '_> {
    fn visit(&mut self, part: &MimePart) -> Result<()> {
        match part.kind() {
            PartKind::PlainText => {
                let text = decode_text(part.payload(), part.charset.as_deref())?;
                let chunks = self.chunker.chunk(&split_lines(&text), self.snippet);
                self.out.extend(chunks);
            }
            PartKind::Multipart => {
                if self.path.len() >= MAX_DEPTH {
                    warn!(depth = self.path.len(), "MIME nesting too deep, skipping");
                    return Ok(());
                }
                for (idx, child) in part.children().iter().enumerate() {
                    self.path.push(idx);
                    let result = self.visit(child);
                    self.path.pop();
                    result?;
                }
            }
            PartKind::Other => self.out.push(Chunk::Attachment(self.attachment(part))),
        }
        Ok(())
    }

    fn attachment(&self, part: &MimePart) -> Attachment {
        let description = part
            .disposition
            .as_deref()
            .map(|d| d.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        Attachment {
            content_type: part
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            filename: part.filename.clone(),
            description,
            part: PartRef {
                path: self.path.clone(),
                size: part.payload().len(),
            },
        }
    }
}
