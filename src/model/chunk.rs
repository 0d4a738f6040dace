//! Classified spans of a message body.

/// Location of a MIME part inside its message's part tree: the child index
/// taken at each level, starting from the root. The root itself is `[]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PartRef {
    pub path: Vec<usize>,
    /// Size of the undecoded payload in bytes.
    pub size: usize,
}

/// A non-text part. The payload is not copied; it is resolved on demand
/// through [`PartRef`] by whoever wants to materialize it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Attachment {
    /// Declared MIME type, e.g. `"application/pdf"`.
    pub content_type: String,
    /// Filename from the part headers, if any.
    pub filename: Option<String>,
    /// Content-Disposition value with whitespace runs collapsed.
    pub description: String,
    pub part: PartRef,
}

/// One classified, contiguous span of a message body.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum Chunk {
    /// Body text, soft-wrapped.
    Text(Vec<String>),
    /// Quoted reply text, including legacy "Original Message" blocks.
    Quote(Vec<String>),
    Signature(Vec<String>),
    Attachment(Attachment),
}

/// Discriminant of a [`Chunk`], for callers that only need the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Text,
    Quote,
    Signature,
    Attachment,
}

impl Chunk {
    pub fn kind(&self) -> ChunkKind {
        match self {
            Chunk::Text(_) => ChunkKind::Text,
            Chunk::Quote(_) => ChunkKind::Quote,
            Chunk::Signature(_) => ChunkKind::Signature,
            Chunk::Attachment(_) => ChunkKind::Attachment,
        }
    }

    /// Text lines of the chunk. Attachments have none.
    pub fn lines(&self) -> &[String] {
        match self {
            Chunk::Text(lines) | Chunk::Quote(lines) | Chunk::Signature(lines) => lines,
            Chunk::Attachment(_) => &[],
        }
    }

    /// Whether the chunk belongs in a quoted reply.
    pub fn is_quotable(&self) -> bool {
        matches!(self, Chunk::Text(_) | Chunk::Quote(_))
    }
}
