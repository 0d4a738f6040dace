//! `mailchunk` — tolerant parsing of mbox mail records.
//!
//! A record goes through two independent pipelines:
//!
//! - headers: [`parser::scanner`] collects raw header values from the record
//!   stream, then [`parser::header`] normalizes them into a
//!   [`MessageIdentity`] (addresses, date, ids, thread linkage);
//! - body: [`parser::mime`] walks the decoded MIME tree and
//!   [`parser::chunker`] splits each plain-text leaf into text, quote and
//!   signature chunks while deriving a short snippet.
//!
//! [`Message`] ties both together on top of a [`MessageSource`].

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod source;
pub mod store;

pub use error::{MailError, Result};
pub use model::address::Address;
pub use model::chunk::{Attachment, Chunk, ChunkKind, PartRef};
pub use model::message::{Message, MessageIdentity};
pub use source::{AttachmentViewer, MessageSource};
pub use store::mbox::MboxSource;
