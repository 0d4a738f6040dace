//! Email parsing: mbox framing, header scanning and normalization, MIME walking and body chunking.

pub mod chunker;
pub mod header;
pub mod mbox;
pub mod mime;
pub mod scanner;
