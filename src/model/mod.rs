//! Core data model types for messages, addresses, and body chunks.

pub mod address;
pub mod chunk;
pub mod message;
