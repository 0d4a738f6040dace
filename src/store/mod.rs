//! Concrete message sources.

pub mod mbox;
