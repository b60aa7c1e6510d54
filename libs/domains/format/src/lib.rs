//! Format domain: opaque text messages on `format.foo` / `format.bar`.
//!
//! Subjects are not environment scoped, so debug and production processes
//! share one `FORMAT` stream.

pub mod processor;
pub mod streams;

pub use processor::LogProcessor;
pub use streams::{FormatProducer, FormatStream, FormatSubject};
