//! External Subprocess Driver backend variant.
//!
//! Drives a long-lived external ASR binary (the `sense-voice-stream`
//! family) as a segment transcriber: one finalized phrase per stdout line,
//! no running cumulative context.

mod driver;
pub mod parser;

pub use driver::{validate_executable, ExternalBackendConfig, ExternalSubprocessDriver};
