//! Transcription backend abstraction.
//!
//! Two concrete variants exist — the OS platform recognizer
//! ([`platform`]) and an external streaming subprocess
//! ([`external`]) — modeled as tagged implementors of one shared
//! trait rather than as a class hierarchy, decoupling the session
//! controller from any one decoder's startup/shutdown shape.

pub mod external;
pub mod platform;

use crate::error::Result;
use crate::matcher::BackendKind;

/// One event surfaced by a running backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// A transcript hypothesis became available. Cumulative backends send
    /// the whole transcript-so-far on every event; segment backends send
    /// one finalized phrase at a time.
    Hypothesis(String),
    /// A stderr line matching one of the known error markers. Maps onto
    /// `TrackerError::BackendRuntimeError` — retryable with backoff.
    Error(String),
    /// The backend stopped on its own — process exit, recognizer
    /// cancellation, or similar.
    Exited,
}

/// A `BackendEvent` tagged with the generation it was produced under, so a
/// session controller can discard events from a backend instance it has
/// already torn down (see `session::SessionController`).
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: BackendEvent,
}

/// Contract shared by every transcription backend variant.
///
/// `start` spawns whatever drives the backend (an OS callback thread, a
/// subprocess reader task, ...) onto the given tokio runtime handle and
/// returns immediately; the driving task pushes `BackendEvent`s onto
/// `sink` until `stop` tears it down. Idempotent `stop`.
pub trait TranscriptionBackend: Send {
    /// Which matcher strategy this backend's hypotheses require.
    fn kind(&self) -> BackendKind;

    /// Begins producing `BackendEvent`s on `sink`, spawning its driving task
    /// onto `runtime`. Returns once startup has been confirmed or has
    /// failed; event production continues asynchronously afterward.
    fn start(&mut self, runtime: &tokio::runtime::Handle, sink: tokio::sync::mpsc::UnboundedSender<BackendEvent>) -> Result<()>;

    /// Stops the backend and releases any held resources. Idempotent.
    fn stop(&mut self);
}
