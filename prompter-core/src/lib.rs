//! # prompter-core
//!
//! Real-time teleprompter speech-tracking engine.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC RingBuffer → consumer thread → tap
//!                                                                   │
//!                                               PlatformRecognizer │ ExternalSubprocessDriver
//!                                                                   │
//!                                                          BackendEvent::Hypothesis
//!                                                                   │
//!                                                        SessionController::handle_message
//!                                                                   │
//!                                                     FuzzyMatcher → SessionSnapshot
//! ```
//!
//! The audio callback is zero-alloc; all tap/backend work happens off the
//! realtime thread. `SessionController::handle_message` is the single point
//! where cursor, generation, and state transitions are decided — see
//! [`session`] for the concurrency contract.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod backend;
pub mod buffering;
pub mod config;
pub mod error;
pub mod matcher;
pub mod script;
pub mod session;

pub use error::{Result, TrackerError};
pub use matcher::{BackendKind, FuzzyMatcher};
pub use script::Script;
pub use session::events::SessionSnapshot;
pub use session::{SessionController, SessionState};
