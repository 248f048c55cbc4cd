use thiserror::Error;

/// All errors produced by prompter-core.
///
/// Variants map onto the Error Kinds table of the engine's error-handling
/// design: permission/config failures are fatal, audio/backend failures are
/// retryable by the session controller up to its backoff limit.
/// `DeviceHotSwap` is deliberately absent — it is a non-error internal
/// signal that triggers a restart, never surfaced to callers.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("audio device temporarily unavailable: {0}")]
    TransientAudioUnavailable(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("failed to spawn backend '{path}': {reason}")]
    BackendSpawnFailed { path: String, reason: String },

    #[error("backend runtime error: {0}")]
    BackendRuntimeError(String),

    #[error("backend exited with code {0:?}")]
    BackendExited(Option<i32>),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("speech recognizer unavailable: {0}")]
    RecognizerUnavailable(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
