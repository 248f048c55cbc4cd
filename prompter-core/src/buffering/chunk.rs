//! Typed audio chunk handed from the ring buffer consumer thread to the
//! installed transcription tap.

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Allocated once per consumer-thread drain (on the non-realtime audio
/// thread, never inside the cpal callback).
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns true if the chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
