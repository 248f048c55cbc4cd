//! Audio capture via cpal.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated (TIME_CRITICAL on
//! Windows) priority. It **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! This module satisfies that contract by writing directly into an SPSC ring buffer
//! producer whose `push_slice` is lock-free and allocation-free. A separate consumer
//! thread drains the ring into fixed-size [`AudioChunk`]s and hands each one to
//! whatever tap callback is currently installed via [`AudioCapture::set_tap`] — that
//! callback may block (it can call into a [`PlatformRecognizerProvider`], which is
//! not a realtime-safe contract), so it must never run on the cpal thread itself.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on macOS).
//! `AudioCapture` therefore must be created and dropped on the same thread. The host
//! accomplishes this by calling `start` inside `spawn_blocking` or a dedicated thread.
//!
//! [`PlatformRecognizerProvider`]: crate::backend::platform::PlatformRecognizerProvider

pub mod device;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleFormat, SampleRate, Stream, StreamConfig,
};

use crate::buffering::chunk::AudioChunk;
use crate::buffering::{create_audio_ring, AudioConsumer, AudioProducer, Consumer as _, Producer as _};
use crate::error::{Result, TrackerError};
use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, warn};

/// Target chunk duration fed to taps — matches the external backend's own
/// `--chunk-size 80` contract (§6) so both backend variants see audio at
/// the same granularity.
const CHUNK_DURATION_MS: u64 = 80;
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Receives one drained chunk plus its RMS-derived level in `[0, 1]`.
pub type TapFn = Box<dyn FnMut(&AudioChunk, f32) + Send>;

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on Windows/macOS.
/// Create and drop this type on the same OS thread.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    running: Arc<AtomicBool>,
    consumer_thread: Option<JoinHandle<()>>,
    tap: Arc<Mutex<Option<TapFn>>>,
    config_changed: Arc<AtomicBool>,
    suppress_config_change: Arc<AtomicBool>,
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Starts capture on `device_id` (as returned by
    /// [`device::enumerate_audio_input_devices`]), or the system default
    /// input if `None` or the id is no longer present.
    #[cfg(feature = "audio-cpal")]
    pub fn start(device_id: Option<&str>) -> Result<Self> {
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut devices: Vec<(String, cpal::Device)> = host
            .input_devices()
            .map_err(|e| TrackerError::AudioStream(e.to_string()))?
            .enumerate()
            .map(|(idx, device)| {
                let name = device.name().unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                (name, device)
            })
            .collect();
        if devices.is_empty() {
            return Err(TrackerError::NoDefaultInputDevice);
        }

        let requested_idx = device_id.and_then(|id| devices.iter().position(|(name, _)| name == id));
        if let Some(id) = device_id.filter(|_| requested_idx.is_none()) {
            warn!(device_id = id, "requested input device not found, falling back to default");
        }

        let default_name = host.default_input_device().and_then(|d| d.name().ok());
        let default_idx = default_name.as_deref().and_then(|name| devices.iter().position(|(n, _)| n == name));

        let selected_idx = requested_idx.or(default_idx).unwrap_or(0);
        let (selected_name, device) = devices.swap_remove(selected_idx);
        info!(device = selected_name.as_str(), "opening input device");

        let supported = device
            .default_input_config()
            .map_err(|e| TrackerError::AudioStream(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels();

        if sample_rate == 0 || channels == 0 {
            return Err(TrackerError::TransientAudioUnavailable(format!(
                "device reported an unusable config: {sample_rate}Hz / {channels}ch"
            )));
        }
        info!(sample_rate, channels, "audio config selected");

        let config = StreamConfig { channels, sample_rate: SampleRate(sample_rate), buffer_size: cpal::BufferSize::Default };

        let running = Arc::new(AtomicBool::new(true));
        let config_changed = Arc::new(AtomicBool::new(false));
        let suppress_config_change = Arc::new(AtomicBool::new(false));
        let tap: Arc<Mutex<Option<TapFn>>> = Arc::new(Mutex::new(None));

        let (producer, consumer) = create_audio_ring();
        let running_cb = Arc::clone(&running);
        let config_changed_cb = Arc::clone(&config_changed);

        let stream = build_stream(&device, &config, supported.sample_format(), producer, running_cb, config_changed_cb)?;
        stream.play().map_err(|e| TrackerError::AudioStream(e.to_string()))?;

        let chunk_frames = ((sample_rate as u64 * CHUNK_DURATION_MS) / 1000).max(1) as usize;
        let consumer_thread = spawn_consumer_thread(consumer, sample_rate, chunk_frames, Arc::clone(&running), Arc::clone(&tap));

        Ok(Self {
            _stream: stream,
            running,
            consumer_thread: Some(consumer_thread),
            tap,
            config_changed,
            suppress_config_change,
            sample_rate,
        })
    }

    /// Installs (or replaces) the callback invoked once per drained chunk.
    pub fn set_tap(&self, callback: impl FnMut(&AudioChunk, f32) + Send + 'static) {
        *self.tap.lock() = Some(Box::new(callback));
    }

    /// Removes any installed tap.
    pub fn clear_tap(&self) {
        *self.tap.lock() = None;
    }

    /// Returns `true` and clears the flag if the stream has signaled a
    /// configuration change (e.g. device disconnect) since the last poll,
    /// unless that signal is currently suppressed.
    pub fn poll_config_change(&self) -> bool {
        if self.suppress_config_change.load(Ordering::Acquire) {
            self.config_changed.store(false, Ordering::Release);
            return false;
        }
        self.config_changed.swap(false, Ordering::AcqRel)
    }

    /// Suppresses (or re-enables) `poll_config_change` — set while the
    /// controller itself is driving a device switch, per §4.5's
    /// device-switch suppression window.
    pub fn set_suppress_config_change(&self, suppress: bool) {
        self.suppress_config_change.store(suppress, Ordering::Release);
    }

    /// Signals the callback and consumer thread to stop, then joins the
    /// consumer thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.consumer_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(feature = "audio-cpal")]
fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    mut producer: AudioProducer,
    running: Arc<AtomicBool>,
    config_changed: Arc<AtomicBool>,
) -> Result<Stream> {
    let channels = config.channels;
    // The error callback is cpal's only signal that the device went away
    // mid-stream (disconnect, format renegotiation). The session controller
    // reads this through `poll_config_change` and decides whether to treat
    // it as a restart-worthy configuration change.
    let on_error = move |err: cpal::StreamError| {
        error!("audio stream error: {err}");
        config_changed.store(true, Ordering::Release);
    };

    let stream = match format {
        SampleFormat::F32 => {
            let ch = channels as usize;
            let mut mix_buf: Vec<f32> = Vec::new();
            device.build_input_stream(
                config,
                move |data: &[f32], _info| {
                    if !running.load(Ordering::Relaxed) {
                        return;
                    }
                    push_mixed(data, ch, &mut mix_buf, |s| s, &mut producer);
                },
                on_error,
                None,
            )
        }
        SampleFormat::I16 => {
            let ch = channels as usize;
            let mut mix_buf: Vec<f32> = Vec::new();
            device.build_input_stream(
                config,
                move |data: &[i16], _info| {
                    if !running.load(Ordering::Relaxed) {
                        return;
                    }
                    push_mixed(data, ch, &mut mix_buf, |s| s as f32 / 32768.0, &mut producer);
                },
                on_error,
                None,
            )
        }
        SampleFormat::U8 => {
            let ch = channels as usize;
            let mut mix_buf: Vec<f32> = Vec::new();
            device.build_input_stream(
                config,
                move |data: &[u8], _info| {
                    if !running.load(Ordering::Relaxed) {
                        return;
                    }
                    push_mixed(data, ch, &mut mix_buf, |s| (s as f32 - 128.0) / 128.0, &mut producer);
                },
                on_error,
                None,
            )
        }
        fmt => return Err(TrackerError::AudioStream(format!("unsupported sample format: {fmt:?}"))),
    }
    .map_err(|e| TrackerError::AudioStream(e.to_string()))?;
    Ok(stream)
}

/// Mixes an interleaved multi-channel frame down to mono into a reusable
/// scratch buffer (no per-callback allocation), then pushes it into the ring.
#[cfg(feature = "audio-cpal")]
fn push_mixed<S: Copy>(data: &[S], channels: usize, mix_buf: &mut Vec<f32>, to_f32: impl Fn(S) -> f32, producer: &mut AudioProducer) {
    let frames = data.len() / channels;
    mix_buf.resize(frames, 0.0);
    if channels == 1 {
        for (idx, sample) in data.iter().take(frames).enumerate() {
            mix_buf[idx] = to_f32(*sample);
        }
    } else {
        for f in 0..frames {
            let base = f * channels;
            let mut sum = 0f32;
            for c in 0..channels {
                sum += to_f32(data[base + c]);
            }
            mix_buf[f] = sum / channels as f32;
        }
    }
    let written = producer.push_slice(mix_buf);
    if written < mix_buf.len() {
        warn!("ring buffer full: dropped {} frames", mix_buf.len() - written);
    }
}

/// Drains `consumer` into `chunk_frames`-sized [`AudioChunk`]s, computing an
/// RMS-derived level for each, and forwards both to the installed tap.
fn spawn_consumer_thread(
    mut consumer: AudioConsumer,
    sample_rate: u32,
    chunk_frames: usize,
    running: Arc<AtomicBool>,
    tap: Arc<Mutex<Option<TapFn>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut scratch = vec![0f32; chunk_frames];
        let mut filled = 0usize;

        while running.load(Ordering::Relaxed) {
            let read = consumer.pop_slice(&mut scratch[filled..]);
            filled += read;
            if filled < chunk_frames {
                std::thread::sleep(POLL_INTERVAL);
                continue;
            }

            let level = rms_level(&scratch);
            let chunk = AudioChunk::new(scratch.clone(), sample_rate);
            if let Some(cb) = tap.lock().as_mut() {
                cb(&chunk, level);
            }
            filled = 0;
        }
    })
}

/// RMS scaled by 5 and clamped to `[0, 1]`, tuned so normal speaking
/// volume lands mid-range on the published audio level ring.
fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_sq / samples.len() as f32).sqrt();
    (rms * 5.0).min(1.0)
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn start(_device_id: Option<&str>) -> Result<Self> {
        Err(TrackerError::AudioStream("compiled without audio-cpal feature".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_level_is_zero_for_silence() {
        assert_eq!(rms_level(&[0.0; 80]), 0.0);
    }

    #[test]
    fn rms_level_scales_and_clamps() {
        let samples = vec![0.1f32; 80];
        let level = rms_level(&samples);
        assert!((level - 0.5).abs() < 1e-5, "expected ~0.5, got {level}");

        let loud = vec![1.0f32; 80];
        assert_eq!(rms_level(&loud), 1.0);
    }

    #[test]
    fn config_change_is_suppressible() {
        let flag = Arc::new(AtomicBool::new(false));
        let suppress = Arc::new(AtomicBool::new(true));
        // Mirrors `poll_config_change`'s logic directly, since building a
        // real `AudioCapture` requires a live input device.
        flag.store(true, Ordering::Release);
        let observed = if suppress.load(Ordering::Acquire) {
            flag.store(false, Ordering::Release);
            false
        } else {
            flag.swap(false, Ordering::AcqRel)
        };
        assert!(!observed);
        assert!(!flag.load(Ordering::Acquire));
    }
}
