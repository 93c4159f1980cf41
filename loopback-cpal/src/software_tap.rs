//! Software waveform tap over a cpal playback session.
//!
//! The playback callback publishes every rendered sample to a [`TapFeed`];
//! [`SoftwareTap`] polls the feed at the configured capture rate and hands
//! the newest `capture_size` samples to the waveform callback on its own
//! worker thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use loopback_core::models::audio_models::AudioSessionId;
use loopback_core::models::error::LoopbackError;
use loopback_core::traits::analysis_tap::{AnalysisTap, FftCallback, TapSettings, WaveformCallback};

/// Smallest snapshot the tap delivers.
pub const MIN_CAPTURE_SIZE: usize = 128;
/// Largest snapshot the tap delivers.
pub const MAX_CAPTURE_SIZE: usize = 1024;
/// Highest delivery rate, in millihertz.
pub const MAX_CAPTURE_RATE_MILLIHERTZ: u32 = 20_000;

/// Most recent 8-bit waveform samples rendered by a playback session.
pub struct TapFeed {
    samples: Mutex<VecDeque<i8>>,
    sample_rate: AtomicU32,
}

impl TapFeed {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(MAX_CAPTURE_SIZE)),
            sample_rate: AtomicU32::new(sample_rate),
        }
    }

    /// Rate of the published samples in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }

    /// Append rendered samples, keeping only the newest `MAX_CAPTURE_SIZE`.
    pub fn publish(&self, rendered: &[i8]) {
        let mut samples = self.samples.lock();
        samples.extend(rendered.iter().copied());
        let excess = samples.len().saturating_sub(MAX_CAPTURE_SIZE);
        samples.drain(..excess);
    }

    /// The newest `count` samples, oldest first, front-padded with silence.
    pub fn latest(&self, count: usize) -> Vec<i8> {
        let samples = self.samples.lock();
        let available = samples.len().min(count);
        let mut out = vec![0i8; count - available];
        out.extend(samples.iter().skip(samples.len() - available).copied());
        out
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

struct Attachment {
    enabled: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    worker: thread::JoinHandle<()>,
}

/// Waveform tap bound to one playback session.
pub struct SoftwareTap {
    session: AudioSessionId,
    feed: Arc<TapFeed>,
    attachment: Option<Attachment>,
}

impl SoftwareTap {
    pub fn new(session: AudioSessionId, feed: Arc<TapFeed>) -> Self {
        Self {
            session,
            feed,
            attachment: None,
        }
    }

    pub fn session(&self) -> AudioSessionId {
        self.session
    }
}

impl AnalysisTap for SoftwareTap {
    fn capture_size_range(&self) -> (usize, usize) {
        (MIN_CAPTURE_SIZE, MAX_CAPTURE_SIZE)
    }

    fn max_capture_rate(&self) -> u32 {
        MAX_CAPTURE_RATE_MILLIHERTZ
    }

    fn attach(
        &mut self,
        session: AudioSessionId,
        settings: TapSettings,
        waveform: WaveformCallback,
        _fft: Option<FftCallback>,
    ) -> Result<(), LoopbackError> {
        if session != self.session {
            return Err(LoopbackError::FatalConfig(format!(
                "tap bound to session {} cannot attach to session {}",
                self.session.0, session.0
            )));
        }
        if self.attachment.is_some() {
            return Err(LoopbackError::InvalidState("tap already attached".into()));
        }
        if !(MIN_CAPTURE_SIZE..=MAX_CAPTURE_SIZE).contains(&settings.capture_size) {
            return Err(LoopbackError::FatalConfig(format!(
                "capture size {} outside {}..={}",
                settings.capture_size, MIN_CAPTURE_SIZE, MAX_CAPTURE_SIZE
            )));
        }
        if settings.capture_rate_millihertz == 0
            || settings.capture_rate_millihertz > MAX_CAPTURE_RATE_MILLIHERTZ
        {
            return Err(LoopbackError::FatalConfig(format!(
                "capture rate {} mHz outside 1..={}",
                settings.capture_rate_millihertz, MAX_CAPTURE_RATE_MILLIHERTZ
            )));
        }

        let period = Duration::from_micros(1_000_000_000 / settings.capture_rate_millihertz as u64);
        let enabled = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        let feed = Arc::clone(&self.feed);
        let worker_enabled = Arc::clone(&enabled);
        let worker_shutdown = Arc::clone(&shutdown);

        let worker = thread::Builder::new()
            .name("waveform-tap".into())
            .spawn(move || {
                while !worker_shutdown.load(Ordering::SeqCst) {
                    thread::park_timeout(period);
                    if worker_shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    if worker_enabled.load(Ordering::SeqCst) {
                        let rate_millihertz = feed.sample_rate().saturating_mul(1000);
                        waveform(&feed.latest(settings.capture_size), rate_millihertz);
                    }
                }
            })
            .map_err(|e| LoopbackError::DeviceUnavailable(format!("failed to spawn tap thread: {}", e)))?;

        log::debug!(
            "tap attached to session {}: {} samples every {:?}",
            session.0,
            settings.capture_size,
            period
        );
        self.attachment = Some(Attachment {
            enabled,
            shutdown,
            worker,
        });
        Ok(())
    }

    fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), LoopbackError> {
        let attachment = self
            .attachment
            .as_ref()
            .ok_or_else(|| LoopbackError::InvalidState("tap not attached".into()))?;
        attachment.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        if let Some(attachment) = self.attachment.take() {
            attachment.shutdown.store(true, Ordering::SeqCst);
            attachment.worker.thread().unpark();
            if attachment.worker.join().is_err() {
                log::error!("waveform tap thread panicked");
            }
            log::debug!("tap released from session {}", self.session.0);
        }
    }
}

impl Drop for SoftwareTap {
    fn drop(&mut self) {
        self.release();
    }
}
