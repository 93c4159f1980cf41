use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioSessionId, SamplerStats, Snapshot};
use crate::models::config::SamplerConfig;
use crate::models::error::LoopbackError;
use crate::processing::snapshot_gate::SnapshotGate;
use crate::traits::analysis_tap::{AnalysisTap, TapSettings};
use crate::traits::snapshot_sink::SnapshotSink;

/// Turns analysis-tap deliveries into rate-limited snapshots for a sink.
///
/// Shares the session's running flag; deliveries arriving while the loop is
/// stopped are counted and dropped.
pub struct WaveformSampler {
    running: Arc<AtomicBool>,
    gate: Mutex<SnapshotGate>,
    stats: Mutex<SamplerStats>,
    sink: Arc<dyn SnapshotSink>,
}

impl WaveformSampler {
    pub fn new(
        running: Arc<AtomicBool>,
        config: &SamplerConfig,
        sink: Arc<dyn SnapshotSink>,
    ) -> Self {
        Self {
            running,
            gate: Mutex::new(SnapshotGate::new(config.min_interval)),
            stats: Mutex::new(SamplerStats::default()),
            sink,
        }
    }

    /// Waveform delivery from the tap.
    pub fn on_waveform(&self, samples: &[i8], _sampling_rate: u32) {
        self.on_waveform_at(samples, Instant::now());
    }

    /// Waveform delivery observed at `now`. Returns whether it was forwarded.
    pub fn on_waveform_at(&self, samples: &[i8], now: Instant) -> bool {
        let admitted = self
            .gate
            .lock()
            .admit(now, self.running.load(Ordering::SeqCst));

        {
            let mut stats = self.stats.lock();
            stats.delivered += 1;
            if admitted {
                stats.forwarded += 1;
            } else {
                stats.dropped += 1;
            }
        }

        if admitted {
            self.sink.receive(Snapshot::new(samples));
        }
        admitted
    }

    /// Frequency-domain delivery. Only the waveform is plotted.
    pub fn on_fft(&self, _magnitudes: &[i8], _sampling_rate: u32) {}

    pub fn stats(&self) -> SamplerStats {
        *self.stats.lock()
    }

    /// Clear counters and let the next delivery through immediately.
    pub fn reset(&self) {
        self.gate.lock().reset();
        *self.stats.lock() = SamplerStats::default();
    }

    /// Attach to `session` on `tap`, wiring both callbacks to this sampler.
    pub fn attach(
        self: &Arc<Self>,
        tap: &mut dyn AnalysisTap,
        session: AudioSessionId,
        config: &SamplerConfig,
    ) -> Result<TapSettings, LoopbackError> {
        let settings = tap_settings(tap, config)?;

        let waveform_sampler = Arc::clone(self);
        let fft_sampler = Arc::clone(self);
        tap.attach(
            session,
            settings,
            Arc::new(move |samples: &[i8], rate: u32| waveform_sampler.on_waveform(samples, rate)),
            Some(Arc::new(move |magnitudes: &[i8], rate: u32| {
                fft_sampler.on_fft(magnitudes, rate)
            })),
        )?;

        log::debug!(
            "Waveform tap attached to session {}: {} samples at {} mHz",
            session.0,
            settings.capture_size,
            settings.capture_rate_millihertz
        );
        Ok(settings)
    }
}

/// Resolve the requested tap settings against what `tap` supports.
///
/// Defaults: the largest capture size and half the maximum rate.
pub fn tap_settings(
    tap: &dyn AnalysisTap,
    config: &SamplerConfig,
) -> Result<TapSettings, LoopbackError> {
    let (min_size, max_size) = tap.capture_size_range();
    let capture_size = config.capture_size.unwrap_or(max_size);
    if capture_size < min_size || capture_size > max_size {
        return Err(LoopbackError::FatalConfig(format!(
            "capture size {} outside supported range {}..={}",
            capture_size, min_size, max_size
        )));
    }

    let max_rate = tap.max_capture_rate();
    if max_rate == 0 {
        return Err(LoopbackError::FatalConfig(
            "analysis tap reports no capture rate".into(),
        ));
    }
    let capture_rate_millihertz = config
        .capture_rate_millihertz
        .unwrap_or(max_rate / 2)
        .clamp(1, max_rate);

    Ok(TapSettings {
        capture_size,
        capture_rate_millihertz,
    })
}
