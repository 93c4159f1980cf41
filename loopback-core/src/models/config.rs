use std::time::Duration;

use super::audio_models::AudioFormat;

/// Configuration for the loopback session.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopbackConfig {
    /// Sample rate in Hz (default: 8000).
    pub sample_rate: u32,

    /// Channel count (default: 1). Only mono is supported.
    pub channels: u16,

    /// Bit depth of linear PCM (default: 16). Only 16 is supported.
    pub bit_depth: u16,

    /// Capture buffer size in bytes, or None for the device minimum.
    pub capture_buffer_bytes: Option<usize>,

    /// Playback buffer size in bytes, or None for the device minimum.
    pub playback_buffer_bytes: Option<usize>,

    /// Consecutive transient read/write failures tolerated before the loop fails.
    pub max_consecutive_io_errors: u32,

    /// Waveform tap settings.
    pub sampler: SamplerConfig,
}

impl LoopbackConfig {
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bit_depth: self.bit_depth,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.channels != 1 {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.bit_depth != 16 {
            return Err(format!("unsupported bit depth: {}", self.bit_depth));
        }
        let frame_bytes = self.format().bytes_per_frame();
        for (name, size) in [
            ("capture", self.capture_buffer_bytes),
            ("playback", self.playback_buffer_bytes),
        ] {
            if let Some(size) = size {
                if size == 0 || size % frame_bytes != 0 {
                    return Err(format!(
                        "{} buffer must be a positive multiple of {} bytes, got {}",
                        name, frame_bytes, size
                    ));
                }
            }
        }
        self.sampler.validate()
    }
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            channels: 1,
            bit_depth: 16,
            capture_buffer_bytes: None,
            playback_buffer_bytes: None,
            max_consecutive_io_errors: 8,
            sampler: SamplerConfig::default(),
        }
    }
}

/// Configuration for the waveform sampler and its analysis tap.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    /// Snapshot size in samples, or None for the tap's maximum.
    pub capture_size: Option<usize>,

    /// Delivery rate in millihertz, or None for half the tap's maximum.
    pub capture_rate_millihertz: Option<u32>,

    /// Minimum time between two forwarded snapshots (default: 5000 ms).
    pub min_interval: Duration,
}

impl SamplerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.capture_size == Some(0) {
            return Err("capture size must be positive".into());
        }
        if self.capture_rate_millihertz == Some(0) {
            return Err("capture rate must be positive".into());
        }
        Ok(())
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            capture_size: None,
            capture_rate_millihertz: None,
            min_interval: Duration::from_millis(5000),
        }
    }
}

/// Configuration for the column plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RendererConfig {
    /// Samples drawn per snapshot column (default: 100).
    pub samples_per_column: usize,

    /// Initial canvas width in pixels.
    pub width: u32,

    /// Initial canvas height in pixels.
    pub height: u32,
}

impl RendererConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.samples_per_column == 0 {
            return Err("samples per column must be positive".into());
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            samples_per_column: 100,
            width: 0,
            height: 0,
        }
    }
}
