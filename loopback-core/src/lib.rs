//! # loopback-core
//!
//! Platform-agnostic core for live audio monitoring with a waveform column plot.
//!
//! Provides the duplication loop, the rate-limited waveform sampler, the
//! column renderer and the session orchestrator. Platform backends implement
//! `CaptureDevice`, `PlaybackDevice` and `AnalysisTap` and plug into the
//! generic `LoopbackSession`.
//!
//! ## Architecture
//!
//! ```text
//! loopback-core (this crate)
//! ├── traits/       ← CaptureDevice, PlaybackDevice, AnalysisTap, SnapshotSink, LoopbackDelegate
//! ├── models/       ← LoopbackError, LoopbackState, LoopbackConfig, Snapshot, SessionReport
//! ├── processing/   ← duplication loop, SnapshotGate, WaveformSampler, WaveformRenderer, HistoryRing
//! ├── session/      ← LoopbackSession (generic orchestrator)
//! └── storage/      ← PPM frame export, JSON report sidecar
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod storage;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types at crate root for convenience.
pub use models::audio_models::{
    AudioFormat, AudioSessionId, DeviceDirection, DeviceInfo, LoopbackDiagnostics, SamplerStats, Snapshot,
};
pub use models::config::{LoopbackConfig, RendererConfig, SamplerConfig};
pub use models::error::{ErrorKind, LoopbackError};
pub use models::session_report::SessionReport;
pub use models::state::{LoopbackState, Notification};
pub use processing::renderer::WaveformRenderer;
pub use processing::ring_buffer::HistoryRing;
pub use processing::sample_converter::SampleConverter;
pub use processing::sampler::WaveformSampler;
pub use processing::snapshot_gate::SnapshotGate;
pub use processing::surface::{PixelBuffer, Rgb, Surface};
pub use session::loopback::LoopbackSession;
pub use traits::analysis_tap::{AnalysisTap, FftCallback, TapSettings, WaveformCallback};
pub use traits::capture_device::CaptureDevice;
pub use traits::loopback_delegate::LoopbackDelegate;
pub use traits::playback_device::PlaybackDevice;
pub use traits::snapshot_sink::SnapshotSink;
