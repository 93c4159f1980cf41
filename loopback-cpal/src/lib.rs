//! # loopback-cpal
//!
//! Cross-platform cpal backend for loopback-core.
//!
//! Provides:
//! - `CpalCapture` - Microphone capture as blocking 16-bit mono PCM reads
//! - `CpalPlayback` - Speaker playback from blocking 16-bit mono PCM writes
//! - `SoftwareTap` - Waveform tap fed by whatever `CpalPlayback` renders
//! - `DeviceEnumerator` - Input/output device enumeration via the default host
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use loopback_cpal::{CpalCapture, CpalPlayback};
//! use loopback_core::{LoopbackConfig, LoopbackSession, RendererConfig, WaveformRenderer};
//!
//! let capture = CpalCapture::default_device();
//! let playback = CpalPlayback::default_device();
//! let tap = playback.tap();
//! let renderer = Arc::new(WaveformRenderer::new(RendererConfig::default())?);
//! let mut session = LoopbackSession::new(capture, playback, tap, renderer, LoopbackConfig::default())?;
//! session.start()?;
//! ```

pub mod cpal_capture;
pub mod cpal_playback;
pub mod device_enumerator;
pub mod pcm_queue;
pub mod software_tap;
pub mod stream_support;

pub use cpal_capture::CpalCapture;
pub use cpal_playback::CpalPlayback;
pub use device_enumerator::DeviceEnumerator;
pub use software_tap::{SoftwareTap, TapFeed};
