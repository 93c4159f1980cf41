use std::sync::Arc;

use crate::models::audio_models::AudioSessionId;
use crate::models::error::LoopbackError;

/// Callback invoked with a waveform snapshot.
///
/// Parameters:
/// - `samples`: signed 8-bit amplitudes, `capture_size` of them.
/// - `sampling_rate`: rate of the underlying audio in millihertz.
pub type WaveformCallback = Arc<dyn Fn(&[i8], u32) + Send + Sync + 'static>;

/// Callback invoked with frequency-domain data. Unused by the sampler.
pub type FftCallback = Arc<dyn Fn(&[i8], u32) + Send + Sync + 'static>;

/// Settings requested when attaching a tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapSettings {
    /// Samples per delivered snapshot.
    pub capture_size: usize,
    /// Deliveries per second, in millihertz.
    pub capture_rate_millihertz: u32,
}

/// Interface for an analysis effect observing a playback session.
///
/// Deliveries happen on a thread owned by the tap, never on the loop thread.
pub trait AnalysisTap: Send {
    /// Inclusive (min, max) snapshot sizes supported.
    fn capture_size_range(&self) -> (usize, usize);

    /// Highest supported delivery rate in millihertz.
    fn max_capture_rate(&self) -> u32;

    /// Attach to `session`, registering the waveform and optional FFT callbacks.
    ///
    /// The tap starts disabled.
    fn attach(
        &mut self,
        session: AudioSessionId,
        settings: TapSettings,
        waveform: WaveformCallback,
        fft: Option<FftCallback>,
    ) -> Result<(), LoopbackError>;

    fn is_attached(&self) -> bool;

    /// Start or stop deliveries.
    fn set_enabled(&mut self, enabled: bool) -> Result<(), LoopbackError>;

    /// Detach and free the tap's resources.
    fn release(&mut self);
}
