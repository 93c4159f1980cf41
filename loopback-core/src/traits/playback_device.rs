use crate::models::audio_models::{AudioFormat, AudioSessionId, DeviceInfo};
use crate::models::error::LoopbackError;

/// Interface for a blocking PCM playback sink (speaker).
pub trait PlaybackDevice: Send {
    /// Smallest buffer, in bytes, the device accepts for `format`.
    fn min_buffer_size(&self, format: &AudioFormat) -> Result<usize, LoopbackError>;

    /// Open the device with the given format and buffer size.
    fn open(&mut self, format: &AudioFormat, buffer_bytes: usize) -> Result<(), LoopbackError>;

    /// Begin rendering queued samples.
    fn play(&mut self) -> Result<(), LoopbackError>;

    /// Queue samples for playback, blocking while the device buffer is full.
    ///
    /// Returns how many bytes of `data` were accepted; may be fewer than
    /// `data.len()`.
    fn write(&mut self, data: &[u8]) -> Result<usize, LoopbackError>;

    /// Stop rendering and discard queued samples.
    fn stop(&mut self) -> Result<(), LoopbackError>;

    /// Session the analysis tap attaches to.
    fn session_id(&self) -> AudioSessionId;

    fn device_info(&self) -> DeviceInfo;
}
