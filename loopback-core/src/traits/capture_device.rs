use crate::models::audio_models::{AudioFormat, DeviceInfo};
use crate::models::error::LoopbackError;

/// Interface for a blocking PCM capture source (microphone).
///
/// The session moves the device onto the loop thread while recording,
/// so implementations must be `Send`.
pub trait CaptureDevice: Send {
    /// Smallest buffer, in bytes, the device accepts for `format`.
    fn min_buffer_size(&self, format: &AudioFormat) -> Result<usize, LoopbackError>;

    /// Open the device with the given format and buffer size.
    ///
    /// Reopening an already open device with the same parameters is a no-op.
    fn open(&mut self, format: &AudioFormat, buffer_bytes: usize) -> Result<(), LoopbackError>;

    /// Begin delivering samples.
    fn start(&mut self) -> Result<(), LoopbackError>;

    /// Block until samples are available and copy up to `buffer.len()` bytes.
    ///
    /// Returns the number of bytes written to `buffer`. May return 0 when
    /// nothing arrived within the device's wait bound.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, LoopbackError>;

    /// Stop delivering samples. The device stays open and can be restarted.
    fn stop(&mut self) -> Result<(), LoopbackError>;

    fn device_info(&self) -> DeviceInfo;
}
