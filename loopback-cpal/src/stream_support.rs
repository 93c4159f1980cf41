//! Helpers shared by the cpal capture and playback devices.

use std::time::Duration;

use loopback_core::models::audio_models::AudioFormat;
use loopback_core::models::error::LoopbackError;

/// Lower bound on a device buffer, in milliseconds of audio.
pub const MIN_BUFFER_MILLIS: u32 = 40;

/// Device buffers of slack held by each PCM queue.
pub const QUEUE_BUFFERS: usize = 8;

/// How long `start`/`play` wait for the stream thread to come up.
pub const STREAM_INIT_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on a blocking read or write; bounds how long `stop` waits.
pub const IO_WAIT: Duration = Duration::from_millis(100);

/// Only 16-bit mono PCM crosses the device boundary.
pub fn check_format(format: &AudioFormat) -> Result<(), LoopbackError> {
    if format.bit_depth != 16 || format.channels != 1 || format.sample_rate == 0 {
        return Err(LoopbackError::FatalConfig(format!(
            "unsupported loopback format: {} Hz, {} ch, {} bit",
            format.sample_rate, format.channels, format.bit_depth
        )));
    }
    Ok(())
}

/// Smallest loopback buffer for a device with the given native buffer range.
///
/// The device minimum (in device frames) is rescaled to the loopback rate and
/// never goes below [`MIN_BUFFER_MILLIS`].
pub fn min_buffer_bytes(
    buffer_size: &cpal::SupportedBufferSize,
    device_rate: u32,
    format: &AudioFormat,
) -> usize {
    let floor = format.bytes_for_millis(MIN_BUFFER_MILLIS);
    let device_min = match buffer_size {
        cpal::SupportedBufferSize::Range { min, .. } if device_rate > 0 => {
            let frames = (*min as u64 * format.sample_rate as u64).div_ceil(device_rate as u64);
            frames as usize * format.bytes_per_frame()
        }
        _ => 0,
    };
    device_min.max(floor)
}

/// Map a cpal stream error onto the loopback error taxonomy.
pub fn classify_stream_error(err: cpal::StreamError) -> LoopbackError {
    match err {
        cpal::StreamError::DeviceNotAvailable => {
            LoopbackError::DeviceUnavailable("audio device disconnected".into())
        }
        other => LoopbackError::TransientIo(other.to_string()),
    }
}

pub fn classify_build_error(err: cpal::BuildStreamError) -> LoopbackError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            LoopbackError::DeviceUnavailable("audio device not available".into())
        }
        cpal::BuildStreamError::StreamConfigNotSupported => {
            LoopbackError::FatalConfig("device rejected its default stream config".into())
        }
        other => LoopbackError::DeviceUnavailable(format!("failed to build stream: {}", other)),
    }
}

pub fn classify_config_error(err: cpal::DefaultStreamConfigError) -> LoopbackError {
    LoopbackError::DeviceUnavailable(format!("no default stream config: {}", err))
}

pub fn classify_play_error(err: cpal::PlayStreamError) -> LoopbackError {
    LoopbackError::DeviceUnavailable(format!("failed to start stream: {}", err))
}

/// Wait for a stream thread to report that its stream is running.
pub fn await_stream_init(
    init_rx: &std::sync::mpsc::Receiver<Result<(), LoopbackError>>,
    label: &str,
) -> Result<(), LoopbackError> {
    match init_rx.recv_timeout(STREAM_INIT_TIMEOUT) {
        Ok(result) => result,
        Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Err(LoopbackError::DeviceUnavailable(
            format!("{} stream did not start within {:?}", label, STREAM_INIT_TIMEOUT),
        )),
        Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => Err(LoopbackError::DeviceUnavailable(
            format!("{} stream thread exited during startup", label),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_applies_for_unknown_range() {
        let bytes = min_buffer_bytes(&cpal::SupportedBufferSize::Unknown, 48000, &AudioFormat::VOICE);
        assert_eq!(bytes, 640);
    }

    #[test]
    fn large_device_minimum_is_rescaled() {
        let range = cpal::SupportedBufferSize::Range { min: 4800, max: 9600 };
        // 4800 frames at 48 kHz = 100 ms = 800 frames at 8 kHz.
        assert_eq!(min_buffer_bytes(&range, 48000, &AudioFormat::VOICE), 1600);
    }

    #[test]
    fn rejects_stereo_format() {
        let format = AudioFormat {
            channels: 2,
            ..AudioFormat::VOICE
        };
        assert!(check_format(&format).is_err());
        assert!(check_format(&AudioFormat::VOICE).is_ok());
    }

    #[test]
    fn unsupported_config_is_fatal() {
        let err = classify_build_error(cpal::BuildStreamError::StreamConfigNotSupported);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn init_channel_dropped_is_device_unavailable() {
        let (tx, rx) = std::sync::mpsc::channel();
        drop(tx);
        let err = await_stream_init(&rx, "capture").unwrap_err();
        assert!(matches!(err, LoopbackError::DeviceUnavailable(_)));
    }

    #[test]
    fn disconnect_is_device_unavailable() {
        let err = classify_stream_error(cpal::StreamError::DeviceNotAvailable);
        assert!(matches!(err, LoopbackError::DeviceUnavailable(_)));
    }
}
