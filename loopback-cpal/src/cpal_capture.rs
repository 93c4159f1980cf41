//! cpal microphone capture device.
//!
//! Runs a cpal input stream on a dedicated thread, converts whatever the
//! hardware delivers to 16-bit mono PCM at the loopback rate, and queues it
//! for blocking reads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use parking_lot::Mutex;

use loopback_core::models::audio_models::{AudioFormat, DeviceDirection, DeviceInfo};
use loopback_core::models::error::LoopbackError;
use loopback_core::processing::sample_converter::{downmix_to_mono, to_pcm16_bytes, SampleConverter};
use loopback_core::traits::capture_device::CaptureDevice;

use crate::device_enumerator::DeviceEnumerator;
use crate::pcm_queue::PcmQueue;
use crate::stream_support::{
    await_stream_init, check_format, classify_build_error, classify_config_error,
    classify_play_error, classify_stream_error, min_buffer_bytes, IO_WAIT, QUEUE_BUFFERS,
};

/// Slot where the stream error callback parks the last failure.
type ErrorSlot = Arc<Mutex<Option<LoopbackError>>>;

/// Microphone capture over cpal.
///
/// `cpal::Stream` is not `Send` on every platform, so the stream is built,
/// played and dropped on its own thread; only the PCM queue is shared.
pub struct CpalCapture {
    device_name: Option<String>,
    display_name: String,
    format: Option<AudioFormat>,
    buffer_bytes: usize,
    queue: Option<Arc<PcmQueue>>,
    stream_error: ErrorSlot,
    running: Arc<AtomicBool>,
    stream_handle: Option<thread::JoinHandle<()>>,
}

impl CpalCapture {
    /// Capture from the system default input device.
    pub fn default_device() -> Self {
        Self::build(None, "Default Microphone".into())
    }

    /// Capture from the input device with the given cpal name.
    pub fn with_device(name: String) -> Self {
        Self::build(Some(name.clone()), name)
    }

    fn build(device_name: Option<String>, display_name: String) -> Self {
        Self {
            device_name,
            display_name,
            format: None,
            buffer_bytes: 0,
            queue: None,
            stream_error: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            stream_handle: None,
        }
    }

    fn resolve(&self) -> Result<cpal::Device, LoopbackError> {
        DeviceEnumerator::new().input_device(self.device_name.as_deref())
    }

    fn shutdown_stream(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.stream_handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("capture stream thread panicked");
            }
        }
    }
}

impl CaptureDevice for CpalCapture {
    fn min_buffer_size(&self, format: &AudioFormat) -> Result<usize, LoopbackError> {
        check_format(format)?;
        let device = self.resolve()?;
        let config = device.default_input_config().map_err(classify_config_error)?;
        Ok(min_buffer_bytes(config.buffer_size(), config.sample_rate().0, format))
    }

    fn open(&mut self, format: &AudioFormat, buffer_bytes: usize) -> Result<(), LoopbackError> {
        check_format(format)?;
        if buffer_bytes == 0 || buffer_bytes % format.bytes_per_frame() != 0 {
            return Err(LoopbackError::FatalConfig(format!(
                "capture buffer of {} bytes is not a whole number of frames",
                buffer_bytes
            )));
        }
        if self.format.as_ref() == Some(format) && self.buffer_bytes == buffer_bytes {
            return Ok(());
        }
        if self.running.load(Ordering::SeqCst) {
            return Err(LoopbackError::InvalidState("cannot reopen a running capture".into()));
        }

        self.format = Some(*format);
        self.buffer_bytes = buffer_bytes;
        self.queue = Some(Arc::new(PcmQueue::new(buffer_bytes * QUEUE_BUFFERS)));
        log::debug!("capture '{}' opened with {} byte buffer", self.display_name, buffer_bytes);
        Ok(())
    }

    fn start(&mut self) -> Result<(), LoopbackError> {
        let (format, queue) = match (self.format, self.queue.as_ref()) {
            (Some(format), Some(queue)) => (format, Arc::clone(queue)),
            _ => return Err(LoopbackError::InvalidState("capture not opened".into())),
        };
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        queue.clear();
        *self.stream_error.lock() = None;
        self.running.store(true, Ordering::SeqCst);

        let (init_tx, init_rx) = mpsc::channel();
        let device_name = self.device_name.clone();
        let running = Arc::clone(&self.running);
        let errors = Arc::clone(&self.stream_error);

        let handle = thread::Builder::new()
            .name("cpal-capture".into())
            .spawn(move || {
                let stream = match open_input_stream(device_name.as_deref(), &format, queue, errors) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(()));
                while running.load(Ordering::SeqCst) {
                    thread::park_timeout(Duration::from_millis(50));
                }
                drop(stream);
            })
            .map_err(|e| LoopbackError::DeviceUnavailable(format!("failed to spawn capture thread: {}", e)))?;
        self.stream_handle = Some(handle);

        if let Err(e) = await_stream_init(&init_rx, "capture") {
            self.shutdown_stream();
            return Err(e);
        }
        log::info!("capture '{}' started", self.display_name);
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, LoopbackError> {
        if let Some(err) = self.stream_error.lock().take() {
            return Err(err);
        }
        let queue = match (&self.queue, self.running.load(Ordering::SeqCst)) {
            (Some(queue), true) => queue,
            _ => return Err(LoopbackError::InvalidState("capture not started".into())),
        };
        Ok(queue.pop_blocking(buffer, IO_WAIT))
    }

    fn stop(&mut self) -> Result<(), LoopbackError> {
        self.shutdown_stream();
        if let Some(queue) = &self.queue {
            queue.clear();
        }
        log::debug!("capture '{}' stopped", self.display_name);
        Ok(())
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.device_name.clone().unwrap_or_else(|| "default-input".into()),
            name: self.display_name.clone(),
            direction: DeviceDirection::Input,
            is_default: self.device_name.is_none(),
        }
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.shutdown_stream();
    }
}

/// Build and play the input stream. Must run on the thread that owns the stream.
fn open_input_stream(
    device_name: Option<&str>,
    format: &AudioFormat,
    queue: Arc<PcmQueue>,
    errors: ErrorSlot,
) -> Result<cpal::Stream, LoopbackError> {
    let device = DeviceEnumerator::new().input_device(device_name)?;
    let supported = device.default_input_config().map_err(classify_config_error)?;
    let config: cpal::StreamConfig = supported.config();
    log::debug!(
        "input stream: {} Hz, {} ch, {:?}",
        config.sample_rate.0,
        config.channels,
        supported.sample_format()
    );

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, format, queue, errors),
        cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, format, queue, errors),
        cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, format, queue, errors),
        other => {
            return Err(LoopbackError::FatalConfig(format!(
                "unsupported input sample format: {:?}",
                other
            )))
        }
    }?;
    stream.play().map_err(classify_play_error)?;
    Ok(stream)
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: &AudioFormat,
    queue: Arc<PcmQueue>,
    errors: ErrorSlot,
) -> Result<cpal::Stream, LoopbackError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let device_rate = config.sample_rate.0 as f64;
    // Lives in the callback so the resampler phase carries across blocks.
    let mut converter = SampleConverter::new(device_rate, format.sample_rate as f64);
    let mut resampled = Vec::new();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
                let mono = downmix_to_mono(&samples, channels);
                resampled.clear();
                converter.process(&mono, usize::MAX, &mut resampled);
                queue.push_overwrite(&to_pcm16_bytes(&resampled));
            },
            move |err| {
                log::warn!("input stream error: {}", err);
                *errors.lock() = Some(classify_stream_error(err));
            },
            None,
        )
        .map_err(classify_build_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_rejects_partial_frames() {
        let mut capture = CpalCapture::default_device();
        let err = capture.open(&AudioFormat::VOICE, 641).unwrap_err();
        assert!(matches!(err, LoopbackError::FatalConfig(_)));
    }

    #[test]
    fn read_before_start_is_invalid_state() {
        let mut capture = CpalCapture::default_device();
        capture.open(&AudioFormat::VOICE, 640).unwrap();
        let mut buffer = [0u8; 640];
        let err = capture.read(&mut buffer).unwrap_err();
        assert!(matches!(err, LoopbackError::InvalidState(_)));
    }

    #[test]
    fn start_before_open_is_invalid_state() {
        let mut capture = CpalCapture::with_device("nonexistent".into());
        assert!(matches!(capture.start(), Err(LoopbackError::InvalidState(_))));
    }

    #[test]
    fn default_device_info() {
        let info = CpalCapture::default_device().device_info();
        assert_eq!(info.direction, DeviceDirection::Input);
        assert!(info.is_default);
    }
}
