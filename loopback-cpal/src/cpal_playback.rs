//! cpal speaker playback device.
//!
//! Blocking writes fill a PCM queue at the loopback rate; the cpal output
//! callback drains it, resamples to the device rate and upmixes to the
//! device channel count. Every rendered block is also published to the
//! session's [`TapFeed`] so a [`SoftwareTap`] can observe it.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use parking_lot::Mutex;

use loopback_core::models::audio_models::{AudioFormat, AudioSessionId, DeviceDirection, DeviceInfo};
use loopback_core::models::error::LoopbackError;
use loopback_core::processing::sample_converter::{
    from_pcm16_bytes, pcm16_to_waveform, upmix_from_mono, SampleConverter,
};
use loopback_core::traits::playback_device::PlaybackDevice;

use crate::device_enumerator::DeviceEnumerator;
use crate::pcm_queue::PcmQueue;
use crate::software_tap::{SoftwareTap, TapFeed};
use crate::stream_support::{
    await_stream_init, check_format, classify_build_error, classify_config_error,
    classify_play_error, classify_stream_error, min_buffer_bytes, IO_WAIT, QUEUE_BUFFERS,
};

type ErrorSlot = Arc<Mutex<Option<LoopbackError>>>;

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

/// Speaker playback over cpal.
pub struct CpalPlayback {
    device_name: Option<String>,
    display_name: String,
    session: AudioSessionId,
    feed: Arc<TapFeed>,
    format: Option<AudioFormat>,
    buffer_bytes: usize,
    queue: Option<Arc<PcmQueue>>,
    stream_error: ErrorSlot,
    running: Arc<AtomicBool>,
    stream_handle: Option<thread::JoinHandle<()>>,
}

impl CpalPlayback {
    /// Play through the system default output device.
    pub fn default_device() -> Self {
        Self::build(None, "Default Speaker".into())
    }

    /// Play through the output device with the given cpal name.
    pub fn with_device(name: String) -> Self {
        Self::build(Some(name.clone()), name)
    }

    fn build(device_name: Option<String>, display_name: String) -> Self {
        Self {
            device_name,
            display_name,
            session: AudioSessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)),
            feed: Arc::new(TapFeed::new(AudioFormat::VOICE.sample_rate)),
            format: None,
            buffer_bytes: 0,
            queue: None,
            stream_error: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            stream_handle: None,
        }
    }

    /// Analysis tap bound to this device's playback session.
    pub fn tap(&self) -> SoftwareTap {
        SoftwareTap::new(self.session, Arc::clone(&self.feed))
    }

    fn resolve(&self) -> Result<cpal::Device, LoopbackError> {
        DeviceEnumerator::new().output_device(self.device_name.as_deref())
    }

    fn shutdown_stream(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.stream_handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("playback stream thread panicked");
            }
        }
    }
}

impl PlaybackDevice for CpalPlayback {
    fn min_buffer_size(&self, format: &AudioFormat) -> Result<usize, LoopbackError> {
        check_format(format)?;
        let device = self.resolve()?;
        let config = device.default_output_config().map_err(classify_config_error)?;
        Ok(min_buffer_bytes(config.buffer_size(), config.sample_rate().0, format))
    }

    fn open(&mut self, format: &AudioFormat, buffer_bytes: usize) -> Result<(), LoopbackError> {
        check_format(format)?;
        if buffer_bytes == 0 || buffer_bytes % format.bytes_per_frame() != 0 {
            return Err(LoopbackError::FatalConfig(format!(
                "playback buffer of {} bytes is not a whole number of frames",
                buffer_bytes
            )));
        }
        if self.format.as_ref() == Some(format) && self.buffer_bytes == buffer_bytes {
            return Ok(());
        }
        if self.running.load(Ordering::SeqCst) {
            return Err(LoopbackError::InvalidState("cannot reopen a running playback".into()));
        }
        self.feed.set_sample_rate(format.sample_rate);

        self.format = Some(*format);
        self.buffer_bytes = buffer_bytes;
        self.queue = Some(Arc::new(PcmQueue::new(buffer_bytes * QUEUE_BUFFERS)));
        log::debug!("playback '{}' opened with {} byte buffer", self.display_name, buffer_bytes);
        Ok(())
    }

    fn play(&mut self) -> Result<(), LoopbackError> {
        let (format, queue) = match (self.format, self.queue.as_ref()) {
            (Some(format), Some(queue)) => (format, Arc::clone(queue)),
            _ => return Err(LoopbackError::InvalidState("playback not opened".into())),
        };
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        queue.clear();
        self.feed.clear();
        *self.stream_error.lock() = None;
        self.running.store(true, Ordering::SeqCst);

        let (init_tx, init_rx) = mpsc::channel();
        let device_name = self.device_name.clone();
        let running = Arc::clone(&self.running);
        let errors = Arc::clone(&self.stream_error);
        let feed = Arc::clone(&self.feed);

        let handle = thread::Builder::new()
            .name("cpal-playback".into())
            .spawn(move || {
                let stream =
                    match open_output_stream(device_name.as_deref(), &format, queue, feed, errors) {
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
            .map_err(|e| LoopbackError::DeviceUnavailable(format!("failed to spawn playback thread: {}", e)))?;
        self.stream_handle = Some(handle);

        if let Err(e) = await_stream_init(&init_rx, "playback") {
            self.shutdown_stream();
            return Err(e);
        }
        log::info!("playback '{}' started (session {})", self.display_name, self.session.0);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, LoopbackError> {
        if let Some(err) = self.stream_error.lock().take() {
            return Err(err);
        }
        let queue = match (&self.queue, self.running.load(Ordering::SeqCst)) {
            (Some(queue), true) => queue,
            _ => return Err(LoopbackError::InvalidState("playback not started".into())),
        };
        Ok(queue.push_blocking(data, IO_WAIT))
    }

    fn stop(&mut self) -> Result<(), LoopbackError> {
        self.shutdown_stream();
        if let Some(queue) = &self.queue {
            queue.clear();
        }
        self.feed.clear();
        log::debug!("playback '{}' stopped", self.display_name);
        Ok(())
    }

    fn session_id(&self) -> AudioSessionId {
        self.session
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.device_name.clone().unwrap_or_else(|| "default-output".into()),
            name: self.display_name.clone(),
            direction: DeviceDirection::Output,
            is_default: self.device_name.is_none(),
        }
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.shutdown_stream();
    }
}

fn open_output_stream(
    device_name: Option<&str>,
    format: &AudioFormat,
    queue: Arc<PcmQueue>,
    feed: Arc<TapFeed>,
    errors: ErrorSlot,
) -> Result<cpal::Stream, LoopbackError> {
    let device = DeviceEnumerator::new().output_device(device_name)?;
    let supported = device.default_output_config().map_err(classify_config_error)?;
    let config: cpal::StreamConfig = supported.config();
    log::debug!(
        "output stream: {} Hz, {} ch, {:?}",
        config.sample_rate.0,
        config.channels,
        supported.sample_format()
    );

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &config, format, queue, feed, errors),
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &config, format, queue, feed, errors),
        cpal::SampleFormat::U16 => build_output::<u16>(&device, &config, format, queue, feed, errors),
        other => {
            return Err(LoopbackError::FatalConfig(format!(
                "unsupported output sample format: {:?}",
                other
            )))
        }
    }?;
    stream.play().map_err(classify_play_error)?;
    Ok(stream)
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: &AudioFormat,
    queue: Arc<PcmQueue>,
    feed: Arc<TapFeed>,
    errors: ErrorSlot,
) -> Result<cpal::Stream, LoopbackError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = (config.channels as usize).max(1);
    let device_rate = config.sample_rate.0 as f64;
    // Lives in the callback so input the device did not need yet is kept
    // for the next block instead of being discarded.
    let mut converter = SampleConverter::new(format.sample_rate as f64, device_rate);
    let mut pcm = Vec::new();
    let mut mono = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                pcm.resize(converter.input_needed(frames) * 2, 0);
                let n = queue.pop_into(&mut pcm);
                // Underrun plays silence.
                pcm[n..].fill(0);

                feed.publish(&pcm16_to_waveform(&pcm[..n]));

                mono.clear();
                converter.process(&from_pcm16_bytes(&pcm), frames, &mut mono);
                mono.resize(frames, 0.0);
                let rendered = upmix_from_mono(&mono, channels);

                data.fill(T::EQUILIBRIUM);
                for (slot, &sample) in data.iter_mut().zip(&rendered) {
                    *slot = T::from_sample(sample);
                }
            },
            move |err| {
                log::warn!("output stream error: {}", err);
                *errors.lock() = Some(classify_stream_error(err));
            },
            None,
        )
        .map_err(classify_build_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopback_core::traits::analysis_tap::AnalysisTap;

    #[test]
    fn sessions_are_distinct() {
        let a = CpalPlayback::default_device();
        let b = CpalPlayback::default_device();
        assert_ne!(a.session_id(), b.session_id());
    }

    #[test]
    fn tap_is_bound_to_session() {
        let playback = CpalPlayback::default_device();
        let tap = playback.tap();
        assert_eq!(tap.session(), playback.session_id());
        assert!(!tap.is_attached());
    }

    #[test]
    fn write_before_play_is_invalid_state() {
        let mut playback = CpalPlayback::with_device("nonexistent".into());
        playback.open(&AudioFormat::VOICE, 1024).unwrap();
        let err = playback.write(&[0u8; 64]).unwrap_err();
        assert!(matches!(err, LoopbackError::InvalidState(_)));
    }

    #[test]
    fn open_rejects_stereo() {
        let mut playback = CpalPlayback::default_device();
        let stereo = AudioFormat {
            channels: 2,
            ..AudioFormat::VOICE
        };
        assert!(matches!(playback.open(&stereo, 1024), Err(LoopbackError::FatalConfig(_))));
    }
}
