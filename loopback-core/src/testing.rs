//! In-memory device fakes shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::audio_models::{AudioFormat, AudioSessionId, DeviceDirection, DeviceInfo};
use crate::models::error::LoopbackError;
use crate::models::session_report::SessionReport;
use crate::models::state::{LoopbackState, Notification};
use crate::traits::analysis_tap::{AnalysisTap, FftCallback, TapSettings, WaveformCallback};
use crate::traits::capture_device::CaptureDevice;
use crate::traits::loopback_delegate::LoopbackDelegate;
use crate::traits::playback_device::PlaybackDevice;

#[derive(Debug, Default)]
pub struct CaptureLog {
    pub opened: Option<(AudioFormat, usize)>,
    pub starts: u32,
    pub stops: u32,
    pub reads: u32,
}

/// Capture device replaying a script of reads, then returning empty reads.
pub struct FakeCapture {
    script: VecDeque<Result<Vec<u8>, LoopbackError>>,
    min_buffer: Result<usize, LoopbackError>,
    log: Arc<Mutex<CaptureLog>>,
}

impl FakeCapture {
    pub fn scripted(
        script: Vec<Result<Vec<u8>, LoopbackError>>,
    ) -> (Self, Arc<Mutex<CaptureLog>>) {
        let log = Arc::new(Mutex::new(CaptureLog::default()));
        let capture = Self {
            script: script.into(),
            min_buffer: Ok(640),
            log: Arc::clone(&log),
        };
        (capture, log)
    }

    pub fn with_min_buffer(mut self, min_buffer: Result<usize, LoopbackError>) -> Self {
        self.min_buffer = min_buffer;
        self
    }
}

impl CaptureDevice for FakeCapture {
    fn min_buffer_size(&self, _format: &AudioFormat) -> Result<usize, LoopbackError> {
        self.min_buffer.clone()
    }

    fn open(&mut self, format: &AudioFormat, buffer_bytes: usize) -> Result<(), LoopbackError> {
        self.log.lock().opened = Some((*format, buffer_bytes));
        Ok(())
    }

    fn start(&mut self) -> Result<(), LoopbackError> {
        self.log.lock().starts += 1;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, LoopbackError> {
        self.log.lock().reads += 1;
        match self.script.pop_front() {
            Some(Ok(data)) => {
                let n = data.len().min(buffer.len());
                buffer[..n].copy_from_slice(&data[..n]);
                Ok(n)
            }
            Some(Err(e)) => Err(e),
            None => {
                thread::sleep(Duration::from_millis(1));
                Ok(0)
            }
        }
    }

    fn stop(&mut self) -> Result<(), LoopbackError> {
        self.log.lock().stops += 1;
        Ok(())
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            id: "fake-in".into(),
            name: "Fake Input".into(),
            direction: DeviceDirection::Input,
            is_default: true,
        }
    }
}

#[derive(Debug, Default)]
pub struct PlaybackLog {
    pub opened: Option<(AudioFormat, usize)>,
    pub plays: u32,
    pub stops: u32,
    pub writes: Vec<Vec<u8>>,
}

impl PlaybackLog {
    /// Every byte written so far, in order.
    pub fn written(&self) -> Vec<u8> {
        self.writes.concat()
    }
}

/// Playback device recording every write.
///
/// Scripted results are consumed one per write; an `Ok(n)` accepts at most
/// `n` bytes. Once the script runs out writes fall back to `max_accept`.
pub struct FakePlayback {
    max_accept: Option<usize>,
    script: VecDeque<Result<usize, LoopbackError>>,
    log: Arc<Mutex<PlaybackLog>>,
}

impl FakePlayback {
    pub fn new() -> (Self, Arc<Mutex<PlaybackLog>>) {
        let log = Arc::new(Mutex::new(PlaybackLog::default()));
        (
            Self {
                max_accept: None,
                script: VecDeque::new(),
                log: Arc::clone(&log),
            },
            log,
        )
    }

    pub fn accepting_at_most(max_accept: usize) -> (Self, Arc<Mutex<PlaybackLog>>) {
        let (mut playback, log) = Self::new();
        playback.max_accept = Some(max_accept);
        (playback, log)
    }

    pub fn scripted(script: Vec<Result<usize, LoopbackError>>) -> (Self, Arc<Mutex<PlaybackLog>>) {
        let (mut playback, log) = Self::new();
        playback.script = script.into();
        (playback, log)
    }
}

impl PlaybackDevice for FakePlayback {
    fn min_buffer_size(&self, _format: &AudioFormat) -> Result<usize, LoopbackError> {
        Ok(1024)
    }

    fn open(&mut self, format: &AudioFormat, buffer_bytes: usize) -> Result<(), LoopbackError> {
        self.log.lock().opened = Some((*format, buffer_bytes));
        Ok(())
    }

    fn play(&mut self) -> Result<(), LoopbackError> {
        self.log.lock().plays += 1;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, LoopbackError> {
        let limit = match self.script.pop_front() {
            Some(Ok(limit)) => Some(limit),
            Some(Err(e)) => return Err(e),
            None => self.max_accept,
        };
        let n = limit.map_or(data.len(), |max| max.min(data.len()));
        self.log.lock().writes.push(data[..n].to_vec());
        Ok(n)
    }

    fn stop(&mut self) -> Result<(), LoopbackError> {
        self.log.lock().stops += 1;
        Ok(())
    }

    fn session_id(&self) -> AudioSessionId {
        AudioSessionId(7)
    }

    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            id: "fake-out".into(),
            name: "Fake Output".into(),
            direction: DeviceDirection::Output,
            is_default: true,
        }
    }
}

#[derive(Default)]
pub struct TapLog {
    pub attached_to: Option<AudioSessionId>,
    pub settings: Option<TapSettings>,
    pub attaches: u32,
    pub enabled: bool,
    pub enable_calls: Vec<bool>,
    pub waveform: Option<WaveformCallback>,
    pub released: bool,
}

/// Analysis tap whose deliveries are driven by the test.
pub struct FakeTap {
    attach_error: Option<LoopbackError>,
    log: Arc<Mutex<TapLog>>,
}

impl FakeTap {
    pub fn new() -> (Self, Arc<Mutex<TapLog>>) {
        let log = Arc::new(Mutex::new(TapLog::default()));
        (
            Self {
                attach_error: None,
                log: Arc::clone(&log),
            },
            log,
        )
    }

    pub fn failing_attach(error: LoopbackError) -> (Self, Arc<Mutex<TapLog>>) {
        let (mut tap, log) = Self::new();
        tap.attach_error = Some(error);
        (tap, log)
    }
}

/// Deliver `samples` through the callback registered with a [`FakeTap`].
pub fn deliver(log: &Mutex<TapLog>, samples: &[i8]) {
    let callback = log.lock().waveform.clone();
    if let Some(callback) = callback {
        callback(samples, 8_000_000);
    }
}

impl AnalysisTap for FakeTap {
    fn capture_size_range(&self) -> (usize, usize) {
        (128, 1024)
    }

    fn max_capture_rate(&self) -> u32 {
        20_000
    }

    fn attach(
        &mut self,
        session: AudioSessionId,
        settings: TapSettings,
        waveform: WaveformCallback,
        _fft: Option<FftCallback>,
    ) -> Result<(), LoopbackError> {
        if let Some(ref e) = self.attach_error {
            return Err(e.clone());
        }
        let mut log = self.log.lock();
        log.attached_to = Some(session);
        log.settings = Some(settings);
        log.attaches += 1;
        log.waveform = Some(waveform);
        Ok(())
    }

    fn is_attached(&self) -> bool {
        self.log.lock().attached_to.is_some()
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), LoopbackError> {
        let mut log = self.log.lock();
        log.enabled = enabled;
        log.enable_calls.push(enabled);
        Ok(())
    }

    fn release(&mut self) {
        let mut log = self.log.lock();
        log.released = true;
        log.attached_to = None;
        log.waveform = None;
    }
}

/// Delegate collecting every event it receives.
#[derive(Default)]
pub struct RecordingDelegate {
    pub states: Mutex<Vec<LoopbackState>>,
    pub notifications: Mutex<Vec<Notification>>,
    pub errors: Mutex<Vec<LoopbackError>>,
    pub reports: Mutex<Vec<SessionReport>>,
}

impl LoopbackDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: &LoopbackState) {
        self.states.lock().push(state.clone());
    }

    fn on_notification(&self, notification: Notification) {
        self.notifications.lock().push(notification);
    }

    fn on_error(&self, error: &LoopbackError) {
        self.errors.lock().push(error.clone());
    }

    fn on_session_finished(&self, report: &SessionReport) {
        self.reports.lock().push(report.clone());
    }
}
