use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::models::audio_models::{DeviceInfo, LoopbackDiagnostics, SamplerStats};
use crate::models::config::LoopbackConfig;
use crate::models::error::LoopbackError;
use crate::models::session_report::SessionReport;
use crate::models::state::{LoopbackState, Notification};
use crate::processing::duplex::run_duplication_loop;
use crate::processing::sampler::WaveformSampler;
use crate::traits::analysis_tap::AnalysisTap;
use crate::traits::capture_device::CaptureDevice;
use crate::traits::loopback_delegate::LoopbackDelegate;
use crate::traits::playback_device::PlaybackDevice;
use crate::traits::snapshot_sink::SnapshotSink;

/// Internal mutable session state, protected by `parking_lot::Mutex`.
struct SessionState {
    state: LoopbackState,
    started_at: Option<DateTime<Utc>>,
    started: Option<Instant>,
    failure: Option<LoopbackError>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            state: LoopbackState::Idle,
            started_at: None,
            started: None,
            failure: None,
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.started
            .map(|start| start.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// Platform-agnostic loopback orchestrator.
///
/// Generic over the capture device, playback device and analysis tap.
/// Data flow:
/// ```text
/// [Capture] → [duplication loop thread] → [Playback]
///                                             │ session
///                                      [AnalysisTap] → [WaveformSampler] → [SnapshotSink]
/// ```
///
/// While recording, both devices live on the loop thread and come back
/// through its `JoinHandle` when [`stop`](Self::stop) joins it.
pub struct LoopbackSession<C, P, T>
where
    C: CaptureDevice + 'static,
    P: PlaybackDevice + 'static,
    T: AnalysisTap,
{
    capture: Option<C>,
    playback: Option<P>,
    tap: T,
    config: LoopbackConfig,
    sampler: Arc<WaveformSampler>,
    running: Arc<AtomicBool>,
    session_state: Arc<Mutex<SessionState>>,
    diagnostics: Arc<Mutex<LoopbackDiagnostics>>,
    delegate: Option<Arc<dyn LoopbackDelegate>>,
    loop_handle: Option<thread::JoinHandle<Option<(C, P)>>>,
}

impl<C, P, T> LoopbackSession<C, P, T>
where
    C: CaptureDevice + 'static,
    P: PlaybackDevice + 'static,
    T: AnalysisTap,
{
    pub fn new(
        capture: C,
        playback: P,
        tap: T,
        sink: Arc<dyn SnapshotSink>,
        config: LoopbackConfig,
    ) -> Result<Self, LoopbackError> {
        config.validate().map_err(LoopbackError::FatalConfig)?;

        let running = Arc::new(AtomicBool::new(false));
        let sampler = Arc::new(WaveformSampler::new(
            Arc::clone(&running),
            &config.sampler,
            sink,
        ));

        Ok(Self {
            capture: Some(capture),
            playback: Some(playback),
            tap,
            config,
            sampler,
            running,
            session_state: Arc::new(Mutex::new(SessionState::new())),
            diagnostics: Arc::new(Mutex::new(LoopbackDiagnostics::default())),
            delegate: None,
            loop_handle: None,
        })
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn LoopbackDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn state(&self) -> LoopbackState {
        self.session_state.lock().state.clone()
    }

    /// Whether the duplication loop is currently told to run.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn diagnostics(&self) -> LoopbackDiagnostics {
        self.diagnostics.lock().clone()
    }

    pub fn sampler_stats(&self) -> SamplerStats {
        self.sampler.stats()
    }

    pub fn config(&self) -> &LoopbackConfig {
        &self.config
    }

    /// Devices backing this session, or None while they are on the loop thread.
    pub fn devices(&self) -> Option<(DeviceInfo, DeviceInfo)> {
        match (&self.capture, &self.playback) {
            (Some(c), Some(p)) => Some((c.device_info(), p.device_info())),
            _ => None,
        }
    }

    /// Open both devices, enable the tap and launch the duplication loop.
    /// Transitions: idle → recording.
    pub fn start(&mut self) -> Result<(), LoopbackError> {
        {
            let state = &self.session_state.lock().state;
            if !state.is_idle() {
                return Err(LoopbackError::InvalidState(format!(
                    "can only start from idle state, currently {}",
                    state.name()
                )));
            }
        }

        let (mut capture, mut playback) = match (self.capture.take(), self.playback.take()) {
            (Some(c), Some(p)) => (c, p),
            (c, p) => {
                self.capture = c;
                self.playback = p;
                return Err(LoopbackError::InvalidState(
                    "audio devices are not available to this session".into(),
                ));
            }
        };

        let (capture_bytes, playback_bytes) = match self.prepare(&mut capture, &mut playback) {
            Ok(sizes) => sizes,
            Err(e) => {
                log::error!("Failed to start loopback: {}", e);
                self.capture = Some(capture);
                self.playback = Some(playback);
                return Err(e);
            }
        };

        *self.diagnostics.lock() = LoopbackDiagnostics {
            capture_buffer_bytes: capture_bytes,
            playback_buffer_bytes: playback_bytes,
            ..Default::default()
        };
        self.sampler.reset();
        {
            let mut s = self.session_state.lock();
            s.started_at = Some(Utc::now());
            s.started = Some(Instant::now());
            s.failure = None;
        }

        self.running.store(true, Ordering::SeqCst);
        self.set_state(LoopbackState::Recording);

        if let Err(e) = self.spawn_loop(capture, playback, capture_bytes) {
            log::error!("Failed to start loopback: {}", e);
            self.abort_start();
            return Err(e);
        }

        log::info!(
            "Loopback started: {} Hz, capture buffer {} B, playback buffer {} B",
            self.config.sample_rate,
            capture_bytes,
            playback_bytes
        );
        self.notify(Notification::RecordingStarted);
        Ok(())
    }

    /// Stop the loop, wait for its thread, stop both devices and the tap.
    /// Transitions: recording/failed → idle.
    pub fn stop(&mut self) -> Result<SessionReport, LoopbackError> {
        {
            let state = &self.session_state.lock().state;
            if state.is_idle() {
                return Err(LoopbackError::InvalidState(
                    "can only stop from recording or failed state".into(),
                ));
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.join_loop();

        if let Some(ref mut capture) = self.capture {
            if let Err(e) = capture.stop() {
                log::warn!("Failed to stop capture device: {}", e);
            }
        }
        if let Some(ref mut playback) = self.playback {
            if let Err(e) = playback.stop() {
                log::warn!("Failed to stop playback device: {}", e);
            }
        }
        if let Err(e) = self.tap.set_enabled(false) {
            log::warn!("Failed to disable waveform tap: {}", e);
        }

        let report = {
            let s = self.session_state.lock();
            SessionReport::new(
                s.started_at.unwrap_or_else(Utc::now),
                s.elapsed_secs(),
                self.config.format(),
                &self.diagnostics.lock(),
                self.sampler.stats(),
                s.failure.as_ref().map(|e| e.to_string()),
            )
        };

        self.set_state(LoopbackState::Idle);
        log::info!(
            "Loopback stopped after {:.1}s, {} bytes forwarded",
            report.duration_secs,
            report.bytes_forwarded
        );
        self.notify(Notification::RecordingStopped);
        if let Some(ref delegate) = self.delegate {
            delegate.on_session_finished(&report);
        }

        Ok(report)
    }

    /// Single start/stop control. Returns the report when it stopped a session.
    pub fn toggle(&mut self) -> Result<Option<SessionReport>, LoopbackError> {
        if self.session_state.lock().state.is_idle() {
            self.start()?;
            Ok(None)
        } else {
            self.stop().map(Some)
        }
    }

    // --- Internal helpers ---

    /// Size, open and start both devices, attach and enable the tap.
    ///
    /// Leaves nothing running when it fails.
    fn prepare(&mut self, capture: &mut C, playback: &mut P) -> Result<(usize, usize), LoopbackError> {
        let format = self.config.format();

        let capture_bytes = match self.config.capture_buffer_bytes {
            Some(bytes) => bytes,
            None => capture.min_buffer_size(&format)?,
        };
        let playback_bytes = match self.config.playback_buffer_bytes {
            Some(bytes) => bytes,
            None => playback.min_buffer_size(&format)?,
        };
        if capture_bytes == 0 || playback_bytes == 0 {
            return Err(LoopbackError::FatalConfig(format!(
                "device reported an empty buffer size (capture {}, playback {})",
                capture_bytes, playback_bytes
            )));
        }
        log::debug!(
            "Opening devices: {:?}, capture {} B, playback {} B",
            format,
            capture_bytes,
            playback_bytes
        );

        capture.open(&format, capture_bytes)?;
        playback.open(&format, playback_bytes)?;

        if !self.tap.is_attached() {
            self.sampler
                .attach(&mut self.tap, playback.session_id(), &self.config.sampler)?;
        }

        capture.start()?;
        if let Err(e) = playback.play() {
            let _ = capture.stop();
            return Err(e);
        }
        if let Err(e) = self.tap.set_enabled(true) {
            let _ = capture.stop();
            let _ = playback.stop();
            return Err(e);
        }

        Ok((capture_bytes, playback_bytes))
    }

    /// Undo a start whose devices were prepared but whose loop never ran.
    ///
    /// Stops whichever devices are back in the session and returns to idle.
    fn abort_start(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(ref mut capture) = self.capture {
            if let Err(e) = capture.stop() {
                log::warn!("Failed to stop capture device: {}", e);
            }
        }
        if let Some(ref mut playback) = self.playback {
            if let Err(e) = playback.stop() {
                log::warn!("Failed to stop playback device: {}", e);
            }
        }
        if let Err(e) = self.tap.set_enabled(false) {
            log::warn!("Failed to disable waveform tap: {}", e);
        }
        self.set_state(LoopbackState::Idle);
    }

    /// Move both devices onto the loop thread.
    ///
    /// The devices travel through a shared slot so they stay with the
    /// session when the thread cannot be spawned.
    fn spawn_loop(&mut self, capture: C, playback: P, buffer_bytes: usize) -> Result<(), LoopbackError> {
        let slot = Arc::new(Mutex::new(Some((capture, playback))));
        let loop_slot = Arc::clone(&slot);
        let running = Arc::clone(&self.running);
        let diagnostics = Arc::clone(&self.diagnostics);
        let session_state = Arc::clone(&self.session_state);
        let delegate = self.delegate.clone();
        let max_errors = self.config.max_consecutive_io_errors;

        let spawned = thread::Builder::new()
            .name("audio-loopback".into())
            .spawn(move || {
                let (mut capture, mut playback) = loop_slot.lock().take()?;
                let result = run_duplication_loop(
                    &mut capture,
                    &mut playback,
                    buffer_bytes,
                    &running,
                    &diagnostics,
                    max_errors,
                );
                if let Err(e) = result {
                    log::error!("Loopback loop terminated: {}", e);
                    running.store(false, Ordering::SeqCst);
                    let failed = LoopbackState::Failed(e.clone());
                    {
                        let mut s = session_state.lock();
                        s.state = failed.clone();
                        s.failure = Some(e.clone());
                    }
                    if let Some(ref d) = delegate {
                        d.on_error(&e);
                        d.on_state_changed(&failed);
                    }
                }
                Some((capture, playback))
            });

        match spawned {
            Ok(handle) => {
                self.loop_handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.reclaim_devices(&slot);
                Err(LoopbackError::FatalConfig(format!(
                    "failed to spawn loopback thread: {}",
                    e
                )))
            }
        }
    }

    /// Put devices left in a loop slot back into the session.
    fn reclaim_devices(&mut self, slot: &Mutex<Option<(C, P)>>) {
        if let Some((capture, playback)) = slot.lock().take() {
            self.capture = Some(capture);
            self.playback = Some(playback);
        }
    }

    /// Wait for the loop thread and take the devices back.
    fn join_loop(&mut self) {
        let Some(handle) = self.loop_handle.take() else {
            return;
        };
        match handle.join() {
            Ok(Some((capture, playback))) => {
                self.capture = Some(capture);
                self.playback = Some(playback);
            }
            Ok(None) => {
                log::error!("Loopback thread ended without its audio devices");
            }
            Err(_) => {
                log::error!("Loopback thread panicked; audio devices were lost");
                let mut s = self.session_state.lock();
                s.failure = Some(LoopbackError::DeviceUnavailable(
                    "loopback thread panicked".into(),
                ));
            }
        }
    }

    fn set_state(&self, new_state: LoopbackState) {
        {
            let mut s = self.session_state.lock();
            s.state = new_state.clone();
        }
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(&new_state);
        }
    }

    fn notify(&self, notification: Notification) {
        log::info!("{}", notification.message());
        if let Some(ref delegate) = self.delegate {
            delegate.on_notification(notification);
        }
    }
}

impl<C, P, T> Drop for LoopbackSession<C, P, T>
where
    C: CaptureDevice + 'static,
    P: PlaybackDevice + 'static,
    T: AnalysisTap,
{
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.join_loop();
        if let Some(ref mut capture) = self.capture {
            let _ = capture.stop();
        }
        if let Some(ref mut playback) = self.playback {
            let _ = playback.stop();
        }
        self.tap.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::models::audio_models::AudioFormat;
    use crate::models::config::RendererConfig;
    use crate::processing::renderer::WaveformRenderer;
    use crate::testing::{
        deliver, CaptureLog, FakeCapture, FakePlayback, FakeTap, PlaybackLog, RecordingDelegate, TapLog,
    };

    type TestSession = LoopbackSession<FakeCapture, FakePlayback, FakeTap>;

    struct Harness {
        session: TestSession,
        capture: Arc<Mutex<CaptureLog>>,
        playback: Arc<Mutex<PlaybackLog>>,
        tap: Arc<Mutex<TapLog>>,
        renderer: Arc<WaveformRenderer>,
        delegate: Arc<RecordingDelegate>,
    }

    fn harness(script: Vec<Result<Vec<u8>, LoopbackError>>, config: LoopbackConfig) -> Harness {
        let (capture, capture_log) = FakeCapture::scripted(script);
        let (playback, playback_log) = FakePlayback::new();
        let (tap, tap_log) = FakeTap::new();
        let renderer = Arc::new(
            WaveformRenderer::new(RendererConfig {
                width: 16,
                height: 100,
                ..Default::default()
            })
            .unwrap(),
        );
        let delegate = Arc::new(RecordingDelegate::default());

        let mut session =
            LoopbackSession::new(capture, playback, tap, renderer.clone(), config).unwrap();
        session.set_delegate(delegate.clone());

        Harness {
            session,
            capture: capture_log,
            playback: playback_log,
            tap: tap_log,
            renderer,
            delegate,
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn start_then_immediate_stop() {
        let mut h = harness(Vec::new(), LoopbackConfig::default());

        h.session.start().unwrap();
        assert!(h.session.is_running());
        assert!(h.session.state().is_recording());

        let report = h.session.stop().unwrap();

        assert!(!h.session.is_running());
        assert!(h.session.state().is_idle());
        assert_eq!(report.bytes_forwarded, 0);
        assert_eq!(report.failure, None);
        assert_eq!(
            *h.delegate.notifications.lock(),
            vec![Notification::RecordingStarted, Notification::RecordingStopped]
        );
        assert_eq!(h.capture.lock().starts, 1);
        assert_eq!(h.capture.lock().stops, 1);
        assert_eq!(h.playback.lock().stops, 1);
    }

    #[test]
    fn opens_devices_at_voice_format_with_minimum_buffers() {
        let mut h = harness(Vec::new(), LoopbackConfig::default());

        h.session.start().unwrap();
        h.session.stop().unwrap();

        assert_eq!(h.capture.lock().opened, Some((AudioFormat::VOICE, 640)));
        assert_eq!(h.playback.lock().opened, Some((AudioFormat::VOICE, 1024)));
        assert_eq!(h.session.diagnostics().capture_buffer_bytes, 640);
    }

    #[test]
    fn forwards_full_capture_buffer() {
        let config = LoopbackConfig {
            capture_buffer_bytes: Some(16000),
            ..Default::default()
        };
        let payload: Vec<u8> = (0..16000u32).map(|i| (i % 256) as u8).collect();
        let mut h = harness(vec![Ok(payload.clone())], config);

        h.session.start().unwrap();
        assert!(wait_until(|| h.playback.lock().written().len() >= 16000));
        let report = h.session.stop().unwrap();

        assert_eq!(h.playback.lock().writes[0], payload);
        assert_eq!(report.bytes_forwarded, 16000);
        assert_eq!(report.capture_buffer_bytes, 16000);
    }

    #[test]
    fn second_start_is_rejected() {
        let mut h = harness(Vec::new(), LoopbackConfig::default());

        h.session.start().unwrap();
        let err = h.session.start().unwrap_err();
        assert!(matches!(err, LoopbackError::InvalidState(_)));

        h.session.stop().unwrap();
        assert_eq!(h.capture.lock().starts, 1);
    }

    #[test]
    fn stop_when_idle_is_rejected() {
        let mut h = harness(Vec::new(), LoopbackConfig::default());
        assert!(matches!(
            h.session.stop(),
            Err(LoopbackError::InvalidState(_))
        ));
    }

    #[test]
    fn tap_follows_start_and_stop() {
        let mut h = harness(Vec::new(), LoopbackConfig::default());

        h.session.start().unwrap();
        h.session.stop().unwrap();
        h.session.start().unwrap();
        h.session.stop().unwrap();

        let tap = h.tap.lock();
        assert_eq!(tap.attaches, 1);
        assert_eq!(tap.attached_to, Some(crate::models::audio_models::AudioSessionId(7)));
        assert_eq!(tap.enable_calls, vec![true, false, true, false]);
        assert!(!tap.enabled);
    }

    #[test]
    fn snapshots_reach_renderer_only_while_recording() {
        let mut h = harness(Vec::new(), LoopbackConfig::default());

        h.session.start().unwrap();
        deliver(&h.tap, &[1; 100]);
        deliver(&h.tap, &[2; 100]);
        let report = h.session.stop().unwrap();
        deliver(&h.tap, &[3; 100]);

        assert_eq!(h.renderer.history_len(), 1);
        assert_eq!(report.snapshots_forwarded, 1);
        assert_eq!(report.snapshots_dropped, 1);
        assert_eq!(h.session.sampler_stats().dropped, 2);
    }

    #[test]
    fn loop_failure_is_surfaced() {
        let mut h = harness(
            vec![Err(LoopbackError::DeviceUnavailable("unplugged".into()))],
            LoopbackConfig::default(),
        );

        h.session.start().unwrap();
        assert!(wait_until(|| h.session.state().is_failed()));
        assert!(!h.session.is_running());
        assert_eq!(h.delegate.errors.lock().len(), 1);

        let report = h.session.stop().unwrap();
        assert!(h.session.state().is_idle());
        assert_eq!(
            report.failure.as_deref(),
            Some("device not available: unplugged")
        );

        // Devices came back from the loop thread, so a restart works.
        h.session.start().unwrap();
        h.session.stop().unwrap();
    }

    #[test]
    fn attach_failure_leaves_session_idle() {
        let (capture, capture_log) = FakeCapture::scripted(Vec::new());
        let (playback, _playback_log) = FakePlayback::new();
        let (tap, _tap_log) =
            FakeTap::failing_attach(LoopbackError::DeviceUnavailable("no effect".into()));
        let renderer = Arc::new(WaveformRenderer::new(RendererConfig::default()).unwrap());
        let mut session =
            LoopbackSession::new(capture, playback, tap, renderer, LoopbackConfig::default()).unwrap();

        let err = session.start().unwrap_err();

        assert!(matches!(err, LoopbackError::DeviceUnavailable(_)));
        assert!(session.state().is_idle());
        assert!(!session.is_running());
        assert_eq!(capture_log.lock().starts, 0);
        // Devices were handed back: the same error repeats instead of InvalidState.
        assert!(matches!(
            session.start(),
            Err(LoopbackError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn failed_loop_spawn_returns_devices_to_session() {
        let mut h = harness(Vec::new(), LoopbackConfig::default());
        let capture = h.session.capture.take().unwrap();
        let playback = h.session.playback.take().unwrap();
        let slot = Mutex::new(Some((capture, playback)));

        // What `spawn_loop` does when the OS refuses the thread.
        h.session.set_state(LoopbackState::Recording);
        h.session.reclaim_devices(&slot);
        h.session.abort_start();

        assert!(slot.lock().is_none());
        assert!(h.session.devices().is_some());
        assert!(h.session.state().is_idle());
        assert_eq!(h.capture.lock().stops, 1);
        assert_eq!(h.playback.lock().stops, 1);
        assert_eq!(h.tap.lock().enable_calls, vec![false]);

        // The next start finds its devices instead of failing with InvalidState.
        h.session.start().unwrap();
        h.session.stop().unwrap();
    }

    #[test]
    fn min_buffer_failure_is_returned() {
        let (capture, _capture_log) = FakeCapture::scripted(Vec::new());
        let capture = capture.with_min_buffer(Err(LoopbackError::FatalConfig(
            "unsupported format".into(),
        )));
        let (playback, _playback_log) = FakePlayback::new();
        let (tap, _tap_log) = FakeTap::new();
        let renderer = Arc::new(WaveformRenderer::new(RendererConfig::default()).unwrap());
        let mut session =
            LoopbackSession::new(capture, playback, tap, renderer, LoopbackConfig::default()).unwrap();

        assert!(matches!(
            session.start(),
            Err(LoopbackError::FatalConfig(_))
        ));
        assert!(session.devices().is_some());
    }

    #[test]
    fn toggle_alternates() {
        let mut h = harness(Vec::new(), LoopbackConfig::default());

        assert_eq!(h.session.toggle().unwrap(), None);
        assert!(h.session.state().is_recording());
        assert!(h.session.toggle().unwrap().is_some());
        assert!(h.session.state().is_idle());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let (capture, _) = FakeCapture::scripted(Vec::new());
        let (playback, _) = FakePlayback::new();
        let (tap, _) = FakeTap::new();
        let renderer = Arc::new(WaveformRenderer::new(RendererConfig::default()).unwrap());
        let config = LoopbackConfig {
            bit_depth: 8,
            ..Default::default()
        };

        assert!(matches!(
            LoopbackSession::new(capture, playback, tap, renderer, config),
            Err(LoopbackError::FatalConfig(_))
        ));
    }

    #[test]
    fn drop_while_recording_joins_and_releases() {
        let h = harness(Vec::new(), LoopbackConfig::default());
        let Harness {
            mut session,
            capture,
            tap,
            ..
        } = h;

        session.start().unwrap();
        drop(session);

        assert_eq!(capture.lock().stops, 1);
        assert!(tap.lock().released);
    }
}
