use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::models::audio_models::Snapshot;
use crate::models::config::RendererConfig;
use crate::models::error::LoopbackError;
use crate::processing::ring_buffer::HistoryRing;
use crate::processing::surface::{Rgb, Surface};
use crate::traits::snapshot_sink::SnapshotSink;

/// Gray level for a sample magnitude: `255 - (128 - |s| * 20)`, clamped.
///
/// Silence maps to 127; magnitudes of 7 and above saturate at 255.
pub fn intensity(magnitude: i32) -> u8 {
    (255 - (128 - magnitude * 20)).clamp(0, 255) as u8
}

/// Vertical pixel span of each sample in a column of `height` pixels.
///
/// Sample `j` gets `(height - used) / (samples - j)` pixels, where `used` is
/// the sum of the spans before it. The spans always sum to `height`.
pub fn column_spans(height: u32, samples: usize) -> Vec<u32> {
    let mut spans = Vec::with_capacity(samples);
    let mut used = 0u32;
    for j in 0..samples {
        let span = (height - used) / (samples - j) as u32;
        spans.push(span);
        used += span;
    }
    spans
}

struct RendererState {
    history: HistoryRing<Snapshot>,
    width: u32,
    height: u32,
}

/// Scrolling column plot of waveform snapshots.
///
/// Keeps one snapshot per pixel column; the newest sits at the right edge and
/// the oldest scrolls off the left edge once the canvas is full.
pub struct WaveformRenderer {
    samples_per_column: usize,
    state: Mutex<RendererState>,
    redraw_requested: AtomicBool,
    received: AtomicU64,
}

impl WaveformRenderer {
    /// Build a renderer, rejecting a config with no samples per column.
    pub fn new(config: RendererConfig) -> Result<Self, LoopbackError> {
        config.validate().map_err(LoopbackError::FatalConfig)?;
        Ok(Self {
            samples_per_column: config.samples_per_column,
            state: Mutex::new(RendererState {
                history: HistoryRing::new(config.width as usize),
                width: config.width,
                height: config.height,
            }),
            redraw_requested: AtomicBool::new(false),
            received: AtomicU64::new(0),
        })
    }

    /// Cache new canvas dimensions; history capacity follows the width.
    pub fn on_size_changed(&self, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.width = width;
        state.height = height;
        state.history.set_capacity(width as usize);
        drop(state);
        self.redraw_requested.store(true, Ordering::SeqCst);
    }

    pub fn dimensions(&self) -> (u32, u32) {
        let state = self.state.lock();
        (state.width, state.height)
    }

    /// Number of snapshots currently retained.
    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Retained snapshots, oldest first.
    pub fn history(&self) -> Vec<Snapshot> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Total snapshots received since creation, including scrolled-off ones.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::SeqCst)
    }

    /// Returns whether a redraw was requested since the last call, and clears it.
    pub fn take_redraw_request(&self) -> bool {
        self.redraw_requested.swap(false, Ordering::SeqCst)
    }

    /// Paint the history onto `surface` using the cached dimensions.
    pub fn redraw(&self, surface: &mut dyn Surface) {
        let state = self.state.lock();
        surface.clear(Rgb::WHITE);

        let (width, height) = (state.width, state.height);
        if width == 0 || height == 0 || state.history.is_empty() {
            return;
        }

        let spans = column_spans(height, self.samples_per_column);
        let len = state.history.len() as u32;
        let first_column = width.saturating_sub(len);

        for (i, snapshot) in state.history.iter().enumerate() {
            let x = first_column + i as u32;
            let mut used = 0u32;
            for (j, &span) in spans.iter().enumerate() {
                let color = Rgb::gray(intensity(snapshot.magnitude(j)));
                for k in 0..span {
                    surface.put_pixel(x, height - 1 - used - k, color);
                }
                used += span;
            }
        }
    }
}

impl SnapshotSink for WaveformRenderer {
    fn receive(&self, snapshot: Snapshot) {
        self.state.lock().history.push(snapshot);
        self.received.fetch_add(1, Ordering::SeqCst);
        self.redraw_requested.store(true, Ordering::SeqCst);
    }
}
