use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Linear PCM stream format shared by the capture and playback devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_depth: u16,
}

impl AudioFormat {
    /// 8 kHz, mono, 16-bit signed little-endian.
    pub const VOICE: Self = Self {
        sample_rate: 8000,
        channels: 1,
        bit_depth: 16,
    };

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.bit_depth as usize / 8
    }

    /// Number of bytes covering `millis` of audio, rounded down to whole frames.
    pub fn bytes_for_millis(&self, millis: u32) -> usize {
        let frames = self.sample_rate as u64 * millis as u64 / 1000;
        frames as usize * self.bytes_per_frame()
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::VOICE
    }
}

/// Direction of an audio endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    Input,
    Output,
}

/// An audio device available for capture or playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    pub name: String,
    pub direction: DeviceDirection,
    pub is_default: bool,
}

/// Identifier of a playback session an analysis tap can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioSessionId(pub u32);

/// One fixed-size batch of signed 8-bit amplitude samples.
///
/// Cheap to clone; the samples are immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    samples: Arc<[i8]>,
}

impl Snapshot {
    pub fn new(samples: &[i8]) -> Self {
        Self {
            samples: Arc::from(samples),
        }
    }

    pub fn samples(&self) -> &[i8] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Magnitude of sample `index`, or 0 past the end of the snapshot.
    pub fn magnitude(&self, index: usize) -> i32 {
        self.samples
            .get(index)
            .map(|&s| (s as i32).abs())
            .unwrap_or(0)
    }
}

impl From<Vec<i8>> for Snapshot {
    fn from(samples: Vec<i8>) -> Self {
        Self {
            samples: Arc::from(samples),
        }
    }
}

/// Counters for debugging a loopback session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopbackDiagnostics {
    pub read_cycles: u64,
    pub bytes_forwarded: u64,
    pub short_reads: u64,
    pub transient_errors: u64,
    pub capture_buffer_bytes: usize,
    pub playback_buffer_bytes: usize,
}

/// Counters kept by the waveform sampler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    pub delivered: u64,
    pub forwarded: u64,
    pub dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_format_frame_size() {
        assert_eq!(AudioFormat::VOICE.bytes_per_frame(), 2);
        assert_eq!(AudioFormat::VOICE.bytes_for_millis(20), 320);
    }

    #[test]
    fn snapshot_magnitude_past_end_is_silence() {
        let snapshot = Snapshot::new(&[-128, 5]);
        assert_eq!(snapshot.magnitude(0), 128);
        assert_eq!(snapshot.magnitude(1), 5);
        assert_eq!(snapshot.magnitude(2), 0);
    }
}
