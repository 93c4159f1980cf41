use serde::{Deserialize, Serialize};

use super::audio_models::{AudioFormat, LoopbackDiagnostics, SamplerStats};

/// Summary returned when a loopback session stops.
///
/// Serializable for the JSON sidecar written by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub id: String,
    pub started_at: String,
    pub duration_secs: f64,
    pub format: AudioFormat,
    pub capture_buffer_bytes: usize,
    pub playback_buffer_bytes: usize,
    pub read_cycles: u64,
    pub bytes_forwarded: u64,
    pub short_reads: u64,
    pub transient_errors: u64,
    pub snapshots_delivered: u64,
    pub snapshots_forwarded: u64,
    pub snapshots_dropped: u64,
    /// Error that terminated the loop early, if any.
    pub failure: Option<String>,
}

impl SessionReport {
    pub fn new(
        started_at: chrono::DateTime<chrono::Utc>,
        duration_secs: f64,
        format: AudioFormat,
        diagnostics: &LoopbackDiagnostics,
        sampler: SamplerStats,
        failure: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: started_at.to_rfc3339(),
            duration_secs,
            format,
            capture_buffer_bytes: diagnostics.capture_buffer_bytes,
            playback_buffer_bytes: diagnostics.playback_buffer_bytes,
            read_cycles: diagnostics.read_cycles,
            bytes_forwarded: diagnostics.bytes_forwarded,
            short_reads: diagnostics.short_reads,
            transient_errors: diagnostics.transient_errors,
            snapshots_delivered: sampler.delivered,
            snapshots_forwarded: sampler.forwarded,
            snapshots_dropped: sampler.dropped,
            failure,
        }
    }

    /// Seconds of audio forwarded, derived from the byte count.
    pub fn forwarded_secs(&self) -> f64 {
        let bytes_per_sec = self.format.sample_rate as f64 * self.format.bytes_per_frame() as f64;
        if bytes_per_sec == 0.0 {
            return 0.0;
        }
        self.bytes_forwarded as f64 / bytes_per_sec
    }
}
