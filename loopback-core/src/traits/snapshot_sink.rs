use crate::models::audio_models::Snapshot;

/// Receiver of snapshots admitted by the waveform sampler.
///
/// Called on the analysis tap's delivery thread.
pub trait SnapshotSink: Send + Sync {
    fn receive(&self, snapshot: Snapshot);
}
