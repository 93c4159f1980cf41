use std::time::{Duration, Instant};

/// Rate limiter deciding which tap deliveries reach the renderer.
///
/// Admits a delivery only while the loop is running and at least
/// `min_interval` has passed since the last admitted one; a delivery landing
/// exactly on the interval boundary is admitted.
///
/// The first delivery after construction or [`reset`](Self::reset) is
/// admitted immediately rather than held back until `min_interval` has
/// passed since start.
#[derive(Debug, Clone)]
pub struct SnapshotGate {
    min_interval: Duration,
    last_admitted: Option<Instant>,
}

impl SnapshotGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_admitted: None,
        }
    }

    pub fn admit(&mut self, now: Instant, running: bool) -> bool {
        if !running {
            return false;
        }
        if let Some(last) = self.last_admitted {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_admitted = Some(now);
        true
    }

    pub fn reset(&mut self) {
        self.last_admitted = None;
    }
}
