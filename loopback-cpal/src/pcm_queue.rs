//! Bounded byte queue between cpal callbacks and the blocking device API.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Bounded queue of 16-bit PCM bytes.
///
/// The cpal callbacks use the non-blocking side (`push_overwrite`,
/// `pop_into`); the duplication loop uses the blocking side
/// (`pop_blocking`, `push_blocking`). Reads and writes always move whole
/// 2-byte samples.
pub struct PcmQueue {
    bytes: Mutex<VecDeque<u8>>,
    changed: Condvar,
    capacity: usize,
}

impl PcmQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity & !1;
        Self {
            bytes: Mutex::new(VecDeque::with_capacity(capacity)),
            changed: Condvar::new(),
            capacity,
        }
    }

    /// Append `data`, dropping the oldest bytes on overflow. Never blocks.
    pub fn push_overwrite(&self, data: &[u8]) {
        let data = &data[..data.len() & !1];
        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };

        let mut bytes = self.bytes.lock();
        let overflow = (bytes.len() + data.len()).saturating_sub(self.capacity);
        bytes.drain(..overflow);
        bytes.extend(data.iter().copied());
        drop(bytes);
        self.changed.notify_all();
    }

    /// Copy whatever is queued, up to `out.len()`, into `out`. Never blocks.
    pub fn pop_into(&self, out: &mut [u8]) -> usize {
        let mut bytes = self.bytes.lock();
        let n = bytes.len().min(out.len()) & !1;
        for (slot, byte) in out.iter_mut().zip(bytes.drain(..n)) {
            *slot = byte;
        }
        drop(bytes);
        if n > 0 {
            self.changed.notify_all();
        }
        n
    }

    /// Wait up to `timeout` for data, then copy up to `out.len()` bytes.
    ///
    /// Returns 0 if nothing arrived in time.
    pub fn pop_blocking(&self, out: &mut [u8], timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut bytes = self.bytes.lock();
        while bytes.len() < 2 {
            if self.changed.wait_until(&mut bytes, deadline).timed_out() {
                break;
            }
        }
        let n = bytes.len().min(out.len()) & !1;
        for (slot, byte) in out.iter_mut().zip(bytes.drain(..n)) {
            *slot = byte;
        }
        drop(bytes);
        if n > 0 {
            self.changed.notify_all();
        }
        n
    }

    /// Wait up to `timeout` for free space, then append as much of `data` as fits.
    ///
    /// Returns the number of bytes accepted; 0 if the queue stayed full.
    pub fn push_blocking(&self, data: &[u8], timeout: Duration) -> usize {
        let data = &data[..data.len() & !1];
        if data.is_empty() {
            return 0;
        }
        let deadline = Instant::now() + timeout;
        let mut bytes = self.bytes.lock();
        while self.capacity.saturating_sub(bytes.len()) < 2 {
            if self.changed.wait_until(&mut bytes, deadline).timed_out() {
                break;
            }
        }
        let n = self.capacity.saturating_sub(bytes.len()).min(data.len()) & !1;
        bytes.extend(data[..n].iter().copied());
        drop(bytes);
        if n > 0 {
            self.changed.notify_all();
        }
        n
    }

    pub fn clear(&self) {
        self.bytes.lock().clear();
        self.changed.notify_all();
    }
}
