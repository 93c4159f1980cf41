//! The duplication loop: capture → playback, byte for byte.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::models::audio_models::LoopbackDiagnostics;
use crate::models::error::LoopbackError;
use crate::traits::capture_device::CaptureDevice;
use crate::traits::playback_device::PlaybackDevice;

/// Consecutive transient failures tolerated before the loop gives up.
///
/// Read and write failures draw on the same budget; any successful device
/// call refills it.
pub struct ErrorBudget<'a> {
    max_consecutive: u32,
    consecutive: u32,
    diagnostics: &'a Mutex<LoopbackDiagnostics>,
}

impl<'a> ErrorBudget<'a> {
    pub fn new(max_consecutive: u32, diagnostics: &'a Mutex<LoopbackDiagnostics>) -> Self {
        Self {
            max_consecutive,
            consecutive: 0,
            diagnostics,
        }
    }

    /// Absorb a recoverable error, or hand it back once the budget is spent.
    fn charge(&mut self, error: LoopbackError) -> Result<(), LoopbackError> {
        if !error.is_recoverable() {
            return Err(error);
        }
        self.consecutive += 1;
        self.diagnostics.lock().transient_errors += 1;
        log::warn!(
            "Loopback I/O error ({}/{}): {}",
            self.consecutive,
            self.max_consecutive,
            error
        );
        if self.consecutive > self.max_consecutive {
            return Err(error);
        }
        Ok(())
    }

    fn refill(&mut self) {
        self.consecutive = 0;
    }
}

/// Read once from `capture` and write exactly the bytes read to `playback`.
///
/// Returns the number of bytes forwarded, or `None` when the read failed
/// with an error the budget absorbed. A short read is forwarded as-is; a
/// zero-byte read writes nothing.
pub fn forward_cycle<C, P>(
    capture: &mut C,
    playback: &mut P,
    buffer: &mut [u8],
    running: &AtomicBool,
    budget: &mut ErrorBudget<'_>,
) -> Result<Option<usize>, LoopbackError>
where
    C: CaptureDevice + ?Sized,
    P: PlaybackDevice + ?Sized,
{
    let read = match capture.read(buffer) {
        Ok(read) => read.min(buffer.len()),
        Err(e) => {
            budget.charge(e)?;
            return Ok(None);
        }
    };
    budget.refill();
    write_all(playback, &buffer[..read], running, budget)?;
    Ok(Some(read))
}

/// Keep writing until the playback device has accepted all of `data`.
///
/// A failed or empty write retries the remaining tail; only a spent budget
/// or a cleared `running` flag leaves bytes unwritten.
fn write_all<P>(
    playback: &mut P,
    mut data: &[u8],
    running: &AtomicBool,
    budget: &mut ErrorBudget<'_>,
) -> Result<(), LoopbackError>
where
    P: PlaybackDevice + ?Sized,
{
    while !data.is_empty() && running.load(Ordering::SeqCst) {
        match playback.write(data) {
            Ok(0) => budget.charge(LoopbackError::TransientIo(
                "playback device accepted no data".into(),
            ))?,
            Ok(written) => {
                budget.refill();
                data = &data[written.min(data.len())..];
            }
            Err(e) => budget.charge(e)?,
        }
    }
    Ok(())
}

/// Run [`forward_cycle`] until `running` is cleared.
///
/// Transient errors are retried until more than `max_consecutive_errors`
/// happen in a row; any other error ends the loop immediately.
pub fn run_duplication_loop<C, P>(
    capture: &mut C,
    playback: &mut P,
    buffer_bytes: usize,
    running: &AtomicBool,
    diagnostics: &Mutex<LoopbackDiagnostics>,
    max_consecutive_errors: u32,
) -> Result<(), LoopbackError>
where
    C: CaptureDevice + ?Sized,
    P: PlaybackDevice + ?Sized,
{
    let mut buffer = vec![0u8; buffer_bytes];
    let mut budget = ErrorBudget::new(max_consecutive_errors, diagnostics);

    while running.load(Ordering::SeqCst) {
        if let Some(forwarded) = forward_cycle(capture, playback, &mut buffer, running, &mut budget)? {
            let mut d = diagnostics.lock();
            d.read_cycles += 1;
            d.bytes_forwarded += forwarded as u64;
            if forwarded < buffer_bytes {
                d.short_reads += 1;
            }
        }
    }
    Ok(())
}
