use crate::models::error::LoopbackError;
use crate::models::session_report::SessionReport;
use crate::models::state::{LoopbackState, Notification};

/// Event delegate for loopback session notifications.
///
/// Methods may be called from the loop thread, not only the control thread.
/// Implementations should marshal to the UI thread if needed.
pub trait LoopbackDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &LoopbackState);

    /// Called with the "recording started" / "recording stopped" notices.
    fn on_notification(&self, notification: Notification);

    /// Called when the duplication loop terminates on an error.
    fn on_error(&self, error: &LoopbackError);

    /// Called after stop with the session summary.
    fn on_session_finished(&self, report: &SessionReport);
}
