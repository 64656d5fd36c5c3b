//! Graceful shutdown coordination.
//!
//! An in-flight operation counter paired with a shutdown flag, both under
//! one mutex. Every `begin_op` is paired with an `end_op`; once the flag is
//! set and the counter drains to zero, `shutdown` waiters are released.

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Default)]
struct OpsState {
    shutdown: bool,
    current_ops: u32,
}

/// Coordinates graceful shutdown across all handler invocations.
#[derive(Default)]
pub(crate) struct ShutdownCoordinator {
    state: Mutex<OpsState>,
    drained: Notify,
}

impl ShutdownCoordinator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Admit one operation. Returns `false` if shutdown has been appointed,
    /// in which case the operation must not run (and no `end_op` follows).
    pub(crate) fn begin_op(&self) -> bool {
        let mut state = self.state.lock();
        if state.shutdown {
            return false;
        }
        state.current_ops += 1;
        true
    }

    /// Mark one operation done; wakes shutdown waiters when the last one
    /// finishes after shutdown was appointed.
    pub(crate) fn end_op(&self) {
        let mut state = self.state.lock();
        state.current_ops -= 1;
        if state.shutdown && state.current_ops == 0 {
            self.drained.notify_waiters();
        }
    }

    /// Whether shutdown has been appointed.
    pub(crate) fn is_shutdown(&self) -> bool {
        self.state.lock().shutdown
    }

    /// Appoint shutdown and block until all in-flight operations return.
    pub(crate) async fn shutdown(&self) {
        {
            let mut state = self.state.lock();
            state.shutdown = true;
            if state.current_ops == 0 {
                return;
            }
        }
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // Register as a waiter before re-checking the counter, so a
            // notify between check and await cannot be missed.
            notified.as_mut().enable();
            if self.state.lock().current_ops == 0 {
                return;
            }
            notified.await;
        }
    }

    #[cfg(test)]
    pub(crate) fn current_ops(&self) -> u32 {
        self.state.lock().current_ops
    }
}
