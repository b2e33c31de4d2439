//! The shutdown signal shared by a session's tasks.
//!
//! [`DoneTrigger`] is not `Clone` and [`DoneTrigger::raise`] consumes it,
//! so the signal is raised at most once. Any number of [`DoneListener`]s
//! observe it. Dropping the trigger without raising counts as raised.

use tokio::sync::watch;

/// Creates a linked trigger and listener.
pub fn done_signal() -> (DoneTrigger, DoneListener) {
    let (tx, rx) = watch::channel(false);
    (DoneTrigger(tx), DoneListener(rx))
}

#[derive(Debug)]
pub struct DoneTrigger(watch::Sender<bool>);

impl DoneTrigger {
    /// Raises the signal. Every listener sees it on its next check.
    pub fn raise(self) {
        self.0.send_replace(true);
    }

    pub fn listener(&self) -> DoneListener {
        DoneListener(self.0.subscribe())
    }
}

#[derive(Debug, Clone)]
pub struct DoneListener(watch::Receiver<bool>);

impl DoneListener {
    pub fn is_raised(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Resolves once the signal is raised (or the trigger is dropped).
    /// Cancel-safe.
    pub async fn wait(&mut self) {
        let _ = self.0.wait_for(|done| *done).await;
    }
}
