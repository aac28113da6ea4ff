//! Host visibility, as reported by the embedder.
//!
//! While hidden, scheduled passes still run but fetch nothing. The hidden →
//! visible transition wakes the scheduler for an immediate catch-up pass.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared visibility flag. Clones observe and control the same state.
#[derive(Debug, Clone)]
pub struct VisibilityGate {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for VisibilityGate {
    fn default() -> Self {
        Self::new(true)
    }
}

impl VisibilityGate {
    pub fn new(visible: bool) -> Self {
        let (tx, _rx) = watch::channel(visible);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report the host's visibility. Only actual changes wake subscribers.
    pub fn set_visible(&self, visible: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });
        if changed {
            tracing::debug!(visible, "visibility changed");
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}
