//! ResourceHandle: joint, idempotent release of an observation.

use parking_lot::Mutex;

use super::traits::LiveQueryHandle;

/// Owns the observer handle and an optional auto-notify handle.
///
/// `stop()` releases the auto-notify handle first, then the observer
/// handle. Only the first call has any effect.
pub struct ResourceHandle {
    held: Mutex<Option<Held>>,
}

struct Held {
    observer: LiveQueryHandle,
    auto_notify: Option<LiveQueryHandle>,
}

impl ResourceHandle {
    /// Pair the observer handle with an optional auto-notify handle.
    pub fn new(observer: LiveQueryHandle, auto_notify: Option<LiveQueryHandle>) -> Self {
        Self {
            held: Mutex::new(Some(Held {
                observer,
                auto_notify,
            })),
        }
    }

    /// Stop both handles; later calls do nothing.
    pub fn stop(&self) {
        let held = self.held.lock().take();
        if let Some(held) = held {
            if let Some(auto_notify) = held.auto_notify {
                auto_notify.stop();
            }
            held.observer.stop();
        }
    }

    /// Whether `stop` has run.
    pub fn is_stopped(&self) -> bool {
        self.held.lock().is_none()
    }
}

impl std::fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
