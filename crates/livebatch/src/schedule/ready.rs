//! ReadyTracker: knows when every outstanding request has answered.
//!
//! Each callback pushed through [`ReadyTracker::push`] counts as one pending
//! request until its first ready/error/stop delivery. `on_ready` waits only
//! for the requests pending at the moment it is registered.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::bind::Callback;

/// Tracks outstanding requests and notifies once they have all answered.
#[derive(Clone, Default)]
pub struct ReadyTracker {
    state: Arc<Mutex<ReadyState>>,
}

#[derive(Default)]
struct ReadyState {
    pending: HashSet<u64>,
    next_id: u64,
    waiters: Vec<Waiter>,
}

struct Waiter {
    waiting_on: HashSet<u64>,
    callback: Box<dyn FnOnce() + Send>,
}

impl ReadyTracker {
    /// Tracker with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `callback` as a pending request; returns the callback to hand
    /// to the request layer. Any ready, error or stop delivery resolves the
    /// request, whichever handlers `callback` carries.
    pub fn push(&self, callback: Callback) -> Callback {
        let id = {
            let mut st = self.state.lock();
            st.next_id += 1;
            let id = st.next_id;
            st.pending.insert(id);
            id
        };
        let callback = match callback {
            Callback::Handlers(h) => Callback::Handlers(h.with_all_slots()),
            other => other,
        };
        let tracker = self.clone();
        callback.wrap(Arc::new(move |deliver: &mut dyn FnMut()| {
            deliver();
            tracker.resolve(id);
        }))
    }

    /// Call `callback` once every currently pending request has resolved.
    pub fn on_ready(&self, callback: impl FnOnce() + Send + 'static) {
        {
            let mut st = self.state.lock();
            if !st.pending.is_empty() {
                let waiting_on = st.pending.clone();
                st.waiters.push(Waiter {
                    waiting_on,
                    callback: Box::new(callback),
                });
                return;
            }
        }
        callback();
    }

    /// Requests still waiting for their first delivery.
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn resolve(&self, id: u64) {
        let ready: Vec<Waiter> = {
            let mut st = self.state.lock();
            if !st.pending.remove(&id) {
                return;
            }
            for waiter in st.waiters.iter_mut() {
                waiter.waiting_on.remove(&id);
            }
            let (done, waiting): (Vec<Waiter>, Vec<Waiter>) = std::mem::take(&mut st.waiters)
                .into_iter()
                .partition(|w| w.waiting_on.is_empty());
            st.waiters = waiting;
            done
        };
        for waiter in ready {
            (waiter.callback)();
        }
    }
}
