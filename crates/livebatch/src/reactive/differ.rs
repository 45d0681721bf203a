//! CursorDiffer: adapts observer batches to a list renderer's edit lists.
//!
//! Each [`CursorDiffer::diff`] call resets the output lists, rebinds when
//! the live query changed identity, then applies whatever batches the bound
//! observer emitted since the previous call. A rebind (and
//! [`CursorDiffer::on_destroy`]) first emits one removal per displayed item
//! so the consumer can clear what it rendered for the old query.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::ObserverOptions;
use crate::error::{LiveError, QueryError, Result};
use crate::query::traits::{is_observable, same_query, SharedQuery};
use crate::runtime::host::Host;
use crate::types::{ChangeRecord, DiffRecord};

use super::observer::LiveQueryObserver;
use super::subscriber::{Subscriber, Subscription};

/// Result of a `diff` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    /// The view must re-render from the edit lists.
    Rerender,
    Unchanged,
}

impl DiffOutcome {
    /// Whether the consumer must re-render.
    pub fn is_rerender(self) -> bool {
        self == DiffOutcome::Rerender
    }
}

/// Batches received from the bound observer since the last `diff`.
#[derive(Default)]
struct Inbox {
    records: Vec<ChangeRecord>,
    received: bool,
    error: Option<QueryError>,
}

struct Binding {
    query: SharedQuery,
    observer: LiveQueryObserver,
    subscription: Subscription,
    inbox: Arc<Mutex<Inbox>>,
}

#[derive(Default)]
struct Edits {
    inserted: Vec<DiffRecord>,
    removed: Vec<DiffRecord>,
    moved: Vec<DiffRecord>,
    updated: Vec<DiffRecord>,
    operations: Vec<DiffRecord>,
}

impl Edits {
    fn clear(&mut self) {
        self.inserted.clear();
        self.removed.clear();
        self.moved.clear();
        self.updated.clear();
        self.operations.clear();
    }
}

/// Stateful adapter from observer batches to renderer edit lists.
pub struct CursorDiffer {
    host: Host,
    options: ObserverOptions,
    binding: Option<Binding>,
    edits: Edits,
    displayed: usize,
    last_error: Option<QueryError>,
}

impl CursorDiffer {
    /// Create an unbound differ.
    pub fn new(host: &Host, options: ObserverOptions) -> Self {
        Self {
            host: host.clone(),
            options,
            binding: None,
            edits: Edits::default(),
            displayed: 0,
            last_error: None,
        }
    }

    /// Rebind to `query` if its identity changed, then apply pending batches.
    pub fn diff(&mut self, query: &SharedQuery) -> Result<DiffOutcome> {
        self.edits.clear();

        let rebound = match &self.binding {
            Some(b) => !same_query(&b.query, query),
            None => true,
        };
        if rebound {
            if !is_observable(query.as_ref()) {
                return Err(LiveError::InvalidInput(
                    "live query does not support observe".to_string(),
                ));
            }
            self.unbind();
            self.bind(query)?;
        }

        let applied = self.apply_pending();
        if rebound || applied {
            Ok(DiffOutcome::Rerender)
        } else {
            Ok(DiffOutcome::Unchanged)
        }
    }

    /// Destroy the bound observer and emit removals for every displayed
    /// item.
    pub fn on_destroy(&mut self) {
        self.edits.clear();
        self.unbind();
    }

    /// Observer for the currently bound query, if any.
    pub fn observer(&self) -> Option<&LiveQueryObserver> {
        self.binding.as_ref().map(|b| &b.observer)
    }

    /// Items currently displayed according to the applied edits.
    pub fn displayed(&self) -> usize {
        self.displayed
    }

    /// Error reported by the bound query, if any. Terminal for that query.
    pub fn last_error(&self) -> Option<&QueryError> {
        self.last_error.as_ref()
    }

    /// Additions from the last call.
    pub fn inserted(&self) -> &[DiffRecord] {
        &self.edits.inserted
    }

    /// Removals from the last call, including cleanup passes.
    pub fn removed(&self) -> &[DiffRecord] {
        &self.edits.removed
    }

    /// Moves from the last call.
    pub fn moved(&self) -> &[DiffRecord] {
        &self.edits.moved
    }

    /// In-place updates from the last call.
    pub fn updated(&self) -> &[DiffRecord] {
        &self.edits.updated
    }

    /// Additions, moves and removals in application order.
    pub fn operations(&self) -> &[DiffRecord] {
        &self.edits.operations
    }

    pub fn for_each_added_item(&self, mut f: impl FnMut(&DiffRecord)) {
        self.edits.inserted.iter().for_each(&mut f);
    }

    pub fn for_each_moved_item(&self, mut f: impl FnMut(&DiffRecord)) {
        self.edits.moved.iter().for_each(&mut f);
    }

    pub fn for_each_removed_item(&self, mut f: impl FnMut(&DiffRecord)) {
        self.edits.removed.iter().for_each(&mut f);
    }

    pub fn for_each_identity_change(&self, mut f: impl FnMut(&DiffRecord)) {
        self.edits.updated.iter().for_each(&mut f);
    }

    /// Visit every edit in application order with its previous and current
    /// positions.
    pub fn for_each_operation(
        &self,
        mut f: impl FnMut(&DiffRecord, Option<usize>, Option<usize>),
    ) {
        for op in &self.edits.operations {
            f(op, op.previous_index, op.current_index);
        }
    }

    fn bind(&mut self, query: &SharedQuery) -> Result<()> {
        debug!("binding differ to a new live query");
        let observer = LiveQueryObserver::new(Arc::clone(query), &self.host, self.options.clone())?;
        let inbox = Arc::new(Mutex::new(Inbox::default()));
        let on_next = Arc::clone(&inbox);
        let on_error = Arc::clone(&inbox);
        let subscription = observer.subscribe(
            Subscriber::new(move |batch| {
                let mut inbox = on_next.lock();
                inbox.records.extend(batch.iter().cloned());
                inbox.received = true;
            })
            .on_error(move |err| on_error.lock().error = Some(err.clone())),
        );
        self.last_error = None;
        self.binding = Some(Binding {
            query: Arc::clone(query),
            observer,
            subscription,
            inbox,
        });
        Ok(())
    }

    fn unbind(&mut self) {
        if let Some(binding) = self.binding.take() {
            binding.observer.destroy();
            binding.subscription.unsubscribe();
        }
        self.apply_cleanup();
    }

    fn apply_cleanup(&mut self) {
        for _ in 0..self.displayed {
            let remove = DiffRecord::new(None, Some(0), None);
            self.edits.removed.push(remove.clone());
            self.edits.operations.push(remove);
        }
        self.displayed = 0;
    }

    /// Apply batches received since the last call. Returns whether any
    /// batch arrived.
    fn apply_pending(&mut self) -> bool {
        let Some(binding) = &self.binding else {
            return false;
        };
        let (records, received, error) = {
            let mut inbox = binding.inbox.lock();
            let received = std::mem::take(&mut inbox.received);
            (std::mem::take(&mut inbox.records), received, inbox.error.take())
        };
        if let Some(err) = error {
            debug!(error = %err, "bound live query failed");
            self.last_error = Some(err);
        }

        for record in records {
            match record {
                ChangeRecord::Add { index, item } => {
                    let add = DiffRecord::new(Some(index), None, Some(item));
                    self.edits.inserted.push(add.clone());
                    self.edits.operations.push(add);
                    self.displayed += 1;
                }
                ChangeRecord::Move {
                    from_index,
                    to_index,
                } => {
                    let mv = DiffRecord::new(Some(to_index), Some(from_index), None);
                    self.edits.moved.push(mv.clone());
                    self.edits.operations.push(mv);
                }
                ChangeRecord::Remove { index } => {
                    let remove = DiffRecord::new(None, Some(index), None);
                    self.edits.removed.push(remove.clone());
                    self.edits.operations.push(remove);
                    self.displayed = self.displayed.saturating_sub(1);
                }
                ChangeRecord::Update { index, item } => {
                    self.edits
                        .updated
                        .push(DiffRecord::new(Some(index), None, Some(item)));
                }
            }
        }
        received
    }
}

impl Drop for CursorDiffer {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.take() {
            binding.observer.destroy();
            binding.subscription.unsubscribe();
        }
    }
}

impl std::fmt::Debug for CursorDiffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorDiffer")
            .field("bound", &self.binding.is_some())
            .field("displayed", &self.displayed)
            .field("operations", &self.edits.operations.len())
            .finish()
    }
}

/// Creates [`CursorDiffer`]s for live queries a list renderer is asked to
/// display.
#[derive(Debug, Clone)]
pub struct CursorDifferFactory {
    host: Host,
    options: ObserverOptions,
}

impl CursorDifferFactory {
    pub fn new(host: &Host) -> Self {
        Self::with_options(host, ObserverOptions::default())
    }

    pub fn with_options(host: &Host, options: ObserverOptions) -> Self {
        Self {
            host: host.clone(),
            options,
        }
    }

    /// Whether `query` can be diffed.
    pub fn supports(&self, query: &SharedQuery) -> bool {
        is_observable(query.as_ref())
    }

    /// Create a differ sharing this factory's host and options.
    pub fn create(&self) -> CursorDiffer {
        CursorDiffer::new(&self.host, self.options.clone())
    }
}
