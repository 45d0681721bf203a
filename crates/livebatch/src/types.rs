//! Value types shared across the crate: documents, change records, batches
//! and the edit records handed to rendering consumers.

use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A document produced by a live query.
pub type Document = Value;

/// Field used to track document identity across edits.
pub const ID_FIELD: &str = "_id";

/// Identity of a document, if it carries an `_id`.
pub fn track_id(doc: &Document) -> Option<&Value> {
    doc.get(ID_FIELD)
}

// ============================================================================
// ChangeRecord
// ============================================================================

/// One structural edit to a live query's ordered result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChangeRecord {
    Add { index: usize, item: Document },
    Update { index: usize, item: Document },
    #[serde(rename_all = "camelCase")]
    Move { from_index: usize, to_index: usize },
    Remove { index: usize },
}

impl ChangeRecord {
    pub fn add(index: usize, item: Document) -> Self {
        Self::Add { index, item }
    }

    pub fn update(index: usize, item: Document) -> Self {
        Self::Update { index, item }
    }

    pub fn moved(from_index: usize, to_index: usize) -> Self {
        Self::Move {
            from_index,
            to_index,
        }
    }

    pub fn remove(index: usize) -> Self {
        Self::Remove { index }
    }

    /// The document carried by the record, for `Add` and `Update`.
    pub fn item(&self) -> Option<&Document> {
        match self {
            Self::Add { item, .. } | Self::Update { item, .. } => Some(item),
            Self::Move { .. } | Self::Remove { .. } => None,
        }
    }
}

// ============================================================================
// Batch
// ============================================================================

/// An ordered, immutable run of change records produced by one flush.
///
/// Cloning shares the underlying records; a delivered batch can never be
/// mutated by any consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch(Arc<[ChangeRecord]>);

impl Batch {
    pub fn new(records: Vec<ChangeRecord>) -> Self {
        Self(records.into())
    }

    pub fn records(&self) -> &[ChangeRecord] {
        &self.0
    }

    /// Convert back into an owned list, e.g. for assertions.
    pub fn to_vec(&self) -> Vec<ChangeRecord> {
        self.0.to_vec()
    }
}

impl Deref for Batch {
    type Target = [ChangeRecord];

    fn deref(&self) -> &[ChangeRecord] {
        &self.0
    }
}

impl From<Vec<ChangeRecord>> for Batch {
    fn from(records: Vec<ChangeRecord>) -> Self {
        Self::new(records)
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a ChangeRecord;
    type IntoIter = std::slice::Iter<'a, ChangeRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ============================================================================
// DiffRecord
// ============================================================================

/// An edit record in the shape rendering consumers expect: the item (when
/// known) with its previous and current positions.
///
/// - insert: `previous_index == None`, `current_index == Some(i)`
/// - remove: `previous_index == Some(i)`, `current_index == None`
/// - move: both set
/// - identity change (update): `current_index == Some(i)`, recorded only in
///   the `updated` list
#[derive(Debug, Clone, PartialEq)]
pub struct DiffRecord {
    pub item: Option<Document>,
    pub track_id: Option<Value>,
    pub previous_index: Option<usize>,
    pub current_index: Option<usize>,
}

impl DiffRecord {
    pub fn new(
        current_index: Option<usize>,
        previous_index: Option<usize>,
        item: Option<Document>,
    ) -> Self {
        let track_id = item.as_ref().and_then(track_id).cloned();
        Self {
            item,
            track_id,
            previous_index,
            current_index,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
