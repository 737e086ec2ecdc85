//! Identity-keyed reference tracking for the encode side.
//!
//! The tracker maps every distinct value encountered during discovery to
//! the pointer already assigned to it, and exposes the records in
//! insertion order so the encoder can resume a traversal from an arbitrary
//! offset without revisiting earlier records.

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::codec::pointer::Tag;
use crate::model::{Node, Value};

/// Lookup key for the tracker.
///
/// Nodes are keyed by reference identity (the `Rc` address; the record
/// keeps the `Rc` alive, so addresses stay unique for the duration of the
/// call). Primitives have no identity of their own and are keyed by value,
/// so equal primitives share one wire slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Node(*const RefCell<Node>),
    Number(u64),
    BigInt(i128),
    Text(String),
}

impl IdentityKey {
    /// The key for a value, or `None` for simple values, which are never
    /// tracked.
    pub fn of(value: &Value) -> Option<IdentityKey> {
        if value.is_simple() {
            return None;
        }
        match value {
            Value::Number(n) => Some(IdentityKey::Number(n.to_bits())),
            Value::BigInt(i) => Some(IdentityKey::BigInt(*i)),
            Value::Text(s) => Some(IdentityKey::Text(s.clone())),
            Value::Node(node) => Some(IdentityKey::Node(Rc::as_ptr(node))),
            // Simple values were filtered above.
            Value::Undefined | Value::Null | Value::Bool(_) => None,
        }
    }
}

/// A tracked value: its assigned address and the live value, retained
/// until its slot has been serialized.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub tag: Tag,
    pub index: usize,
    pub token: String,
    pub value: Value,
}

/// Insertion-ordered map from value identity to node record.
#[derive(Debug, Default)]
pub struct ReferenceTracker {
    records: Vec<NodeRecord>,
    index: FxHashMap<IdentityKey, usize>,
}

impl ReferenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the record for a previously encountered value.
    pub fn get(&self, key: &IdentityKey) -> Option<&NodeRecord> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    /// Registers a record under the given identity, returning its position
    /// in the traversal order.
    pub fn insert(&mut self, key: IdentityKey, record: NodeRecord) -> usize {
        let position = self.records.len();
        self.records.push(record);
        self.index.insert(key, position);
        position
    }

    /// Number of records registered so far.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The record at a traversal position.
    ///
    /// Together with [`len`](Self::len) this is the resumable traversal:
    /// callers loop from a saved offset while new records keep being
    /// appended, and never revisit earlier positions.
    pub fn record(&self, position: usize) -> Option<&NodeRecord> {
        self.records.get(position)
    }
}
