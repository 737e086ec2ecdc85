//! The type-registry capability consumed by the codec engine.
//!
//! The engine never depends on the identity of a concrete kind: it asks
//! the registry to classify values, to serialize a node into a parts list,
//! to allocate a shell for a tag during decode, and to populate that shell
//! once every reachable pointer has one. Kinds are a strategy table — a
//! flat mapping from tag to behavior — not an inheritance hierarchy.

pub mod kinds;

use futures::future::LocalBoxFuture;
use lazy_static::lazy_static;
use rustc_hash::FxHashMap;

use crate::codec::decode::{DecodeStore, DecodedItem};
use crate::codec::pointer::Tag;
use crate::codec::wire::RawSlot;
use crate::error::DecodeError;
use crate::model::{NodeBody, Value};

/// Per-tag compression class for the wire serializer's value lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Slots stay as a list of strings (text).
    None,
    /// Slots join into one delimited string (numeric literals).
    Delimited,
    /// Slots render as a base-63 pointer grid (node kinds).
    PointerGrid,
}

/// Serialized form of one value, produced by a kind adapter.
///
/// Grid leaves are raw live values; the encoder passes every one of them
/// through `encounter`, which is how nested references are discovered.
#[derive(Debug)]
pub enum SerialParts {
    Text(String),
    Grid(Vec<Vec<Value>>),
}

/// Capability interface implemented once per kind.
pub trait KindAdapter: Sync {
    /// The tag this adapter serves.
    fn tag(&self) -> Tag;

    /// Compression class of this tag's value list.
    fn compression(&self) -> Compression;

    /// Turns a live value of this kind into its serialized parts.
    fn serialize(&self, value: &Value) -> SerialParts;

    /// True when serialization of this value must await an out-of-band
    /// production before the wire text can be finalized.
    fn is_deferred(&self, _value: &Value) -> bool {
        false
    }

    /// Takes the pending production for a deferred value. Yields the value
    /// exactly once; later calls return `None`.
    fn take_deferred(&self, _value: &Value) -> Option<LocalBoxFuture<'static, Vec<u8>>> {
        None
    }

    /// Allocates the decoded reference for a slot — an empty shell for
    /// cycle-capable kinds, the final value for scalar-state kinds. Runs
    /// before the slot's parts are scanned for nested pointers.
    fn generate(&self, store: &DecodeStore<'_>, slot: &RawSlot) -> Result<Value, DecodeError>;

    /// Fills a shell's primary content and attachments, resolving nested
    /// pointers against already-allocated shells.
    fn populate(&self, store: &DecodeStore<'_>, item: &DecodedItem) -> Result<(), DecodeError>;
}

/// Tag constants for the built-in catalogue.
pub mod tags {
    use crate::codec::pointer::Tag;

    // Simple singletons.
    pub const UNDEFINED: Tag = Tag::new(b'K');
    pub const NULL: Tag = Tag::new(b'L');
    pub const TRUE: Tag = Tag::new(b'T');
    pub const FALSE: Tag = Tag::new(b'F');
    pub const INFINITY: Tag = Tag::new(b'I');
    pub const NEG_INFINITY: Tag = Tag::new(b'J');
    pub const NAN: Tag = Tag::new(b'C');
    pub const NEG_ZERO: Tag = Tag::new(b'M');

    // Primitive kinds.
    pub const TEXT: Tag = Tag::new(b'S');
    pub const NUMBER: Tag = Tag::new(b'N');
    pub const BIGINT: Tag = Tag::new(b'_');

    // Node kinds.
    pub const SEQUENCE: Tag = Tag::new(b'A');
    pub const RECORD: Tag = Tag::new(b'O');
    pub const ORDERED_SET: Tag = Tag::new(b'U');
    pub const ORDERED_MAP: Tag = Tag::new(b'V');
    pub const BYTES: Tag = Tag::new(b'W');
    pub const BOXED: Tag = Tag::new(b'B');
    pub const TIMESTAMP: Tag = Tag::new(b'D');
    pub const PATTERN: Tag = Tag::new(b'R');
    pub const FAULT: Tag = Tag::new(b'E');
    pub const BLOB: Tag = Tag::new(b'Y');
}

/// The singleton value for a simple token, if the token is simple.
pub fn simple_value(token: &str) -> Option<Value> {
    match token {
        "K" => Some(Value::Undefined),
        "L" => Some(Value::Null),
        "T" => Some(Value::Bool(true)),
        "F" => Some(Value::Bool(false)),
        "I" => Some(Value::Number(f64::INFINITY)),
        "J" => Some(Value::Number(f64::NEG_INFINITY)),
        "C" => Some(Value::Number(f64::NAN)),
        "M" => Some(Value::Number(-0.0)),
        _ => None,
    }
}

/// The simple token for a value, if the value is simple.
pub fn simple_token(value: &Value) -> Option<&'static str> {
    match value {
        Value::Undefined => Some("K"),
        Value::Null => Some("L"),
        Value::Bool(true) => Some("T"),
        Value::Bool(false) => Some("F"),
        Value::Number(n) => {
            if n.is_nan() {
                Some("C")
            } else if *n == f64::INFINITY {
                Some("I")
            } else if *n == f64::NEG_INFINITY {
                Some("J")
            } else if *n == 0.0 && n.is_sign_negative() {
                Some("M")
            } else {
                None
            }
        }
        _ => None,
    }
}

/// True for tags denoting a simple singleton.
pub fn is_simple_tag(tag: Tag) -> bool {
    matches!(
        tag,
        tags::UNDEFINED
            | tags::NULL
            | tags::TRUE
            | tags::FALSE
            | tags::INFINITY
            | tags::NEG_INFINITY
            | tags::NAN
            | tags::NEG_ZERO
    )
}

/// The catalogue tag for a node body.
fn node_tag(body: &NodeBody) -> Tag {
    match body {
        NodeBody::Record => tags::RECORD,
        NodeBody::Sequence(_) => tags::SEQUENCE,
        NodeBody::OrderedSet(_) => tags::ORDERED_SET,
        NodeBody::OrderedMap(_) => tags::ORDERED_MAP,
        NodeBody::Bytes(_) => tags::BYTES,
        NodeBody::Boxed(_) => tags::BOXED,
        NodeBody::Timestamp(_) => tags::TIMESTAMP,
        NodeBody::Pattern { .. } => tags::PATTERN,
        NodeBody::Fault { .. } => tags::FAULT,
        NodeBody::Blob { .. } => tags::BLOB,
    }
}

/// Table of registered kind adapters.
///
/// The default registry carries the full built-in catalogue. A reduced
/// registry makes values of the removed kinds unsupported on encode and
/// their tags unrecognized on decode — the forward-compatibility paths.
pub struct Registry {
    adapters: FxHashMap<Tag, &'static dyn KindAdapter>,
}

impl Registry {
    /// A registry with every built-in kind.
    pub fn full() -> Registry {
        let mut adapters = FxHashMap::default();
        for adapter in kinds::catalogue() {
            adapters.insert(adapter.tag(), adapter);
        }
        Registry { adapters }
    }

    /// A registry with only the listed built-in kinds.
    ///
    /// The record kind is always retained: it is the placeholder container
    /// lenient encoding falls back to for unsupported values.
    pub fn with_kinds(keep: &[Tag]) -> Registry {
        let mut registry = Registry::full();
        registry
            .adapters
            .retain(|tag, _| *tag == tags::RECORD || keep.contains(tag));
        registry
    }

    /// Removes a kind. The record kind cannot be removed.
    pub fn remove(&mut self, tag: Tag) {
        if tag != tags::RECORD {
            self.adapters.remove(&tag);
        }
    }

    /// The adapter for a tag, if registered.
    pub fn adapter(&self, tag: Tag) -> Option<&'static dyn KindAdapter> {
        self.adapters.get(&tag).copied()
    }

    /// True if the tag is registered (or simple).
    pub fn contains(&self, tag: Tag) -> bool {
        is_simple_tag(tag) || self.adapters.contains_key(&tag)
    }

    /// The registered tag for a non-simple value, or `None` when the value
    /// is unsupported under this registry. Deterministic and side-effect
    /// free.
    pub fn classify(&self, value: &Value) -> Option<Tag> {
        let tag = match value {
            Value::Text(_) => tags::TEXT,
            Value::Number(_) => tags::NUMBER,
            Value::BigInt(_) => tags::BIGINT,
            Value::Node(node) => node_tag(&node.borrow().body),
            Value::Undefined | Value::Null | Value::Bool(_) => return None,
        };
        self.adapters.contains_key(&tag).then_some(tag)
    }
}

lazy_static! {
    /// Process-wide registry with the full built-in catalogue.
    pub static ref DEFAULT_REGISTRY: Registry = Registry::full();
}
