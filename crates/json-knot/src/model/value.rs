//! The dynamic value graph the codec operates on.
//!
//! A graph is built from cheap-to-clone [`Value`]s. Scalars are carried
//! inline; everything that can be shared or participate in a cycle is a
//! [`Node`] behind an `Rc<RefCell<_>>`, and it is that reference identity
//! (`Rc::ptr_eq`) which the codec preserves across a round trip.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use futures::future::LocalBoxFuture;

/// Shared handle to a node in the graph.
pub type NodeRef = Rc<RefCell<Node>>;

/// A value in the graph.
///
/// Primitives (`Number`, `Text`, ...) have no identity of their own: two
/// equal primitives may share a wire slot. `Node` values carry reference
/// identity, which survives encoding and decoding.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i128),
    Text(String),
    Node(NodeRef),
}

/// A heap node: primary content plus attachments.
///
/// `props` is the attachment list — extra keyed properties carried beyond
/// the node's primary content (e.g. a named field set on a sequence).
/// Every node kind supports attachments.
#[derive(Debug)]
pub struct Node {
    pub body: NodeBody,
    pub props: Vec<(Value, Value)>,
}

/// Primary content of a node, one variant per built-in kind.
#[derive(Debug)]
pub enum NodeBody {
    /// Keyed object; all content lives in the attachment list.
    Record,
    /// Ordered list of values.
    Sequence(Vec<Value>),
    /// Insertion-ordered set.
    OrderedSet(Vec<Value>),
    /// Insertion-ordered map with arbitrary-value keys.
    OrderedMap(Vec<(Value, Value)>),
    /// Binary buffer.
    Bytes(Vec<u8>),
    /// Wrapped value (object form of a primitive).
    Boxed(Value),
    /// Instant as epoch milliseconds.
    Timestamp(i64),
    /// Regular-expression object state.
    Pattern {
        source: String,
        flags: String,
        last_index: u64,
    },
    /// Error-object state.
    Fault {
        name: String,
        message: String,
        trace: String,
    },
    /// Binary payload whose bytes may only be available asynchronously.
    Blob {
        content_type: String,
        data: BlobData,
    },
}

/// Payload of a [`NodeBody::Blob`].
pub enum BlobData {
    /// Bytes already in memory.
    Ready(Vec<u8>),
    /// Bytes produced out of band. The future is taken exactly once, by
    /// the deferred encoding wave; `None` afterwards.
    Deferred(Option<LocalBoxFuture<'static, Vec<u8>>>),
}

impl fmt::Debug for BlobData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobData::Ready(bytes) => f.debug_tuple("Ready").field(&bytes.len()).finish(),
            BlobData::Deferred(Some(_)) => f.write_str("Deferred(pending)"),
            BlobData::Deferred(None) => f.write_str("Deferred(taken)"),
        }
    }
}

impl Node {
    /// Creates a node handle from a body, with no attachments.
    pub fn new(body: NodeBody) -> NodeRef {
        Rc::new(RefCell::new(Node {
            body,
            props: Vec::new(),
        }))
    }

    /// A short name for the node's kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self.body {
            NodeBody::Record => "Record",
            NodeBody::Sequence(_) => "Sequence",
            NodeBody::OrderedSet(_) => "OrderedSet",
            NodeBody::OrderedMap(_) => "OrderedMap",
            NodeBody::Bytes(_) => "Bytes",
            NodeBody::Boxed(_) => "Boxed",
            NodeBody::Timestamp(_) => "Timestamp",
            NodeBody::Pattern { .. } => "Pattern",
            NodeBody::Fault { .. } => "Fault",
            NodeBody::Blob { .. } => "Blob",
        }
    }
}

impl Value {
    /// An empty record node.
    pub fn record() -> Value {
        Value::Node(Node::new(NodeBody::Record))
    }

    /// A sequence node with the given items.
    pub fn sequence(items: Vec<Value>) -> Value {
        Value::Node(Node::new(NodeBody::Sequence(items)))
    }

    /// An ordered-set node with the given members.
    pub fn ordered_set(members: Vec<Value>) -> Value {
        Value::Node(Node::new(NodeBody::OrderedSet(members)))
    }

    /// An ordered-map node with the given entries.
    pub fn ordered_map(entries: Vec<(Value, Value)>) -> Value {
        Value::Node(Node::new(NodeBody::OrderedMap(entries)))
    }

    /// A bytes node.
    pub fn bytes(bytes: Vec<u8>) -> Value {
        Value::Node(Node::new(NodeBody::Bytes(bytes)))
    }

    /// A boxed (object-wrapped) value.
    pub fn boxed(inner: Value) -> Value {
        Value::Node(Node::new(NodeBody::Boxed(inner)))
    }

    /// A timestamp node from epoch milliseconds.
    pub fn timestamp(millis: i64) -> Value {
        Value::Node(Node::new(NodeBody::Timestamp(millis)))
    }

    /// A pattern node. `last_index` is the match cursor; pass 0 for a
    /// fresh pattern.
    pub fn pattern(
        source: impl Into<String>,
        flags: impl Into<String>,
        last_index: u64,
    ) -> Value {
        Value::Node(Node::new(NodeBody::Pattern {
            source: source.into(),
            flags: flags.into(),
            last_index,
        }))
    }

    /// A fault node.
    pub fn fault(
        name: impl Into<String>,
        message: impl Into<String>,
        trace: impl Into<String>,
    ) -> Value {
        Value::Node(Node::new(NodeBody::Fault {
            name: name.into(),
            message: message.into(),
            trace: trace.into(),
        }))
    }

    /// A blob node with bytes already in memory.
    pub fn blob(content_type: impl Into<String>, bytes: Vec<u8>) -> Value {
        Value::Node(Node::new(NodeBody::Blob {
            content_type: content_type.into(),
            data: BlobData::Ready(bytes),
        }))
    }

    /// A blob node whose bytes are produced asynchronously.
    ///
    /// Synchronous [`encode`](crate::encode) refuses such a graph in strict
    /// mode; [`encode_deferred`](crate::encode_deferred) awaits the
    /// production before finalizing the wire text.
    pub fn deferred_blob(
        content_type: impl Into<String>,
        production: LocalBoxFuture<'static, Vec<u8>>,
    ) -> Value {
        Value::Node(Node::new(NodeBody::Blob {
            content_type: content_type.into(),
            data: BlobData::Deferred(Some(production)),
        }))
    }

    /// A text value.
    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    /// The node handle, if this value is a node.
    pub fn as_node(&self) -> Option<&NodeRef> {
        match self {
            Value::Node(node) => Some(node),
            _ => None,
        }
    }

    /// True if `self` and `other` are the same node (reference identity).
    pub fn same_node(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Node(a), Value::Node(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// True for values denoted by a bare simple tag on the wire: the
    /// undefined/null/boolean constants and the non-finite or negative-zero
    /// numbers. Simple values never occupy a table slot.
    pub fn is_simple(&self) -> bool {
        match self {
            Value::Undefined | Value::Null | Value::Bool(_) => true,
            Value::Number(n) => !n.is_finite() || (*n == 0.0 && n.is_sign_negative()),
            _ => false,
        }
    }

    /// A short name for the value's kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "Undefined",
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Number(_) => "Number",
            Value::BigInt(_) => "BigInt",
            Value::Text(_) => "Text",
            Value::Node(node) => node.borrow().kind_name(),
        }
    }
}
