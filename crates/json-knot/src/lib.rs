//! Identity-preserving codec for cyclic and shared value graphs.
//!
//! Plain JSON serializes a tree; this crate serializes a graph. Every
//! distinct value is assigned a pointer into per-kind tables, references
//! are encoded as pointer tokens, and the decoder rebuilds the same
//! shape: shared references decode shared, and cycles decode as cycles
//! instead of overflowing the stack.
//!
//! The wire form is itself valid JSON, so it passes through JSON-only
//! channels untouched.
//!
//! ```
//! use json_knot::{decode, encode, DecodeOptions, EncodeOptions, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let shared = Value::sequence(vec![Value::Number(1.0)]);
//! let graph = Value::sequence(vec![shared.clone(), shared]);
//!
//! let wire = encode(&graph, &EncodeOptions::default())?;
//! let decoded = decode(&wire, &DecodeOptions::default())?;
//!
//! // Both elements decode to the same node, not two equal copies.
//! # let node = decoded.as_node().unwrap().borrow();
//! # let json_knot::NodeBody::Sequence(items) = &node.body else { unreachable!() };
//! assert!(items[0].same_node(&items[1]));
//! # Ok(())
//! # }
//! ```
//!
//! Graphs containing deferred productions (blobs whose bytes arrive
//! asynchronously) are encoded with [`encode_deferred`], which awaits
//! every outstanding production at a completion barrier before emitting
//! the final text.

pub mod codec;
pub mod error;
pub mod limits;
pub mod model;
pub mod registry;

pub use codec::{
    decode, decode_with_registry, encode, encode_deferred, encode_deferred_with_registry,
    encode_with_registry, DecodeOptions, EncodeOptions,
};
pub use error::{DecodeError, EncodeError};
pub use limits::FORMAT_VERSION;
pub use model::{BlobData, Node, NodeBody, NodeRef, Value};
pub use registry::{Compression, KindAdapter, Registry, SerialParts};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
