//! Data model for the value graph.
//!
//! This module contains the types a caller builds graphs out of:
//! - Shared, possibly cyclic nodes (`Node`, `NodeRef`)
//! - Inline scalar values (`Value`)
//! - Deferred binary payloads (`BlobData`)

pub mod value;

pub use value::{BlobData, Node, NodeBody, NodeRef, Value};
