//! Encode and decode pipelines and their shared machinery.

pub mod decode;
pub mod encode;
pub mod pointer;
pub mod tracker;
pub mod wire;

pub use decode::{decode, decode_with_registry, DecodeOptions, DecodeStore, DecodedItem};
pub use encode::{
    encode, encode_deferred, encode_deferred_with_registry, encode_with_registry, EncodeOptions,
};
pub use pointer::{format_pointer, parse_pointer, Pointer, Tag};
pub use wire::RawSlot;
