//! Security limits for decoding untrusted input.
//!
//! Every allocation the decoder performs is bounded by one of these
//! constants; payloads exceeding them are rejected with
//! [`DecodeError::LengthExceedsLimit`](crate::DecodeError::LengthExceedsLimit)
//! in both strict and lenient mode.

/// Wire format version carried in every payload.
pub const FORMAT_VERSION: &str = "1";

/// Maximum accepted wire text size in bytes (64 MiB).
pub const MAX_WIRE_LEN: usize = 64 * 1024 * 1024;

/// Maximum number of slots in a single per-tag table.
pub const MAX_TABLE_SLOTS: usize = 16_777_216;

/// Maximum number of parts in one slot.
pub const MAX_PARTS_PER_SLOT: usize = 65_536;

/// Maximum number of pointers in one part.
pub const MAX_POINTERS_PER_PART: usize = 16_777_216;

/// Maximum length of a single text slot in bytes.
pub const MAX_TEXT_LEN: usize = 16 * 1024 * 1024;
