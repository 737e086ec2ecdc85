//! Pointer tokens: `(tag, index)` addresses rendered as text.
//!
//! Tags are single characters drawn from `A`-`Z`, `$` and `_`; table
//! indices are rendered in decimal inside a raw payload and in base 63
//! inside a compressed pointer grid. The two alphabets are disjoint, so a
//! run of concatenated pointers self-delimits without a length prefix.

use std::fmt;

use crate::error::DecodeError;

/// Base-63 digit alphabet used by compressed pointer grids.
///
/// Digits, lowercase letters, and JSON-safe punctuation — fully disjoint
/// from the tag alphabet.
pub const BASE63_ALPHABET: &[u8; 63] =
    b"0123456789abcdefghijklmnopqrstuvwxyz!#%&'()*+-./:;<=>?@[]^`{|}~";

/// A kind discriminator: one character from the tag alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(u8);

impl Tag {
    /// Creates a tag from a byte known to be in the tag alphabet.
    pub(crate) const fn new(byte: u8) -> Tag {
        Tag(byte)
    }

    /// Creates a tag, returning `None` for bytes outside the tag alphabet.
    pub fn from_byte(byte: u8) -> Option<Tag> {
        if is_tag_byte(byte) {
            Some(Tag(byte))
        } else {
            None
        }
    }

    /// The tag character.
    pub fn as_char(self) -> char {
        self.0 as char
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A parsed pointer: tag plus table index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pointer {
    pub tag: Tag,
    pub index: usize,
}

/// True for bytes in the tag alphabet.
pub fn is_tag_byte(byte: u8) -> bool {
    byte.is_ascii_uppercase() || byte == b'$' || byte == b'_'
}

/// True for bytes in the base-63 alphabet.
pub fn is_base63_byte(byte: u8) -> bool {
    BASE63_ALPHABET.contains(&byte)
}

/// Renders a pointer token: tag character followed by the decimal index.
pub fn format_pointer(tag: Tag, index: usize) -> String {
    format!("{}{}", tag.as_char(), index)
}

/// Parses a pointer token with an explicit index.
///
/// Simple tokens (a bare tag with no index) are not pointers in this sense
/// and must be recognized by the caller before parsing.
pub fn parse_pointer(token: &str) -> Result<Pointer, DecodeError> {
    let bytes = token.as_bytes();
    let malformed = || DecodeError::MalformedPointer {
        token: token.to_string(),
    };

    let (&first, rest) = bytes.split_first().ok_or_else(malformed)?;
    let tag = Tag::from_byte(first).ok_or_else(malformed)?;

    if rest.is_empty() || !rest.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }
    let index = std::str::from_utf8(rest)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(malformed)?;

    Ok(Pointer { tag, index })
}

/// Renders an index in base 63, most significant digit first.
///
/// Zero renders as a single digit; there is no sign and no leading-zero
/// ambiguity because the encoder always emits the shortest form.
pub fn to_base63(mut value: usize) -> String {
    let mut digits = Vec::new();
    loop {
        digits.push(BASE63_ALPHABET[value % 63]);
        value /= 63;
        if value == 0 {
            break;
        }
    }
    digits.reverse();
    // The alphabet is ASCII, so the digit run is valid UTF-8.
    String::from_utf8(digits).unwrap_or_default()
}

/// Parses a base-63 digit run back to an index.
///
/// Returns `None` for an empty run, a byte outside the alphabet, or a
/// value that would overflow `usize`.
pub fn from_base63(digits: &[u8]) -> Option<usize> {
    if digits.is_empty() {
        return None;
    }
    let mut value: usize = 0;
    for &byte in digits {
        let digit = BASE63_ALPHABET.iter().position(|&b| b == byte)?;
        value = value.checked_mul(63)?.checked_add(digit)?;
    }
    Some(value)
}
