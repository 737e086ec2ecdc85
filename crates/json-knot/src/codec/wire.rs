//! Wire payload assembly and parsing.
//!
//! The payload is a JSON array: the root pointer token, the format
//! version, then one `[tag, values]` pair per output table in
//! first-reservation order. Per-tag value lists may be compressed by the
//! tag's compression class; compression is purely a size optimization —
//! the decoder detects the form from the JSON shape and accepts both.

use rustc_hash::FxHashMap;
use serde_json::Value as Json;

use crate::codec::encode::{EncodeOptions, EncodedParts, OutputTable};
use crate::codec::pointer::{
    format_pointer, from_base63, is_base63_byte, to_base63, Tag,
};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{
    FORMAT_VERSION, MAX_PARTS_PER_SLOT, MAX_POINTERS_PER_PART, MAX_TABLE_SLOTS, MAX_TEXT_LEN,
    MAX_WIRE_LEN,
};
use crate::registry::{is_simple_tag, Compression, Registry};

/// Decompressed content of one table slot, as the decoder sees it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawSlot {
    Text(String),
    Grid(Vec<Vec<String>>),
}

impl RawSlot {
    /// The slot's text, for primitive kinds.
    pub fn text(&self) -> Option<&str> {
        match self {
            RawSlot::Text(s) => Some(s),
            RawSlot::Grid(_) => None,
        }
    }

    /// The slot's pointer grid, for node kinds.
    pub fn grid(&self) -> Option<&[Vec<String>]> {
        match self {
            RawSlot::Text(_) => None,
            RawSlot::Grid(rows) => Some(rows),
        }
    }

    /// One part of the grid; absent parts read as empty.
    pub fn part(&self, index: usize) -> &[String] {
        self.grid()
            .and_then(|rows| rows.get(index))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// One pointer token of a part.
    pub fn token(&self, part: usize, index: usize) -> Option<&str> {
        self.part(part).get(index).map(String::as_str)
    }
}

// =============================================================================
// ASSEMBLY
// =============================================================================

/// Assembles the output tables into the final wire text.
pub(crate) fn assemble(
    output: &OutputTable,
    registry: &Registry,
    root: &str,
    options: &EncodeOptions,
) -> Result<String, EncodeError> {
    let mut payload = vec![Json::from(root), Json::from(FORMAT_VERSION)];

    for (tag, slots) in output.iter() {
        let compression = registry
            .adapter(tag)
            .map(|adapter| adapter.compression())
            .unwrap_or(Compression::None);
        let values = if options.compress {
            compress_table(compression, slots)?
        } else {
            raw_table(slots)
        };
        payload.push(Json::from(vec![Json::from(tag.as_char().to_string()), values]));
    }

    let payload = Json::from(payload);
    let text = if options.pretty {
        serde_json::to_string_pretty(&payload)
    } else {
        serde_json::to_string(&payload)
    };
    text.map_err(|e| EncodeError::Json(e.to_string()))
}

/// Renders a table without compression: text slots as strings, grids as
/// nested arrays of pointer tokens.
fn raw_table(slots: &[Option<EncodedParts>]) -> Json {
    let items: Vec<Json> = slots
        .iter()
        .map(|slot| match slot {
            Some(EncodedParts::Text(text)) => Json::from(text.as_str()),
            Some(EncodedParts::Grid(grid)) => Json::from(
                grid.iter()
                    .map(|part| Json::from(part.clone()))
                    .collect::<Vec<Json>>(),
            ),
            None => Json::Array(Vec::new()),
        })
        .collect();
    Json::from(items)
}

/// Renders a table through its compression class.
fn compress_table(
    compression: Compression,
    slots: &[Option<EncodedParts>],
) -> Result<Json, EncodeError> {
    match compression {
        Compression::None => Ok(raw_table(slots)),
        Compression::Delimited => {
            let joined = slots
                .iter()
                .map(|slot| match slot {
                    Some(EncodedParts::Text(text)) => text.as_str(),
                    _ => "",
                })
                .collect::<Vec<&str>>()
                .join(",");
            Ok(Json::from(joined))
        }
        Compression::PointerGrid => {
            let mut rendered = Vec::with_capacity(slots.len());
            for slot in slots {
                let grid: &[Vec<String>] = match slot {
                    Some(EncodedParts::Grid(grid)) => grid,
                    _ => &[],
                };
                let parts = grid
                    .iter()
                    .map(|part| compress_part(part))
                    .collect::<Result<Vec<String>, EncodeError>>()?;
                rendered.push(parts.join(" "));
            }
            Ok(Json::from(rendered.join(",")))
        }
    }
}

/// Joins a part's tokens with their indices rendered in base 63. The
/// disjoint tag and digit alphabets make the join self-delimiting.
fn compress_part(part: &[String]) -> Result<String, EncodeError> {
    let mut out = String::new();
    for token in part {
        let bytes = token.as_bytes();
        match bytes.split_first().and_then(|(&b, rest)| {
            let tag = Tag::from_byte(b)?;
            Some((tag, rest))
        }) {
            Some((tag, rest)) if rest.is_empty() && is_simple_tag(tag) => {
                out.push(tag.as_char());
            }
            Some((tag, rest)) => {
                let index: usize = std::str::from_utf8(rest)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| EncodeError::Json(format!("bad pointer token {token:?}")))?;
                out.push(tag.as_char());
                out.push_str(&to_base63(index));
            }
            None => return Err(EncodeError::Json(format!("bad pointer token {token:?}"))),
        }
    }
    Ok(out)
}

// =============================================================================
// PARSING
// =============================================================================

/// Parsed and decompressed payload.
pub(crate) struct ParsedPayload {
    pub root: String,
    pub tables: FxHashMap<Tag, Vec<RawSlot>>,
}

/// Parses wire text into per-tag tables, decompressing value lists.
///
/// Tables for tags the registry does not know are skipped; whether a
/// pointer into such a table is an error is decided at resolution time.
pub(crate) fn parse_payload(text: &str, registry: &Registry) -> Result<ParsedPayload, DecodeError> {
    if text.len() > MAX_WIRE_LEN {
        return Err(DecodeError::LengthExceedsLimit {
            field: "wire text",
            len: text.len(),
            max: MAX_WIRE_LEN,
        });
    }

    let parsed: Json = serde_json::from_str(text).map_err(|e| DecodeError::Json(e.to_string()))?;
    let entries = parsed.as_array().ok_or(DecodeError::InvalidPayload {
        context: "expected a top-level array",
    })?;

    let root = entries
        .first()
        .and_then(Json::as_str)
        .ok_or(DecodeError::InvalidPayload {
            context: "missing root pointer",
        })?
        .to_string();

    let version = entries
        .get(1)
        .and_then(Json::as_str)
        .ok_or(DecodeError::InvalidPayload {
            context: "missing format version",
        })?;
    if version != FORMAT_VERSION {
        return Err(DecodeError::UnsupportedVersion {
            version: version.to_string(),
        });
    }

    let mut tables = FxHashMap::default();
    for entry in &entries[2..] {
        let pair = entry.as_array().ok_or(DecodeError::InvalidPayload {
            context: "expected a [tag, values] pair",
        })?;
        let tag_str = pair.first().and_then(Json::as_str).unwrap_or("");
        let tag = match tag_str.as_bytes() {
            [byte] => Tag::from_byte(*byte).ok_or(DecodeError::InvalidPayload {
                context: "invalid table tag",
            })?,
            _ => {
                return Err(DecodeError::InvalidPayload {
                    context: "invalid table tag",
                })
            }
        };
        if is_simple_tag(tag) {
            return Err(DecodeError::InvalidPayload {
                context: "simple tags carry no table",
            });
        }

        // Unknown tag: keep the payload opaque. Lenient decoding drops
        // pointers into it; strict decoding fails on first reference.
        let Some(adapter) = registry.adapter(tag) else {
            continue;
        };

        let values = pair.get(1).unwrap_or(&Json::Null);
        let slots = match values {
            Json::String(joined) => decompress_table(adapter.compression(), joined)?,
            Json::Array(items) => raw_slots(items)?,
            _ => {
                return Err(DecodeError::InvalidPayload {
                    context: "table values must be a string or array",
                })
            }
        };
        if slots.len() > MAX_TABLE_SLOTS {
            return Err(DecodeError::LengthExceedsLimit {
                field: "table slots",
                len: slots.len(),
                max: MAX_TABLE_SLOTS,
            });
        }
        tables.insert(tag, slots);
    }

    Ok(ParsedPayload { root, tables })
}

/// Parses an uncompressed table: strings are text slots, nested arrays
/// are pointer grids.
fn raw_slots(items: &[Json]) -> Result<Vec<RawSlot>, DecodeError> {
    let mut slots = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Json::String(text) => {
                check_text_len(text)?;
                slots.push(RawSlot::Text(text.clone()));
            }
            Json::Array(parts) => {
                if parts.len() > MAX_PARTS_PER_SLOT {
                    return Err(DecodeError::LengthExceedsLimit {
                        field: "slot parts",
                        len: parts.len(),
                        max: MAX_PARTS_PER_SLOT,
                    });
                }
                let mut grid = Vec::with_capacity(parts.len());
                for part in parts {
                    let tokens = part.as_array().ok_or(DecodeError::InvalidPayload {
                        context: "grid part must be an array",
                    })?;
                    if tokens.len() > MAX_POINTERS_PER_PART {
                        return Err(DecodeError::LengthExceedsLimit {
                            field: "part pointers",
                            len: tokens.len(),
                            max: MAX_POINTERS_PER_PART,
                        });
                    }
                    let mut row = Vec::with_capacity(tokens.len());
                    for token in tokens {
                        let token = token.as_str().ok_or(DecodeError::InvalidPayload {
                            context: "pointer token must be a string",
                        })?;
                        row.push(token.to_string());
                    }
                    grid.push(row);
                }
                slots.push(RawSlot::Grid(grid));
            }
            _ => {
                return Err(DecodeError::InvalidPayload {
                    context: "slot must be a string or array",
                })
            }
        }
    }
    Ok(slots)
}

/// Reverses a compression class over a joined table string.
fn decompress_table(compression: Compression, joined: &str) -> Result<Vec<RawSlot>, DecodeError> {
    match compression {
        Compression::None => Err(DecodeError::InvalidPayload {
            context: "uncompressible table rendered as a string",
        }),
        Compression::Delimited => {
            check_text_len(joined)?;
            Ok(joined
                .split(',')
                .map(|slot| RawSlot::Text(slot.to_string()))
                .collect())
        }
        Compression::PointerGrid => {
            let mut slots = Vec::new();
            for slot in joined.split(',') {
                let mut grid = Vec::new();
                for part in slot.split(' ') {
                    grid.push(split_grid_part(part)?);
                    if grid.len() > MAX_PARTS_PER_SLOT {
                        return Err(DecodeError::LengthExceedsLimit {
                            field: "slot parts",
                            len: grid.len(),
                            max: MAX_PARTS_PER_SLOT,
                        });
                    }
                }
                slots.push(RawSlot::Grid(grid));
            }
            Ok(slots)
        }
    }
}

/// Splits a compressed pointer run back into decimal-index tokens.
fn split_grid_part(part: &str) -> Result<Vec<String>, DecodeError> {
    let bytes = part.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let tag = Tag::from_byte(bytes[i]).ok_or_else(|| DecodeError::MalformedPointer {
            token: part.to_string(),
        })?;
        i += 1;
        if is_simple_tag(tag) {
            tokens.push(tag.as_char().to_string());
        } else {
            let start = i;
            while i < bytes.len() && is_base63_byte(bytes[i]) {
                i += 1;
            }
            let index =
                from_base63(&bytes[start..i]).ok_or_else(|| DecodeError::MalformedPointer {
                    token: part.to_string(),
                })?;
            tokens.push(format_pointer(tag, index));
        }
        if tokens.len() > MAX_POINTERS_PER_PART {
            return Err(DecodeError::LengthExceedsLimit {
                field: "part pointers",
                len: tokens.len(),
                max: MAX_POINTERS_PER_PART,
            });
        }
    }
    Ok(tokens)
}

fn check_text_len(text: &str) -> Result<(), DecodeError> {
    if text.len() > MAX_TEXT_LEN {
        return Err(DecodeError::LengthExceedsLimit {
            field: "text slot",
            len: text.len(),
            max: MAX_TEXT_LEN,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_grid_part_simple_run() {
        // Adjacent simple pointers self-delimit without indices.
        let tokens = split_grid_part("KLTC").unwrap();
        assert_eq!(tokens, vec!["K", "L", "T", "C"]);
    }

    #[test]
    fn test_split_grid_part_mixed_run() {
        let tokens = split_grid_part("N0KA10S~").unwrap();
        assert_eq!(tokens, vec!["N0", "K", "A63", "S62"]);
    }

    #[test]
    fn test_split_grid_part_requires_index() {
        // A non-simple tag with no digit run is malformed.
        assert!(matches!(
            split_grid_part("A"),
            Err(DecodeError::MalformedPointer { .. })
        ));
        assert!(matches!(
            split_grid_part("0A"),
            Err(DecodeError::MalformedPointer { .. })
        ));
    }

    #[test]
    fn test_compress_part_roundtrip() {
        let part: Vec<String> = ["A0", "K", "N12", "S63", "C"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let joined = compress_part(&part).unwrap();
        assert_eq!(joined, "A0KNcS10C");
        assert_eq!(split_grid_part(&joined).unwrap(), part);
    }

    #[test]
    fn test_version_check() {
        let registry = Registry::full();
        let result = parse_payload(r#"["K","999"]"#, &registry);
        assert!(matches!(
            result,
            Err(DecodeError::UnsupportedVersion { version }) if version == "999"
        ));
    }

    #[test]
    fn test_unknown_table_skipped() {
        let registry = Registry::full();
        // Z is a valid tag byte with no registered kind.
        let payload = parse_payload(r#"["K","1",["Z","whatever"]]"#, &registry).unwrap();
        assert!(payload.tables.is_empty());
        assert_eq!(payload.root, "K");
    }

    #[test]
    fn test_invalid_payload_shapes() {
        let registry = Registry::full();
        for text in ["{}", "[]", r#"[3,"1"]"#, r#"["K"]"#, r#"["K","1",["AB",[]]]"#] {
            assert!(parse_payload(text, &registry).is_err(), "accepted {text:?}");
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_grid_part_roundtrip(indices in proptest::collection::vec(0usize..100_000, 0..20)) {
            let part: Vec<String> = indices
                .iter()
                .map(|&i| format_pointer(Tag::from_byte(b'A').unwrap(), i))
                .collect();
            let joined = compress_part(&part).unwrap();
            proptest::prop_assert_eq!(split_grid_part(&joined).unwrap(), part);
        }
    }
}
