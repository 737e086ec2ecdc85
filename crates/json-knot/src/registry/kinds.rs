//! Built-in kind adapters.
//!
//! Each adapter is a unit struct implementing [`KindAdapter`] for one tag.
//! These are deliberately mechanical; the interesting logic lives in the
//! engine, which calls them through the registry only.

use futures::future::LocalBoxFuture;

use crate::codec::decode::{attach_props, fill_part, DecodeStore, DecodedItem};
use crate::codec::pointer::Tag;
use crate::codec::wire::RawSlot;
use crate::error::DecodeError;
use crate::model::{BlobData, Node, NodeBody, Value};
use crate::registry::{tags, Compression, KindAdapter, SerialParts};

/// All built-in adapters, in catalogue order.
pub(crate) fn catalogue() -> [&'static dyn KindAdapter; 13] {
    [
        &TextKind,
        &NumberKind,
        &BigIntKind,
        &SequenceKind,
        &RecordKind,
        &OrderedSetKind,
        &OrderedMapKind,
        &BytesKind,
        &BoxedKind,
        &TimestampKind,
        &PatternKind,
        &FaultKind,
        &BlobKind,
    ]
}

/// Appends the attachment key/value parts when the node has any.
fn with_attachments(mut parts: Vec<Vec<Value>>, props: &[(Value, Value)]) -> Vec<Vec<Value>> {
    if !props.is_empty() {
        parts.push(props.iter().map(|(k, _)| k.clone()).collect());
        parts.push(props.iter().map(|(_, v)| v.clone()).collect());
    }
    parts
}

/// Scalar expected at a grid position, resolved eagerly from raw slots.
fn scalar_at(
    store: &DecodeStore<'_>,
    slot: &RawSlot,
    part: usize,
    index: usize,
    tag: Tag,
    context: &'static str,
) -> Result<Value, DecodeError> {
    let token = slot.token(part, index).ok_or(DecodeError::MalformedParts {
        tag: tag.as_char(),
        context,
    })?;
    store.decode_scalar(token)
}

fn text_at(
    store: &DecodeStore<'_>,
    slot: &RawSlot,
    part: usize,
    index: usize,
    tag: Tag,
    context: &'static str,
) -> Result<String, DecodeError> {
    match scalar_at(store, slot, part, index, tag, context)? {
        Value::Text(s) => Ok(s),
        _ => Err(DecodeError::MalformedParts {
            tag: tag.as_char(),
            context,
        }),
    }
}

fn number_at(
    store: &DecodeStore<'_>,
    slot: &RawSlot,
    part: usize,
    index: usize,
    tag: Tag,
    context: &'static str,
) -> Result<f64, DecodeError> {
    match scalar_at(store, slot, part, index, tag, context)? {
        Value::Number(n) => Ok(n),
        _ => Err(DecodeError::MalformedParts {
            tag: tag.as_char(),
            context,
        }),
    }
}

/// Decodes a part of byte-valued number pointers.
fn bytes_from_part(
    store: &DecodeStore<'_>,
    part: &[String],
    tag: Tag,
) -> Result<Vec<u8>, DecodeError> {
    let mut bytes = Vec::with_capacity(part.len());
    for token in part {
        match store.decode_scalar(token)? {
            Value::Number(n) if (0.0..=255.0).contains(&n) => bytes.push(n as u8),
            _ => {
                return Err(DecodeError::MalformedParts {
                    tag: tag.as_char(),
                    context: "byte value out of range",
                })
            }
        }
    }
    Ok(bytes)
}

/// Runs `f` against the mutable node behind a decoded item's reference.
fn with_node<F: FnOnce(&mut Node)>(item: &DecodedItem, f: F) {
    if let Some(Value::Node(node)) = &item.reference {
        f(&mut node.borrow_mut());
    }
}

// =============================================================================
// PRIMITIVE KINDS
// =============================================================================

pub struct TextKind;

impl KindAdapter for TextKind {
    fn tag(&self) -> Tag {
        tags::TEXT
    }

    fn compression(&self) -> Compression {
        Compression::None
    }

    fn serialize(&self, value: &Value) -> SerialParts {
        match value {
            Value::Text(s) => SerialParts::Text(s.clone()),
            _ => SerialParts::Text(String::new()),
        }
    }

    fn generate(&self, _store: &DecodeStore<'_>, slot: &RawSlot) -> Result<Value, DecodeError> {
        let text = slot.text().ok_or(DecodeError::MalformedParts {
            tag: 'S',
            context: "expected a text slot",
        })?;
        Ok(Value::Text(text.to_string()))
    }

    fn populate(&self, _store: &DecodeStore<'_>, _item: &DecodedItem) -> Result<(), DecodeError> {
        Ok(())
    }
}

pub struct NumberKind;

impl KindAdapter for NumberKind {
    fn tag(&self) -> Tag {
        tags::NUMBER
    }

    fn compression(&self) -> Compression {
        Compression::Delimited
    }

    fn serialize(&self, value: &Value) -> SerialParts {
        match value {
            // Non-finite and negative-zero numbers take the simple-tag
            // fast path and never reach this adapter.
            Value::Number(n) => SerialParts::Text(format!("{n}")),
            _ => SerialParts::Text(String::new()),
        }
    }

    fn generate(&self, _store: &DecodeStore<'_>, slot: &RawSlot) -> Result<Value, DecodeError> {
        let literal = slot.text().ok_or(DecodeError::MalformedParts {
            tag: 'N',
            context: "expected a number literal",
        })?;
        let n: f64 = literal.parse().map_err(|_| DecodeError::MalformedParts {
            tag: 'N',
            context: "invalid number literal",
        })?;
        Ok(Value::Number(n))
    }

    fn populate(&self, _store: &DecodeStore<'_>, _item: &DecodedItem) -> Result<(), DecodeError> {
        Ok(())
    }
}

pub struct BigIntKind;

impl KindAdapter for BigIntKind {
    fn tag(&self) -> Tag {
        tags::BIGINT
    }

    fn compression(&self) -> Compression {
        Compression::Delimited
    }

    fn serialize(&self, value: &Value) -> SerialParts {
        match value {
            Value::BigInt(i) => SerialParts::Text(format!("{i}")),
            _ => SerialParts::Text(String::new()),
        }
    }

    fn generate(&self, _store: &DecodeStore<'_>, slot: &RawSlot) -> Result<Value, DecodeError> {
        let literal = slot.text().ok_or(DecodeError::MalformedParts {
            tag: '_',
            context: "expected an integer literal",
        })?;
        let i: i128 = literal.parse().map_err(|_| DecodeError::MalformedParts {
            tag: '_',
            context: "invalid integer literal",
        })?;
        Ok(Value::BigInt(i))
    }

    fn populate(&self, _store: &DecodeStore<'_>, _item: &DecodedItem) -> Result<(), DecodeError> {
        Ok(())
    }
}

// =============================================================================
// CONTAINER KINDS
// =============================================================================

pub struct SequenceKind;

impl KindAdapter for SequenceKind {
    fn tag(&self) -> Tag {
        tags::SEQUENCE
    }

    fn compression(&self) -> Compression {
        Compression::PointerGrid
    }

    fn serialize(&self, value: &Value) -> SerialParts {
        let mut items = Vec::new();
        let mut props = Vec::new();
        if let Some(node) = value.as_node() {
            let node = node.borrow();
            if let NodeBody::Sequence(body) = &node.body {
                items = body.clone();
            }
            props = node.props.clone();
        }
        SerialParts::Grid(with_attachments(vec![items], &props))
    }

    fn generate(&self, _store: &DecodeStore<'_>, _slot: &RawSlot) -> Result<Value, DecodeError> {
        Ok(Value::sequence(Vec::new()))
    }

    fn populate(&self, store: &DecodeStore<'_>, item: &DecodedItem) -> Result<(), DecodeError> {
        let items = fill_part(store, item, 0);
        with_node(item, |node| {
            if let NodeBody::Sequence(body) = &mut node.body {
                *body = items;
            }
        });
        attach_props(store, item, 1)?;
        Ok(())
    }
}

pub struct RecordKind;

impl KindAdapter for RecordKind {
    fn tag(&self) -> Tag {
        tags::RECORD
    }

    fn compression(&self) -> Compression {
        Compression::PointerGrid
    }

    fn serialize(&self, value: &Value) -> SerialParts {
        // Records carry everything in attachments. This adapter also
        // serializes the lenient-mode placeholder for unsupported values,
        // so it must not assume the body variant.
        let props = match value.as_node() {
            Some(node) => node.borrow().props.clone(),
            None => Vec::new(),
        };
        SerialParts::Grid(with_attachments(Vec::new(), &props))
    }

    fn generate(&self, _store: &DecodeStore<'_>, _slot: &RawSlot) -> Result<Value, DecodeError> {
        Ok(Value::record())
    }

    fn populate(&self, store: &DecodeStore<'_>, item: &DecodedItem) -> Result<(), DecodeError> {
        attach_props(store, item, 0)?;
        Ok(())
    }
}

pub struct OrderedSetKind;

impl KindAdapter for OrderedSetKind {
    fn tag(&self) -> Tag {
        tags::ORDERED_SET
    }

    fn compression(&self) -> Compression {
        Compression::PointerGrid
    }

    fn serialize(&self, value: &Value) -> SerialParts {
        let mut members = Vec::new();
        let mut props = Vec::new();
        if let Some(node) = value.as_node() {
            let node = node.borrow();
            if let NodeBody::OrderedSet(body) = &node.body {
                members = body.clone();
            }
            props = node.props.clone();
        }
        SerialParts::Grid(with_attachments(vec![members], &props))
    }

    fn generate(&self, _store: &DecodeStore<'_>, _slot: &RawSlot) -> Result<Value, DecodeError> {
        Ok(Value::ordered_set(Vec::new()))
    }

    fn populate(&self, store: &DecodeStore<'_>, item: &DecodedItem) -> Result<(), DecodeError> {
        let members = fill_part(store, item, 0);
        with_node(item, |node| {
            if let NodeBody::OrderedSet(body) = &mut node.body {
                *body = members;
            }
        });
        attach_props(store, item, 1)?;
        Ok(())
    }
}

pub struct OrderedMapKind;

impl KindAdapter for OrderedMapKind {
    fn tag(&self) -> Tag {
        tags::ORDERED_MAP
    }

    fn compression(&self) -> Compression {
        Compression::PointerGrid
    }

    fn serialize(&self, value: &Value) -> SerialParts {
        let mut keys = Vec::new();
        let mut values = Vec::new();
        let mut props = Vec::new();
        if let Some(node) = value.as_node() {
            let node = node.borrow();
            if let NodeBody::OrderedMap(entries) = &node.body {
                keys = entries.iter().map(|(k, _)| k.clone()).collect();
                values = entries.iter().map(|(_, v)| v.clone()).collect();
            }
            props = node.props.clone();
        }
        SerialParts::Grid(with_attachments(vec![keys, values], &props))
    }

    fn generate(&self, _store: &DecodeStore<'_>, _slot: &RawSlot) -> Result<Value, DecodeError> {
        Ok(Value::ordered_map(Vec::new()))
    }

    fn populate(&self, store: &DecodeStore<'_>, item: &DecodedItem) -> Result<(), DecodeError> {
        let keys = fill_part(store, item, 0);
        let values = fill_part(store, item, 1);
        let entries: Vec<(Value, Value)> = keys.into_iter().zip(values).collect();
        with_node(item, |node| {
            if let NodeBody::OrderedMap(body) = &mut node.body {
                *body = entries;
            }
        });
        attach_props(store, item, 2)?;
        Ok(())
    }
}

pub struct BytesKind;

impl KindAdapter for BytesKind {
    fn tag(&self) -> Tag {
        tags::BYTES
    }

    fn compression(&self) -> Compression {
        Compression::PointerGrid
    }

    fn serialize(&self, value: &Value) -> SerialParts {
        let mut bytes = Vec::new();
        let mut props = Vec::new();
        if let Some(node) = value.as_node() {
            let node = node.borrow();
            if let NodeBody::Bytes(body) = &node.body {
                bytes = body.iter().map(|&b| Value::Number(f64::from(b))).collect();
            }
            props = node.props.clone();
        }
        SerialParts::Grid(with_attachments(vec![bytes], &props))
    }

    fn generate(&self, store: &DecodeStore<'_>, slot: &RawSlot) -> Result<Value, DecodeError> {
        // Byte content is scalar-valued and cannot participate in a
        // cycle, so it decodes eagerly here rather than in populate.
        let bytes = bytes_from_part(store, slot.part(0), tags::BYTES)?;
        Ok(Value::bytes(bytes))
    }

    fn populate(&self, store: &DecodeStore<'_>, item: &DecodedItem) -> Result<(), DecodeError> {
        attach_props(store, item, 1)?;
        Ok(())
    }
}

pub struct BoxedKind;

impl KindAdapter for BoxedKind {
    fn tag(&self) -> Tag {
        tags::BOXED
    }

    fn compression(&self) -> Compression {
        Compression::PointerGrid
    }

    fn serialize(&self, value: &Value) -> SerialParts {
        let mut inner = Value::Undefined;
        let mut props = Vec::new();
        if let Some(node) = value.as_node() {
            let node = node.borrow();
            if let NodeBody::Boxed(body) = &node.body {
                inner = body.clone();
            }
            props = node.props.clone();
        }
        SerialParts::Grid(with_attachments(vec![vec![inner]], &props))
    }

    fn generate(&self, _store: &DecodeStore<'_>, _slot: &RawSlot) -> Result<Value, DecodeError> {
        // The wrapped value may itself be a node, so it resolves in
        // populate against an allocated shell.
        Ok(Value::boxed(Value::Undefined))
    }

    fn populate(&self, store: &DecodeStore<'_>, item: &DecodedItem) -> Result<(), DecodeError> {
        let inner = match item.slot.token(0, 0) {
            Some(token) => store.resolve(token),
            None if store.lenient() => Value::Undefined,
            None => {
                return Err(DecodeError::MalformedParts {
                    tag: 'B',
                    context: "missing wrapped value",
                })
            }
        };
        with_node(item, |node| {
            if let NodeBody::Boxed(body) = &mut node.body {
                *body = inner;
            }
        });
        attach_props(store, item, 1)?;
        Ok(())
    }
}

pub struct TimestampKind;

impl KindAdapter for TimestampKind {
    fn tag(&self) -> Tag {
        tags::TIMESTAMP
    }

    fn compression(&self) -> Compression {
        Compression::PointerGrid
    }

    fn serialize(&self, value: &Value) -> SerialParts {
        let mut millis = 0i64;
        let mut props = Vec::new();
        if let Some(node) = value.as_node() {
            let node = node.borrow();
            if let NodeBody::Timestamp(body) = &node.body {
                millis = *body;
            }
            props = node.props.clone();
        }
        SerialParts::Grid(with_attachments(
            vec![vec![Value::Number(millis as f64)]],
            &props,
        ))
    }

    fn generate(&self, store: &DecodeStore<'_>, slot: &RawSlot) -> Result<Value, DecodeError> {
        let millis = number_at(store, slot, 0, 0, tags::TIMESTAMP, "missing milliseconds")?;
        Ok(Value::timestamp(millis as i64))
    }

    fn populate(&self, store: &DecodeStore<'_>, item: &DecodedItem) -> Result<(), DecodeError> {
        attach_props(store, item, 1)?;
        Ok(())
    }
}

pub struct PatternKind;

impl KindAdapter for PatternKind {
    fn tag(&self) -> Tag {
        tags::PATTERN
    }

    fn compression(&self) -> Compression {
        Compression::PointerGrid
    }

    fn serialize(&self, value: &Value) -> SerialParts {
        let mut state = vec![
            Value::text(""),
            Value::text(""),
            Value::Number(0.0),
        ];
        let mut props = Vec::new();
        if let Some(node) = value.as_node() {
            let node = node.borrow();
            if let NodeBody::Pattern {
                source,
                flags,
                last_index,
            } = &node.body
            {
                state = vec![
                    Value::text(source.clone()),
                    Value::text(flags.clone()),
                    Value::Number(*last_index as f64),
                ];
            }
            props = node.props.clone();
        }
        SerialParts::Grid(with_attachments(vec![state], &props))
    }

    fn generate(&self, store: &DecodeStore<'_>, slot: &RawSlot) -> Result<Value, DecodeError> {
        let source = text_at(store, slot, 0, 0, tags::PATTERN, "missing source")?;
        let flags = text_at(store, slot, 0, 1, tags::PATTERN, "missing flags")?;
        let last_index = number_at(store, slot, 0, 2, tags::PATTERN, "missing last index")?;
        Ok(Value::Node(Node::new(NodeBody::Pattern {
            source,
            flags,
            last_index: last_index as u64,
        })))
    }

    fn populate(&self, store: &DecodeStore<'_>, item: &DecodedItem) -> Result<(), DecodeError> {
        attach_props(store, item, 1)?;
        Ok(())
    }
}

pub struct FaultKind;

impl KindAdapter for FaultKind {
    fn tag(&self) -> Tag {
        tags::FAULT
    }

    fn compression(&self) -> Compression {
        Compression::PointerGrid
    }

    fn serialize(&self, value: &Value) -> SerialParts {
        let mut state = vec![Value::text(""), Value::text(""), Value::text("")];
        let mut props = Vec::new();
        if let Some(node) = value.as_node() {
            let node = node.borrow();
            if let NodeBody::Fault {
                name,
                message,
                trace,
            } = &node.body
            {
                state = vec![
                    Value::text(name.clone()),
                    Value::text(message.clone()),
                    Value::text(trace.clone()),
                ];
            }
            props = node.props.clone();
        }
        SerialParts::Grid(with_attachments(vec![state], &props))
    }

    fn generate(&self, store: &DecodeStore<'_>, slot: &RawSlot) -> Result<Value, DecodeError> {
        let name = text_at(store, slot, 0, 0, tags::FAULT, "missing name")?;
        let message = text_at(store, slot, 0, 1, tags::FAULT, "missing message")?;
        let trace = text_at(store, slot, 0, 2, tags::FAULT, "missing trace")?;
        Ok(Value::fault(name, message, trace))
    }

    fn populate(&self, store: &DecodeStore<'_>, item: &DecodedItem) -> Result<(), DecodeError> {
        attach_props(store, item, 1)?;
        Ok(())
    }
}

pub struct BlobKind;

impl KindAdapter for BlobKind {
    fn tag(&self) -> Tag {
        tags::BLOB
    }

    fn compression(&self) -> Compression {
        Compression::PointerGrid
    }

    fn serialize(&self, value: &Value) -> SerialParts {
        let mut data = Value::Undefined;
        let mut content_type = Value::text("");
        let mut props = Vec::new();
        if let Some(node) = value.as_node() {
            let node = node.borrow();
            if let NodeBody::Blob {
                content_type: ct,
                data: blob_data,
            } = &node.body
            {
                content_type = Value::text(ct.clone());
                if let BlobData::Ready(bytes) = blob_data {
                    data = Value::bytes(bytes.clone());
                }
                // Deferred data keeps the undefined placeholder; the
                // completion wave patches the real pointer in.
            }
            props = node.props.clone();
        }
        SerialParts::Grid(with_attachments(vec![vec![data, content_type]], &props))
    }

    fn is_deferred(&self, value: &Value) -> bool {
        match value.as_node() {
            Some(node) => matches!(
                node.borrow().body,
                NodeBody::Blob {
                    data: BlobData::Deferred(Some(_)),
                    ..
                }
            ),
            None => false,
        }
    }

    fn take_deferred(&self, value: &Value) -> Option<LocalBoxFuture<'static, Vec<u8>>> {
        let node = value.as_node()?;
        match &mut node.borrow_mut().body {
            NodeBody::Blob {
                data: BlobData::Deferred(pending),
                ..
            } => pending.take(),
            _ => None,
        }
    }

    fn generate(&self, store: &DecodeStore<'_>, slot: &RawSlot) -> Result<Value, DecodeError> {
        let data_token = slot.token(0, 0).ok_or(DecodeError::MalformedParts {
            tag: 'Y',
            context: "missing data pointer",
        })?;

        // A blob that was never produced (lenient encode without the
        // barrier) keeps the undefined placeholder and decodes empty.
        let bytes = if data_token == "K" {
            Vec::new()
        } else {
            let pointer = crate::codec::pointer::parse_pointer(data_token)?;
            if pointer.tag != tags::BYTES {
                return Err(DecodeError::MalformedParts {
                    tag: 'Y',
                    context: "data pointer is not a bytes pointer",
                });
            }
            let raw = store
                .raw_slot(pointer.tag, pointer.index)
                .ok_or(DecodeError::IndexOutOfBounds {
                    tag: pointer.tag.as_char(),
                    index: pointer.index,
                    size: store.table_len(pointer.tag),
                })?;
            bytes_from_part(store, raw.part(0), tags::BLOB)?
        };

        let content_type = text_at(store, slot, 0, 1, tags::BLOB, "missing content type")?;
        Ok(Value::blob(content_type, bytes))
    }

    fn populate(&self, store: &DecodeStore<'_>, item: &DecodedItem) -> Result<(), DecodeError> {
        attach_props(store, item, 1)?;
        Ok(())
    }
}
