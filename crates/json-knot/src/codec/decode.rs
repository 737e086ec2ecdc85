//! Decode pipeline: exploration and population.
//!
//! Decoding mirrors the two-phase encoder. The explore phase walks
//! pointers breadth-first from the root and allocates an empty shell for
//! every referenced slot before any content is filled in; the build phase
//! then populates each shell, resolving nested pointers against the
//! already-allocated shells. A cycle therefore resolves to a reference
//! into the graph under construction rather than recursing.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;

use crate::codec::pointer::{parse_pointer, Tag};
use crate::codec::wire::{self, RawSlot};
use crate::error::DecodeError;
use crate::registry::{simple_value, tags, Registry, DEFAULT_REGISTRY};
use crate::model::Value;

/// Options for decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    /// Degrade malformed references to `Undefined` instead of failing.
    /// Length limits stay fatal in both modes.
    pub lenient: bool,
}

/// One explored slot: its raw parts plus the shell allocated for it.
///
/// `reference` is `None` when lenient decoding swallowed a generation
/// failure; pointers to such an item resolve to `Undefined`.
#[derive(Debug)]
pub struct DecodedItem {
    pub tag: Tag,
    pub index: usize,
    pub token: String,
    pub slot: RawSlot,
    pub reference: Option<Value>,
}

/// Per-call decoding state, shared with kind adapters.
pub struct DecodeStore<'a> {
    registry: &'a Registry,
    options: &'a DecodeOptions,
    tables: FxHashMap<Tag, Vec<RawSlot>>,
    decoded: FxHashMap<String, DecodedItem>,
    order: Vec<String>,
}

impl<'a> DecodeStore<'a> {
    pub fn lenient(&self) -> bool {
        self.options.lenient
    }

    /// Raw slot content for a pointer, if the payload carries it.
    pub fn raw_slot(&self, tag: Tag, index: usize) -> Option<&RawSlot> {
        self.tables.get(&tag)?.get(index)
    }

    /// Number of slots in a tag's table.
    pub fn table_len(&self, tag: Tag) -> usize {
        self.tables.get(&tag).map(Vec::len).unwrap_or(0)
    }

    /// Resolves a pointer token against the explored graph.
    ///
    /// Every token reachable from the root was explored before the build
    /// phase runs, so a miss here means the reference was dropped in
    /// lenient mode; it resolves to `Undefined`.
    pub fn resolve(&self, token: &str) -> Value {
        if let Some(value) = simple_value(token) {
            return value;
        }
        self.decoded
            .get(token)
            .and_then(|item| item.reference.clone())
            .unwrap_or(Value::Undefined)
    }

    /// Decodes a scalar-valued token eagerly from its raw slot.
    ///
    /// Only simple tags and the primitive kinds are accepted: those
    /// decode without following further pointers, so a crafted payload
    /// cannot recurse through this path.
    pub fn decode_scalar(&self, token: &str) -> Result<Value, DecodeError> {
        if let Some(value) = simple_value(token) {
            return Ok(value);
        }
        let pointer = parse_pointer(token)?;
        if pointer.tag != tags::TEXT && pointer.tag != tags::NUMBER && pointer.tag != tags::BIGINT
        {
            return Err(DecodeError::MalformedParts {
                tag: pointer.tag.as_char(),
                context: "expected a scalar pointer",
            });
        }
        let adapter =
            self.registry
                .adapter(pointer.tag)
                .ok_or(DecodeError::UnrecognizedTag {
                    tag: pointer.tag.as_char().to_string(),
                })?;
        let slot =
            self.raw_slot(pointer.tag, pointer.index)
                .ok_or(DecodeError::IndexOutOfBounds {
                    tag: pointer.tag.as_char(),
                    index: pointer.index,
                    size: self.table_len(pointer.tag),
                })?;
        adapter.generate(self, slot)
    }
}

/// Resolves every token of one grid part.
pub fn fill_part(store: &DecodeStore<'_>, item: &DecodedItem, part: usize) -> Vec<Value> {
    item.slot
        .part(part)
        .iter()
        .map(|token| store.resolve(token))
        .collect()
}

/// Attaches key/value pairs from a pair of grid parts to the item's node.
/// Absent parts attach nothing.
///
/// The two parts must be the same length; strict decoding rejects a
/// mismatch, lenient decoding attaches the pairs that line up.
pub fn attach_props(
    store: &DecodeStore<'_>,
    item: &DecodedItem,
    key_part: usize,
) -> Result<(), DecodeError> {
    let keys = item.slot.part(key_part);
    let values = item.slot.part(key_part + 1);
    if keys.len() != values.len() && !store.lenient() {
        return Err(DecodeError::MalformedParts {
            tag: item.tag.as_char(),
            context: "attachment key/value length mismatch",
        });
    }
    if let Some(Value::Node(node)) = &item.reference {
        let mut node = node.borrow_mut();
        for (key, value) in keys.iter().zip(values.iter()) {
            node.props.push((store.resolve(key), store.resolve(value)));
        }
    }
    Ok(())
}

/// Explores one pointer: allocates its shell and enqueues the pointers
/// its slot references.
fn explore_pointer(
    store: &mut DecodeStore<'_>,
    queue: &mut VecDeque<String>,
    token: &str,
) -> Result<(), DecodeError> {
    if simple_value(token).is_some() || store.decoded.contains_key(token) {
        return Ok(());
    }

    let pointer = match parse_pointer(token) {
        Ok(pointer) => pointer,
        Err(_) if store.lenient() => return Ok(()),
        Err(e) => return Err(e),
    };
    let Some(adapter) = store.registry.adapter(pointer.tag) else {
        if store.lenient() {
            return Ok(());
        }
        return Err(DecodeError::UnrecognizedTag {
            tag: pointer.tag.as_char().to_string(),
        });
    };

    let slot = match store.raw_slot(pointer.tag, pointer.index) {
        Some(slot) => slot.clone(),
        None if store.lenient() => {
            // Keep an empty item so repeated pointers short-circuit; it
            // resolves to undefined.
            let item = DecodedItem {
                tag: pointer.tag,
                index: pointer.index,
                token: token.to_string(),
                slot: RawSlot::Grid(Vec::new()),
                reference: None,
            };
            store.order.push(token.to_string());
            store.decoded.insert(token.to_string(), item);
            return Ok(());
        }
        None => {
            return Err(DecodeError::IndexOutOfBounds {
                tag: pointer.tag.as_char(),
                index: pointer.index,
                size: store.table_len(pointer.tag),
            })
        }
    };

    let mut item = DecodedItem {
        tag: pointer.tag,
        index: pointer.index,
        token: token.to_string(),
        slot,
        reference: None,
    };
    match adapter.generate(store, &item.slot) {
        Ok(reference) => item.reference = Some(reference),
        Err(_) if store.lenient() => {}
        Err(e) => return Err(e),
    }

    if let RawSlot::Grid(rows) = &item.slot {
        for row in rows {
            for nested in row {
                if simple_value(nested).is_none() && !store.decoded.contains_key(nested) {
                    queue.push_back(nested.clone());
                }
            }
        }
    }

    store.order.push(token.to_string());
    store.decoded.insert(token.to_string(), item);
    Ok(())
}

/// Decodes wire text back into a value graph using the default registry.
pub fn decode(text: &str, options: &DecodeOptions) -> Result<Value, DecodeError> {
    decode_with_registry(text, options, &DEFAULT_REGISTRY)
}

/// Decodes against a caller-supplied registry.
pub fn decode_with_registry(
    text: &str,
    options: &DecodeOptions,
    registry: &Registry,
) -> Result<Value, DecodeError> {
    let payload = wire::parse_payload(text, registry)?;

    if let Some(value) = simple_value(&payload.root) {
        return Ok(value);
    }

    // An unrecognized root comes back verbatim as text in lenient mode,
    // so a payload produced by a richer registry still yields something
    // inspectable.
    match parse_pointer(&payload.root) {
        Ok(pointer) if registry.adapter(pointer.tag).is_some() => {}
        Ok(_) if options.lenient => return Ok(Value::Text(payload.root)),
        Ok(pointer) => {
            return Err(DecodeError::UnrecognizedTag {
                tag: pointer.tag.as_char().to_string(),
            })
        }
        Err(_) if options.lenient => return Ok(Value::Text(payload.root)),
        Err(e) => return Err(e),
    }

    let mut store = DecodeStore {
        registry,
        options,
        tables: payload.tables,
        decoded: FxHashMap::default(),
        order: Vec::new(),
    };

    let mut queue = VecDeque::new();
    queue.push_back(payload.root.clone());
    while let Some(token) = queue.pop_front() {
        explore_pointer(&mut store, &mut queue, &token)?;
    }

    // Every shell exists; fill contents in exploration order.
    for token in &store.order {
        let Some(item) = store.decoded.get(token) else {
            continue;
        };
        if item.reference.is_none() {
            continue;
        }
        let Some(adapter) = store.registry.adapter(item.tag) else {
            continue;
        };
        match adapter.populate(&store, item) {
            Ok(()) => {}
            Err(_) if store.lenient() => {}
            Err(e) => return Err(e),
        }
    }

    Ok(store
        .decoded
        .get(&payload.root)
        .and_then(|item| item.reference.clone())
        .unwrap_or(Value::Undefined))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode::{encode, EncodeOptions};
    use crate::model::{BlobData, NodeBody, Value};

    fn roundtrip(value: &Value) -> Value {
        let text = encode(value, &EncodeOptions::default()).unwrap();
        decode(&text, &DecodeOptions::default()).unwrap()
    }

    fn sequence_items(value: &Value) -> Vec<Value> {
        let node = value.as_node().expect("expected a node");
        let node = node.borrow();
        match &node.body {
            NodeBody::Sequence(items) => items.clone(),
            other => panic!("expected a sequence, got {other:?}"),
        }
    }

    #[test]
    fn test_roundtrip_simple_values() {
        assert!(matches!(roundtrip(&Value::Undefined), Value::Undefined));
        assert!(matches!(roundtrip(&Value::Null), Value::Null));
        assert!(matches!(roundtrip(&Value::Bool(true)), Value::Bool(true)));
        assert!(matches!(roundtrip(&Value::Bool(false)), Value::Bool(false)));
        assert!(
            matches!(roundtrip(&Value::Number(f64::NAN)), Value::Number(n) if n.is_nan())
        );
        assert!(matches!(
            roundtrip(&Value::Number(f64::INFINITY)),
            Value::Number(n) if n == f64::INFINITY
        ));
        assert!(matches!(
            roundtrip(&Value::Number(f64::NEG_INFINITY)),
            Value::Number(n) if n == f64::NEG_INFINITY
        ));
        // Negative zero keeps its sign.
        assert!(matches!(
            roundtrip(&Value::Number(-0.0)),
            Value::Number(n) if n == 0.0 && n.is_sign_negative()
        ));
    }

    #[test]
    fn test_roundtrip_primitives() {
        assert!(matches!(
            roundtrip(&Value::Number(2.5)),
            Value::Number(n) if n == 2.5
        ));
        assert!(matches!(
            roundtrip(&Value::text("hello, wire")),
            Value::Text(s) if s == "hello, wire"
        ));
        assert!(matches!(
            roundtrip(&Value::BigInt(-170141183460469231731687303715884105728)),
            Value::BigInt(i) if i == i128::MIN
        ));
        // Empty text survives; a comma in text does not collide with the
        // table delimiter because text tables are never joined.
        assert!(matches!(roundtrip(&Value::text("")), Value::Text(s) if s.is_empty()));
    }

    #[test]
    fn test_shared_reference_identity_preserved() {
        let shared = Value::sequence(vec![Value::Number(7.0)]);
        let root = Value::sequence(vec![shared.clone(), shared.clone()]);

        let decoded = roundtrip(&root);
        let items = sequence_items(&decoded);
        assert_eq!(items.len(), 2);
        assert!(items[0].same_node(&items[1]));
        // But distinct source nodes stay distinct, even when equal.
        let root = Value::sequence(vec![
            Value::sequence(vec![]),
            Value::sequence(vec![]),
        ]);
        let items = sequence_items(&roundtrip(&root));
        assert!(!items[0].same_node(&items[1]));
    }

    #[test]
    fn test_cycle_resolves_to_self() {
        let root = Value::sequence(vec![]);
        if let Value::Node(node) = &root {
            node.borrow_mut().body = NodeBody::Sequence(vec![root.clone()]);
        }

        let decoded = roundtrip(&root);
        let items = sequence_items(&decoded);
        assert_eq!(items.len(), 1);
        assert!(items[0].same_node(&decoded));
    }

    #[test]
    fn test_cycle_through_attachments() {
        let root = Value::record();
        if let Value::Node(node) = &root {
            node.borrow_mut()
                .props
                .push((Value::text("me"), root.clone()));
        }

        let decoded = roundtrip(&root);
        let node = decoded.as_node().unwrap();
        let props = node.borrow().props.clone();
        assert_eq!(props.len(), 1);
        assert!(matches!(&props[0].0, Value::Text(s) if s == "me"));
        assert!(props[0].1.same_node(&decoded));
    }

    #[test]
    fn test_primitive_dedup_roundtrip() {
        let root = Value::sequence(vec![
            Value::Number(1.0),
            Value::Number(1.0),
            Value::Number(f64::NAN),
        ]);
        let items = sequence_items(&roundtrip(&root));
        assert!(matches!(items[0], Value::Number(n) if n == 1.0));
        assert!(matches!(items[1], Value::Number(n) if n == 1.0));
        assert!(matches!(items[2], Value::Number(n) if n.is_nan()));
    }

    #[test]
    fn test_ordered_map_preserves_insertion_order() {
        let entries = vec![
            (Value::text("z"), Value::Number(1.0)),
            (Value::text("a"), Value::Number(2.0)),
            (Value::Number(3.0), Value::Null),
        ];
        let decoded = roundtrip(&Value::ordered_map(entries));
        let node = decoded.as_node().unwrap().borrow();
        let NodeBody::OrderedMap(entries) = &node.body else {
            panic!("expected an ordered map");
        };
        assert_eq!(entries.len(), 3);
        assert!(matches!(&entries[0].0, Value::Text(s) if s == "z"));
        assert!(matches!(&entries[1].0, Value::Text(s) if s == "a"));
        assert!(matches!(entries[2].0, Value::Number(n) if n == 3.0));
        assert!(matches!(entries[2].1, Value::Null));
    }

    #[test]
    fn test_ordered_set_roundtrip() {
        let decoded = roundtrip(&Value::ordered_set(vec![
            Value::text("b"),
            Value::text("a"),
        ]));
        let node = decoded.as_node().unwrap().borrow();
        let NodeBody::OrderedSet(members) = &node.body else {
            panic!("expected an ordered set");
        };
        assert!(matches!(&members[0], Value::Text(s) if s == "b"));
        assert!(matches!(&members[1], Value::Text(s) if s == "a"));
    }

    #[test]
    fn test_leaf_kind_roundtrips() {
        let decoded = roundtrip(&Value::bytes(vec![0, 1, 127, 255]));
        let node = decoded.as_node().unwrap().borrow();
        assert!(matches!(&node.body, NodeBody::Bytes(bytes) if *bytes == vec![0, 1, 127, 255]));
        drop(node);

        let decoded = roundtrip(&Value::timestamp(-86_400_000));
        let node = decoded.as_node().unwrap().borrow();
        assert!(matches!(node.body, NodeBody::Timestamp(-86_400_000)));
        drop(node);

        let decoded = roundtrip(&Value::pattern("a+b", "gi", 4));
        let node = decoded.as_node().unwrap().borrow();
        assert!(matches!(
            &node.body,
            NodeBody::Pattern { source, flags, last_index }
                if source == "a+b" && flags == "gi" && *last_index == 4
        ));
        drop(node);

        let decoded = roundtrip(&Value::fault("TypeFault", "bad input", "at main"));
        let node = decoded.as_node().unwrap().borrow();
        assert!(matches!(
            &node.body,
            NodeBody::Fault { name, message, trace }
                if name == "TypeFault" && message == "bad input" && trace == "at main"
        ));
        drop(node);

        let decoded = roundtrip(&Value::blob("application/octet-stream", vec![9, 8]));
        let node = decoded.as_node().unwrap().borrow();
        assert!(matches!(
            &node.body,
            NodeBody::Blob { content_type, data: BlobData::Ready(bytes) }
                if content_type == "application/octet-stream" && *bytes == vec![9, 8]
        ));
    }

    #[test]
    fn test_boxed_node_roundtrip() {
        // The wrapped value may be a node; it resolves in the build phase.
        let decoded = roundtrip(&Value::boxed(Value::sequence(vec![Value::Number(5.0)])));
        let node = decoded.as_node().unwrap().borrow();
        let NodeBody::Boxed(inner) = &node.body else {
            panic!("expected a boxed value");
        };
        let items = sequence_items(inner);
        assert!(matches!(items[0], Value::Number(n) if n == 5.0));
    }

    #[test]
    fn test_attachments_on_container() {
        let root = Value::sequence(vec![Value::Number(1.0)]);
        if let Value::Node(node) = &root {
            node.borrow_mut()
                .props
                .push((Value::text("label"), Value::text("tagged")));
        }

        let decoded = roundtrip(&root);
        let node = decoded.as_node().unwrap();
        let props = node.borrow().props.clone();
        assert_eq!(props.len(), 1);
        assert!(matches!(&props[0].0, Value::Text(s) if s == "label"));
        assert!(matches!(&props[0].1, Value::Text(s) if s == "tagged"));
        assert_eq!(sequence_items(&decoded).len(), 1);
    }

    #[test]
    fn test_uncompressed_and_pretty_forms_decode_equally() {
        let root = Value::sequence(vec![
            Value::Number(42.0),
            Value::text("x"),
            Value::Null,
        ]);
        for options in [
            EncodeOptions::default(),
            EncodeOptions {
                compress: false,
                ..Default::default()
            },
            EncodeOptions {
                pretty: true,
                ..Default::default()
            },
        ] {
            let text = encode(&root, &options).unwrap();
            let items = sequence_items(&decode(&text, &DecodeOptions::default()).unwrap());
            assert!(matches!(items[0], Value::Number(n) if n == 42.0));
            assert!(matches!(&items[1], Value::Text(s) if s == "x"));
            assert!(matches!(items[2], Value::Null));
        }
    }

    #[test]
    fn test_unknown_root_tag() {
        let text = r#"["Z0","1",["Z",["x"]]]"#;
        let strict = decode(text, &DecodeOptions::default());
        assert!(matches!(
            strict,
            Err(DecodeError::UnrecognizedTag { tag }) if tag == "Z"
        ));

        // Lenient: the root pointer comes back verbatim.
        let decoded = decode(text, &DecodeOptions { lenient: true }).unwrap();
        assert!(matches!(decoded, Value::Text(s) if s == "Z0"));
    }

    #[test]
    fn test_unknown_nested_pointer() {
        let text = r#"["A0","1",["A",[[["Z0"]]]]]"#;
        let strict = decode(text, &DecodeOptions::default());
        assert!(matches!(strict, Err(DecodeError::UnrecognizedTag { .. })));

        // Lenient: the nested reference drops to undefined.
        let decoded = decode(text, &DecodeOptions { lenient: true }).unwrap();
        let items = sequence_items(&decoded);
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Value::Undefined));
    }

    #[test]
    fn test_index_out_of_bounds() {
        let text = r#"["A0","1",["A",[[["N5"]]]]]"#;
        let strict = decode(text, &DecodeOptions::default());
        assert!(matches!(
            strict,
            Err(DecodeError::IndexOutOfBounds { tag: 'N', index: 5, size: 0 })
        ));

        let decoded = decode(text, &DecodeOptions { lenient: true }).unwrap();
        let items = sequence_items(&decoded);
        assert!(matches!(items[0], Value::Undefined));
    }

    #[test]
    fn test_malformed_number_slot() {
        let text = r#"["N0","1",["N","abc"]]"#;
        let strict = decode(text, &DecodeOptions::default());
        assert!(matches!(strict, Err(DecodeError::MalformedParts { tag: 'N', .. })));

        // Lenient: the failed slot resolves to undefined at the root.
        let decoded = decode(text, &DecodeOptions { lenient: true }).unwrap();
        assert!(matches!(decoded, Value::Undefined));
    }

    #[test]
    fn test_attachment_length_mismatch() {
        // A record slot with an attachment key but no matching value.
        let text = r#"["O0","1",["O",[[["S0"],[]]]],["S",["k"]]]"#;
        let strict = decode(text, &DecodeOptions::default());
        assert!(matches!(
            strict,
            Err(DecodeError::MalformedParts {
                tag: 'O',
                context: "attachment key/value length mismatch",
            })
        ));

        // Lenient: only aligned pairs attach.
        let decoded = decode(text, &DecodeOptions { lenient: true }).unwrap();
        let node = decoded.as_node().unwrap();
        assert!(node.borrow().props.is_empty());
    }

    #[test]
    fn test_scalar_pointer_cannot_point_at_containers() {
        // A crafted timestamp whose milliseconds pointer targets a
        // container must fail instead of recursing.
        let text = r#"["D0","1",["D",[[["A0"]]]],["A",[[["D0"]]]]]"#;
        let strict = decode(text, &DecodeOptions::default());
        assert!(matches!(strict, Err(DecodeError::MalformedParts { .. })));

        let decoded = decode(text, &DecodeOptions { lenient: true }).unwrap();
        assert!(matches!(decoded, Value::Undefined));
    }

    #[test]
    fn test_restricted_registry_rejects_other_kinds() {
        let registry = crate::registry::Registry::with_kinds(&[
            crate::registry::tags::SEQUENCE,
            crate::registry::tags::NUMBER,
        ]);
        let text = r#"["S0","1",["S",["hi"]]]"#;
        let strict = decode_with_registry(text, &DecodeOptions::default(), &registry);
        assert!(matches!(strict, Err(DecodeError::UnrecognizedTag { tag }) if tag == "S"));
    }

    proptest::proptest! {
        #[test]
        fn prop_number_sequence_roundtrip(
            numbers in proptest::collection::vec(
                proptest::num::f64::NORMAL | proptest::num::f64::ZERO,
                0..32,
            )
        ) {
            let root = Value::sequence(numbers.iter().map(|&n| Value::Number(n)).collect());
            let items = sequence_items(&roundtrip(&root));
            proptest::prop_assert_eq!(items.len(), numbers.len());
            for (item, &expected) in items.iter().zip(&numbers) {
                match item {
                    Value::Number(n) => proptest::prop_assert_eq!(*n, expected),
                    other => return Err(proptest::test_runner::TestCaseError::fail(
                        format!("expected a number, got {other:?}"),
                    )),
                }
            }
        }

        #[test]
        fn prop_text_sequence_roundtrip(
            texts in proptest::collection::vec("[ -~]{0,24}", 0..16)
        ) {
            let root = Value::sequence(texts.iter().map(|t| Value::text(t.clone())).collect());
            let items = sequence_items(&roundtrip(&root));
            proptest::prop_assert_eq!(items.len(), texts.len());
            for (item, expected) in items.iter().zip(&texts) {
                match item {
                    Value::Text(s) => proptest::prop_assert_eq!(s, expected),
                    other => return Err(proptest::test_runner::TestCaseError::fail(
                        format!("expected text, got {other:?}"),
                    )),
                }
            }
        }
    }
}
