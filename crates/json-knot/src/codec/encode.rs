//! Encode pipeline: discovery, deduplication, and serialization.
//!
//! Encoding is not a single recursive pass. `encounter` assigns each
//! distinct value a pointer and reserves its output slot; `encode_all`
//! then serializes tracker records in insertion order, and because
//! serializing one record can discover new values (which `encounter`
//! appends to the tracker), the loop is a level-by-level closure that
//! runs until no unencoded records remain. Deferred productions suspend
//! the closure at a completion barrier and resume it afterwards.

use futures::future::join_all;
use rustc_hash::FxHashMap;

use crate::codec::pointer::{format_pointer, Tag};
use crate::codec::tracker::{IdentityKey, NodeRecord, ReferenceTracker};
use crate::codec::wire;
use crate::error::EncodeError;
use crate::limits::MAX_TEXT_LEN;
use crate::registry::{simple_token, tags, Registry, SerialParts, DEFAULT_REGISTRY};
use crate::model::Value;

/// Options for encoding.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// Degrade unsupported and pending-deferred values to placeholders
    /// instead of failing.
    pub lenient: bool,
    /// Compress per-tag value lists (delimited joins and base-63 pointer
    /// grids). Purely a size optimization; decoders accept both forms.
    pub compress: bool,
    /// Emit indented wire text.
    pub pretty: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            lenient: false,
            compress: true,
            pretty: false,
        }
    }
}

/// Serialized content of one output slot.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedParts {
    Text(String),
    Grid(Vec<Vec<String>>),
}

/// Per-tag output tables, in first-reservation order.
///
/// An index is reserved with an empty placeholder before its content is
/// computed, so self-referential and forward-referential structures
/// resolve to stable indices.
#[derive(Debug, Default)]
pub struct OutputTable {
    order: Vec<Tag>,
    table_index: FxHashMap<Tag, usize>,
    slots: Vec<Vec<Option<EncodedParts>>>,
}

impl OutputTable {
    fn table_mut(&mut self, tag: Tag) -> &mut Vec<Option<EncodedParts>> {
        let position = *self.table_index.entry(tag).or_insert_with(|| {
            self.order.push(tag);
            self.slots.push(Vec::new());
            self.slots.len() - 1
        });
        &mut self.slots[position]
    }

    /// Reserves the next index in a tag's table.
    pub fn reserve(&mut self, tag: Tag) -> usize {
        let table = self.table_mut(tag);
        table.push(None);
        table.len() - 1
    }

    /// Stores the serialized parts for a reserved slot.
    pub fn set(&mut self, tag: Tag, index: usize, parts: EncodedParts) {
        let table = self.table_mut(tag);
        if let Some(slot) = table.get_mut(index) {
            *slot = Some(parts);
        }
    }

    /// Mutable access to an already-serialized grid slot.
    pub fn grid_mut(&mut self, tag: Tag, index: usize) -> Option<&mut Vec<Vec<String>>> {
        let position = *self.table_index.get(&tag)?;
        match self.slots[position].get_mut(index)? {
            Some(EncodedParts::Grid(grid)) => Some(grid),
            _ => None,
        }
    }

    /// Tables in first-reservation order.
    pub fn iter(&self) -> impl Iterator<Item = (Tag, &[Option<EncodedParts>])> {
        self.order
            .iter()
            .enumerate()
            .map(|(i, &tag)| (tag, self.slots[i].as_slice()))
    }
}

/// Per-call encoding state.
pub(crate) struct EncodeStore<'a> {
    registry: &'a Registry,
    options: &'a EncodeOptions,
    tracker: ReferenceTracker,
    deferred: Vec<usize>,
    pub(crate) output: OutputTable,
}

impl<'a> EncodeStore<'a> {
    fn new(registry: &'a Registry, options: &'a EncodeOptions) -> Self {
        Self {
            registry,
            options,
            tracker: ReferenceTracker::new(),
            deferred: Vec::new(),
            output: OutputTable::default(),
        }
    }
}

/// Assigns a pointer to a value, deduplicating by identity.
///
/// Simple values return their bare tag with no tracking. A first
/// encounter reserves the next slot in the tag's table and registers a
/// record; later encounters return the existing pointer.
fn encounter(store: &mut EncodeStore<'_>, value: &Value) -> Result<String, EncodeError> {
    if let Some(token) = simple_token(value) {
        return Ok(token.to_string());
    }

    // Same bound the decoder enforces on text slots; fatal in both modes.
    if let Value::Text(s) = value {
        if s.len() > MAX_TEXT_LEN {
            return Err(EncodeError::LengthExceedsLimit {
                field: "text slot",
                len: s.len(),
                max: MAX_TEXT_LEN,
            });
        }
    }

    let tag = match store.registry.classify(value) {
        Some(tag) => tag,
        // Unsupported values degrade to an empty record placeholder in
        // lenient mode so their referential slots survive.
        None if store.options.lenient => tags::RECORD,
        None => {
            return Err(EncodeError::UnsupportedType {
                kind: value.kind_name(),
            })
        }
    };

    // Simple values were handled above, so every remaining value has an
    // identity key.
    let key = IdentityKey::of(value).ok_or(EncodeError::UnsupportedType {
        kind: value.kind_name(),
    })?;

    if let Some(record) = store.tracker.get(&key) {
        return Ok(record.token.clone());
    }

    let index = store.output.reserve(tag);
    let token = format_pointer(tag, index);
    let record = NodeRecord {
        tag,
        index,
        token: token.clone(),
        value: value.clone(),
    };
    let position = store.tracker.insert(key, record);

    let deferred = store
        .registry
        .adapter(tag)
        .is_some_and(|adapter| adapter.is_deferred(value));
    if deferred {
        store.deferred.push(position);
    }

    Ok(token)
}

/// Serializes tracker records from `resume` onward, closing over every
/// newly discovered reference, and returns the next resume offset.
fn encode_all(store: &mut EncodeStore<'_>, resume: usize) -> Result<usize, EncodeError> {
    let mut position = resume;
    while position < store.tracker.len() {
        // Serialization below may grow the tracker; clone the record so
        // no borrow is held across `encounter` calls.
        let record = match store.tracker.record(position) {
            Some(record) => record.clone(),
            None => break,
        };
        let adapter =
            store
                .registry
                .adapter(record.tag)
                .ok_or(EncodeError::UnsupportedType {
                    kind: record.value.kind_name(),
                })?;

        let encoded = match adapter.serialize(&record.value) {
            SerialParts::Text(text) => EncodedParts::Text(text),
            SerialParts::Grid(parts) => {
                let mut grid = Vec::with_capacity(parts.len());
                for part in parts {
                    let mut tokens = Vec::with_capacity(part.len());
                    for nested in &part {
                        tokens.push(encounter(store, nested)?);
                    }
                    grid.push(tokens);
                }
                EncodedParts::Grid(grid)
            }
        };
        store.output.set(record.tag, record.index, encoded);
        position += 1;
    }
    Ok(position)
}

/// Encodes a value graph to wire text using the default registry.
///
/// Fails with [`EncodeError::MissingCompletionHandler`] if the graph
/// contains deferred values and lenient mode is off; use
/// [`encode_deferred`] for those graphs.
pub fn encode(value: &Value, options: &EncodeOptions) -> Result<String, EncodeError> {
    encode_with_registry(value, options, &DEFAULT_REGISTRY)
}

/// Encodes a value graph against a caller-supplied registry.
pub fn encode_with_registry(
    value: &Value,
    options: &EncodeOptions,
    registry: &Registry,
) -> Result<String, EncodeError> {
    let mut store = EncodeStore::new(registry, options);
    let root = encounter(&mut store, value)?;
    encode_all(&mut store, 0)?;

    if !store.deferred.is_empty() && !options.lenient {
        return Err(EncodeError::MissingCompletionHandler);
    }
    // Lenient: pending slots keep their undefined placeholder and decode
    // as empty payloads.

    wire::assemble(&store.output, registry, &root, options)
}

/// Encodes a value graph, awaiting deferred productions.
///
/// This is the completion barrier: all outstanding productions of a wave
/// are issued together and joined — none may be skipped — after which the
/// discovery closure resumes to pick up any references the produced data
/// introduced. The returned future resolves exactly once, with the full
/// wire text. It is not `Send`; drive it with a local executor.
pub async fn encode_deferred(
    value: &Value,
    options: &EncodeOptions,
) -> Result<String, EncodeError> {
    encode_deferred_with_registry(value, options, &DEFAULT_REGISTRY).await
}

/// [`encode_deferred`] against a caller-supplied registry.
pub async fn encode_deferred_with_registry(
    value: &Value,
    options: &EncodeOptions,
    registry: &Registry,
) -> Result<String, EncodeError> {
    let mut store = EncodeStore::new(registry, options);
    let root = encounter(&mut store, value)?;
    let mut resume = encode_all(&mut store, 0)?;

    while !store.deferred.is_empty() {
        let wave = std::mem::take(&mut store.deferred);

        let mut productions = Vec::with_capacity(wave.len());
        let mut targets = Vec::with_capacity(wave.len());
        for position in wave {
            let Some(record) = store.tracker.record(position) else {
                continue;
            };
            let (tag, index, value) = (record.tag, record.index, record.value.clone());
            let Some(adapter) = store.registry.adapter(tag) else {
                continue;
            };
            if let Some(production) = adapter.take_deferred(&value) {
                productions.push(production);
                targets.push((tag, index));
            }
        }

        let produced = join_all(productions).await;

        for ((tag, index), bytes) in targets.into_iter().zip(produced) {
            let data = Value::bytes(bytes);
            let token = encounter(&mut store, &data)?;
            if let Some(grid) = store.output.grid_mut(tag, index) {
                if let Some(position) = grid.first_mut().and_then(|part| part.first_mut()) {
                    *position = token;
                }
            }
        }

        // Second pass from the offset captured before the wave: encodes
        // the produced data and anything it referenced.
        resume = encode_all(&mut store, resume)?;
    }

    wire::assemble(&store.output, registry, &root, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn encode_compact(value: &Value) -> String {
        encode(value, &EncodeOptions::default()).unwrap()
    }

    #[test]
    fn test_simple_root_no_tables() {
        assert_eq!(encode_compact(&Value::Undefined), r#"["K","1"]"#);
        assert_eq!(encode_compact(&Value::Bool(true)), r#"["T","1"]"#);
        assert_eq!(encode_compact(&Value::Number(f64::NAN)), r#"["C","1"]"#);
        assert_eq!(encode_compact(&Value::Number(-0.0)), r#"["M","1"]"#);
    }

    #[test]
    fn test_shared_primitive_dedup() {
        // [1, 1, NaN]: both ones share slot N0, NaN is a bare simple tag.
        let root = Value::sequence(vec![
            Value::Number(1.0),
            Value::Number(1.0),
            Value::Number(f64::NAN),
        ]);
        let text = encode_compact(&root);
        assert_eq!(text, r#"["A0","1",["A","N0N0C"],["N","1"]]"#);
    }

    #[test]
    fn test_shared_node_single_slot() {
        let shared = Value::sequence(vec![]);
        let root = Value::sequence(vec![shared.clone(), shared.clone()]);
        let text = encode_compact(&root);
        // One A-table slot for the root, one for the shared node.
        assert_eq!(text, r#"["A0","1",["A","A1A1,"]]"#);
    }

    #[test]
    fn test_self_reference_resolves_to_own_pointer() {
        let root = Value::sequence(vec![]);
        if let Value::Node(node) = &root {
            let me = root.clone();
            node.borrow_mut().body = crate::model::NodeBody::Sequence(vec![me]);
        }
        let text = encode_compact(&root);
        assert_eq!(text, r#"["A0","1",["A","A0"]]"#);
    }

    #[test]
    fn test_determinism() {
        let entries = vec![
            (Value::text("a"), Value::Number(1.0)),
            (Value::text("b"), Value::Number(2.0)),
        ];
        let root = Value::ordered_map(entries);
        let first = encode_compact(&root);
        let second = encode_compact(&root);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unsupported_strict_vs_lenient() {
        let registry = crate::registry::Registry::with_kinds(&[crate::registry::tags::SEQUENCE]);
        let root = Value::sequence(vec![Value::timestamp(0)]);

        let strict = encode_with_registry(&root, &EncodeOptions::default(), &registry);
        assert!(matches!(
            strict,
            Err(EncodeError::UnsupportedType { kind: "Timestamp" })
        ));

        let lenient_options = EncodeOptions {
            lenient: true,
            ..Default::default()
        };
        let text = encode_with_registry(&root, &lenient_options, &registry).unwrap();
        // The timestamp occupies a record placeholder slot.
        assert!(text.contains(r#"["O""#), "placeholder missing: {text}");
    }

    #[test]
    fn test_oversized_text_rejected() {
        let root = Value::text("x".repeat(crate::limits::MAX_TEXT_LEN + 1));
        for lenient in [false, true] {
            let options = EncodeOptions {
                lenient,
                ..Default::default()
            };
            assert!(matches!(
                encode(&root, &options),
                Err(EncodeError::LengthExceedsLimit {
                    field: "text slot",
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_deferred_without_barrier() {
        let root = Value::deferred_blob("text/plain", Box::pin(async { b"hi".to_vec() }));

        let strict = encode(&root, &EncodeOptions::default());
        assert!(matches!(strict, Err(EncodeError::MissingCompletionHandler)));

        let lenient_options = EncodeOptions {
            lenient: true,
            ..Default::default()
        };
        let text = encode(&root, &lenient_options).unwrap();
        // Pending data degrades to the undefined placeholder.
        assert!(text.contains("KS0"), "placeholder missing: {text}");
    }

    #[test]
    fn test_deferred_barrier_resolves_once() {
        let root = Value::sequence(vec![
            Value::deferred_blob("a/b", Box::pin(async { vec![1u8, 2] })),
            Value::deferred_blob("c/d", Box::pin(async { vec![3u8] })),
        ]);
        let text =
            futures::executor::block_on(encode_deferred(&root, &EncodeOptions::default()))
                .unwrap();
        // Both productions completed: two bytes tables slots exist and no
        // undefined placeholder remains in the blob slots.
        assert!(text.contains(r#"["W""#), "bytes table missing: {text}");
        assert!(!text.contains("KS"), "unpatched placeholder: {text}");
    }

    #[test]
    fn test_deferred_future_taken_once() {
        let blob = Value::deferred_blob("x/y", Box::pin(async { vec![9u8] }));
        futures::executor::block_on(encode_deferred(&blob, &EncodeOptions::default())).unwrap();

        // The production was consumed; a second synchronous encode no
        // longer sees a pending deferred value.
        let second = encode(&blob, &EncodeOptions::default()).unwrap();
        assert!(second.starts_with(r#"["Y0""#));
    }
}
