//! JSON codec for entity records.
//!
//! ## Record shape
//! ```json
//! { "id": 2, "children": [3, 4], "components": { "pos": { "x": 1.0, "y": 0.0, "z": 0.0 } }, "tags": ["enemy"] }
//! ```
//! `id` is the entity's pid. `children` lists child pids in order. The
//! `components` bag holds components and scripts under their registered keys.
//! Empty fields are omitted on export and optional on import.
//!
//! ## Import semantics
//! A record describes the complete state of an entity. Importing it:
//! 1. decodes every value and checks every child pid first; a rejected
//!    record changes nothing, and an entity created for it is deleted again,
//! 2. removes components, scripts and tags the record does not list,
//! 3. adds or replaces the listed ones,
//! 4. keeps keys and tag names unknown to the registry in [`Unresolved`],
//! 5. sets the child list to the listed pids, creating missing children.
//!
//! ## Errors
//! Every [`ParseError`] carries a byte offset into the input text. Values
//! inside the `components` bag report the path `components.<key>`.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::de::{DeserializeSeed, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::error::Category;
use serde_json::value::RawValue;

use crate::engine::component::{
    component_info, schema_by_key, script_info, tag_by_name, tag_info, Component, SchemaKey, ScriptObject,
    Unresolved, UNRESOLVED_ID,
};
use crate::engine::entity::Entity;
use crate::engine::error::{
    ArgumentError, ColumnError, InvalidOperationError, ParseError, ParseErrorKind, RegistryError,
    StoreError, StoreResult,
};
use crate::engine::store::EntityStore;
use crate::engine::types::{Bits, ComponentID, Pid, ScriptID, TagID};


/// Owned form of one entity record.

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Persistent id of the entity.
    #[serde(rename = "id")]
    pub pid: Pid,
    /// Child pids in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Pid>,
    /// Component and script values by key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components: BTreeMap<String, Box<RawValue>>,
    /// Tag names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Outcome of [`EntityStore::read_store_json`].

#[derive(Debug)]
pub struct ReadResult {
    /// Number of entities imported before the first failure.
    pub count: usize,
    /// First failure; entities before it stay committed.
    pub error: Option<StoreError>,
}

/// Record view borrowing from the input text.
#[derive(Deserialize)]
struct RawRecord<'a> {
    #[serde(default)]
    id: Option<Pid>,
    #[serde(default)]
    children: Vec<Pid>,
    #[serde(borrow, default)]
    components: Option<&'a RawValue>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Default)]
struct Decoded {
    components: Vec<(ComponentID, Box<dyn Any + Send>)>,
    scripts: Vec<(ScriptID, Box<dyn ScriptObject>)>,
    tags: Vec<TagID>,
    unresolved: Unresolved,
}

// ─────────────────────────────────────────────────────────────────────────────
// Export
// ─────────────────────────────────────────────────────────────────────────────

impl EntityStore {

    /// Builds the record of `entity`.
    ///
    /// Components come first, then scripts, both keyed; tags list known tags
    /// in id order followed by unresolved names.

    pub fn export_entity(&self, entity: Entity) -> StoreResult<EntityRecord> {
        let node = self.check(entity)?;
        let (archetype_id, row) = self.location_of_id(node.id)?;
        let archetype = &self.archetypes[archetype_id as usize];

        let mut record = EntityRecord {
            pid: node.pid,
            children: node.child_ids.iter().filter_map(|&id| self.id_to_pid(id)).collect(),
            ..EntityRecord::default()
        };
        let mut unresolved_tags = Vec::new();

        for &component_id in archetype.component_ids() {
            if component_id == UNRESOLVED_ID {
                let Some(unresolved) = archetype.typed_column::<Unresolved>(component_id).and_then(|c| c.at(row)) else {
                    continue;
                };
                for (key, json) in &unresolved.components {
                    let value = RawValue::from_string(json.clone())
                        .map_err(|source| StoreError::Encode { key: Unresolved::KEY, source })?;
                    record.components.insert(key.clone(), value);
                }
                unresolved_tags.extend(unresolved.tags.iter().cloned());
                continue;
            }
            let info = component_info(component_id)
                .ok_or(RegistryError::NotRegistered { type_name: "<unknown component id>" })?;
            let column = archetype.column(component_id).ok_or(ColumnError::MissingColumn { component_id })?;
            let value = column
                .encode_json(row)
                .map_err(|source| StoreError::Encode { key: info.key, source })?;
            if let Some(value) = value {
                record.components.insert(info.key.to_string(), value);
            }
        }

        for (script_id, script) in &node.scripts {
            let info = script_info(*script_id).ok_or(RegistryError::NotRegistered { type_name: "<unknown script id>" })?;
            let value = script.encode_json().map_err(|source| StoreError::Encode { key: info.key, source })?;
            record.components.insert(info.key.to_string(), value);
        }

        record.tags = archetype
            .signature()
            .tags
            .iter()
            .filter_map(tag_info)
            .map(|info| info.name.to_string())
            .collect();
        record.tags.extend(unresolved_tags);
        Ok(record)
    }

    /// Encodes the record of `entity` as JSON.
    pub fn write_entity_json(&self, entity: Entity) -> StoreResult<String> {
        let record = self.export_entity(entity)?;
        serde_json::to_string(&record).map_err(|source| StoreError::Encode { key: "record", source })
    }

    /// Encodes every live entity, in id order, as a JSON array of records.
    pub fn write_store_json(&self) -> StoreResult<String> {
        let records = self
            .entities()
            .map(|entity| self.export_entity(entity))
            .collect::<StoreResult<Vec<_>>>()?;
        serde_json::to_string(&records).map_err(|source| StoreError::Encode { key: "store", source })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Import
// ─────────────────────────────────────────────────────────────────────────────

impl EntityStore {

    /// Creates or updates the entity with the record's pid.
    ///
    /// Parse positions refer to the offending value's own text.

    pub fn import_record(&mut self, record: &EntityRecord) -> StoreResult<Entity> {
        let entries = record.components.iter().map(|(key, value)| (key.as_str(), value.as_ref()));
        let decoded = decode_values(entries, &record.tags, None)?;
        self.import_decoded(Some(record.pid), decoded, &record.children)
    }

    /// Replaces the state of `entity` with the record in `json`.
    ///
    /// The record's `id` is ignored.
    ///
    /// ## Errors
    /// `Parse` for malformed input; `entity` is unchanged in that case.

    pub fn read_entity_json(&mut self, entity: Entity, json: &str) -> StoreResult<()> {
        self.check(entity)?;
        let (record, components) = parse_record(json, json)?;
        let entries = components.iter().map(|(key, value)| (key.as_str(), *value));
        let decoded = decode_values(entries, &record.tags, Some(json))?;
        self.apply_record(entity, decoded, &record.children)
    }

    /// Imports a JSON array of records, committing each as soon as it parses.
    ///
    /// Reading stops at the first failure; [`ReadResult::count`] tells how many
    /// entities were imported before it.

    pub fn read_store_json(&mut self, json: &str) -> ReadResult {
        if let Err(error) = expect_opening(json, json, b'[', None) {
            return ReadResult { count: 0, error: Some(error.into()) };
        }
        let mut state = ReadState { store: self, input: json, count: 0, failure: None };
        let mut deserializer = serde_json::Deserializer::from_str(json);
        let outcome = RecordSeq { state: &mut state }
            .deserialize(&mut deserializer)
            .and_then(|()| deserializer.end());

        let ReadState { count, failure, .. } = state;
        let error = failure.or_else(|| outcome.err().map(|error| parse_error(&error, json, json, None).into()));
        match &error {
            Some(error) => log::warn!("store import stopped after {count} entities: {error}"),
            None => log::debug!("imported {count} entities"),
        }
        ReadResult { count, error }
    }

    /// Applies a decoded record to the entity with `pid`, creating it if needed.
    ///
    /// An entity created here is deleted again if the record is rejected.

    fn import_decoded(&mut self, pid: Option<Pid>, decoded: Decoded, child_pids: &[Pid]) -> StoreResult<Entity> {
        let existing = pid.and_then(|pid| self.entity_by_pid(pid));
        let (entity, created) = match (existing, pid) {
            (Some(entity), _) => (entity, false),
            (None, Some(pid)) => (self.create_entity_with_pid(pid)?, true),
            (None, None) => (self.create_entity()?, true),
        };
        match self.apply_record(entity, decoded, child_pids) {
            Ok(()) => Ok(entity),
            Err(error) => {
                if created {
                    self.delete_entity(entity)?;
                }
                Err(error)
            }
        }
    }

    fn resolve_pid(&mut self, pid: Pid) -> StoreResult<Entity> {
        match self.entity_by_pid(pid) {
            Some(entity) => Ok(entity),
            None => self.create_entity_with_pid(pid),
        }
    }

    fn apply_record(&mut self, entity: Entity, decoded: Decoded, child_pids: &[Pid]) -> StoreResult<()> {
        self.check_child_pids(entity, child_pids)?;
        let Decoded { components, scripts, tags, unresolved } = decoded;

        let mut target = Bits::default();
        for (component_id, _) in &components {
            target.set(*component_id);
        }
        let keep_unresolved = !unresolved.is_empty();
        if keep_unresolved {
            target.set(UNRESOLVED_ID);
        }
        let current = self.archetype_of(entity)?.component_ids().to_vec();
        for component_id in current {
            if !target.has(component_id) {
                self.remove_component_by_id(entity, component_id)?;
            }
        }
        for (component_id, value) in components {
            self.add_component_boxed(entity, component_id, value)?;
        }
        if keep_unresolved {
            self.add_component_boxed(entity, UNRESOLVED_ID, Box::new(unresolved))?;
        }

        self.nodes[entity.id() as usize].scripts = scripts;

        for tag_id in self.tags_of(entity)? {
            if !tags.contains(&tag_id) {
                self.remove_tag_by_id(entity, tag_id)?;
            }
        }
        for tag_id in tags {
            self.add_tag_by_id(entity, tag_id)?;
        }

        let mut children = Vec::with_capacity(child_pids.len());
        for &pid in child_pids {
            children.push(self.resolve_pid(pid)?);
        }
        for existing in self.children(entity)? {
            if !children.contains(&existing) {
                self.remove_child(entity, existing)?;
            }
        }
        for (index, child) in children.into_iter().enumerate() {
            self.insert_child(entity, index, child)?;
        }
        Ok(())
    }

    /// Checks a record's child list against `entity` before anything changes.
    ///
    /// ## Errors
    /// - `ArgumentError::DuplicateChild` for a pid listed twice.
    /// - `InvalidOperation::GraphOriginAsChild` / `ChildCycle` for a live child
    ///   that cannot be attached to `entity`.
    /// - The errors of entity creation for a pid without a live entity.

    fn check_child_pids(&self, entity: Entity, child_pids: &[Pid]) -> StoreResult<()> {
        let parent_id = self.check(entity)?.id;
        let mut seen = HashSet::with_capacity(child_pids.len());
        for &pid in child_pids {
            if !seen.insert(pid) {
                return Err(ArgumentError::DuplicateChild { pid }.into());
            }
            match self.pid_to_id(pid) {
                Some(child_id) if child_id == self.graph_origin => {
                    return Err(InvalidOperationError::GraphOriginAsChild { id: child_id }.into());
                }
                Some(child_id) if self.is_self_or_ancestor(child_id, parent_id) => {
                    return Err(InvalidOperationError::ChildCycle { parent: parent_id, child: child_id }.into());
                }
                Some(_) => {}
                None => {
                    self.check_new_pid(pid)?;
                }
            }
        }
        Ok(())
    }
}

struct ReadState<'s, 'i> {
    store: &'s mut EntityStore,
    input: &'i str,
    count: usize,
    failure: Option<StoreError>,
}

impl<'s, 'i> ReadState<'s, 'i> {
    fn import_fragment(&mut self, text: &'i str) -> StoreResult<()> {
        let (record, components) = parse_record(self.input, text)?;
        let entries = components.iter().map(|(key, value)| (key.as_str(), *value));
        let decoded = decode_values(entries, &record.tags, Some(self.input))?;
        self.store.import_decoded(record.id, decoded, &record.children).map(drop)
    }
}

/// Streams the elements of the top-level array into the store.
struct RecordSeq<'r, 's, 'i> {
    state: &'r mut ReadState<'s, 'i>,
}

impl<'de, 'r, 's> DeserializeSeed<'de> for RecordSeq<'r, 's, 'de> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<(), D::Error> {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, 'r, 's> Visitor<'de> for RecordSeq<'r, 's, 'de> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an array of entity records")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<(), A::Error> {
        while let Some(raw) = seq.next_element::<&'de RawValue>()? {
            match self.state.import_fragment(raw.get()) {
                Ok(()) => self.state.count += 1,
                Err(error) => {
                    self.state.failure = Some(error);
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

type ComponentBag<'a> = BTreeMap<String, &'a RawValue>;

/// Parses the record in `text`, a slice of `input`.
fn parse_record<'a>(input: &'a str, text: &'a str) -> Result<(RawRecord<'a>, ComponentBag<'a>), ParseError> {
    expect_opening(input, text, b'{', None)?;
    let record: RawRecord<'a> = serde_json::from_str(text).map_err(|error| parse_error(&error, input, text, None))?;

    let components = match record.components {
        Some(raw) => {
            let text = raw.get();
            expect_opening(input, text, b'{', Some("components"))?;
            serde_json::from_str::<ComponentBag<'a>>(text)
                .map_err(|error| parse_error(&error, input, text, Some("components".to_string())))?
        }
        None => ComponentBag::new(),
    };
    Ok((record, components))
}

/// Decodes every value of a components bag and resolves tag names.
///
/// Positions are offsets into `input` when given, else into each value.

fn decode_values<'a>(
    entries: impl IntoIterator<Item = (&'a str, &'a RawValue)>,
    tag_names: &[String],
    input: Option<&str>,
) -> Result<Decoded, ParseError> {
    let mut decoded = Decoded::default();

    for (key, raw) in entries {
        let text = raw.get();
        let failed = |error: serde_json::Error| {
            parse_error(&error, input.unwrap_or(text), text, Some(format!("components.{key}")))
        };
        match schema_by_key(key) {
            Some(SchemaKey::Component(component_id)) if component_id != UNRESOLVED_ID => {
                let Some(info) = component_info(component_id) else {
                    continue;
                };
                decoded.components.push((component_id, (info.decode)(text).map_err(failed)?));
            }
            Some(SchemaKey::Script(script_id)) => {
                let Some(info) = script_info(script_id) else {
                    continue;
                };
                decoded.scripts.push((script_id, (info.decode)(text).map_err(failed)?));
            }
            _ => decoded.unresolved.components.push((key.to_string(), text.to_string())),
        }
    }

    for name in tag_names {
        match tag_by_name(name) {
            Some(tag_id) => {
                if !decoded.tags.contains(&tag_id) {
                    decoded.tags.push(tag_id);
                }
            }
            None => decoded.unresolved.tags.push(name.clone()),
        }
    }
    Ok(decoded)
}

/// Requires the first token of `text` to open an object (`{`) or array (`[`).

fn expect_opening(input: &str, text: &str, open: u8, path: Option<&str>) -> Result<(), ParseError> {
    let base = offset_in(input, text);
    let path = path.map(str::to_string);
    let Some(index) = text.bytes().position(|byte| !byte.is_ascii_whitespace()) else {
        return Err(ParseError { kind: ParseErrorKind::UnexpectedEnd, path, position: base + text.len() });
    };
    let byte = text.as_bytes()[index];
    if byte == open {
        return Ok(());
    }
    let found = token_name(byte);
    let kind = if open == b'{' {
        ParseErrorKind::ExpectedObject { found }
    } else {
        ParseErrorKind::ExpectedArray { found }
    };
    Err(ParseError { kind, path, position: base + index + 1 })
}

fn token_name(byte: u8) -> &'static str {
    match byte {
        b'{' => "object",
        b'[' => "array",
        b'"' => "string",
        b'-' | b'0'..=b'9' => "number",
        b't' | b'f' => "bool",
        b'n' => "null",
        _ => "invalid",
    }
}

/// Converts a decoder error on `text` (a slice of `input`) into a [`ParseError`].

fn parse_error(error: &serde_json::Error, input: &str, text: &str, path: Option<String>) -> ParseError {
    let message = error.to_string();
    let detail = match message.rfind(" at line ") {
        Some(end) => message[..end].to_string(),
        None => message,
    };
    let kind = match error.classify() {
        Category::Eof => ParseErrorKind::UnexpectedEnd,
        Category::Data => ParseErrorKind::TypeMismatch { detail },
        Category::Syntax | Category::Io => ParseErrorKind::Syntax { detail },
    };
    let position = offset_in(input, text) + line_column_offset(text, error.line(), error.column());
    ParseError { kind, path, position }
}

/// Byte offset of the 1-based `line` / `column` pair reported by the decoder.

fn line_column_offset(text: &str, line: usize, column: usize) -> usize {
    if line == 0 {
        return 0;
    }
    let line_start: usize = text.split_inclusive('\n').take(line - 1).map(str::len).sum();
    (line_start + column).min(text.len())
}

/// Offset of `fragment` inside `input`; `0` if it is not a slice of it.

fn offset_in(input: &str, fragment: &str) -> usize {
    let start = input.as_ptr() as usize;
    let offset = (fragment.as_ptr() as usize).wrapping_sub(start);
    if offset <= input.len() { offset } else { 0 }
}
