//! Dotted path parsing and traversal over nested JSON values.
//!
//! Paths look like `locations.positions.0.x`. Each segment is either an
//! object key or, when it is a canonical non-negative integer, a sequence
//! index. Objects are still indexable by numeric segments (the numeral is
//! used as the key).

use std::fmt;

use serde_json::{Map, Value};

use crate::error::PathError;

/// A single segment within a dotted path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Object key, e.g. `positions`
    Key(String),
    /// Sequence index, e.g. `0`
    Index(usize),
}

impl Segment {
    /// Classify a raw segment. Only canonical numerals (`0`, `12`, not `01`
    /// or `+1`) become indices.
    pub fn parse(raw: &str) -> Self {
        let canonical = !raw.is_empty()
            && raw.bytes().all(|b| b.is_ascii_digit())
            && (raw.len() == 1 || !raw.starts_with('0'));

        match raw.parse::<usize>() {
            Ok(index) if canonical => Segment::Index(index),
            _ => Segment::Key(raw.to_string()),
        }
    }

    /// The segment as an object key.
    pub fn key(&self) -> String {
        match self {
            Segment::Key(key) => key.clone(),
            Segment::Index(index) => index.to_string(),
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Segment::Index(_))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Key(key) => f.write_str(key),
            Segment::Index(index) => write!(f, "{}", index),
        }
    }
}

/// A parsed dotted path: a root field name followed by zero or more segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DottedPath {
    root: String,
    segments: Vec<Segment>,
}

impl DottedPath {
    pub fn parse(input: &str) -> Result<Self, PathError> {
        if input.is_empty() {
            return Err(PathError::Empty);
        }

        let mut parts = input.split('.');
        let root = parts.next().unwrap_or_default().to_string();
        let segments = parts.map(Segment::parse).collect();

        Ok(DottedPath { root, segments })
    }

    /// First segment, naming a top-level field.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Segments after the root.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

impl fmt::Display for DottedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root)?;
        for seg in &self.segments {
            write!(f, ".{}", seg)?;
        }
        Ok(())
    }
}

/// Kind of container created for a missing intermediate segment on write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContainerMode {
    /// Always create an empty object, even when the next segment is an index.
    /// `locations.items.0.x` on a fresh tree yields `{"items": {"0": {"x": ..}}}`.
    #[default]
    Object,
    /// Create an array when the next segment is an index, an object otherwise.
    Infer,
}

impl ContainerMode {
    fn fresh(self, next: &Segment) -> Value {
        match self {
            ContainerMode::Infer if next.is_index() => Value::Array(Vec::new()),
            _ => Value::Object(Map::new()),
        }
    }
}

/// Resolve `segments` starting at `value`.
pub fn lookup<'a>(value: &'a Value, segments: &[Segment]) -> Result<&'a Value, PathError> {
    segments.iter().try_fold(value, child)
}

fn child<'a>(value: &'a Value, seg: &Segment) -> Result<&'a Value, PathError> {
    match (value, seg) {
        (Value::Object(map), _) => map
            .get(&seg.key())
            .ok_or_else(|| PathError::MissingKey(seg.key())),
        (Value::Array(items), Segment::Index(index)) => {
            items.get(*index).ok_or(PathError::IndexOutOfRange {
                index: *index,
                len: items.len(),
            })
        }
        (Value::Array(_), Segment::Key(key)) => Err(PathError::MissingKey(key.clone())),
        _ => Err(PathError::NotAContainer(seg.to_string())),
    }
}

fn child_mut<'a>(value: &'a mut Value, seg: &Segment) -> Result<&'a mut Value, PathError> {
    match (value, seg) {
        (Value::Object(map), _) => map
            .get_mut(&seg.key())
            .ok_or_else(|| PathError::MissingKey(seg.key())),
        (Value::Array(items), Segment::Index(index)) => {
            let len = items.len();
            items
                .get_mut(*index)
                .ok_or(PathError::IndexOutOfRange { index: *index, len })
        }
        (Value::Array(_), Segment::Key(key)) => Err(PathError::MissingKey(key.clone())),
        _ => Err(PathError::NotAContainer(seg.to_string())),
    }
}

/// Values a write treats as an empty slot to be replaced by a fresh container.
fn is_vacant(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Most null slots a write past the end of an array may insert.
pub const MAX_INDEX_GAP: usize = 1024;

fn slot_mut<'a>(value: &'a mut Value, seg: &Segment) -> Result<&'a mut Value, PathError> {
    match (value, seg) {
        (Value::Object(map), _) => Ok(map.entry(seg.key()).or_insert(Value::Null)),
        (Value::Array(items), Segment::Index(index)) => {
            let len = items.len();
            if *index >= len {
                if *index - len > MAX_INDEX_GAP {
                    return Err(PathError::IndexOutOfRange { index: *index, len });
                }
                // Holes left by a far index encode as null, like a sparse array
                items.resize(*index + 1, Value::Null);
            }
            Ok(&mut items[*index])
        }
        (Value::Array(_), Segment::Key(key)) => Err(PathError::NotAnObject(key.clone())),
        _ => Err(PathError::NotAContainer(seg.to_string())),
    }
}

/// Write `new` at `segments` below `target`, creating missing intermediates.
///
/// An intermediate counts as missing when it is absent or holds an empty
/// scalar (`null`, `false`, `0`, `""`); such slots are replaced by a fresh
/// container chosen by `mode`. An index more than [`MAX_INDEX_GAP`] past
/// the end of its array is rejected. On error `target` is left unchanged.
pub fn assign(
    target: &mut Value,
    segments: &[Segment],
    new: Value,
    mode: ContainerMode,
) -> Result<(), PathError> {
    let Some((last, parents)) = segments.split_last() else {
        *target = new;
        return Ok(());
    };

    let mut draft = target.clone();
    let mut current = &mut draft;
    for (i, seg) in parents.iter().enumerate() {
        let slot = slot_mut(current, seg)?;
        if is_vacant(slot) {
            *slot = mode.fresh(&segments[i + 1]);
        }
        current = slot;
    }

    *slot_mut(current, last)? = new;
    *target = draft;
    Ok(())
}

/// Remove the leaf addressed by `segments` below `target`.
///
/// A key segment deletes that field from its parent object (absent keys are
/// ignored). An index segment pops the *last* element of the parent array,
/// whatever the index value.
pub fn remove(target: &mut Value, segments: &[Segment]) -> Result<(), PathError> {
    let Some((last, parents)) = segments.split_last() else {
        return Err(PathError::Empty);
    };

    let parent = parents.iter().try_fold(target, child_mut)?;

    match (parent, last) {
        (Value::Object(map), Segment::Key(key)) => {
            map.remove(key);
            Ok(())
        }
        (Value::Array(items), Segment::Index(_)) => {
            items.pop();
            Ok(())
        }
        (Value::Array(_), Segment::Key(key)) => Err(PathError::NotAnObject(key.clone())),
        (Value::Object(_), Segment::Index(index)) => {
            Err(PathError::NotAnArray(index.to_string()))
        }
        (_, seg) => Err(PathError::NotAContainer(seg.to_string())),
    }
}
