//! In-memory mirror of the persisted settings.
//!
//! The first segment of a dotted path selects a top-level field, by either
//! its snapshot name (`centerWidth`) or its backend key (`center-width`).
//! Deeper segments only make sense below `locations`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::SettingsBackend;
use crate::constants::{default_locations, fields, keys};
use crate::error::{PathError, Result, SettingsError};
use crate::path::{self, ContainerMode, DottedPath, Segment};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub center_width: i32,
    pub center_height: i32,
    pub side_width: i32,
    pub side_height: i32,
    /// Window placement rules; opaque beyond path access
    pub locations: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    CenterWidth,
    CenterHeight,
    SideWidth,
    SideHeight,
    Locations,
}

impl Field {
    fn parse(name: &str) -> Result<Self, PathError> {
        match name {
            fields::CENTER_WIDTH | keys::CENTER_WIDTH => Ok(Field::CenterWidth),
            fields::CENTER_HEIGHT | keys::CENTER_HEIGHT => Ok(Field::CenterHeight),
            fields::SIDE_WIDTH | keys::SIDE_WIDTH => Ok(Field::SideWidth),
            fields::SIDE_HEIGHT | keys::SIDE_HEIGHT => Ok(Field::SideHeight),
            fields::LOCATIONS => Ok(Field::Locations),
            other => Err(PathError::UnknownRoot(other.to_string())),
        }
    }
}

/// Numeric reading of a value, treating numeric strings, booleans and null
/// as numbers. Arrays, objects and other strings are not numeric.
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Some(0.0);
            }
            trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Integer reading of a value, if it is numeric and fits 32 bits.
pub fn integer_value(value: &Value) -> Option<i32> {
    let n = numeric_value(value)?;
    if n.fract() != 0.0 || n < f64::from(i32::MIN) || n > f64::from(i32::MAX) {
        return None;
    }
    Some(n as i32)
}

impl Snapshot {
    /// Read every mirrored key from `backend`.
    ///
    /// An empty `locations` string means the value was never written and
    /// yields the default start shape; any other undecodable text fails.
    pub fn read(backend: &dyn SettingsBackend) -> Result<Self> {
        let encoded = backend.get_string(keys::LOCATIONS)?;
        let locations = if encoded.trim().is_empty() {
            default_locations()
        } else {
            serde_json::from_str(&encoded).map_err(SettingsError::LocationsDecode)?
        };

        Ok(Snapshot {
            center_width: backend.get_int(keys::CENTER_WIDTH)?,
            center_height: backend.get_int(keys::CENTER_HEIGHT)?,
            side_width: backend.get_int(keys::SIDE_WIDTH)?,
            side_height: backend.get_int(keys::SIDE_HEIGHT)?,
            locations,
        })
    }

    /// JSON text stored in the backend for `locations`.
    pub fn encoded_locations(&self) -> Result<String> {
        serde_json::to_string(&self.locations).map_err(|e| SettingsError::Backend(e.into()))
    }

    fn integer_mut(&mut self, field: Field) -> Option<&mut i32> {
        match field {
            Field::CenterWidth => Some(&mut self.center_width),
            Field::CenterHeight => Some(&mut self.center_height),
            Field::SideWidth => Some(&mut self.side_width),
            Field::SideHeight => Some(&mut self.side_height),
            Field::Locations => None,
        }
    }

    /// Value stored at `path`.
    pub fn get(&self, path: &DottedPath) -> Result<Value, PathError> {
        let root = match Field::parse(path.root())? {
            Field::CenterWidth => Value::from(self.center_width),
            Field::CenterHeight => Value::from(self.center_height),
            Field::SideWidth => Value::from(self.side_width),
            Field::SideHeight => Value::from(self.side_height),
            Field::Locations => return path::lookup(&self.locations, path.segments()).cloned(),
        };
        path::lookup(&root, path.segments()).cloned()
    }

    /// Store `value` at `path`, creating missing containers below `locations`.
    pub fn set(
        &mut self,
        path: &DottedPath,
        value: Value,
        mode: ContainerMode,
    ) -> Result<(), PathError> {
        let field = Field::parse(path.root())?;
        match self.integer_mut(field) {
            None => path::assign(&mut self.locations, path.segments(), value, mode),
            Some(slot) => {
                if let Some(seg) = path.segments().first() {
                    return Err(PathError::NotAContainer(seg.to_string()));
                }
                *slot = integer_value(&value)
                    .ok_or_else(|| PathError::NotAnInteger(path.root().to_string()))?;
                Ok(())
            }
        }
    }

    /// Remove the leaf at `path`. Top-level fields cannot be removed.
    pub fn unset(&mut self, path: &DottedPath) -> Result<(), PathError> {
        let field = Field::parse(path.root())?;
        let segments = path.segments();
        if segments.is_empty() {
            return Err(PathError::RootNotRemovable(path.root().to_string()));
        }

        match field {
            Field::Locations => path::remove(&mut self.locations, segments),
            _ => Err(PathError::NotAContainer(
                segments.first().map(Segment::to_string).unwrap_or_default(),
            )),
        }
    }
}
