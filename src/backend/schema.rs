//! Schema definitions and directory-backed schema sources
//!
//! A schema file is a JSON document named `<anything>.schema.json`:
//!
//! ```json
//! {
//!   "id": "org.gnome.shell.extensions.org-lab21-putwindow",
//!   "keys": {
//!     "center-width": { "type": "i", "default": 50, "summary": "Center width" }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::SchemaSource;
use crate::constants::extension::SCHEMA_SUFFIX;
use crate::error::{Result, SettingsError};

/// Value type of a schema key, tagged like GVariant type strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyKind {
    #[serde(rename = "i")]
    Int,
    #[serde(rename = "s")]
    String,
    #[serde(rename = "as")]
    StringArray,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::Int => "i",
            KeyKind::String => "s",
            KeyKind::StringArray => "as",
        }
    }

    /// Whether `value` is a valid stored value for this kind.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            KeyKind::Int => value
                .as_i64()
                .is_some_and(|n| i32::try_from(n).is_ok()),
            KeyKind::String => value.is_string(),
            KeyKind::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One key declared by a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaKey {
    #[serde(rename = "type")]
    pub kind: KeyKind,
    pub default: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
}

/// A named set of typed keys with defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSchema {
    pub id: String,
    #[serde(default)]
    pub keys: BTreeMap<String, SchemaKey>,
}

impl SettingsSchema {
    pub fn key(&self, name: &str) -> Option<&SchemaKey> {
        self.keys.get(name)
    }

    /// Parse a schema file, dropping keys whose default does not match their type.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut schema: SettingsSchema =
            serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        schema.keys.retain(|name, key| {
            let valid = key.kind.accepts(&key.default);
            if !valid {
                warn!(
                    schema = %path.display(),
                    key = %name,
                    kind = %key.kind,
                    "Default does not match key type, dropping key"
                );
            }
            valid
        });

        Ok(schema)
    }
}

/// Schemas loaded from one directory, optionally chained to a parent source.
pub struct DirectorySchemaSource {
    schemas: HashMap<String, SettingsSchema>,
    parent: Option<Rc<dyn SchemaSource>>,
}

impl DirectorySchemaSource {
    /// Load every `*.schema.json` file in `dir`.
    pub fn open(dir: &Path, parent: Option<Rc<dyn SchemaSource>>) -> Result<Self> {
        let entries = fs::read_dir(dir).map_err(|source| SettingsError::Read {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut schemas = HashMap::new();
        for entry in entries {
            let path = entry
                .map_err(|source| SettingsError::Read {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            let is_schema = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(SCHEMA_SUFFIX));
            if !is_schema {
                continue;
            }

            let schema = SettingsSchema::from_file(&path)?;
            debug!(schema = %schema.id, path = %path.display(), "Loaded schema");
            schemas.insert(schema.id.clone(), schema);
        }

        Ok(Self { schemas, parent })
    }

    /// Build a source from already-parsed schemas.
    pub fn from_schemas(
        schemas: impl IntoIterator<Item = SettingsSchema>,
        parent: Option<Rc<dyn SchemaSource>>,
    ) -> Self {
        Self {
            schemas: schemas.into_iter().map(|s| (s.id.clone(), s)).collect(),
            parent,
        }
    }

    pub fn empty() -> Self {
        Self::from_schemas(Vec::new(), None)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

impl SchemaSource for DirectorySchemaSource {
    fn lookup(&self, schema_id: &str, recursive: bool) -> Option<SettingsSchema> {
        if let Some(schema) = self.schemas.get(schema_id) {
            return Some(schema.clone());
        }
        if recursive {
            self.parent.as_ref()?.lookup(schema_id, true)
        } else {
            None
        }
    }
}
