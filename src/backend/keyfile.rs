//! JSON key-file settings backend
//!
//! User-set values for a schema live in `<store-dir>/<schema-id>.json` as a
//! flat JSON object; keys never written fall back to the schema default.
//! Every successful write is flushed to disk immediately. Another process
//! editing the file is picked up with [`KeyFileSettings::reload`].

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, info};

use super::{
    ChangeHandler, DirectorySchemaSource, HandlerId, KeyKind, SchemaKey, SchemaSource,
    SettingsBackend, SettingsHost, SettingsSchema,
};
use crate::error::{BackendError, Result};

struct Subscription {
    id: HandlerId,
    key: String,
    handler: ChangeHandler,
}

/// Settings object for one schema, backed by an optional JSON file.
pub struct KeyFileSettings {
    schema: SettingsSchema,
    path: Option<PathBuf>,
    values: RefCell<BTreeMap<String, Value>>,
    subscriptions: RefCell<Vec<Subscription>>,
    next_handler: Cell<u64>,
}

impl KeyFileSettings {
    /// Open settings stored at `path`. A missing file means all defaults.
    pub fn open(schema: SettingsSchema, path: PathBuf) -> Result<Self, BackendError> {
        let values = read_values(&path)?;
        debug!(
            schema = %schema.id,
            path = %path.display(),
            stored = values.len(),
            "Opened settings file"
        );
        Ok(Self::with_values(schema, Some(path), values))
    }

    /// Settings kept in memory only.
    pub fn in_memory(schema: SettingsSchema) -> Self {
        Self::with_values(schema, None, BTreeMap::new())
    }

    fn with_values(
        schema: SettingsSchema,
        path: Option<PathBuf>,
        values: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            schema,
            path,
            values: RefCell::new(values),
            subscriptions: RefCell::new(Vec::new()),
            next_handler: Cell::new(1),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of live change subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.borrow().len()
    }

    /// Re-read the value file and notify subscribers of every key whose
    /// effective value differs. Returns the changed keys.
    pub fn reload(&self) -> Result<Vec<String>, BackendError> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };

        let fresh = read_values(path)?;
        let changed: Vec<String> = {
            let current = self.values.borrow();
            self.schema
                .keys
                .iter()
                .filter(|(name, key)| {
                    effective(&current, name, key) != effective(&fresh, name, key)
                })
                .map(|(name, _)| name.clone())
                .collect()
        };
        *self.values.borrow_mut() = fresh;

        if !changed.is_empty() {
            info!(schema = %self.schema.id, keys = ?changed, "Settings changed on disk");
        }
        for key in &changed {
            self.emit(key);
        }
        Ok(changed)
    }

    fn spec(&self, key: &str, kind: KeyKind) -> Result<&SchemaKey, BackendError> {
        let spec = self.schema.key(key).ok_or_else(|| BackendError::UnknownKey {
            schema: self.schema.id.clone(),
            key: key.to_string(),
        })?;
        if spec.kind != kind {
            return Err(BackendError::TypeMismatch {
                key: key.to_string(),
                expected: spec.kind,
            });
        }
        Ok(spec)
    }

    fn get(&self, key: &str, kind: KeyKind) -> Result<Value, BackendError> {
        let spec = self.spec(key, kind)?;
        Ok(effective(&self.values.borrow(), key, spec).clone())
    }

    fn set(&self, key: &str, kind: KeyKind, value: Value) -> Result<(), BackendError> {
        let spec = self.spec(key, kind)?;
        let previous = {
            let mut values = self.values.borrow_mut();
            if effective(&values, key, spec) == &value {
                return Ok(());
            }
            values.insert(key.to_string(), value)
        };

        if let Err(e) = self.flush() {
            let mut values = self.values.borrow_mut();
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            return Err(e);
        }

        self.emit(key);
        Ok(())
    }

    fn flush(&self) -> Result<(), BackendError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| BackendError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(&*self.values.borrow())?;
        fs::write(path, json).map_err(|source| BackendError::Io {
            path: path.clone(),
            source,
        })
    }

    /// Invoke subscribers of `key` without holding any internal borrow.
    fn emit(&self, key: &str) {
        let handlers: Vec<ChangeHandler> = self
            .subscriptions
            .borrow()
            .iter()
            .filter(|sub| sub.key == key)
            .map(|sub| Rc::clone(&sub.handler))
            .collect();

        debug!(schema = %self.schema.id, key = %key, handlers = handlers.len(), "Emitting change");
        for handler in handlers {
            handler(key);
        }
    }
}

fn effective<'a>(values: &'a BTreeMap<String, Value>, key: &str, spec: &'a SchemaKey) -> &'a Value {
    values
        .get(key)
        .filter(|v| spec.kind.accepts(v))
        .unwrap_or(&spec.default)
}

fn read_values(path: &Path) -> Result<BTreeMap<String, Value>, BackendError> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(source) => Err(BackendError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn expect_int(key: &str, value: Value) -> Result<i32, BackendError> {
    value
        .as_i64()
        .and_then(|n| i32::try_from(n).ok())
        .ok_or_else(|| BackendError::TypeMismatch {
            key: key.to_string(),
            expected: KeyKind::Int,
        })
}

impl SettingsBackend for KeyFileSettings {
    fn schema_id(&self) -> &str {
        &self.schema.id
    }

    fn get_int(&self, key: &str) -> Result<i32, BackendError> {
        expect_int(key, self.get(key, KeyKind::Int)?)
    }

    fn set_int(&self, key: &str, value: i32) -> Result<(), BackendError> {
        self.set(key, KeyKind::Int, Value::from(value))
    }

    fn get_string(&self, key: &str) -> Result<String, BackendError> {
        match self.get(key, KeyKind::String)? {
            Value::String(s) => Ok(s),
            _ => Err(BackendError::TypeMismatch {
                key: key.to_string(),
                expected: KeyKind::String,
            }),
        }
    }

    fn set_string(&self, key: &str, value: &str) -> Result<(), BackendError> {
        self.set(key, KeyKind::String, Value::from(value))
    }

    fn get_strv(&self, key: &str) -> Result<Vec<String>, BackendError> {
        Ok(serde_json::from_value(self.get(key, KeyKind::StringArray)?)?)
    }

    fn set_strv(&self, key: &str, value: &[String]) -> Result<(), BackendError> {
        self.set(key, KeyKind::StringArray, Value::from(value.to_vec()))
    }

    fn connect_changed(&self, key: &str, handler: ChangeHandler) -> HandlerId {
        let id = HandlerId(self.next_handler.get());
        self.next_handler.set(id.0 + 1);
        self.subscriptions.borrow_mut().push(Subscription {
            id,
            key: key.to_string(),
            handler,
        });
        debug!(schema = %self.schema.id, key = %key, handler = %id, "Connected change handler");
        id
    }

    fn disconnect(&self, id: HandlerId) -> bool {
        let mut subscriptions = self.subscriptions.borrow_mut();
        let before = subscriptions.len();
        subscriptions.retain(|sub| sub.id != id);
        before != subscriptions.len()
    }
}

/// Host handing out [`KeyFileSettings`], one per schema id.
pub struct KeyFileHost {
    system: Rc<DirectorySchemaSource>,
    store_dir: Option<PathBuf>,
    opened: RefCell<HashMap<String, Rc<KeyFileSettings>>>,
}

impl KeyFileHost {
    /// Host with system schemas from `system_schema_dir` (may be absent) and
    /// values stored under `store_dir`.
    pub fn new(system_schema_dir: &Path, store_dir: PathBuf) -> Result<Self> {
        let system = if system_schema_dir.is_dir() {
            DirectorySchemaSource::open(system_schema_dir, None)?
        } else {
            info!(path = %system_schema_dir.display(), "No system schema directory");
            DirectorySchemaSource::empty()
        };

        Ok(Self {
            system: Rc::new(system),
            store_dir: Some(store_dir),
            opened: RefCell::new(HashMap::new()),
        })
    }

    /// Host that keeps every value in memory.
    pub fn in_memory(system_schemas: Vec<SettingsSchema>) -> Self {
        Self {
            system: Rc::new(DirectorySchemaSource::from_schemas(system_schemas, None)),
            store_dir: None,
            opened: RefCell::new(HashMap::new()),
        }
    }

    /// Concrete handle to an already opened schema.
    pub fn settings(&self, schema_id: &str) -> Option<Rc<KeyFileSettings>> {
        self.opened.borrow().get(schema_id).cloned()
    }
}

impl SettingsHost for KeyFileHost {
    fn default_schema_source(&self) -> Rc<dyn SchemaSource> {
        self.system.clone()
    }

    fn open(&self, schema: &SettingsSchema) -> Result<Rc<dyn SettingsBackend>, BackendError> {
        if let Some(existing) = self.settings(&schema.id) {
            return Ok(existing);
        }

        let settings = match &self.store_dir {
            Some(dir) => {
                let path = dir.join(format!("{}.json", schema.id));
                KeyFileSettings::open(schema.clone(), path)?
            }
            None => KeyFileSettings::in_memory(schema.clone()),
        };
        let settings = Rc::new(settings);
        self.opened
            .borrow_mut()
            .insert(schema.id.clone(), Rc::clone(&settings));
        Ok(settings)
    }
}
