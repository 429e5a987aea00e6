//! Settings store for the window-placement extension
//!
//! `ConfigStore` resolves the extension's schema, mirrors the persisted values
//! into a [`Snapshot`] and offers dotted-path access to it. Watched keys
//! trigger a full snapshot reload when they change in the backend.
//!
//! Only construction can fail. Reads fall back to the caller's default,
//! writes and saves report through the [`Notifier`] and carry on.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, info};

use crate::backend::{
    ChangeHandler, DirectorySchemaSource, HandlerId, SchemaSource, SettingsBackend, SettingsHost,
    SettingsSchema,
};
use crate::constants::keys;
use crate::error::{BackendError, Result, SettingsError};
use crate::metadata::ExtensionMetadata;
use crate::notify::{Notifier, TracingNotifier};
use crate::path::{ContainerMode, DottedPath};
use crate::snapshot::{Snapshot, integer_value, numeric_value};

const GET_FAILED: &str = "Error getting parameter!";
const SET_FAILED: &str = "Error setting parameter!";
const SAVE_FAILED: &str = "Error saving settings";
const RELOAD_FAILED: &str = "Error reloading settings";

/// Construction options for [`ConfigStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Backend keys whose change reloads the snapshot
    pub watched_keys: Vec<String>,
    /// Container created for missing intermediates on write
    pub container_mode: ContainerMode,
    /// Report successful saves through [`Notifier::info`]
    pub announce_saves: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            watched_keys: vec![keys::LOCATIONS.to_string()],
            container_mode: ContainerMode::Object,
            announce_saves: false,
        }
    }
}

/// A change subscription held by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeListener {
    pub key: String,
    handler: Option<HandlerId>,
}

impl ChangeListener {
    pub fn is_connected(&self) -> bool {
        self.handler.is_some()
    }
}

/// Resolve the extension's schema, preferring schemas bundled in the
/// extension directory over the host's system source.
pub fn resolve_schema(
    metadata: &ExtensionMetadata,
    host: &dyn SettingsHost,
) -> Result<SettingsSchema> {
    let system = host.default_schema_source();
    let schema_dir = metadata.schema_dir();

    let source: Rc<dyn SchemaSource> = if schema_dir.is_dir() {
        debug!(path = %schema_dir.display(), "Using bundled schema directory");
        Rc::new(DirectorySchemaSource::open(&schema_dir, Some(system))?)
    } else {
        system
    };

    source
        .lookup(&metadata.settings_schema, true)
        .ok_or_else(|| SettingsError::SchemaNotFound {
            schema_id: metadata.settings_schema.clone(),
            uuid: metadata.uuid.clone(),
        })
}

/// State shared with change handlers.
struct Shared {
    metadata: ExtensionMetadata,
    backend: Rc<dyn SettingsBackend>,
    snapshot: RefCell<Snapshot>,
    notifier: Rc<dyn Notifier>,
    options: StoreOptions,
}

impl Shared {
    fn load_settings(&self) -> Result<()> {
        let fresh = Snapshot::read(self.backend.as_ref())?;
        *self.snapshot.borrow_mut() = fresh;
        debug!(schema = %self.backend.schema_id(), "Settings snapshot loaded");
        Ok(())
    }
}

fn reload_handler(shared: Weak<Shared>) -> ChangeHandler {
    Rc::new(move |key: &str| {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        info!(key = %key, "Setting changed, reloading snapshot");
        if let Err(e) = shared.load_settings() {
            shared.notifier.error(
                RELOAD_FAILED,
                &format!("Reload after change of '{}' failed, keeping previous values: {}", key, e),
            );
        }
    })
}

/// Whether `path` addresses the JSON-encoded `locations` structure rather
/// than a backend key.
fn touches_locations(path: &str) -> bool {
    path.contains(keys::LOCATIONS)
}

pub struct ConfigStore {
    shared: Rc<Shared>,
    listeners: Vec<ChangeListener>,
}

impl ConfigStore {
    /// Open the store with default options, reporting through `tracing`.
    pub fn new(metadata: ExtensionMetadata, host: Rc<dyn SettingsHost>) -> Result<Self> {
        Self::with_options(metadata, host, Rc::new(TracingNotifier), StoreOptions::default())
    }

    /// Resolve the schema, load the snapshot and subscribe to the watched keys.
    ///
    /// Fails with [`SettingsError::SchemaNotFound`] when neither the bundled
    /// nor the system source knows the schema, and with
    /// [`SettingsError::LocationsDecode`] when the stored locations are not JSON.
    pub fn with_options(
        metadata: ExtensionMetadata,
        host: Rc<dyn SettingsHost>,
        notifier: Rc<dyn Notifier>,
        options: StoreOptions,
    ) -> Result<Self> {
        let schema = resolve_schema(&metadata, host.as_ref())?;
        let backend = host.open(&schema)?;
        let snapshot = Snapshot::read(backend.as_ref())?;
        info!(schema = %schema.id, extension = %metadata.uuid, "Loaded settings");

        let watched = options.watched_keys.clone();
        let shared = Rc::new(Shared {
            metadata,
            backend,
            snapshot: RefCell::new(snapshot),
            notifier,
            options,
        });

        let listeners = watched
            .into_iter()
            .map(|key| {
                let id = shared
                    .backend
                    .connect_changed(&key, reload_handler(Rc::downgrade(&shared)));
                debug!(key = %key, handler = %id, "Watching setting");
                ChangeListener { key, handler: Some(id) }
            })
            .collect();

        Ok(Self { shared, listeners })
    }

    /// Re-read every mirrored value from the backend, replacing the snapshot
    /// in one step.
    pub fn load_settings(&self) -> Result<()> {
        self.shared.load_settings()
    }

    /// Unsubscribe every change listener. Safe to call more than once.
    pub fn destroy(&mut self) {
        for listener in &mut self.listeners {
            if let Some(id) = listener.handler.take() {
                let removed = self.shared.backend.disconnect(id);
                debug!(key = %listener.key, handler = %id, removed, "Stopped watching setting");
            }
        }
    }

    pub fn listeners(&self) -> &[ChangeListener] {
        &self.listeners
    }

    pub fn metadata(&self) -> &ExtensionMetadata {
        &self.shared.metadata
    }

    /// The backend settings object the store is bound to.
    pub fn settings(&self) -> Rc<dyn SettingsBackend> {
        Rc::clone(&self.shared.backend)
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Write the integer keys and the encoded locations back to the backend.
    /// Failures are reported, never returned.
    pub fn save_settings(&self) {
        match self.try_save() {
            Ok(()) => {
                info!(schema = %self.shared.backend.schema_id(), "Settings saved");
                if self.shared.options.announce_saves {
                    self.shared
                        .notifier
                        .info("Success!", "Changes successfully saved");
                }
            }
            Err(e) => self.shared.notifier.error(SAVE_FAILED, &e.to_string()),
        }
    }

    fn try_save(&self) -> Result<()> {
        let backend = &self.shared.backend;
        // Integers go through the backend accessor, as get_number does for them
        for key in keys::INTEGER_KEYS {
            let value = backend.get_int(key)?;
            backend.set_int(key, value)?;
        }

        let encoded = self.shared.snapshot.borrow().encoded_locations()?;
        backend.set_string(keys::LOCATIONS, &encoded)?;
        Ok(())
    }

    /// Value at `path`, or `default` (with an error report) if it cannot be
    /// resolved.
    pub fn get_parameter(&self, path: &str, default: impl Into<Value>) -> Value {
        let default = default.into();
        let resolved = DottedPath::parse(path).and_then(|p| self.shared.snapshot.borrow().get(&p));

        match resolved {
            Ok(value) => value,
            Err(e) => {
                self.shared.notifier.error(
                    GET_FAILED,
                    &format!(
                        "Can not get config by name {} defaulting to {}: {}",
                        path, default, e
                    ),
                );
                default
            }
        }
    }

    /// True only when `path` (or `default`, if unresolvable) is the string
    /// `"true"` or `"1"`.
    pub fn get_boolean(&self, path: &str, default: impl Into<Value>) -> bool {
        match self.get_parameter(path, default) {
            Value::String(s) => s == "true" || s == "1",
            _ => false,
        }
    }

    /// Numeric value at `path`.
    ///
    /// Paths outside `locations` are read straight from the backend's integer
    /// accessor. Otherwise the resolved value is coerced to a number, falling
    /// back to `default` (or 0 if `default` is not numeric either).
    pub fn get_number(&self, path: &str, default: impl Into<Value>) -> f64 {
        let default = default.into();
        let fallback = numeric_value(&default).unwrap_or(0.0);

        if !touches_locations(path) {
            return match self.shared.backend.get_int(path) {
                Ok(n) => f64::from(n),
                Err(e) => {
                    self.shared.notifier.error(
                        GET_FAILED,
                        &format!(
                            "Can not get config by name {} defaulting to {}: {}",
                            path, default, e
                        ),
                    );
                    fallback
                }
            };
        }

        let resolved = self.get_parameter(path, default);
        numeric_value(&resolved).unwrap_or(fallback)
    }

    /// Store `value` at `path`.
    ///
    /// Paths outside `locations` are first written to the backend under the
    /// literal key `path` (integer setter for numeric values, string setter
    /// otherwise). The snapshot is then updated, creating missing containers.
    /// Failures are reported, never returned.
    pub fn set_parameter(&self, path: &str, value: impl Into<Value>) {
        if let Err(e) = self.try_set_parameter(path, value.into()) {
            self.shared
                .notifier
                .error(SET_FAILED, &format!("Can not set config parameter {}: {}", path, e));
        }
    }

    fn try_set_parameter(&self, path: &str, value: Value) -> Result<()> {
        if !touches_locations(path) {
            self.write_backend(path, &value)?;
        }

        let parsed = DottedPath::parse(path)?;
        self.shared
            .snapshot
            .borrow_mut()
            .set(&parsed, value, self.shared.options.container_mode)?;
        debug!(path = %path, "Parameter set");
        Ok(())
    }

    fn write_backend(&self, key: &str, value: &Value) -> Result<()> {
        let backend = &self.shared.backend;
        match (numeric_value(value), value) {
            (Some(n), _) => {
                let int = integer_value(value).ok_or_else(|| BackendError::OutOfRange {
                    key: key.to_string(),
                    value: n,
                })?;
                backend.set_int(key, int)?;
            }
            (None, Value::String(s)) => backend.set_string(key, s)?,
            (None, other) => return Err(SettingsError::UnsupportedValue(other.to_string())),
        }
        Ok(())
    }

    /// Remove the leaf at `path` from the snapshot only.
    ///
    /// A numeric final segment pops the last element of the parent array,
    /// whatever the index. Unlike the other accessors, failures are returned.
    pub fn unset_parameter(&self, path: &str) -> Result<()> {
        let parsed = DottedPath::parse(path)?;
        self.shared.snapshot.borrow_mut().unset(&parsed)?;
        debug!(path = %path, "Parameter unset");
        Ok(())
    }

    /// String array stored under `key`, read straight from the backend.
    pub fn get_strv(&self, key: &str) -> Result<Vec<String>> {
        Ok(self.shared.backend.get_strv(key)?)
    }

    /// Write a string array straight to the backend.
    pub fn set_strv(&self, key: &str, value: &[String]) -> Result<()> {
        Ok(self.shared.backend.set_strv(key, value)?)
    }
}

impl Drop for ConfigStore {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use serde_json::json;

    use crate::backend::KeyFileHost;
    use crate::constants::{default_locations, extension};
    use crate::error::PathError;
    use crate::notify::{Level, MemoryNotifier};

    fn bundled_schema() -> SettingsSchema {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("schemas")
            .join(format!("{}{}", extension::SCHEMA_ID, extension::SCHEMA_SUFFIX));
        SettingsSchema::from_file(&path).unwrap()
    }

    fn metadata() -> ExtensionMetadata {
        ExtensionMetadata::new(extension::UUID, extension::SCHEMA_ID, "/nonexistent/putwindow")
    }

    struct Fixture {
        host: Rc<KeyFileHost>,
        notifier: Rc<MemoryNotifier>,
        store: ConfigStore,
    }

    impl Fixture {
        fn backend(&self) -> Rc<crate::backend::KeyFileSettings> {
            self.host.settings(extension::SCHEMA_ID).unwrap()
        }

        fn error_count(&self) -> usize {
            self.notifier.errors().len()
        }
    }

    fn fixture_with(locations: Option<&str>, options: StoreOptions) -> Fixture {
        let host = Rc::new(KeyFileHost::in_memory(vec![bundled_schema()]));
        if let Some(text) = locations {
            let backend = host.open(&bundled_schema()).unwrap();
            backend.set_string(keys::LOCATIONS, text).unwrap();
        }
        let notifier = Rc::new(MemoryNotifier::new());
        let store =
            ConfigStore::with_options(metadata(), host.clone(), notifier.clone(), options).unwrap();
        Fixture { host, notifier, store }
    }

    fn fixture() -> Fixture {
        fixture_with(None, StoreOptions::default())
    }

    #[test]
    fn test_load_reads_schema_defaults() {
        let f = fixture();
        let snap = f.store.snapshot();
        assert_eq!(snap.center_width, 50);
        assert_eq!(snap.side_height, 50);
        assert_eq!(snap.locations, default_locations());
        assert_eq!(f.store.listeners().len(), 1);
        assert_eq!(f.store.listeners()[0].key, "locations");
        assert!(f.store.listeners()[0].is_connected());
    }

    #[test]
    fn test_empty_locations_string_yields_default_shape() {
        let f = fixture_with(Some(""), StoreOptions::default());
        assert_eq!(f.store.snapshot().locations, default_locations());
    }

    #[test]
    fn test_undecodable_locations_fails_construction() {
        let host = Rc::new(KeyFileHost::in_memory(vec![bundled_schema()]));
        host.open(&bundled_schema())
            .unwrap()
            .set_string(keys::LOCATIONS, "{ not json")
            .unwrap();

        let result = ConfigStore::new(metadata(), host);
        assert!(matches!(result, Err(SettingsError::LocationsDecode(_))));
    }

    #[test]
    fn test_missing_schema_fails_construction() {
        let host = Rc::new(KeyFileHost::in_memory(Vec::new()));
        match ConfigStore::new(metadata(), host) {
            Err(SettingsError::SchemaNotFound { schema_id, uuid }) => {
                assert_eq!(schema_id, extension::SCHEMA_ID);
                assert_eq!(uuid, extension::UUID);
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("store constructed without a schema"),
        }
    }

    #[test]
    fn test_bundled_schema_preferred_over_system() {
        let dir = tempfile::tempdir().unwrap();
        let schema_dir = dir.path().join("schemas");
        fs::create_dir(&schema_dir).unwrap();

        let mut bundled = bundled_schema();
        bundled.keys.get_mut(keys::CENTER_WIDTH).unwrap().default = json!(33);
        fs::write(
            schema_dir.join(format!("{}{}", extension::SCHEMA_ID, extension::SCHEMA_SUFFIX)),
            serde_json::to_string(&bundled).unwrap(),
        )
        .unwrap();

        let host = Rc::new(KeyFileHost::in_memory(vec![bundled_schema()]));
        let meta = ExtensionMetadata::new(extension::UUID, extension::SCHEMA_ID, dir.path());
        let store = ConfigStore::new(meta, host).unwrap();
        assert_eq!(store.snapshot().center_width, 33);
    }

    #[test]
    fn test_bundled_dir_without_schema_falls_back_to_system() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("schemas")).unwrap();

        let host = Rc::new(KeyFileHost::in_memory(vec![bundled_schema()]));
        let meta = ExtensionMetadata::new(extension::UUID, extension::SCHEMA_ID, dir.path());
        let store = ConfigStore::new(meta, host).unwrap();
        assert_eq!(store.snapshot().center_width, 50);
    }

    #[test]
    fn test_get_parameter_returns_stored_value_regardless_of_default() {
        let f = fixture();
        for default in [json!(0), json!("x"), Value::Null] {
            assert_eq!(f.store.get_parameter("locations.positions.0.height", default), json!(100));
        }
        assert_eq!(f.store.get_parameter("centerWidth", -1), json!(50));
        assert_eq!(f.store.get_parameter("locations.autoMove", true), json!(false));
        assert_eq!(f.error_count(), 0);
    }

    #[test]
    fn test_get_parameter_missing_path_reports_once() {
        let f = fixture();
        assert_eq!(f.store.get_parameter("locations.positions.4.x", 17), json!(17));
        assert_eq!(f.error_count(), 1);

        let report = &f.notifier.errors()[0];
        assert_eq!(report.title, "Error getting parameter!");
        assert!(report.message.contains("locations.positions.4.x"));
        assert!(report.message.contains("17"));

        f.notifier.clear();
        assert_eq!(f.store.get_parameter("nothing.here", "fallback"), json!("fallback"));
        assert_eq!(f.store.get_parameter("", 3), json!(3));
        assert_eq!(f.error_count(), 2);
    }

    #[test]
    fn test_get_boolean_only_accepts_true_strings() {
        let f = fixture();
        f.store.set_parameter("locations.flags.a", "true");
        f.store.set_parameter("locations.flags.b", "1");
        f.store.set_parameter("locations.flags.c", true);
        f.store.set_parameter("locations.flags.d", 1);
        f.store.set_parameter("locations.flags.e", "yes");

        assert!(f.store.get_boolean("locations.flags.a", false));
        assert!(f.store.get_boolean("locations.flags.b", false));
        assert!(!f.store.get_boolean("locations.flags.c", false));
        assert!(!f.store.get_boolean("locations.flags.d", false));
        assert!(!f.store.get_boolean("locations.flags.e", false));
        assert!(!f.store.get_boolean("locations.autoMove", "true"));
    }

    #[test]
    fn test_get_boolean_missing_path_applies_rule_to_default() {
        let f = fixture();
        assert!(f.store.get_boolean("locations.missing", "true"));
        assert!(f.store.get_boolean("locations.missing", "1"));
        assert!(!f.store.get_boolean("locations.missing", true));
        assert!(!f.store.get_boolean("locations.missing", false));
    }

    #[test]
    fn test_get_number_inside_locations() {
        let f = fixture_with(
            Some(r#"[{"x":0,"y":0,"width":50,"height":100,"label":"left","size":"42"}]"#),
            StoreOptions::default(),
        );
        assert_eq!(f.store.get_number("locations.0.width", 0), 50.0);
        assert_eq!(f.store.get_number("locations.0.size", 0), 42.0);
        assert_eq!(f.store.get_number("locations.0.label", 7), 7.0);
        assert_eq!(f.store.get_number("locations.0.label", "abc"), 0.0);
        assert_eq!(f.error_count(), 0);

        assert_eq!(f.store.get_number("locations.3.width", 5), 5.0);
        assert_eq!(f.store.get_number("locations.3.width", "n/a"), 0.0);
        assert_eq!(f.error_count(), 2);
    }

    #[test]
    fn test_get_number_outside_locations_reads_backend() {
        let f = fixture();
        f.backend().set_int(keys::SIDE_WIDTH, 65).unwrap();

        // Snapshot is stale (side-width is not watched), backend is authoritative
        assert_eq!(f.store.snapshot().side_width, 50);
        assert_eq!(f.store.get_number(keys::SIDE_WIDTH, 0), 65.0);

        assert_eq!(f.store.get_number("no-such-key", 9), 9.0);
        assert_eq!(f.error_count(), 1);
    }

    #[test]
    fn test_set_parameter_locations_round_trip() {
        let f = fixture();
        f.store.set_parameter("locations.0.height", 200);
        assert_eq!(f.store.get_parameter("locations.0.height", 0), json!(200));

        f.store.set_parameter("locations.positions.0.height", 75);
        assert_eq!(f.store.get_number("locations.positions.0.height", 0), 75.0);

        // Nothing written to the backend
        let stored = f.backend().get_string(keys::LOCATIONS).unwrap();
        let decoded: Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(decoded, default_locations());
        assert_eq!(f.error_count(), 0);
    }

    #[test]
    fn test_set_parameter_vivifies_objects_by_default() {
        let f = fixture();
        f.store.set_parameter("locations.items.0.x", 4);
        assert_eq!(
            f.store.get_parameter("locations.items", Value::Null),
            json!({ "0": { "x": 4 } })
        );
    }

    #[test]
    fn test_set_parameter_infer_mode_creates_arrays() {
        let options = StoreOptions {
            container_mode: ContainerMode::Infer,
            ..StoreOptions::default()
        };
        let f = fixture_with(None, options);
        f.store.set_parameter("locations.items.0.x", 4);
        assert_eq!(f.store.get_parameter("locations.items", Value::Null), json!([{ "x": 4 }]));
    }

    #[test]
    fn test_set_parameter_backend_key() {
        let f = fixture();
        f.store.set_parameter(keys::CENTER_WIDTH, 70);
        assert_eq!(f.backend().get_int(keys::CENTER_WIDTH).unwrap(), 70);
        assert_eq!(f.store.snapshot().center_width, 70);

        f.store.set_parameter(keys::CENTER_HEIGHT, "80");
        assert_eq!(f.backend().get_int(keys::CENTER_HEIGHT).unwrap(), 80);
        assert_eq!(f.error_count(), 0);
    }

    #[test]
    fn test_set_parameter_failures_are_reported() {
        let f = fixture();

        // String into an integer key
        f.store.set_parameter(keys::CENTER_WIDTH, "wide");
        assert_eq!(f.backend().get_int(keys::CENTER_WIDTH).unwrap(), 50);
        assert_eq!(f.store.snapshot().center_width, 50);

        // Unknown backend key
        f.store.set_parameter("colour", 3);

        // Fractional value into an integer key
        f.store.set_parameter(keys::SIDE_WIDTH, 1.5);

        // Writing through a scalar inside locations
        f.store.set_parameter("locations.positions.0.width.deep", 1);

        let errors = f.notifier.errors();
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().all(|r| r.title == "Error setting parameter!"));
        assert_eq!(f.store.snapshot().locations, default_locations());
    }

    #[test]
    fn test_set_parameter_huge_index_is_reported() {
        let f = fixture();
        let far = usize::MAX / 2;
        for index in [usize::MAX, far] {
            f.store.set_parameter(&format!("locations.positions.{}", index), 1);
        }

        let errors = f.notifier.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|r| r.title == "Error setting parameter!"));
        assert_eq!(f.store.snapshot().locations, default_locations());
    }

    #[test]
    fn test_reload_keeps_schema_bound_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let schema_dir = dir.path().join("schemas");
        fs::create_dir(&schema_dir).unwrap();
        let schema_file =
            schema_dir.join(format!("{}{}", extension::SCHEMA_ID, extension::SCHEMA_SUFFIX));
        fs::write(&schema_file, serde_json::to_string(&bundled_schema()).unwrap()).unwrap();

        let host = Rc::new(KeyFileHost::in_memory(vec![bundled_schema()]));
        let notifier = Rc::new(MemoryNotifier::new());
        let meta = ExtensionMetadata::new(extension::UUID, extension::SCHEMA_ID, dir.path());
        let store =
            ConfigStore::with_options(meta, host.clone(), notifier.clone(), StoreOptions::default())
                .unwrap();

        // A broken bundled schema after startup does not affect reloads
        fs::write(&schema_file, "{ not json").unwrap();
        host.settings(extension::SCHEMA_ID)
            .unwrap()
            .set_string(keys::LOCATIONS, r#"{"autoMove":true}"#)
            .unwrap();

        assert_eq!(store.snapshot().locations, json!({ "autoMove": true }));
        store.load_settings().unwrap();
        assert!(notifier.errors().is_empty());
    }

    #[test]
    fn test_save_then_load_reproduces_locations() {
        let f = fixture();
        f.store.set_parameter("locations.autoMove", true);
        f.store.set_parameter("locations.positions.1.x", 50);
        f.store.set_parameter("locations.positions.1.width", 50);
        f.store.set_parameter("locations.rules.firefox.width", 30);
        let expected = f.store.snapshot().locations;

        f.store.save_settings();
        assert_eq!(f.error_count(), 0);

        let stored = f.backend().get_string(keys::LOCATIONS).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&stored).unwrap(), expected);

        f.store.load_settings().unwrap();
        assert_eq!(f.store.snapshot().locations, expected);

        let reopened = ConfigStore::new(metadata(), f.host.clone()).unwrap();
        assert_eq!(reopened.snapshot().locations, expected);
    }

    #[test]
    fn test_save_announces_when_enabled() {
        let options = StoreOptions {
            announce_saves: true,
            ..StoreOptions::default()
        };
        let f = fixture_with(None, options);
        f.store.save_settings();

        let reports = f.notifier.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].level, Level::Info);
    }

    #[test]
    fn test_unset_parameter_removes_key() {
        let f = fixture();
        f.store.unset_parameter("locations.positions").unwrap();
        assert_eq!(f.store.snapshot().locations, json!({ "autoMove": false }));

        assert_eq!(f.store.get_parameter("locations.positions.0.x", -1), json!(-1));
        assert_eq!(f.error_count(), 1);
    }

    #[test]
    fn test_unset_parameter_index_pops_last() {
        let f = fixture();
        f.store.set_parameter("locations.positions.1.x", 50);
        f.store.unset_parameter("locations.positions.0").unwrap();

        let positions = f.store.get_parameter("locations.positions", Value::Null);
        assert_eq!(positions, json!([{ "x": 0, "y": 0, "width": 50, "height": 100 }]));
    }

    #[test]
    fn test_unset_parameter_malformed_path_propagates() {
        let f = fixture();
        assert!(matches!(
            f.store.unset_parameter("locations.rules.0"),
            Err(SettingsError::Path(PathError::MissingKey(_)))
        ));
        assert!(matches!(
            f.store.unset_parameter("windows.0"),
            Err(SettingsError::Path(PathError::UnknownRoot(_)))
        ));
        assert_eq!(f.error_count(), 0);
    }

    #[test]
    fn test_external_change_reloads_snapshot() {
        let f = fixture();
        f.backend()
            .set_string(keys::LOCATIONS, r#"{"autoMove":true,"positions":[]}"#)
            .unwrap();

        assert_eq!(
            f.store.snapshot().locations,
            json!({ "autoMove": true, "positions": [] })
        );
    }

    #[test]
    fn test_external_change_with_bad_json_keeps_snapshot() {
        let f = fixture();
        f.backend().set_string(keys::LOCATIONS, "[1, 2").unwrap();

        assert_eq!(f.store.snapshot().locations, default_locations());
        let errors = f.notifier.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].title, "Error reloading settings");
    }

    #[test]
    fn test_destroy_is_idempotent_and_stops_reloads() {
        let mut f = fixture();
        assert_eq!(f.backend().subscription_count(), 1);

        f.store.destroy();
        f.store.destroy();
        assert_eq!(f.backend().subscription_count(), 0);
        assert!(f.store.listeners().iter().all(|l| !l.is_connected()));

        f.backend()
            .set_string(keys::LOCATIONS, r#"{"autoMove":true}"#)
            .unwrap();
        assert_eq!(f.store.snapshot().locations, default_locations());
    }

    #[test]
    fn test_drop_disconnects_listeners() {
        let f = fixture();
        let backend = f.backend();
        drop(f.store);
        assert_eq!(backend.subscription_count(), 0);
    }

    #[test]
    fn test_watching_extra_keys() {
        let options = StoreOptions {
            watched_keys: vec![keys::LOCATIONS.to_string(), keys::SIDE_WIDTH.to_string()],
            ..StoreOptions::default()
        };
        let f = fixture_with(None, options);
        f.backend().set_int(keys::SIDE_WIDTH, 61).unwrap();
        assert_eq!(f.store.snapshot().side_width, 61);

        // A store write to a watched key reloads too, without tripping over itself
        f.store.set_parameter(keys::SIDE_WIDTH, 62);
        assert_eq!(f.store.snapshot().side_width, 62);
        assert_eq!(f.error_count(), 0);
    }

    #[test]
    fn test_no_watched_keys() {
        let options = StoreOptions {
            watched_keys: Vec::new(),
            ..StoreOptions::default()
        };
        let f = fixture_with(None, options);
        assert!(f.store.listeners().is_empty());
        assert_eq!(f.backend().subscription_count(), 0);
    }

    #[test]
    fn test_string_arrays_pass_through() {
        let f = fixture();
        assert_eq!(f.store.get_strv("put-to-side-n").unwrap(), vec!["<Super>KP_8".to_string()]);

        let bindings = vec!["<Super>Up".to_string(), "<Super>KP_8".to_string()];
        f.store.set_strv("put-to-side-n", &bindings).unwrap();
        assert_eq!(f.backend().get_strv("put-to-side-n").unwrap(), bindings);

        assert!(matches!(
            f.store.get_strv(keys::CENTER_WIDTH),
            Err(SettingsError::Backend(BackendError::TypeMismatch { .. }))
        ));
    }

    /// Backend that refuses every write.
    struct ReadOnly(Rc<crate::backend::KeyFileSettings>);

    impl SettingsBackend for ReadOnly {
        fn schema_id(&self) -> &str {
            self.0.schema_id()
        }
        fn get_int(&self, key: &str) -> Result<i32, BackendError> {
            self.0.get_int(key)
        }
        fn set_int(&self, _key: &str, _value: i32) -> Result<(), BackendError> {
            Err(read_only())
        }
        fn get_string(&self, key: &str) -> Result<String, BackendError> {
            self.0.get_string(key)
        }
        fn set_string(&self, _key: &str, _value: &str) -> Result<(), BackendError> {
            Err(read_only())
        }
        fn get_strv(&self, key: &str) -> Result<Vec<String>, BackendError> {
            self.0.get_strv(key)
        }
        fn set_strv(&self, _key: &str, _value: &[String]) -> Result<(), BackendError> {
            Err(read_only())
        }
        fn connect_changed(&self, key: &str, handler: ChangeHandler) -> HandlerId {
            self.0.connect_changed(key, handler)
        }
        fn disconnect(&self, id: HandlerId) -> bool {
            self.0.disconnect(id)
        }
    }

    fn read_only() -> BackendError {
        BackendError::Io {
            path: "/read-only".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        }
    }

    struct ReadOnlyHost(KeyFileHost);

    impl SettingsHost for ReadOnlyHost {
        fn default_schema_source(&self) -> Rc<dyn SchemaSource> {
            self.0.default_schema_source()
        }
        fn open(&self, schema: &SettingsSchema) -> Result<Rc<dyn SettingsBackend>, BackendError> {
            self.0.open(schema)?;
            let inner = self.0.settings(&schema.id).ok_or_else(read_only)?;
            Ok(Rc::new(ReadOnly(inner)))
        }
    }

    #[test]
    fn test_save_failure_is_reported_not_propagated() {
        let host = Rc::new(ReadOnlyHost(KeyFileHost::in_memory(vec![bundled_schema()])));
        let notifier = Rc::new(MemoryNotifier::new());
        let store =
            ConfigStore::with_options(metadata(), host, notifier.clone(), StoreOptions::default())
                .unwrap();

        store.save_settings();
        let errors = notifier.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].title, "Error saving settings");
        assert!(errors[0].message.contains("read-only"));
    }
}
