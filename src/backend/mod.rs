//! Host settings backend
//!
//! The store talks to its persisted values only through the traits below:
//! - **SchemaSource**: resolves schema definitions by id
//! - **SettingsHost**: hands out the system schema source and opens a settings object for a schema
//! - **SettingsBackend**: typed get/set per key plus change subscriptions
//!
//! [`KeyFileHost`] is the bundled implementation, storing values as JSON.

use std::fmt;
use std::rc::Rc;

use crate::error::BackendError;

mod keyfile;
mod schema;

pub use keyfile::{KeyFileHost, KeyFileSettings};
pub use schema::{DirectorySchemaSource, KeyKind, SchemaKey, SettingsSchema};

/// Callback invoked with the changed key name.
pub type ChangeHandler = Rc<dyn Fn(&str)>;

/// Identifies one change subscription on a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler#{}", self.0)
    }
}

/// Lookup of schema definitions by id.
pub trait SchemaSource {
    /// Find `schema_id`, consulting parent sources when `recursive` is set.
    fn lookup(&self, schema_id: &str, recursive: bool) -> Option<SettingsSchema>;
}

/// A settings object bound to one schema.
///
/// Change handlers run synchronously from within the setter that caused the
/// change, after the new value is visible to getters. Implementations must
/// not hold internal borrows while handlers run, since handlers typically
/// read the backend again.
pub trait SettingsBackend {
    fn schema_id(&self) -> &str;

    fn get_int(&self, key: &str) -> Result<i32, BackendError>;
    fn set_int(&self, key: &str, value: i32) -> Result<(), BackendError>;

    fn get_string(&self, key: &str) -> Result<String, BackendError>;
    fn set_string(&self, key: &str, value: &str) -> Result<(), BackendError>;

    fn get_strv(&self, key: &str) -> Result<Vec<String>, BackendError>;
    fn set_strv(&self, key: &str, value: &[String]) -> Result<(), BackendError>;

    /// Subscribe to changes of `key`.
    fn connect_changed(&self, key: &str, handler: ChangeHandler) -> HandlerId;

    /// Drop a subscription. Returns false if `id` was not connected.
    fn disconnect(&self, id: HandlerId) -> bool;
}

/// The environment the store runs in.
pub trait SettingsHost {
    /// System-wide schema source used when no bundled schemas are present.
    fn default_schema_source(&self) -> Rc<dyn SchemaSource>;

    /// Open the settings object for `schema`. Opening the same schema twice
    /// yields the same underlying object.
    fn open(&self, schema: &SettingsSchema) -> Result<Rc<dyn SettingsBackend>, BackendError>;
}
