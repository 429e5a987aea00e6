#![forbid(unsafe_code)]

//! Settings store for the putWindow window-placement extension.
//!
//! [`ConfigStore`] mirrors a schema-backed settings object into a local
//! snapshot, offers dotted-path access into it (`locations.positions.0.x`),
//! persists it back on demand and reloads it when watched keys change.

pub mod backend;
pub mod constants;
pub mod error;
pub mod metadata;
pub mod notify;
pub mod path;
pub mod snapshot;
pub mod store;

pub use backend::{KeyFileHost, SettingsBackend, SettingsHost};
pub use error::{BackendError, PathError, SettingsError};
pub use metadata::ExtensionMetadata;
pub use notify::{Notifier, TracingNotifier};
pub use path::ContainerMode;
pub use snapshot::Snapshot;
pub use store::{ConfigStore, StoreOptions};
