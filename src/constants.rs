//! Application-wide constants
//!
//! Setting key names, schema identifiers and file locations used throughout
//! the crate, providing a single source of truth for constant values.

use serde_json::{Value, json};

/// Backend key names (as declared in the settings schema)
pub mod keys {
    /// Width of the centered window, in percent of the work area
    pub const CENTER_WIDTH: &str = "center-width";

    /// Height of the centered window, in percent of the work area
    pub const CENTER_HEIGHT: &str = "center-height";

    /// Width of a window moved to the east/west side
    pub const SIDE_WIDTH: &str = "side-width";

    /// Height of a window moved to the north/south side
    pub const SIDE_HEIGHT: &str = "side-height";

    /// JSON-encoded window placement rules
    pub const LOCATIONS: &str = "locations";

    /// Integer keys mirrored into the snapshot, in persist order
    pub const INTEGER_KEYS: [&str; 4] = [CENTER_WIDTH, CENTER_HEIGHT, SIDE_WIDTH, SIDE_HEIGHT];
}

/// Snapshot field names (first segment of a dotted path)
pub mod fields {
    pub const CENTER_WIDTH: &str = "centerWidth";
    pub const CENTER_HEIGHT: &str = "centerHeight";
    pub const SIDE_WIDTH: &str = "sideWidth";
    pub const SIDE_HEIGHT: &str = "sideHeight";
    pub const LOCATIONS: &str = "locations";
}

/// Extension identity and on-disk layout
pub mod extension {
    /// UUID of the window-placement extension
    pub const UUID: &str = "putWindow@clemens.lab21.org";

    /// Schema id declared in metadata.json
    pub const SCHEMA_ID: &str = "org.gnome.shell.extensions.org-lab21-putwindow";

    /// Extension metadata file name
    pub const METADATA_FILE: &str = "metadata.json";

    /// Directory (relative to the extension dir) holding bundled schemas
    pub const SCHEMA_DIR: &str = "schemas";

    /// Suffix of schema definition files
    pub const SCHEMA_SUFFIX: &str = ".schema.json";
}

/// Default locations for the CLI front end
pub mod paths {
    /// Directory under the user config dir holding stored values
    pub const APP_DIR: &str = "putwindow";

    /// Directory under the user data dir holding system-registered schemas
    pub const SYSTEM_SCHEMA_DIR: &str = "putwindow/schemas";

    /// Directory under the user data dir holding installed shell extensions
    pub const EXTENSIONS_DIR: &str = "gnome-shell/extensions";
}

/// Initial `locations` structure used when nothing has been written yet
pub fn default_locations() -> Value {
    json!({
        "autoMove": false,
        "positions": [{
            "x": 0,
            "y": 0,
            "width": 50,
            "height": 100
        }]
    })
}
