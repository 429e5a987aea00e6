//! Extension metadata
//!
//! Identity of the installed extension: its uuid, the schema id it declares
//! and the directory it is installed in.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::extension::{METADATA_FILE, SCHEMA_DIR};
use crate::error::{Result, SettingsError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct MetadataFile {
    uuid: String,
    #[serde(rename = "settings-schema")]
    settings_schema: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionMetadata {
    pub uuid: String,
    pub name: String,
    /// Schema id the extension's settings are declared under
    pub settings_schema: String,
    /// Installation directory
    pub dir: PathBuf,
}

impl ExtensionMetadata {
    pub fn new(
        uuid: impl Into<String>,
        settings_schema: impl Into<String>,
        dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            name: String::new(),
            settings_schema: settings_schema.into(),
            dir: dir.into(),
        }
    }

    /// Read `metadata.json` from an extension directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join(METADATA_FILE);
        let contents = fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;
        let file: MetadataFile = serde_json::from_str(&contents)
            .map_err(|source| SettingsError::Parse { path, source })?;

        Ok(Self {
            uuid: file.uuid,
            name: file.name,
            settings_schema: file.settings_schema,
            dir: dir.to_path_buf(),
        })
    }

    /// Directory where schemas compiled alongside the extension live.
    pub fn schema_dir(&self) -> PathBuf {
        self.dir.join(SCHEMA_DIR)
    }
}
