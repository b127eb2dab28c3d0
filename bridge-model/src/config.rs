//! Dynamic-states configuration file: schema and version-gated loader.

use std::path::Path;

use serde::Deserialize;

use crate::error::{BridgeError, Result};

/// Accepted schema version. Anything else is rejected with
/// [`BridgeError::Config`] before a single page or state is touched.
pub const DYNAMIC_STATES_FILE_VERSION: u64 = 4;

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    pub name: String,
    pub internal_name: Option<String>,
    pub formula: String,
    #[serde(rename = "type")]
    pub datatype: String,
    #[serde(rename = "dataref-rounding")]
    pub dataref_rounding: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageConfig {
    pub name: String,
    pub states: Vec<StateConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DynamicStatesFile {
    pub version: u64,
    #[serde(rename = "long-press-commands", default)]
    pub long_press_commands: Vec<String>,
    pub pages: Vec<PageConfig>,
}

/// Parse and validate a dynamic-states file's raw JSON text.
///
/// Validation happens in two stages so a bad version never sees the rest of
/// the structure trusted: first a generic JSON-to-struct parse (required to
/// even read `version`), then the version check itself.
pub fn parse(text: &str) -> Result<DynamicStatesFile> {
    let file: DynamicStatesFile = serde_json::from_str(text)?;
    if file.version != DYNAMIC_STATES_FILE_VERSION {
        return Err(BridgeError::Config {
            path: Path::new("<dynamic-states>").to_path_buf(),
            details: format!(
                "invalid version {} vs. {DYNAMIC_STATES_FILE_VERSION}",
                file.version
            ),
        });
    }
    Ok(file)
}

/// Load and validate a dynamic-states file from disk.
pub fn load(path: &Path) -> Result<DynamicStatesFile> {
    let text = std::fs::read_to_string(path).map_err(|source| BridgeError::ConfigIo {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text).map_err(|err| match err {
        BridgeError::Config { details, .. } => BridgeError::Config { path: path.to_path_buf(), details },
        other => other,
    })
}

/// Derive a state's internal name from its display name: alphanumerics only,
/// uppercased, prefixed by the plugin id.
pub fn mkintname(plugin_id: &str, display_name: &str) -> String {
    let stripped: String = display_name.chars().filter(|c| c.is_alphanumeric()).collect();
    format!("{plugin_id}.{}", stripped.to_uppercase())
}
