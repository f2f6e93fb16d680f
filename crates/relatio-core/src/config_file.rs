use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub api: Option<ApiConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    pub gemini_api_key: Option<String>,
    pub consensus_model: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    pub output_dir: Option<String>,
    pub pretty_json: Option<bool>,
}

/// Platform config directory path: `<config_dir>/relatio/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("relatio").join("config.toml"))
}

/// Load config by cascading CWD `.relatio.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".relatio.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    ConfigFile {
        api: Some(ApiConfig {
            gemini_api_key: overlay
                .api
                .as_ref()
                .and_then(|a| a.gemini_api_key.clone())
                .or_else(|| base.api.as_ref().and_then(|a| a.gemini_api_key.clone())),
            consensus_model: overlay
                .api
                .as_ref()
                .and_then(|a| a.consensus_model.clone())
                .or_else(|| base.api.as_ref().and_then(|a| a.consensus_model.clone())),
        }),
        output: Some(OutputConfig {
            output_dir: overlay
                .output
                .as_ref()
                .and_then(|o| o.output_dir.clone())
                .or_else(|| base.output.as_ref().and_then(|o| o.output_dir.clone())),
            pretty_json: overlay
                .output
                .as_ref()
                .and_then(|o| o.pretty_json)
                .or_else(|| base.output.as_ref().and_then(|o| o.pretty_json)),
        }),
    }
}
