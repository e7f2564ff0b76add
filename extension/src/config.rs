use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub const API_BASE_URL: &str = "http://localhost:3000";
pub const MAX_REWRITES_PER_MONTH: u32 = 15;
pub const POPUP_Z_INDEX: i64 = 2_147_483_647;

const APP_DIR_NAME: &str = "rewrite";
const SETTINGS_FILE_NAME: &str = "settings.json";
const API_BASE_URL_ENV: &str = "REWRITE_API_BASE_URL";
const MIN_REWRITES_PER_MONTH: u32 = 1;
const MAX_CONFIGURABLE_REWRITES_PER_MONTH: u32 = 10_000;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("no configuration directory is available on this platform")]
    ConfigDirUnavailable,
    #[error("failed to access settings file: {0}")]
    Io(String),
    #[error("failed to parse settings file: {0}")]
    Parse(String),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_max_rewrites_per_month")]
    pub max_rewrites_per_month: u32,
    #[serde(default = "default_popup_z_index")]
    pub popup_z_index: i64,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            max_rewrites_per_month: default_max_rewrites_per_month(),
            popup_z_index: default_popup_z_index(),
        }
    }
}

impl ExtensionSettings {
    pub fn rewrite_endpoint(&self) -> String {
        format!("{}/rewrite", self.api_base_url)
    }
}

fn default_api_base_url() -> String {
    API_BASE_URL.to_string()
}

fn default_max_rewrites_per_month() -> u32 {
    MAX_REWRITES_PER_MONTH
}

fn default_popup_z_index() -> i64 {
    POPUP_Z_INDEX
}

pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    let config_dir = dirs::config_dir().ok_or(SettingsError::ConfigDirUnavailable)?;
    Ok(config_dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
}

/// Loads settings from `path`, falling back to defaults when the file does not exist.
///
/// `REWRITE_API_BASE_URL` takes precedence over the persisted base URL.
pub fn load_settings(path: &Path) -> Result<ExtensionSettings, SettingsError> {
    let mut settings = normalize_loaded_settings(read_settings(path)?);

    if let Some(base_url) = api_base_url_override(std::env::var(API_BASE_URL_ENV).ok()) {
        settings.api_base_url = base_url;
    }

    Ok(settings)
}

pub fn save_settings(
    path: &Path,
    settings: ExtensionSettings,
) -> Result<ExtensionSettings, SettingsError> {
    let validated = validate_settings(settings)?;
    write_settings(path, &validated)?;
    Ok(validated)
}

fn read_settings(path: &Path) -> Result<ExtensionSettings, SettingsError> {
    if !path.exists() {
        return Ok(ExtensionSettings::default());
    }

    let content = fs::read_to_string(path).map_err(|err| SettingsError::Io(err.to_string()))?;
    serde_json::from_str::<ExtensionSettings>(&content)
        .map_err(|err| SettingsError::Parse(err.to_string()))
}

fn write_settings(path: &Path, settings: &ExtensionSettings) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| SettingsError::Io(err.to_string()))?;
    }

    let serialized = serde_json::to_string_pretty(settings)
        .map_err(|err| SettingsError::Parse(err.to_string()))?;
    fs::write(path, serialized).map_err(|err| SettingsError::Io(err.to_string()))
}

fn api_base_url_override(value: Option<String>) -> Option<String> {
    let normalized = normalize_base_url(&value?);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn normalize_loaded_settings(mut settings: ExtensionSettings) -> ExtensionSettings {
    settings.api_base_url = normalize_base_url(&settings.api_base_url);
    if settings.api_base_url.is_empty() {
        warn!("loaded api base url is empty; resetting to default");
        settings.api_base_url = default_api_base_url();
    }

    if !(MIN_REWRITES_PER_MONTH..=MAX_CONFIGURABLE_REWRITES_PER_MONTH)
        .contains(&settings.max_rewrites_per_month)
    {
        warn!(
            max_rewrites_per_month = settings.max_rewrites_per_month,
            "loaded monthly rewrite ceiling is out of range; resetting to default"
        );
        settings.max_rewrites_per_month = MAX_REWRITES_PER_MONTH;
    }

    if settings.popup_z_index <= 0 {
        warn!(
            popup_z_index = settings.popup_z_index,
            "loaded popup stacking order is not positive; resetting to default"
        );
        settings.popup_z_index = POPUP_Z_INDEX;
    }

    settings
}

fn validate_settings(mut settings: ExtensionSettings) -> Result<ExtensionSettings, SettingsError> {
    settings.api_base_url = normalize_base_url(&settings.api_base_url);
    if !(settings.api_base_url.starts_with("http://")
        || settings.api_base_url.starts_with("https://"))
    {
        return Err(SettingsError::Invalid(
            "apiBaseUrl must start with http:// or https://".to_string(),
        ));
    }

    if !(MIN_REWRITES_PER_MONTH..=MAX_CONFIGURABLE_REWRITES_PER_MONTH)
        .contains(&settings.max_rewrites_per_month)
    {
        return Err(SettingsError::Invalid(format!(
            "maxRewritesPerMonth must be between {MIN_REWRITES_PER_MONTH} and {MAX_CONFIGURABLE_REWRITES_PER_MONTH}"
        )));
    }

    if settings.popup_z_index <= 0 {
        return Err(SettingsError::Invalid(
            "popupZIndex must be positive".to_string(),
        ));
    }

    Ok(settings)
}
