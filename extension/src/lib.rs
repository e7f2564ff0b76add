pub mod background;
pub mod config;
pub mod content;
mod error;
pub mod messages;
pub mod network;
pub mod options;
pub mod page;
pub mod state;
pub mod storage;
pub mod tone;
pub mod usage;

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::background::Background;
use crate::config::ExtensionSettings;
use crate::content::ContentScript;
use crate::network::RewriteClient;
use crate::options::UsageSummary;
use crate::storage::LocalStore;
use crate::usage::UsageTracker;

pub use error::AppError;

fn init_logging() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .map_err(|err| AppError::LoggingInit(err.to_string()))
}

/// One installed extension: shared storage, the quota tracker and the
/// background context. Content scripts are created per page.
pub struct Extension {
    settings: ExtensionSettings,
    tracker: Arc<UsageTracker>,
    background: Arc<Background>,
}

impl Extension {
    pub fn install(settings: ExtensionSettings, store: Arc<LocalStore>) -> Result<Self, AppError> {
        let tracker = Arc::new(UsageTracker::new(store, settings.max_rewrites_per_month));
        let client = RewriteClient::from_settings(&settings, Arc::clone(&tracker))
            .map_err(|err| AppError::Client(err.to_string()))?;

        info!(
            endpoint = client.endpoint(),
            limit = settings.max_rewrites_per_month,
            "rewrite extension installed"
        );

        Ok(Self {
            settings,
            tracker,
            background: Arc::new(Background::new(client)),
        })
    }

    pub fn from_paths(settings_path: &Path, storage_path: &Path) -> Result<Self, AppError> {
        let settings = config::load_settings(settings_path)?;
        let store = LocalStore::open(storage_path)?;
        Self::install(settings, Arc::new(store))
    }

    /// Starts logging and installs from the platform config and data dirs.
    pub fn bootstrap() -> Result<Self, AppError> {
        Self::bootstrap_at(
            &config::default_settings_path()?,
            &LocalStore::default_path()?,
        )
    }

    pub fn bootstrap_at(settings_path: &Path, storage_path: &Path) -> Result<Self, AppError> {
        if let Err(init_err) = init_logging() {
            eprintln!("logging bootstrap failed: {init_err}");
        }
        Self::from_paths(settings_path, storage_path)
    }

    pub fn settings(&self) -> &ExtensionSettings {
        &self.settings
    }

    pub fn tracker(&self) -> &Arc<UsageTracker> {
        &self.tracker
    }

    pub fn background(&self) -> &Arc<Background> {
        &self.background
    }

    pub fn content_script(&self) -> ContentScript {
        ContentScript::new(
            Arc::clone(&self.background),
            Arc::clone(&self.tracker),
            &self.settings,
        )
    }

    pub async fn usage_summary(&self) -> Option<UsageSummary> {
        options::load_usage_summary(&self.tracker).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::save_settings;

    #[test]
    fn install_targets_configured_endpoint() {
        let settings = ExtensionSettings {
            api_base_url: "http://127.0.0.1:4000".to_string(),
            ..ExtensionSettings::default()
        };
        let extension =
            Extension::install(settings, Arc::new(LocalStore::in_memory())).expect("install");

        assert_eq!(
            extension.background().client().endpoint(),
            "http://127.0.0.1:4000/rewrite"
        );
        assert_eq!(extension.tracker().limit(), 15);
    }

    #[tokio::test]
    async fn paths_share_settings_and_storage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings_path = dir.path().join("settings.json");
        let storage_path = dir.path().join("data").join("storage.json");
        save_settings(
            &settings_path,
            ExtensionSettings {
                max_rewrites_per_month: 4,
                ..ExtensionSettings::default()
            },
        )
        .expect("save");

        let extension = Extension::from_paths(&settings_path, &storage_path).expect("install");
        assert!(extension.tracker().check_quota().await.expect("check"));
        extension.tracker().consume().await.expect("consume");

        let reopened = Extension::from_paths(&settings_path, &storage_path).expect("reopen");
        let summary = reopened.usage_summary().await.expect("summary");
        assert_eq!((summary.used, summary.limit), (1, 4));
        assert_eq!(summary.percentage, 25.0);
    }

    #[test]
    fn logging_installs_once_and_bootstrap_survives_reinit() {
        let _ = init_logging();
        assert!(matches!(init_logging(), Err(AppError::LoggingInit(_))));

        let dir = tempfile::tempdir().expect("tempdir");
        let extension = Extension::bootstrap_at(
            &dir.path().join("settings.json"),
            &dir.path().join("storage.json"),
        )
        .expect("bootstrap");
        assert_eq!(extension.settings().max_rewrites_per_month, 15);
    }

    #[test]
    fn content_scripts_start_without_popup() {
        let extension = Extension::install(
            ExtensionSettings::default(),
            Arc::new(LocalStore::in_memory()),
        )
        .expect("install");

        let script = extension.content_script();
        assert!(!script.popup().is_visible());
        assert!(!script.detector().is_affordance_visible());
    }
}
