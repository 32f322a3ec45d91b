use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Deserialize;

use crate::error::OniError;
use crate::provider::{DEFAULT_PROVIDER, ProviderRegistry};
use crate::store::Store;
use crate::tabulator::TabulatorOptions;

pub const SETTINGS_FILE: &str = "oni-tabulator.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_RETRIES: usize = 3;

#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub default_provider: Option<String>,
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub retries: Option<usize>,
    #[serde(default)]
    pub tabulator_program: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedSettings {
    pub default_provider: String,
    pub providers: Vec<String>,
    pub data_dir: Option<Utf8PathBuf>,
    pub timeout: Duration,
    pub retries: usize,
    pub tabulator_program: Option<PathBuf>,
}

impl ResolvedSettings {
    /// Default provider first, then the extra providers in file order.
    pub fn registry(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new(self.default_provider.clone());
        for provider in &self.providers {
            registry.add(provider);
        }
        if let Err(err) = registry.select(&self.default_provider) {
            tracing::warn!(error = %err, "default provider not selectable");
        }
        registry
    }

    pub fn store(&self) -> Result<Store, OniError> {
        match &self.data_dir {
            Some(dir) => Ok(Store::new_with_path(dir.clone())),
            None => Store::new(),
        }
    }

    pub fn tabulator_options(&self) -> TabulatorOptions {
        TabulatorOptions {
            program: self.tabulator_program.clone(),
            timeout: self.timeout,
            retries: self.retries,
        }
    }
}

pub struct SettingsLoader;

impl SettingsLoader {
    /// Reads `path`, or `oni-tabulator.json` in the current directory when it
    /// exists. No file means defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedSettings, OniError> {
        let settings_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(SETTINGS_FILE),
        };

        if path.is_none() && !settings_path.exists() {
            return Self::resolve_settings(Settings::default());
        }

        let content = fs::read_to_string(&settings_path)
            .map_err(|_| OniError::SettingsRead(settings_path.clone()))?;
        let settings: Settings = serde_json::from_str(&content)
            .map_err(|err| OniError::SettingsParse(err.to_string()))?;

        Self::resolve_settings(settings)
    }

    pub fn resolve_settings(settings: Settings) -> Result<ResolvedSettings, OniError> {
        let default_provider = settings
            .default_provider
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
        if default_provider.is_empty() {
            return Err(OniError::SettingsParse(
                "default_provider must not be empty".to_string(),
            ));
        }

        let timeout_secs = settings.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(OniError::SettingsParse(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }

        Ok(ResolvedSettings {
            default_provider,
            providers: settings.providers,
            data_dir: settings.data_dir.map(Utf8PathBuf::from),
            timeout: Duration::from_secs(timeout_secs),
            retries: settings.retries.unwrap_or(DEFAULT_RETRIES),
            tabulator_program: settings.tabulator_program.map(PathBuf::from),
        })
    }
}
