//! Monitor configuration
//!
//! Loaded once from a YAML file at start-up and read-only afterwards.
//! Telegram secrets may be supplied through the environment (or a `.env`
//! file) instead of the config file.

use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};

use crate::utils::errors::ConfigError;

pub const DEFAULT_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub asset_ids: Vec<String>,
    pub currency: String,
    pub csv_path: PathBuf,
    pub html_output_path: PathBuf,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retries: u8,
    /// Per-asset display and alert overrides, keyed by asset id
    #[serde(default)]
    pub assets: HashMap<String, AssetSettings>,
    #[serde(default)]
    pub chart: ChartSettings,
    #[serde(default)]
    pub alerts: AlertSettings,
    #[serde(default)]
    pub telegram: TelegramSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetSettings {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub upper: Option<f64>,
    #[serde(default)]
    pub lower: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChartSettings {
    pub title: String,
    pub theme_bg: String,
    pub theme_fg: String,
    pub ma_windows: Vec<usize>,
    pub static_snapshot: bool,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            title: "Price history".to_string(),
            theme_bg: "#0f1220".to_string(),
            theme_fg: "#e8ecf5".to_string(),
            ma_windows: vec![5, 20],
            static_snapshot: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertSettings {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramSettings {
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

impl TelegramSettings {
    /// Bot token and chat id, when both are present and non-blank
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let token = self.bot_token.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let chat_id = self.chat_id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some((token, chat_id))
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    20
}

impl Settings {
    /// Load, override from the environment and validate the YAML config at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path).format(FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        settings.override_with(|key| env::var(key).ok()).validated()
    }

    #[cfg(test)]
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        settings.validated()
    }

    /// Values found through `lookup` replace the ones from the file
    fn override_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(token) = lookup(TELEGRAM_BOT_TOKEN) {
            self.telegram.bot_token = Some(token);
        }

        if let Some(chat_id) = lookup(TELEGRAM_CHAT_ID) {
            self.telegram.chat_id = Some(chat_id);
        }

        self
    }

    /// Normalise identifiers and reject unusable values
    fn validated(mut self) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut asset_ids = Vec::with_capacity(self.asset_ids.len());
        for raw in &self.asset_ids {
            let id = raw.trim().to_string();
            if id.is_empty() {
                return Err(ConfigError::Invalid("asset_ids contains a blank entry".to_string()));
            }
            if id.contains(',') {
                return Err(ConfigError::Invalid(format!("asset id '{}' must not contain ','", id)));
            }
            if seen.insert(id.clone()) {
                asset_ids.push(id);
            }
        }
        if asset_ids.is_empty() {
            return Err(ConfigError::Invalid("asset_ids must list at least one asset".to_string()));
        }
        self.asset_ids = asset_ids;

        self.currency = self.currency.trim().to_lowercase();
        if self.currency.is_empty() {
            return Err(ConfigError::Invalid("currency must not be blank".to_string()));
        }

        if self.csv_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("csv_path must not be blank".to_string()));
        }
        if self.html_output_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("html_output_path must not be blank".to_string()));
        }
        if self.csv_path == self.html_output_path {
            return Err(ConfigError::Invalid(
                "csv_path and html_output_path must differ".to_string(),
            ));
        }

        if self.api_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_url must not be blank".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be positive".to_string()));
        }
        if self.retries > 1 {
            return Err(ConfigError::Invalid(format!(
                "retries must be 0 or 1, got {}",
                self.retries
            )));
        }
        if self.chart.ma_windows.contains(&0) {
            return Err(ConfigError::Invalid("chart.ma_windows entries must be positive".to_string()));
        }

        for (id, asset) in &self.assets {
            if let (Some(lower), Some(upper)) = (asset.lower, asset.upper) {
                if lower > upper {
                    return Err(ConfigError::Invalid(format!(
                        "assets.{}: lower ({}) is above upper ({})",
                        id, lower, upper
                    )));
                }
            }
        }

        Ok(self)
    }

    /// Display label for an asset, falling back to its id
    pub fn label_for<'a>(&'a self, asset_id: &'a str) -> &'a str {
        self.assets
            .get(asset_id)
            .and_then(|a| a.label.as_deref())
            .unwrap_or(asset_id)
    }

    pub fn color_for(&self, asset_id: &str) -> Option<&str> {
        self.assets.get(asset_id).and_then(|a| a.color.as_deref())
    }
}
