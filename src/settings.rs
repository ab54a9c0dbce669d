use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::aggregator::BudgetRollup;
use crate::error::{Result, TallyError};
use crate::merchants::MerchantDatabase;
use crate::models::DEFAULT_ALERT_THRESHOLD;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_alert_threshold")]
    pub default_alert_threshold: f64,
    #[serde(default)]
    pub budget_rollup: BudgetRollup,
    /// CSV file replacing the built-in merchant table.
    #[serde(default)]
    pub merchant_db: Option<String>,
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_alert_threshold() -> f64 {
    DEFAULT_ALERT_THRESHOLD
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            currency: default_currency(),
            default_alert_threshold: default_alert_threshold(),
            budget_rollup: BudgetRollup::default(),
            merchant_db: None,
        }
    }
}

impl Settings {
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("tally.db")
    }

    pub fn merchants(&self) -> Result<MerchantDatabase> {
        MerchantDatabase::load(self.merchant_db.as_deref().map(std::path::Path::new))
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("tally")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("tally")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        match serde_json::from_str(&content) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("ignoring unreadable {}: {e}", path.display());
                Settings::default()
            }
        }
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| TallyError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
