// Configuration - TOML file with defaults for every key
//
// Default location is the platform config dir (`~/.config/acc/config.toml`
// on Linux); `--config` or ACC_CONFIG point elsewhere.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "acc.db";
const CATEGORIES_FILE: &str = "categories.json";

/// Exchange rates: `exchange[FROM][TO]` units of TO per unit of FROM.
pub type ExchangeTable = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file.
    pub database: PathBuf,

    /// Category JSON file.
    pub categories: PathBuf,

    /// Currency used when an amount carries none.
    pub default_currency: String,

    /// Editor for batch sheets; falls back to $VISUAL, $EDITOR, then `vi`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,

    /// Rows shown by `read` when no limit is given.
    pub read_limit: usize,

    /// Categories left out of spending charts.
    pub income_categories: Vec<String>,

    pub exchange: ExchangeTable,
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "acc")
}

impl Default for Config {
    fn default() -> Self {
        let dirs = project_dirs();
        let database = dirs
            .as_ref()
            .map(|d| d.data_dir().join(DATABASE_FILE))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILE));
        let categories = dirs
            .as_ref()
            .map(|d| d.config_dir().join(CATEGORIES_FILE))
            .unwrap_or_else(|| PathBuf::from(CATEGORIES_FILE));

        Self {
            database,
            categories,
            default_currency: "EUR".to_string(),
            editor: None,
            read_limit: 20,
            income_categories: vec!["INGRESO".to_string(), "BLIND".to_string()],
            exchange: ExchangeTable::new(),
        }
    }
}

impl Config {
    /// Platform default path of the config file.
    pub fn default_path() -> Result<PathBuf> {
        project_dirs()
            .map(|d| d.config_dir().join(CONFIG_FILE))
            .context("Could not determine the config directory")
    }

    /// Read `path`, or return the defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file missing, using defaults");
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        config.normalize();
        config.resolve_relative_to(path.parent().unwrap_or_else(|| Path::new(".")));
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Failed to write config {}", path.display()))?;
        Ok(())
    }

    fn normalize(&mut self) {
        self.default_currency = self.default_currency.to_uppercase();
        for category in &mut self.income_categories {
            *category = category.to_uppercase();
        }
        self.exchange = std::mem::take(&mut self.exchange)
            .into_iter()
            .map(|(from, rates)| {
                let rates = rates.into_iter().map(|(to, r)| (to.to_uppercase(), r)).collect();
                (from.to_uppercase(), rates)
            })
            .collect();
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        if self.database.is_relative() {
            self.database = base.join(&self.database);
        }
        if self.categories.is_relative() {
            self.categories = base.join(&self.categories);
        }
    }

    /// Units of `to` per unit of `from`: direct entry, inverse entry, or 1 for the same currency.
    pub fn exchange_rate(&self, from: &str, to: &str) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        if let Some(rate) = self.exchange.get(from).and_then(|r| r.get(to)) {
            return Some(*rate);
        }
        self.exchange
            .get(to)
            .and_then(|r| r.get(from))
            .filter(|rate| **rate != 0.0)
            .map(|rate| 1.0 / rate)
    }

    pub fn editor_command(&self) -> String {
        self.editor
            .clone()
            .or_else(|| env::var("VISUAL").ok())
            .or_else(|| env::var("EDITOR").ok())
            .unwrap_or_else(|| "vi".to_string())
    }

    pub fn is_income(&self, category: &str) -> bool {
        self.income_categories.iter().any(|c| c == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.default_currency, "EUR");
        assert_eq!(config.read_limit, 20);
        assert!(config.is_income("INGRESO"));
        assert!(config.is_income("BLIND"));
        assert!(!config.is_income("FOOD"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str("default_currency = \"usd\"\n").unwrap();
        assert_eq!(config.read_limit, 20);
        assert_eq!(config.income_categories.len(), 2);
    }

    #[test]
    fn test_load_and_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
database = "books.db"
default_currency = "pen"
income_categories = ["salary"]

[exchange.eur]
usd = 1.1
pen = 4.0
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.database, dir.path().join("books.db"));
        assert_eq!(config.default_currency, "PEN");
        assert!(config.is_income("SALARY"));
        assert_eq!(config.exchange_rate("EUR", "USD"), Some(1.1));
        assert_eq!(config.exchange_rate("PEN", "EUR"), Some(0.25));
        assert_eq!(config.exchange_rate("USD", "USD"), Some(1.0));
        assert_eq!(config.exchange_rate("USD", "PEN"), None);
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.database = dir.path().join("x.db");
        config.categories = dir.path().join("c.json");
        config.editor = Some("nano".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.editor_command(), "nano");
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "read_limit = \"many\"").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
