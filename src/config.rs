use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::warn;

use crate::join::SpreadConvention;
use crate::provider::{CfbdClient, DEFAULT_BASE_URL};
use crate::table_store::StoreConfig;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_FETCH_PAUSE_MS: u64 = 200;
const MAX_FETCH_PAUSE_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub data_dir: PathBuf,
    pub fetch_pause: Duration,
    pub spread_convention: SpreadConvention,
    pub write_csv: bool,
    pub run_log_path: PathBuf,
}

/// Loads `.env.local` then `.env`; values already in the environment win.
pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let opt = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let data_dir = PathBuf::from(opt("DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into()));
        let fetch_pause_ms = opt("FETCH_PAUSE_MS")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_FETCH_PAUSE_MS)
            .min(MAX_FETCH_PAUSE_MS);
        let spread_convention = match opt("SPREAD_CONVENTION").map(|v| v.parse()) {
            Some(Ok(convention)) => convention,
            Some(Err(err)) => {
                warn!("{err}; using home_negative");
                SpreadConvention::default()
            }
            None => SpreadConvention::default(),
        };
        let write_csv = opt("WRITE_CSV")
            .map(|v| {
                let t = v.to_ascii_lowercase();
                !(t == "0" || t == "false" || t == "off" || t == "no")
            })
            .unwrap_or(true);
        let run_log_path = opt("RUN_LOG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("runs.sqlite"));

        Self {
            api_key: opt("CFBD_API_KEY"),
            base_url: opt("CFBD_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            data_dir,
            fetch_pause: Duration::from_millis(fetch_pause_ms),
            spread_convention,
            write_csv,
            run_log_path,
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            write_csv: self.write_csv,
            ..StoreConfig::from_data_dir(&self.data_dir)
        }
    }

    /// Provider client for fetch commands; fails without an API key.
    pub fn provider(&self) -> Result<CfbdClient> {
        let Some(api_key) = self.api_key.as_ref() else {
            return Err(anyhow!("CFBD_API_KEY missing"));
        };
        Ok(CfbdClient::new(&self.base_url, api_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]);
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert_eq!(cfg.fetch_pause, Duration::from_millis(200));
        assert_eq!(cfg.run_log_path, PathBuf::from("data").join("runs.sqlite"));
        assert!(cfg.write_csv);
        assert!(cfg.provider().is_err());
        assert_eq!(cfg.store_config().raw_dir, PathBuf::from("data").join("raw"));
    }

    #[test]
    fn overrides_are_parsed_and_clamped() {
        let cfg = config(&[
            ("DATA_DIR", "/tmp/cfb"),
            ("FETCH_PAUSE_MS", "999999"),
            ("SPREAD_CONVENTION", "home_positive"),
            ("WRITE_CSV", "off"),
            ("CFBD_API_KEY", " key "),
        ]);
        assert_eq!(cfg.fetch_pause, Duration::from_millis(10_000));
        assert_eq!(cfg.spread_convention, SpreadConvention::HomePositive);
        assert!(!cfg.store_config().write_csv);
        assert_eq!(cfg.api_key.as_deref(), Some("key"));
        assert_eq!(cfg.run_log_path, PathBuf::from("/tmp/cfb/runs.sqlite"));
    }
}
