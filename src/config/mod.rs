use std::fs;
use std::path::Path;

use anyhow::Context;
use portal_core::boost::BoostConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://portal.db";
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 16;
pub const DEFAULT_STATE_MAX_AGE_SECS: i64 = 600;

/// Runtime settings. Every field is optional in the JSON file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortalConfig {
    pub database_url: String,
    pub boost: BoostConfig,
    pub sweep_concurrency: usize,
    pub oauth_state_max_age_secs: i64,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            boost: BoostConfig::default(),
            sweep_concurrency: DEFAULT_SWEEP_CONCURRENCY,
            oauth_state_max_age_secs: DEFAULT_STATE_MAX_AGE_SECS,
        }
    }
}

impl PortalConfig {
    /// Read `path` if given, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                let bytes = fs::read(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                Self::from_json(&bytes)
                    .with_context(|| format!("parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.boost.validate()?;
        if self.sweep_concurrency == 0 {
            anyhow::bail!("sweep_concurrency must be > 0");
        }
        if self.oauth_state_max_age_secs <= 0 {
            anyhow::bail!("oauth_state_max_age_secs must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_means_defaults() {
        let config = PortalConfig::from_json(b"{}").unwrap();
        assert_eq!(config, PortalConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn nested_boost_overrides_keep_other_defaults() {
        let config = PortalConfig::from_json(
            br#"{"database_url": "sqlite::memory:", "boost": {"max_coefficient": 1.3}}"#,
        )
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.boost.max_coefficient, 1.3);
        assert_eq!(config.boost.coefficient_b, 1.5);
        assert_eq!(config.sweep_concurrency, DEFAULT_SWEEP_CONCURRENCY);
    }

    #[test]
    fn validate_rejects_zero_concurrency_and_bad_boosts() {
        let zero = PortalConfig {
            sweep_concurrency: 0,
            ..PortalConfig::default()
        };
        assert!(zero.validate().is_err());

        let bad = PortalConfig::from_json(br#"{"boost": {"coefficient_a": 0.5}}"#).unwrap();
        assert!(bad.validate().is_err());

        assert!(PortalConfig::from_json(br#"{"boost": {"threshold_a": 15}}"#).is_err());
    }
}
