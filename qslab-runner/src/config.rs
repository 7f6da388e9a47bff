//! Serializable backtest configuration.
//!
//! A run is described by a TOML document with four sections:
//!
//! ```toml
//! [backtest]
//! start = "2019-01-01T00:00:00Z"
//! end = "2019-12-31T23:59:00Z"
//! rebalance = "weekly"
//! rebalance_weekday = "WED"
//!
//! [strategy]
//! assets = ["EQ:SPY", "EQ:AGG"]
//! weights = { "EQ:SPY" = 0.6, "EQ:AGG" = 0.4 }
//! long_only = true
//! cash_buffer_percentage = 0.01
//!
//! [data]
//! csv_dir = "data"
//!
//! [fees]
//! type = "PERCENT"
//! commission_pct = 0.001
//! tax_pct = 0.0
//! ```
//!
//! Timestamps are RFC 3339 strings. `[fees]` is optional and defaults to
//! `ZERO`.

use chrono::{DateTime, Utc};
use qslab_core::orchestrator::{DEFAULT_INITIAL_CASH, DEFAULT_PORTFOLIO_ID, DEFAULT_PORTFOLIO_NAME};
use qslab_core::schedule::parse_weekday;
use qslab_core::{
    ExecutionTiming, FeeModel, PercentFeeModel, RebalanceFrequency, SessionSettings, ZeroFeeModel,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

/// Errors from loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete configuration for one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestConfig {
    pub backtest: BacktestSection,
    pub strategy: StrategySection,
    pub data: DataSection,
    #[serde(default)]
    pub fees: FeeModelConfig,
}

/// `[backtest]`: time range, cash, schedule and execution timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestSection {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_initial_cash")]
    pub initial_cash: f64,
    #[serde(default = "default_portfolio_id")]
    pub portfolio_id: String,
    #[serde(default = "default_portfolio_name")]
    pub portfolio_name: String,
    #[serde(default)]
    pub burn_in: Option<DateTime<Utc>>,
    pub rebalance: RebalanceFrequency,
    #[serde(default)]
    pub rebalance_weekday: Option<String>,
    #[serde(default)]
    pub pre_market: bool,
    #[serde(default)]
    pub post_market: bool,
    #[serde(default)]
    pub execution_timing: ExecutionTiming,
}

/// `[strategy]`: fixed target weights over a static universe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StrategySection {
    pub assets: Vec<String>,
    pub weights: BTreeMap<String, f64>,
    #[serde(default)]
    pub long_only: bool,
    #[serde(default)]
    pub cash_buffer_percentage: Option<f64>,
    #[serde(default)]
    pub gross_leverage: Option<f64>,
}

/// `[data]`: where the daily bar CSV files live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataSection {
    pub csv_dir: PathBuf,
}

/// Fee model configuration (serializable enum).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeeModelConfig {
    /// No commission, no tax.
    #[default]
    Zero,

    /// Commission on every trade plus a tax on buys, both fractions of notional.
    Percent { commission_pct: f64, tax_pct: f64 },
}

impl FeeModelConfig {
    pub fn build(&self) -> Box<dyn FeeModel> {
        match self {
            FeeModelConfig::Zero => Box::new(ZeroFeeModel),
            FeeModelConfig::Percent {
                commission_pct,
                tax_pct,
            } => Box::new(PercentFeeModel::new(*commission_pct, *tax_pct)),
        }
    }
}

fn default_initial_cash() -> f64 {
    DEFAULT_INITIAL_CASH
}

fn default_portfolio_id() -> String {
    DEFAULT_PORTFOLIO_ID.to_string()
}

fn default_portfolio_name() -> String {
    DEFAULT_PORTFOLIO_NAME.to_string()
}

impl BacktestConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        if config.data.csv_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.data.csv_dir = parent.join(&config.data.csv_dir);
            }
        }
        Ok(config)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("serialize config: {e}")))
    }

    /// Reject configurations the engine would refuse mid-build.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.backtest;
        let s = &self.strategy;

        if b.end < b.start {
            return Err(ConfigError::Invalid(format!(
                "end {} is before start {}",
                b.end, b.start
            )));
        }
        if b.initial_cash.is_nan() || b.initial_cash < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "initial_cash must be non-negative, got {}",
                b.initial_cash
            )));
        }
        if b.rebalance == RebalanceFrequency::Weekly {
            let day = b.rebalance_weekday.as_deref().ok_or_else(|| {
                ConfigError::Invalid("weekly rebalancing requires rebalance_weekday".into())
            })?;
            parse_weekday(day).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }

        if s.assets.is_empty() {
            return Err(ConfigError::Invalid("strategy.assets is empty".into()));
        }
        if let Some(asset) = s.weights.keys().find(|a| !s.assets.contains(a)) {
            return Err(ConfigError::Invalid(format!(
                "weight given for '{asset}' which is not in strategy.assets"
            )));
        }
        if s.long_only {
            match s.cash_buffer_percentage {
                None => {
                    return Err(ConfigError::Invalid(
                        "long_only requires cash_buffer_percentage".into(),
                    ))
                }
                Some(buf) if !(0.0..=1.0).contains(&buf) => {
                    return Err(ConfigError::Invalid(format!(
                        "cash_buffer_percentage must be in [0, 1], got {buf}"
                    )))
                }
                Some(_) => {}
            }
            if let Some((asset, w)) = s.weights.iter().find(|(_, w)| **w < 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "long_only forbids negative weight {w} for '{asset}'"
                )));
            }
        } else {
            match s.gross_leverage {
                None => {
                    return Err(ConfigError::Invalid(
                        "long/short requires gross_leverage".into(),
                    ))
                }
                Some(lev) if lev.is_nan() || lev <= 0.0 => {
                    return Err(ConfigError::Invalid(format!(
                        "gross_leverage must be positive, got {lev}"
                    )))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Core session settings for this run.
    pub fn session_settings(&self) -> SessionSettings {
        let b = &self.backtest;
        let s = &self.strategy;
        let mut settings = SessionSettings::new(b.start, b.end, b.rebalance);
        settings.initial_cash = b.initial_cash;
        settings.portfolio_id = b.portfolio_id.clone();
        settings.portfolio_name = b.portfolio_name.clone();
        settings.rebalance_weekday = b.rebalance_weekday.clone();
        settings.burn_in = b.burn_in;
        settings.pre_market = b.pre_market;
        settings.post_market = b.post_market;
        settings.execution_timing = b.execution_timing;
        settings.long_only = s.long_only;
        settings.cash_buffer_percentage = s.cash_buffer_percentage;
        settings.gross_leverage = s.gross_leverage;
        settings
    }

    /// Deterministic hash of the run configuration.
    ///
    /// Two runs with identical configs share a RunId.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const WEEKLY: &str = r#"
[backtest]
start = "2019-01-01T00:00:00Z"
end = "2019-01-31T23:59:00Z"
rebalance = "weekly"
rebalance_weekday = "WED"

[strategy]
assets = ["EQ:ABC", "EQ:DEF"]
weights = { "EQ:ABC" = 0.6, "EQ:DEF" = 0.4 }
long_only = true
cash_buffer_percentage = 0.05

[data]
csv_dir = "data"
"#;

    #[test]
    fn parses_weekly_config_with_defaults() {
        let config = BacktestConfig::from_toml(WEEKLY).unwrap();
        assert_eq!(
            config.backtest.start,
            Utc.with_ymd_and_hms(2019, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(config.backtest.rebalance, RebalanceFrequency::Weekly);
        assert_eq!(config.backtest.initial_cash, DEFAULT_INITIAL_CASH);
        assert_eq!(config.backtest.portfolio_id, DEFAULT_PORTFOLIO_ID);
        assert_eq!(config.backtest.execution_timing, ExecutionTiming::NextEvent);
        assert_eq!(config.fees, FeeModelConfig::Zero);
        assert_eq!(config.strategy.weights["EQ:ABC"], 0.6);
    }

    #[test]
    fn percent_fees_parse_from_tagged_table() {
        let toml = format!(
            "{WEEKLY}\n[fees]\ntype = \"PERCENT\"\ncommission_pct = 0.001\ntax_pct = 0.002\n"
        );
        let config = BacktestConfig::from_toml(&toml).unwrap();
        assert_eq!(
            config.fees,
            FeeModelConfig::Percent {
                commission_pct: 0.001,
                tax_pct: 0.002
            }
        );
        assert_eq!(config.fees.build().name(), "percent");
    }

    #[test]
    fn weekly_without_weekday_is_rejected() {
        let toml = WEEKLY.replace("rebalance_weekday = \"WED\"\n", "");
        let err = BacktestConfig::from_toml(&toml).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("rebalance_weekday"));
    }

    #[test]
    fn unknown_weekday_is_rejected() {
        let toml = WEEKLY.replace("\"WED\"", "\"FUNDAY\"");
        assert!(matches!(
            BacktestConfig::from_toml(&toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn long_only_without_buffer_is_rejected() {
        let toml = WEEKLY.replace("cash_buffer_percentage = 0.05\n", "");
        let err = BacktestConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("cash_buffer_percentage"));
    }

    #[test]
    fn long_short_without_leverage_is_rejected() {
        let toml = WEEKLY.replace("long_only = true\n", "");
        let err = BacktestConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("gross_leverage"));
    }

    #[test]
    fn reversed_range_is_rejected() {
        let toml = WEEKLY.replace("2019-01-31T23:59:00Z", "2018-12-01T00:00:00Z");
        assert!(matches!(
            BacktestConfig::from_toml(&toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn weight_outside_universe_is_rejected() {
        let toml = WEEKLY.replace("\"EQ:DEF\" = 0.4", "\"EQ:XYZ\" = 0.4");
        let err = BacktestConfig::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("EQ:XYZ"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(
            BacktestConfig::from_toml("[backtest\nstart = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn session_settings_carry_every_field() {
        let config = BacktestConfig::from_toml(WEEKLY).unwrap();
        let settings = config.session_settings();
        assert_eq!(settings.start, config.backtest.start);
        assert_eq!(settings.rebalance_weekday.as_deref(), Some("WED"));
        assert!(settings.long_only);
        assert_eq!(settings.cash_buffer_percentage, Some(0.05));
        assert!(settings.schedule().is_ok());
    }

    #[test]
    fn run_id_is_deterministic_and_sensitive() {
        let a = BacktestConfig::from_toml(WEEKLY).unwrap();
        let b = BacktestConfig::from_toml(WEEKLY).unwrap();
        assert_eq!(a.run_id().unwrap(), b.run_id().unwrap());
        assert_eq!(a.run_id().unwrap().len(), 64);

        let mut c = a.clone();
        c.strategy.weights.insert("EQ:ABC".into(), 0.5);
        assert_ne!(a.run_id().unwrap(), c.run_id().unwrap());
    }

    #[test]
    fn toml_round_trip() {
        let config = BacktestConfig::from_toml(WEEKLY).unwrap();
        let text = config.to_toml().unwrap();
        assert_eq!(BacktestConfig::from_toml(&text).unwrap(), config);
    }
}
