// src/config.rs
use crate::application::service::{MonitorSettings, RecomputeMode};
use crate::domain::errors::{AppError, AppResult};
use crate::domain::model::{Condition, Resolution, SignalRule, SignalSpec, StrategyDefinition};
use crate::domain::service::SignalSynthesizer;
use dotenv::dotenv;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Signal engine configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Market data source
    pub market: MarketConfig,

    /// Strategy signals and conditions
    pub strategy: StrategyConfig,

    /// Live monitor timing and window sizes
    pub monitor: MonitorConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Market data configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Instrument identifier (e.g., "BTCUSDT")
    pub identifier: String,

    /// Bar resolution (e.g., "1m", "15m", "1h", "day")
    pub resolution: String,

    /// Number of bars fetched for backtests and monitor initialisation
    pub history_count: usize,

    /// JSON bar file for the replay provider
    pub data_file: Option<String>,
}

/// One side of a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Natural-language description handed to the synthesizer
    pub signal: String,

    /// Signal (and column) name
    pub name: String,

    /// One of >, <, >=, <=, ==, !=
    pub operator: String,

    pub threshold: Decimal,
}

/// Strategy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    /// Optional chart-only filter signal description
    pub filter: Option<String>,

    pub buy: RuleConfig,

    pub sell: RuleConfig,
}

/// Live monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_ms: u64,

    /// Stop flag check interval while sleeping
    pub stop_check_ms: u64,

    pub error_backoff_ms: u64,

    pub fetch_timeout_ms: u64,

    /// Bars kept in the live window
    pub retention: usize,

    /// Bars recomputed per cycle by the tail strategy
    pub lookback: usize,

    /// Capacity of the event channel
    pub event_buffer: usize,

    pub recompute: RecomputeMode,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

fn env_or<T>(key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid {} '{}': {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn rule_from_env(prefix: &str, default: RuleConfig) -> AppResult<RuleConfig> {
    Ok(RuleConfig {
        signal: env_string(&format!("{}_SIGNAL", prefix), &default.signal),
        name: env_string(&format!("{}_NAME", prefix), &default.name),
        operator: env_string(&format!("{}_OPERATOR", prefix), &default.operator),
        threshold: env_or(&format!("{}_THRESHOLD", prefix), default.threshold)?,
    })
}

async fn build_rule(rule: &RuleConfig, synthesizer: &dyn SignalSynthesizer) -> AppResult<SignalRule> {
    let calculation = synthesizer.synthesize(&rule.signal, &rule.name).await?;
    Ok(SignalRule::new(
        SignalSpec::new(rule.name.clone(), calculation),
        Condition::parse(&rule.operator, rule.threshold)?,
    ))
}

impl Config {
    /// Load configuration from environment variables; unset keys keep their defaults
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();
        let defaults = Config::default();

        let market = MarketConfig {
            identifier: env_string("MARKET_IDENTIFIER", &defaults.market.identifier),
            resolution: env_string("MARKET_RESOLUTION", &defaults.market.resolution),
            history_count: env_or("HISTORY_COUNT", defaults.market.history_count)?,
            data_file: env::var("DATA_FILE").ok().or(defaults.market.data_file),
        };

        let strategy = StrategyConfig {
            filter: env::var("FILTER_SIGNAL").ok().or(defaults.strategy.filter),
            buy: rule_from_env("BUY", defaults.strategy.buy)?,
            sell: rule_from_env("SELL", defaults.strategy.sell)?,
        };

        let d = &defaults.monitor;
        let monitor = MonitorConfig {
            poll_interval_ms: env_or("POLL_INTERVAL_MS", d.poll_interval_ms)?,
            stop_check_ms: env_or("STOP_CHECK_MS", d.stop_check_ms)?,
            error_backoff_ms: env_or("ERROR_BACKOFF_MS", d.error_backoff_ms)?,
            fetch_timeout_ms: env_or("FETCH_TIMEOUT_MS", d.fetch_timeout_ms)?,
            retention: env_or("WINDOW_RETENTION", d.retention)?,
            lookback: env_or("RECOMPUTE_LOOKBACK", d.lookback)?,
            event_buffer: env_or("EVENT_BUFFER", d.event_buffer)?,
            recompute: env_or("RECOMPUTE_MODE", d.recompute)?,
        };

        let logging = LoggingConfig {
            level: env_string("LOG_LEVEL", &defaults.logging.level),
            to_file: env_or("LOG_TO_FILE", false)?,
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        let config = Config {
            market,
            strategy,
            monitor,
            logging,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            AppError::Config(format!("Failed to open config file: {}", e))
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            AppError::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, contents).map_err(|e| {
            AppError::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Check values that would otherwise only fail once the engine runs
    pub fn validate(&self) -> AppResult<()> {
        self.resolution()?;
        for rule in [&self.strategy.buy, &self.strategy.sell] {
            Condition::parse(&rule.operator, rule.threshold)?;
            if rule.name.trim().is_empty() {
                return Err(AppError::Config("Signal name must not be empty".to_string()));
            }
        }
        if self.monitor.retention == 0 || self.monitor.lookback == 0 {
            return Err(AppError::Config(
                "Monitor retention and lookback must be at least 1".to_string(),
            ));
        }
        if self.market.history_count == 0 {
            return Err(AppError::Config("History count must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn resolution(&self) -> AppResult<Resolution> {
        Ok(self.market.resolution.parse()?)
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        let m = &self.monitor;
        MonitorSettings {
            poll_interval: Duration::from_millis(m.poll_interval_ms),
            stop_check: Duration::from_millis(m.stop_check_ms),
            error_backoff: Duration::from_millis(m.error_backoff_ms),
            fetch_timeout: Duration::from_millis(m.fetch_timeout_ms),
            history_count: self.market.history_count,
            retention: m.retention,
            lookback: m.lookback,
            event_buffer: m.event_buffer,
            recompute: m.recompute,
        }
    }

    /// Turn the configured descriptions into runnable signals
    pub async fn build_strategy(
        &self,
        synthesizer: &dyn SignalSynthesizer,
    ) -> AppResult<StrategyDefinition> {
        let buy = build_rule(&self.strategy.buy, synthesizer).await?;
        let sell = build_rule(&self.strategy.sell, synthesizer).await?;

        let mut strategy = StrategyDefinition::new(buy, sell);
        if let Some(filter) = &self.strategy.filter {
            let calculation = synthesizer.synthesize(filter, "filter").await?;
            strategy = strategy.with_filter(SignalSpec::new("filter", calculation));
        }
        Ok(strategy)
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        // Set log level
        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            _ => log::LevelFilter::Info,
        };

        builder.filter_level(log_level);

        // Configure output
        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path).map_err(|e| {
                    AppError::Config(format!("Failed to create log file: {}", e))
                })?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        builder
            .try_init()
            .map_err(|e| AppError::Config(format!("Failed to initialize logger: {}", e)))
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            identifier: "BTCUSDT".to_string(),
            resolution: "15m".to_string(),
            history_count: 100,
            data_file: None,
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            filter: Some("sma 20".to_string()),
            buy: RuleConfig {
                signal: "rsi 14".to_string(),
                name: "rsi_14".to_string(),
                operator: "<".to_string(),
                threshold: dec!(30),
            },
            sell: RuleConfig {
                signal: "rsi 14".to_string(),
                name: "rsi_14".to_string(),
                operator: ">".to_string(),
                threshold: dec!(70),
            },
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            stop_check_ms: 100,
            error_backoff_ms: 5_000,
            fetch_timeout_ms: 10_000,
            retention: 100,
            lookback: 20,
            event_buffer: 16,
            recompute: RecomputeMode::Tail,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            to_file: false,
            file_path: None,
        }
    }
}
