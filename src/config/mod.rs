//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroUsize, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{CliArgs, Command, DescribeArgs, LoggingOverrides, RunArgs, RunOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "trellis";
const DEFAULT_STORE_LIMIT: usize = 1000;
const DEFAULT_CACHE_ROLE: &str = "default";

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub store_limit: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub cache_role: String,
    pub auto_caching_point: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("TRELLIS").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match &cli.command {
        Command::Run(args) => raw.apply_run_overrides(&args.overrides),
        Command::Describe(args) => raw.apply_logging_overrides(&args.logging),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    pipeline: RawPipelineSettings,
}

impl RawSettings {
    fn apply_run_overrides(&mut self, overrides: &RunOverrides) {
        self.apply_logging_overrides(&overrides.logging);
        if let Some(limit) = overrides.cache_store_limit {
            self.cache.store_limit = Some(limit);
        }
        if let Some(role) = overrides.pipeline_cache_role.as_ref() {
            self.pipeline.cache_role = Some(role.clone());
        }
        if let Some(switch) = overrides.pipeline_auto_caching_point.as_ref() {
            self.pipeline.auto_caching_point = Some(switch.clone());
        }
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            pipeline,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let pipeline = build_pipeline_settings(pipeline)?;

        Ok(Self {
            logging,
            cache,
            pipeline,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let value = cache.store_limit.unwrap_or(DEFAULT_STORE_LIMIT);
    let store_limit = NonZeroUsize::new(value)
        .ok_or_else(|| LoadError::invalid("cache.store_limit", "must be greater than zero"))?;
    Ok(CacheSettings { store_limit })
}

fn build_pipeline_settings(pipeline: RawPipelineSettings) -> Result<PipelineSettings, LoadError> {
    let cache_role = match pipeline.cache_role {
        Some(role) => {
            let trimmed = role.trim();
            if trimmed.is_empty() {
                return Err(LoadError::invalid(
                    "pipeline.cache_role",
                    "must not be empty",
                ));
            }
            trimmed.to_string()
        }
        None => DEFAULT_CACHE_ROLE.to_string(),
    };

    let auto_caching_point = match pipeline.auto_caching_point {
        Some(value) => parse_toggle(&value).ok_or_else(|| {
            LoadError::invalid(
                "pipeline.auto_caching_point",
                format!("expected `on` or `off`, got `{value}`"),
            )
        })?,
        None => true,
    };

    Ok(PipelineSettings {
        cache_role,
        auto_caching_point,
    })
}

/// Accepts `on`/`off` as well as the boolean spellings config sources produce.
fn parse_toggle(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" => Some(true),
        "off" | "false" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    store_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPipelineSettings {
    cache_role: Option<String>,
    auto_caching_point: Option<String>,
}
