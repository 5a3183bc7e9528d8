use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the Trellis binary.
#[derive(Debug, Parser)]
#[command(name = "trellis", version, about = "Caching pipeline runner")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TRELLIS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Process a pipeline description, optionally several times against one store.
    Run(RunArgs),
    /// Print the cache key a pipeline description resolves to.
    Describe(DescribeArgs),
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub overrides: RunOverrides,

    /// Pipeline description (TOML).
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub pipeline: PathBuf,

    /// Number of times to process the pipeline.
    #[arg(long, default_value = "1", value_name = "COUNT")]
    pub repeat: NonZeroUsize,
}

#[derive(Debug, Args, Clone)]
pub struct DescribeArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Pipeline description (TOML).
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub pipeline: PathBuf,

    /// Print the key as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RunOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    /// Override the number of entries kept by the in-memory cache store.
    #[arg(long = "cache-store-limit", value_name = "COUNT")]
    pub cache_store_limit: Option<usize>,

    /// Override the cache store role pipelines use.
    #[arg(long = "pipeline-cache-role", value_name = "ROLE")]
    pub pipeline_cache_role: Option<String>,

    /// Override automatic cache points at branch points (on|off).
    #[arg(long = "pipeline-auto-caching-point", value_name = "SWITCH")]
    pub pipeline_auto_caching_point: Option<String>,
}
