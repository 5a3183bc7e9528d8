use std::{
    io::{self, Write},
    process,
    sync::Arc,
};

use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;
use trellis::{
    application::{
        error::AppError,
        pipeline::{BufferedEnvironment, CacheLookup, CachingPipeline, ComponentRegistry},
    },
    cache::{CacheConfig, StoreRegistry},
    config,
    domain::key::PipelineCacheKey,
    infra::{description::PipelineDescription, error::InfraError, telemetry},
};

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_writer(io::stderr)
        .with_max_level(Level::ERROR)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    let components = Arc::new(ComponentRegistry::with_builtin());
    let stores = StoreRegistry::with_default_store(&CacheConfig::from(&settings.cache));

    match cli_args.command {
        config::Command::Run(args) => run_pipeline(&settings, &components, &stores, args),
        config::Command::Describe(args) => run_describe(&settings, &components, &stores, args),
    }
}

fn run_pipeline(
    settings: &config::Settings,
    components: &Arc<ComponentRegistry>,
    stores: &StoreRegistry,
    args: config::RunArgs,
) -> Result<(), AppError> {
    let description = PipelineDescription::load(&args.pipeline)?;
    let pipeline_config = description.pipeline_config(&settings.pipeline)?;
    let mut pipeline = CachingPipeline::new(components.clone(), stores, pipeline_config)?;

    let repeat = args.repeat.get();
    let mut last_body = None;
    for round in 1..=repeat {
        description.assemble(&mut pipeline)?;
        let mut environment = BufferedEnvironment::new();
        let outcome = pipeline.process(&mut environment)?;

        info!(
            target = "trellis::run",
            round,
            lookup = lookup_label(outcome.lookup),
            stored = outcome.stored.len(),
            content_type = environment.content_type().unwrap_or("-"),
            "Processed pipeline"
        );

        pipeline.recycle();
        last_body = Some(environment.into_body());
    }

    if let Some(body) = last_body {
        let mut stdout = io::stdout().lock();
        stdout.write_all(&body).map_err(InfraError::from)?;
        stdout.flush().map_err(InfraError::from)?;
    }

    Ok(())
}

fn run_describe(
    settings: &config::Settings,
    components: &Arc<ComponentRegistry>,
    stores: &StoreRegistry,
    args: config::DescribeArgs,
) -> Result<(), AppError> {
    let description = PipelineDescription::load(&args.pipeline)?;
    let pipeline_config = description.pipeline_config(&settings.pipeline)?;
    let mut pipeline = CachingPipeline::new(components.clone(), stores, pipeline_config)?;
    description.assemble(&mut pipeline)?;

    let key = pipeline.cache_key()?;
    let mut stdout = io::stdout().lock();

    if args.json {
        let digest = (!key.is_empty()).then(|| key.digest());
        let rendered = serde_json::to_string_pretty(&serde_json::json!({
            "key": &key,
            "digest": digest,
        }))
        .map_err(|err| AppError::unexpected(format!("failed to render key: {err}")))?;
        writeln!(stdout, "{rendered}").map_err(InfraError::from)?;
        return Ok(());
    }

    write_key(&mut stdout, &key).map_err(InfraError::from)?;
    Ok(())
}

fn write_key(out: &mut impl Write, key: &PipelineCacheKey) -> io::Result<()> {
    writeln!(out, "key: {key}")?;
    writeln!(out, "fragments: {}", key.len())?;
    if key.is_empty() {
        writeln!(out, "digest: -")
    } else {
        writeln!(out, "digest: {}", key.digest())
    }
}

fn lookup_label(lookup: CacheLookup) -> String {
    match lookup {
        CacheLookup::Uncacheable => "uncacheable".to_string(),
        CacheLookup::Miss => "miss".to_string(),
        CacheLookup::Partial { prefix_len } => format!("partial({prefix_len})"),
        CacheLookup::Complete => "complete".to_string(),
    }
}
