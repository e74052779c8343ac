use anyhow::{Context, Result};
use chunkpipe::config::{RuntimeConfig, StorageBackend};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Split line-oriented exports into size-bounded parts for many channels
#[derive(Parser)]
#[command(name = "chunkpipe")]
#[command(version)]
#[command(about = "Split line-oriented exports into size-bounded parts for many channels", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Input file, repeatable; `-` reads standard input (overrides config file)
    #[arg(short, long, value_name = "FILE", global = true)]
    input: Vec<String>,

    /// Output directory for parts (filesystem backend only)
    #[arg(short, long, value_name = "DIR", global = true)]
    output: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream the inputs into every destination (default if no subcommand given)
    Run,
    /// Validate the configuration and print the resolved destinations
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build tokio runtime and run the job
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Step 1: Load base configuration
    let mut config = if let Some(config_path) = &cli.config {
        RuntimeConfig::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        // Try default locations, fall back to defaults
        RuntimeConfig::load_or_default().context("Failed to load configuration")?
    };

    // Step 2: Apply CLI overrides (highest priority)
    apply_cli_overrides(&mut config, &cli)?;

    // Step 3: Initialize tracing early so validation logs show up
    chunkpipe::init_tracing(&config.log);

    // Step 4: Validate configuration
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Some(Commands::Check) => {
            print_destinations(&config)
        }
        Some(Commands::Run) | None => run(config).await,
    }
}

async fn run(config: RuntimeConfig) -> Result<()> {
    prepare_output_dir(&config)?;
    display_startup_info(&config);

    let report = chunkpipe::run_with_config(&config).await?;

    tracing::info!(
        inputs = report.inputs,
        bytes = report.bytes,
        parts = report.total_parts(),
        "Run complete"
    );
    for destination in &report.destinations {
        for part in &destination.parts {
            println!("{}\t{}", destination.name, part);
        }
    }
    Ok(())
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) -> Result<()> {
    if !cli.input.is_empty() {
        config.source.paths = cli.input.clone();
    }

    // Override output directory (only valid for fs backend)
    if let Some(output) = &cli.output {
        if config.storage.backend != StorageBackend::Fs {
            anyhow::bail!(
                "--output flag only works with filesystem backend, but backend is '{}'.\n\
                Either remove --output flag or set backend to 'fs' in config file.",
                config.storage.backend
            );
        }

        let fs_config = config.storage.fs.get_or_insert_with(Default::default);
        fs_config.path = output.to_string_lossy().to_string();
    }

    if let Some(level) = &cli.log_level {
        config.log.level = level.clone();
    }

    Ok(())
}

fn prepare_output_dir(config: &RuntimeConfig) -> Result<()> {
    use tracing::info;

    if config.storage.backend != StorageBackend::Fs {
        return Ok(());
    }
    let Some(fs_config) = config.storage.fs.as_ref() else {
        return Ok(());
    };

    let output_path = PathBuf::from(&fs_config.path);
    if !output_path.exists() {
        info!("Creating output directory: {}", fs_config.path);
        std::fs::create_dir_all(&output_path)
            .with_context(|| format!("Failed to create output directory: {}", fs_config.path))?;
    }
    Ok(())
}

fn display_startup_info(config: &RuntimeConfig) {
    use tracing::info;

    info!("╭─────────────────────────────────────────────────");
    info!("│ chunkpipe v{}", env!("CARGO_PKG_VERSION"));
    info!("├─────────────────────────────────────────────────");
    if config.source.paths.is_empty() {
        info!("│ Input: <stdin>");
    }
    for path in &config.source.paths {
        info!("│ Input: {}", path);
    }
    info!("│ Storage backend: {}", config.storage.backend);
    info!("│ Destinations: {}", config.destinations.len());
    for destination in &config.destinations {
        info!(
            "│   - {} (max {} KB per part)",
            destination.name,
            destination.max_part_bytes / 1024
        );
    }
    info!("│ High-water mark: {} KB", config.pipe.high_water_mark / 1024);
    info!("│ Log level: {}", config.log.level);
    info!("╰─────────────────────────────────────────────────");

    chunkpipe::log_storage(&config.storage);
}

fn print_destinations(config: &RuntimeConfig) -> Result<()> {
    let context = chunkpipe::template::TemplateContext::new(
        config.source.paths.first().map(String::as_str).unwrap_or("-"),
    );

    println!("storage: {}", config.storage.backend);
    for destination in &config.destinations {
        let writer = chunkpipe::runner::writer_config(destination, &context)
            .with_context(|| format!("Invalid destination '{}'", destination.name))?;
        println!(
            "{}: first part '{}', max {} bytes, transform {}",
            destination.name,
            writer.part_key(1),
            destination.max_part_bytes,
            if destination.transform.is_some() {
                "mapped"
            } else {
                "identity"
            }
        );
    }
    Ok(())
}
