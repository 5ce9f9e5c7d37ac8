use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use narrator::audio::FfmpegAssembler;
use narrator::cli::{Cli, Commands, ConfigAction};
use narrator::config::Config;
use narrator::content::{ContentSource, DirectorySource};
use narrator::diagnostics::{SystemPreflight, check_dependencies};
use narrator::output::{ConsoleReporter, print_summary};
use narrator::pipeline::{OutputLayout, Pipeline, PipelineSettings, RunOptions};
use narrator::worker::{WorkerCommand, WorkerProcess};
use owo_colors::OwoColorize;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Run { force, slugs } => {
            let config = load_config(cli.config.as_deref())?;
            run_narration(config, RunOptions { force, slugs }, cli.quiet).await?;
        }
        Commands::Check => {
            let config = load_config(cli.config.as_deref())?;
            if !check_dependencies(&SystemPreflight::from_config(&config)) {
                std::process::exit(1);
            }
        }
        Commands::List => {
            let config = load_config(cli.config.as_deref())?;
            list_items(&config)?;
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "narrator",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` takes precedence over `-v`.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,narrator={level}")));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose >= 2),
        )
        .with(filter)
        .init();
}

async fn run_narration(config: Config, options: RunOptions, quiet: bool) -> Result<()> {
    let source = DirectorySource::new(config.content.dir.clone(), config.content.extensions.clone());
    let items = source.load()?;
    tracing::info!("narrator {}", narrator::version_string());
    tracing::info!("Loaded {} content item(s) from {}", items.len(), source.dir().display());

    let worker = WorkerProcess::new(WorkerCommand::from_config(&config.worker))
        .with_request_timeout(config.worker.request_timeout()?);
    let assembler = FfmpegAssembler::new(config.audio.ffmpeg.clone(), config.audio.bitrate.clone());

    let mut pipeline = Pipeline::new(
        OutputLayout::from_config(&config.audio),
        PipelineSettings::from_config(&config),
        Box::new(worker),
        Arc::new(assembler),
    )
    .with_preflight(Arc::new(SystemPreflight::from_config(&config)))
    .with_reporter(Arc::new(ConsoleReporter::new(quiet)));

    match pipeline.run(items, &options).await {
        Ok(report) => {
            if !quiet {
                print_summary(&report);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", format!("Error: {}", e).red());
            std::process::exit(1);
        }
    }
}

fn list_items(config: &Config) -> Result<()> {
    let source = DirectorySource::new(config.content.dir.clone(), config.content.extensions.clone());
    let items = source.load()?;
    let layout = OutputLayout::from_config(&config.audio);

    if items.is_empty() {
        eprintln!("No content found in {}", source.dir().display());
        return Ok(());
    }

    let mut narrated = 0;
    for item in &items {
        if layout.artifact_path(&item.id).exists() {
            narrated += 1;
            println!("  {} {}", "●".green(), item.id);
        } else {
            println!("  {} {}", "○".dimmed(), item.id);
        }
    }
    println!();
    println!(
        "{} of {} item(s) narrated in {}",
        narrated,
        items.len(),
        layout.output_dir().display()
    );
    Ok(())
}

fn handle_config_command(action: ConfigAction, config_path: Option<&std::path::Path>) -> Result<()> {
    match action {
        ConfigAction::Dump => {
            print!("{}", Config::dump_template());
        }
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            print!("{}", config.to_display_toml()?);
        }
    }
    Ok(())
}

/// Load configuration from custom path or default location.
fn load_config(custom_path: Option<&std::path::Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        // Load from custom path
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        // Try default path, fall back to defaults
        let default_path = Config::default_path();
        Config::load_or_default(&default_path)
            .with_context(|| format!("Failed to load {}", default_path.display()))?
    };

    // Apply environment variable overrides
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}
