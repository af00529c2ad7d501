//! ReelGuard - Resource-Pressure Controller for Media Generation
//!
//! Runs the background pressure monitor, serves one-off generation
//! requests through the degradation ladder, and offers maintenance
//! commands for sweeping and diagnostics.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reelguard::{
    backend::{resolve_binary, FfmpegBackend, VideoEncodingBackend},
    config::{default_config_path, ReelGuardConfig},
    controller::{AdmissionGate, GenerationController},
    eviction::{AllocatorReclaimer, PassKind},
    ladder::{DegradationLadder, GenerationOptions},
    metrics::{MetricsSource, SystemMetricsSource},
    monitor::PressureMonitor,
    process::apply_process_hardening,
    store::ArtifactStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "reelguard")]
#[command(author = "A3S Lab Team")]
#[command(version)]
#[command(about = "Resource-pressure controller for memory-constrained media generation")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "REELGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pressure monitor until interrupted
    Monitor,

    /// Serve a single generation request through the degradation ladder
    Generate {
        /// Prompt text
        prompt: String,

        /// Task identifier (random UUID when omitted)
        #[arg(short, long)]
        task_id: Option<String>,

        /// Output path (defaults to `<tasks_dir>/<task_id>.mp4`)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Optional style hint
        #[arg(long)]
        style: Option<String>,

        /// Still image for the slideshow tier (repeatable)
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },

    /// Run a single eviction pass and exit
    Sweep {
        /// Force a full pass regardless of memory pressure
        #[arg(long)]
        full: bool,
    },

    /// Run diagnostics
    Doctor,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("reelguard={}", log_level).into());
    let (plain, json) = if cli.json_logs {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();

    // Load configuration, then fold in the environment flags exactly once
    let config_path = cli
        .config
        .or_else(|| default_config_path().filter(|p| p.exists()));
    let mut config = ReelGuardConfig::load(config_path.as_deref())?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;

    match cli.command {
        Commands::Monitor => {
            apply_process_hardening(&config.process);
            run_monitor(&config).await?;
        }
        Commands::Generate {
            prompt,
            task_id,
            output,
            style,
            images,
        } => {
            apply_process_hardening(&config.process);
            run_generate(&config, prompt, task_id, output, GenerationOptions { style, images })
                .await?;
        }
        Commands::Sweep { full } => {
            run_sweep(&config, full).await?;
        }
        Commands::Doctor => {
            run_doctor(&config).await?;
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

fn build_monitor(config: &ReelGuardConfig) -> Arc<PressureMonitor> {
    let metrics = Arc::new(SystemMetricsSource::new(config.monitor.sample_timeout()));
    let store = Arc::new(ArtifactStore::new(&config.storage));
    Arc::new(PressureMonitor::new(
        &config.monitor,
        metrics,
        store,
        Arc::new(AllocatorReclaimer),
    ))
}

async fn run_monitor(config: &ReelGuardConfig) -> Result<()> {
    let monitor = build_monitor(config);
    let handle = monitor.spawn();

    tracing::info!("ReelGuard monitor is running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    let signal = shutdown_signal().await?;

    tracing::info!(signal, "Shutting down...");
    handle.shutdown().await?;

    Ok(())
}

/// Resolve on Ctrl+C or, on unix, SIGTERM from a service manager.
#[cfg(unix)]
async fn shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res?;
            Ok("SIGINT")
        }
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

async fn run_generate(
    config: &ReelGuardConfig,
    prompt: String,
    task_id: Option<String>,
    output: Option<PathBuf>,
    options: GenerationOptions,
) -> Result<()> {
    let task_id = task_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let output =
        output.unwrap_or_else(|| config.storage.tasks_dir.join(format!("{}.mp4", task_id)));

    let store = Arc::new(ArtifactStore::new(&config.storage));
    let backend: Arc<dyn VideoEncodingBackend> =
        Arc::new(FfmpegBackend::new(config.encoder.clone()));
    let ladder = Arc::new(DegradationLadder::new(config, store, backend));
    let gate = AdmissionGate::new(ladder, config.generation.max_concurrent_tasks);
    let controller = GenerationController::new(Arc::new(gate));

    let started = chrono::Utc::now();
    let outcome = controller
        .generate(&prompt, &task_id, &output, options)
        .await
        .with_context(|| format!("generation failed for task {}", task_id))?;

    tracing::info!(
        task_id = %task_id,
        tier = %outcome.succeeded_tier,
        elapsed_ms = (chrono::Utc::now() - started).num_milliseconds(),
        "Generation finished"
    );
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn run_sweep(config: &ReelGuardConfig, full: bool) -> Result<()> {
    let monitor = build_monitor(config);
    let report = if full {
        monitor.run_pass(PassKind::Full).await?
    } else {
        monitor.evaluate_once().await?
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_doctor(config: &ReelGuardConfig) -> Result<()> {
    println!("🔍 ReelGuard Doctor");
    println!();

    println!("Checking encoder binaries...");
    for binary in [&config.encoder.ffmpeg_binary, &config.encoder.convert_binary] {
        match resolve_binary(binary) {
            Some(path) => println!("  ✓ {} found: {}", binary, path.display()),
            None => println!("  ✗ {} not found on PATH", binary),
        }
    }
    if config.generation.disable_processing {
        println!("  ℹ Video processing disabled; the encoder will not be invoked");
    }

    println!();
    println!("Checking managed directories...");
    let store = ArtifactStore::new(&config.storage);
    for dir in store
        .eviction_dirs()
        .iter()
        .chain(store.reuse_dirs())
        .chain(store.temp_dirs())
    {
        if ArtifactStore::dir_exists(dir) {
            println!("  ✓ {:?} {}", dir.role, dir.path.display());
        } else {
            println!("  ℹ {:?} {} does not exist yet", dir.role, dir.path.display());
        }
    }
    let reusable = store.reusable_artifacts().len();
    println!("  ℹ {} reusable artifact(s) available", reusable);

    println!();
    println!("Checking memory...");
    let source = SystemMetricsSource::new(config.monitor.sample_timeout());
    let sample = source.sample().await;
    if sample.is_known() {
        let marker = if sample.percent_used > config.monitor.threshold_percent {
            "✗"
        } else {
            "✓"
        };
        println!(
            "  {} {:.1}% used, {:.1}MB available (threshold {:.1}%)",
            marker,
            sample.percent_used,
            sample.available_mib(),
            config.monitor.threshold_percent
        );
    } else {
        println!("  ✗ Memory usage could not be sampled");
    }

    println!();
    println!("Checking configuration...");
    if let Some(path) = default_config_path() {
        if path.exists() {
            println!("  ✓ Configuration file found: {}", path.display());
        } else {
            println!("  ℹ No configuration file found (using defaults)");
        }
    }

    println!();
    println!("Doctor check complete!");

    Ok(())
}

fn show_config(config: Option<&ReelGuardConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
