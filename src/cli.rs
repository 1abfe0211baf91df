//! Command-line front-end for the recovery engine

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::events::EventTopic;
use crate::observability::telemetry::{init_tracing, init_tracing_verbose};
use crate::self_healing::{
    builtin_strategies, ActionKind, ErrorCategory, ErrorRecoveryEngine, ErrorReport,
    ErrorSeverity, RecoveryAction, RecoveryHooks, SystemError,
};

#[derive(Parser)]
#[command(name = "selfheal")]
#[command(about = "Self-healing error recovery engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Verbose logging (debug level)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the engine with the built-in strategies and wait for Ctrl-C
    Run,

    /// Report a single error and print how the engine handled it
    Simulate {
        /// Error category, e.g. plugin-load, network, security
        #[arg(long)]
        category: ErrorCategory,

        /// Error severity: low, medium, high, critical
        #[arg(long, default_value = "medium")]
        severity: ErrorSeverity,

        #[arg(long, default_value = "simulated failure")]
        message: String,

        /// Plugin that raised the error
        #[arg(long, conflicts_with = "component")]
        plugin: Option<String>,

        /// Component that raised the error
        #[arg(long)]
        component: Option<String>,

        /// Make every non-escalation action fail
        #[arg(long)]
        fail: bool,
    },

    /// Print the built-in strategies as JSON
    Strategies,

    /// Print the effective configuration as TOML
    Config,
}

/// Hooks used by `simulate`: log each action and optionally fail it.
struct SimulatedHooks {
    fail: bool,
}

#[async_trait::async_trait]
impl RecoveryHooks for SimulatedHooks {
    async fn perform(&self, action: &RecoveryAction, error: &SystemError) -> Result<()> {
        info!(error_id = %error.id, action = %action.kind, target = %action.target, "Simulated action");
        if self.fail && !matches!(action.kind, ActionKind::Escalate | ActionKind::Notify) {
            anyhow::bail!("simulated {} failure", action.kind);
        }
        Ok(())
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        init_tracing_verbose();
    } else {
        init_tracing();
    }

    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run => run_engine(config).await,
        Commands::Simulate {
            category,
            severity,
            message,
            plugin,
            component,
            fail,
        } => {
            let mut report = ErrorReport::new(category, severity, &message).with_source("cli");
            if let Some(plugin) = plugin {
                report = report.with_plugin(&plugin);
            }
            if let Some(component) = component {
                report = report.with_component(&component);
            }
            simulate(config, report, fail).await
        }
        Commands::Strategies => {
            let strategies = builtin_strategies();
            println!("{}", serde_json::to_string_pretty(&strategies)?);
            Ok(())
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

async fn run_engine(config: EngineConfig) -> Result<()> {
    let engine = ErrorRecoveryEngine::new(config).with_builtin_strategies();
    engine.initialize().await;
    info!(
        strategies = engine.get_recovery_strategies().len(),
        "Engine running, press Ctrl-C to stop"
    );

    shutdown_signal().await?;
    eprintln!("\nReceived shutdown signal, draining recoveries...");
    engine.shutdown().await;
    Ok(())
}

async fn simulate(config: EngineConfig, report: ErrorReport, fail: bool) -> Result<()> {
    let config = EngineConfig {
        enable_auto_recovery: true,
        enable_health_checks: false,
        ..config
    };
    let engine =
        ErrorRecoveryEngine::with_hooks(config, Arc::new(SimulatedHooks { fail })).with_builtin_strategies();

    let seen: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    for topic in EventTopic::ALL {
        let seen = Arc::clone(&seen);
        engine.on(topic, move |event| seen.lock().push(event.topic().as_str()));
    }

    let id = engine.report_error(report)?;
    engine.wait_idle().await;

    let error = engine
        .get_error(&id)
        .context("reported error disappeared from the store")?;
    let output = json!({
        "error": error,
        "events": *seen.lock(),
        "statistics": engine.get_statistics(),
    });
    engine.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("failed to register SIGTERM handler")?;
        tokio::select! {
            res = ctrl_c => res.context("failed to listen for Ctrl-C")?,
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("failed to listen for Ctrl-C")?;
    }
    Ok(())
}
