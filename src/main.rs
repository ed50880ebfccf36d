//! Skillwatch - continuous storefront monitoring
//!
//! Runs pluggable checks ("skills") against a target URL on a fixed
//! interval and whenever a deployment event arrives, then alerts through
//! rate-limited stdout, Discord and Slack channels.
//!
//! Exit codes:
//!   0 - Success (or clean shutdown)
//!   1 - Runtime error (bad config, unknown skill, bind failure, etc.)
//!   2 - `--once` run in which at least one skill failed

use anyhow::{Context, Result};
use skillwatch::cli::Args;
use skillwatch::config::{Config, DEFAULT_CONFIG_FILE};
use skillwatch::ingress;
use skillwatch::notify::Notifier;
use skillwatch::orchestrator::Orchestrator;
use skillwatch::runtime::Monitor;
use skillwatch::scheduler::Scheduler;
use skillwatch::skills;
use skillwatch::store::{JsonlStore, ResultStore};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("Skillwatch v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            error!("Monitor failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .skillwatch.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    std::fs::write(path, Config::default_toml())
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to set the target URL, skills and alert channels.");
    Ok(())
}

/// Initialize logging. `RUST_LOG` wins over the verbosity flags.
fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level().as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Wire the components together and run. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;
    let config = Arc::new(config);

    let mut orchestrator = Orchestrator::new(config.skill_timeout());
    for skill in skills::builtin_skills(&config) {
        orchestrator.register(skill);
    }
    let selected = match orchestrator.resolve(&config.skills.enabled)? {
        names if names.is_empty() => orchestrator.skill_names(),
        names => names,
    };
    info!("Skills: {}", selected.join(", "));

    let http = reqwest::Client::builder()
        .user_agent(concat!("skillwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let notifier = Notifier::new(config.alert_cooldown(), config.alert_timeout())?;

    let scheduler = Arc::new(Scheduler::new(config.interval()));
    scheduler.register_handler(|event| {
        if let Some(ref deployment) = event.deployment {
            info!(
                "Deployment event queued: env={} sha={}",
                deployment.environment.as_deref().unwrap_or("-"),
                deployment.sha.as_deref().unwrap_or("-")
            );
        }
        Ok(())
    });

    let mut monitor = Monitor::new(
        Arc::clone(&config),
        Arc::clone(&scheduler),
        orchestrator,
        notifier,
        http,
    );
    if config.store.enabled {
        let store: Arc<dyn ResultStore> = Arc::new(JsonlStore::open(config.store.path.clone())?);
        monitor = monitor.with_store(store);
    }

    if args.once {
        let summary = monitor.run_once().await?;
        println!(
            "\n📊 {} skill(s): ✅ {} passed | ⚠️ {} warned | ❌ {} failed",
            summary.total_skills, summary.passed, summary.warned, summary.failed
        );
        return Ok(if summary.failed > 0 { 2 } else { 0 });
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let receiver = if config.ingress.enabled {
        let mut rx = shutdown_rx.clone();
        let shutdown = async move {
            let _ = rx.wait_for(|stop| *stop).await;
        };
        let scheduler = Arc::clone(&scheduler);
        let bind = config.ingress.bind.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = ingress::serve(scheduler, &bind, shutdown).await {
                error!("Event receiver stopped: {:#}", e);
            }
        }))
    } else {
        None
    };

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            // Hold the sender forever: dropping it stops the monitor.
            std::future::pending::<()>().await;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    monitor.run(shutdown_rx).await;

    if let Some(handle) = receiver {
        handle.await.context("Event receiver task panicked")?;
    }

    Ok(0)
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
