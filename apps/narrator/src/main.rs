//! Narrator binary
//!
//! `narrator-run --config <path> [--ticks N] [--resume-from <tick>]`
//!
//! Exit codes: 0 success, 2 configuration error, 3 provider unavailable
//! at startup, 4 fatal rule-engine error, 1 any other failure.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use seed::SeedManager;
use vellum_events::JsonlEventSink;
use vellum_llm::{build_provider, ProviderRouter};
use vellum_world::{ActionCatalog, GlobalClock};

use vellum_narrator::dm::DmResolver;
use vellum_narrator::fallback::FallbackPolicy;
use vellum_narrator::{genesis, phenology};
use vellum_narrator::{Narrator, NarratorConfig, NarratorError, NarratorOptions};

const EXIT_OK: i32 = 0;
const EXIT_OTHER: i32 = 1;
const EXIT_CONFIG: i32 = 2;
const EXIT_PROVIDER: i32 = 3;
const EXIT_RULES: i32 = 4;

#[derive(Debug, Parser)]
#[command(name = "narrator-run", about = "Run the VELLUM narrative simulation kernel")]
struct Cli {
    /// Path to the configuration YAML
    #[arg(long)]
    config: PathBuf,

    /// Number of ticks to run; unbounded when omitted
    #[arg(long)]
    ticks: Option<u64>,

    /// Restart the clock at this tick and append to the existing log
    #[arg(long = "resume-from")]
    resume_from: Option<u64>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let code = run(Cli::parse()).await;
    std::process::exit(code);
}

async fn run(cli: Cli) -> i32 {
    // Configuration: everything here is fatal with exit code 2
    let config = match NarratorConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %cli.config.display(), error = %e, "configuration error");
            return EXIT_CONFIG;
        }
    };

    let whitelist_text = match std::fs::read_to_string(&config.narrator.whitelist) {
        Ok(text) => text,
        Err(e) => {
            error!(path = %config.narrator.whitelist, error = %e, "cannot read whitelist");
            return EXIT_CONFIG;
        }
    };
    let catalog = match ActionCatalog::from_yaml(&whitelist_text) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!(path = %config.narrator.whitelist, error = %e, "invalid whitelist");
            return EXIT_CONFIG;
        }
    };

    // Provider registry
    let router = Arc::new(ProviderRouter::new());
    for (id, provider_config) in &config.llm.providers {
        let settings = match config.provider_settings(provider_config) {
            Ok(settings) => settings,
            Err(e) => {
                error!(provider_id = %id, error = %e, "provider configuration error");
                return EXIT_CONFIG;
            }
        };
        match build_provider(provider_config.kind, id, settings) {
            Ok(provider) => router.register(provider),
            Err(e) => {
                error!(provider_id = %id, error = %e, "provider construction failed");
                return EXIT_PROVIDER;
            }
        }
    }
    if let Err(e) = router.set_default(&config.llm.default_provider) {
        error!(error = %e, "default provider selection failed");
        return EXIT_CONFIG;
    }

    // Startup health gate on the default provider
    let health = router.health_check_all().await;
    for (id, status) in &health {
        info!(provider_id = %id, healthy = status.is_healthy(), "provider probed");
    }
    let default_healthy = health
        .get(&config.llm.default_provider)
        .map(|status| status.is_healthy())
        .unwrap_or(false);
    if !default_healthy {
        error!(
            provider_id = %config.llm.default_provider,
            "default provider unavailable at startup"
        );
        return EXIT_PROVIDER;
    }

    // Clock, seeds, genesis world, event log
    let start_tick = match cli.resume_from {
        Some(tick) => tick as i64,
        None => config.clock.start_tick,
    };
    let clock = match GlobalClock::new(start_tick) {
        Ok(clock) => clock,
        Err(e) => {
            error!(error = %e, "clock configuration error");
            return EXIT_CONFIG;
        }
    };

    let seeds = SeedManager::new(config.seed);
    let world = genesis::genesis_world(config.seed, start_tick as u64);

    let sink = match JsonlEventSink::open(&config.narrator.event_log) {
        Ok(sink) => sink,
        Err(e) => {
            error!(path = %config.narrator.event_log, error = %e, "cannot open event log");
            return EXIT_OTHER;
        }
    };

    let options = NarratorOptions {
        max_retries: config.narrator.max_retries,
        granularity: config.narrator.granularity,
        granularity_steps: config.narrator.granularity_steps.clone(),
        default_step: config.clock.default_step,
        tick_deadline: Duration::from_millis(config.narrator.tick_deadline_ms),
        ..NarratorOptions::default()
    };

    let mut narrator = Narrator::new(
        options,
        clock,
        seeds,
        router,
        catalog,
        FallbackPolicy::default(),
        DmResolver::new(),
        world,
        Box::new(sink),
    );
    narrator
        .engine_mut()
        .register_with(phenology::season_drift(), 0, ["environmental"]);
    narrator
        .engine_mut()
        .register_with(phenology::field_regrowth(100), 0, ["environmental"]);

    // External cancellation waits for the current tick to close
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let _ = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, finishing current tick");
            flag.store(true, Ordering::SeqCst);
        }
    });

    info!(
        seed = config.seed,
        start_tick,
        ticks = ?cli.ticks,
        "narrator starting"
    );

    match narrator.run(cli.ticks, shutdown).await {
        Ok(completed) => {
            info!(ticks = completed, "run complete");
            EXIT_OK
        }
        Err(e @ (NarratorError::Rule(_) | NarratorError::Interrupt(_))) => {
            error!(error = %e, "fatal rule-engine error");
            EXIT_RULES
        }
        Err(e) => {
            error!(error = %e, "narrator failed");
            EXIT_OTHER
        }
    }
}
