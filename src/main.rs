//! Value engine entry point.

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use value_engine::bankroll::RiskState;
use value_engine::config::Config;
use value_engine::engine::{ChatContext, ValueEngine};
use value_engine::metrics;

/// Value betting opportunity engine.
#[derive(Parser, Debug)]
#[command(name = "value-engine")]
#[command(about = "Finds value bets in football markets and sizes stakes by bankroll phase")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one evaluation pass (default).
    Run {
        /// Bankroll to size stakes against (defaults to INITIAL_BANKROLL).
        #[arg(short, long)]
        bankroll: Option<Decimal>,

        /// Print the evaluation as JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Show the phase summary for a bankroll.
    Phase {
        /// Bankroll to summarize (defaults to INITIAL_BANKROLL).
        #[arg(short, long)]
        bankroll: Option<Decimal>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging. Config errors surface later with proper reporting.
    let (config_verbose, config_level) = Config::load()
        .map(|c| (c.verbose, c.rust_log))
        .unwrap_or((false, "info".to_string()));
    let filter = if args.verbose || config_verbose {
        EnvFilter::new("value_engine=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    // Initialize metrics
    metrics::init_metrics();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Phase { bankroll }) => cmd_phase(bankroll),
        Some(Command::Run { bankroll, json }) => cmd_run(bankroll, json).await,
        None => cmd_run(None, false).await,
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::load()?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(config)
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("VALUE ENGINE - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    print!("Checking provider credentials... ");
    let missing = config.missing_credentials();
    if missing.is_empty() {
        println!("OK");
    } else if config.is_production() {
        println!("FAILED");
        println!("  Missing: {}", missing.join(", "));
        return Err(anyhow::anyhow!("Provider credentials missing in production"));
    } else {
        println!("MISSING");
        println!("  Missing: {} (substitute data will be used)", missing.join(", "));
    }

    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!("  Environment: {}", config.environment);
    println!("  Initial Bankroll: {}", config.initial_bankroll);
    println!("  Current Phase: {}", config.current_phase);
    println!(
        "  Phase Targets: {} / {} / {} / {}",
        config.target_bankroll_phase_1,
        config.target_bankroll_phase_2,
        config.target_bankroll_phase_3,
        config.target_bankroll_phase_4
    );
    println!("  Consolidation Threshold: {}", config.consolidation_threshold);
    println!("  Kelly Multiplier: {}", config.kelly_multiplier);
    println!("  Sports: {}", config.sports().join(", "));
    println!("  Lookahead: {} days", config.lookahead_days);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Show the phase summary for a bankroll.
fn cmd_phase(bankroll: Option<Decimal>) -> anyhow::Result<()> {
    let config = load_config()?;
    let manager = config.bankroll_manager(bankroll.unwrap_or(config.initial_bankroll));
    let info = manager.get_phase_info();

    println!("======================================================================");
    println!("VALUE ENGINE - PHASE");
    println!("======================================================================");
    println!("  Bankroll: {}", info.bankroll);
    println!("  Phase: {}", info.phase);
    println!("  Session Phase: {}", manager.opened_in());
    if let Some(target) = info.target {
        println!("  Target: {}", target);
    }
    if let Some(progress) = info.progress_pct {
        println!("  Progress: {:.2}%", progress);
    }
    if let Some(remaining) = info.remaining {
        println!("  Remaining: {}", remaining);
    }
    println!("  Minimum EV: {}%", info.min_ev);
    println!("  Max Stake: {}% ({})", info.max_stake_pct, manager.max_stake());

    let (completed, withdraw) = manager.check_phase_completion();
    if completed {
        println!("  Phase target reached, withdraw {}", withdraw);
    }
    println!("======================================================================");
    Ok(())
}

/// Run one evaluation pass and print the result.
async fn cmd_run(bankroll: Option<Decimal>, json: bool) -> anyhow::Result<()> {
    let config = load_config()?;
    let engine = ValueEngine::from_config(&config)?;
    let manager = config.bankroll_manager(bankroll.unwrap_or(config.initial_bankroll));

    info!(
        environment = %engine.environment(),
        live = engine.has_live_data(),
        bankroll = %manager.bankroll(),
        phase = %manager.phase(),
        "Starting evaluation"
    );

    let evaluation = tokio::select! {
        result = engine.evaluate(&manager, RiskState::new(&manager)) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted before the evaluation finished");
            return Ok(());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&evaluation)?);
        return Ok(());
    }

    let context = ChatContext::new(&manager, engine.risk_manager(), &evaluation, &[]);
    println!("======================================================================");
    println!("VALUE ENGINE - {} DATA", evaluation.mode.to_string().to_uppercase());
    println!("======================================================================");
    print!("{}", context.render());
    if let Some(withdraw) = evaluation.withdraw {
        println!("Phase target reached: withdraw {}", withdraw);
    }
    println!("======================================================================");
    Ok(())
}
