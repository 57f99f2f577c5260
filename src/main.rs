//! ramstor
//!
//! Creates or removes a RAM-backed Ceph cluster on this host, as described
//! by an INI configuration file:
//!
//! ```text
//! ramstor --config-file ramstor.ini --action create
//! ramstor --config-file ramstor.ini --action remove
//! ```

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ramstor::{
    default_registries, Action, BackendContext, Backends, Orchestrator, Result, RuntimeConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Info,
    Debug,
}

/// ramstor - Ephemeral RAM-backed Ceph clusters for compute jobs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long)]
    config_file: PathBuf,

    /// Create or remove the cluster
    #[arg(short = 'a', long, value_enum)]
    action: Action,

    /// Log level; overrides `log_level` from the configuration file
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    /// Output logs as JSON
    #[arg(long, env = "RAMSTOR_LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging starts once the file is read, since it may set the level
    let config = match RuntimeConfig::load(&args.config_file) {
        Ok(config) => {
            init_logging(&args, config.setup.log_level.as_deref());
            config
        }
        Err(e) => {
            init_logging(&args, None);
            error!("Could not load {:?}: {}", args.config_file, e);
            return Err(e);
        }
    };

    info!("Starting {} {}", ramstor::NAME, ramstor::VERSION);
    info!("  Action: {}", args.action);
    info!("  Backend: {}", config.setup.backend);
    info!("  Service: {}", config.setup.service);
    info!("  Folder: {:?}", config.setup.folder);

    if let Err(e) = run(&args, config).await {
        error!("{} failed ({}): {}", args.action, e.category(), e);
        return Err(e);
    }

    info!("{} finished", args.action);
    Ok(())
}

async fn run(args: &Args, config: RuntimeConfig) -> Result<()> {
    let ctx = BackendContext::local(config.setup.folder.clone(), config.timeouts)?;
    let mut registries = default_registries();
    let backends = Backends::resolve(&mut registries, &config.selection(), &ctx)?;

    let orchestrator = Orchestrator::new(config, backends);
    orchestrator.run(args.action).await
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args, config_level: Option<&str>) {
    let level = match (args.log_level, config_level) {
        (Some(LogLevel::Debug), _) => Level::DEBUG,
        (Some(LogLevel::Info), _) => Level::INFO,
        (None, Some("debug")) => Level::DEBUG,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
