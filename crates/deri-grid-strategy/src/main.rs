/*
[INPUT]:  CLI arguments, YAML configuration file, OS shutdown signals
[OUTPUT]: Running grid engine with graceful shutdown
[POS]:    Binary entry point
[UPDATE]: When changing CLI flags, startup flow, or shutdown handling
*/

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use deri_grid_gateway::{ClientConfig, Credentials, DeribitClient};
use deri_grid_strategy::{GridConfig, GridEngine, OrderStore};

const ENV_CLIENT_ID: &str = "DERI_GRID_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "DERI_GRID_CLIENT_SECRET";

#[derive(Parser, Debug)]
#[command(name = "deri-grid", version, about = "Grid trading strategy runner")]
struct Cli {
    #[arg(long = "config", value_name = "PATH")]
    config_path: PathBuf,
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    log_level: String,
    #[arg(long = "dry-run")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let config = GridConfig::from_file(&args.config_path)
        .with_context(|| format!("load config {}", args.config_path.display()))?;
    let _log_guard = init_tracing(&args.log_level, config.log_dir.as_deref())?;

    info!(
        config_path = %args.config_path.display(),
        symbol = %config.symbol,
        dry_run = args.dry_run,
        "starting deri-grid"
    );

    if args.dry_run {
        info!("dry-run requested; configuration validated");
        return Ok(());
    }

    let credentials = load_credentials()?;
    let mut client = DeribitClient::with_config(ClientConfig::default())?;
    client.set_credentials(credentials);

    let store = OrderStore::new(&config.order_log);
    let mut engine = GridEngine::new(config, client, store);

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());

    engine.run(shutdown).await.context("grid engine run")?;
    info!("engine stopped");

    Ok(())
}

fn init_tracing(log_level: &str, log_dir: Option<&std::path::Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(log_level).context("invalid log level")?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let guard = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "deri-grid.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            builder
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|err| anyhow!(err))
                .context("initialize tracing subscriber")?;
            Some(guard)
        }
        None => {
            builder
                .try_init()
                .map_err(|err| anyhow!(err))
                .context("initialize tracing subscriber")?;
            None
        }
    };
    Ok(guard)
}

fn load_credentials() -> Result<Credentials> {
    let client_id = std::env::var(ENV_CLIENT_ID)
        .with_context(|| format!("{ENV_CLIENT_ID} must be set"))?;
    let client_secret = std::env::var(ENV_CLIENT_SECRET)
        .with_context(|| format!("{ENV_CLIENT_SECRET} must be set"))?;
    Ok(Credentials {
        client_id,
        client_secret,
    })
}

fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install SIGINT handler");
            return;
        }
        info!("received SIGINT");
        shutdown_clone.cancel();
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_clone = shutdown.clone();
        tokio::spawn(async move {
            match signal(SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                    info!("received SIGTERM");
                    shutdown_clone.cancel();
                }
                Err(err) => {
                    warn!(error = %err, "failed to install SIGTERM handler");
                }
            }
        });
    }
}
