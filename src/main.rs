use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use clap::Parser;
use dwd_archive::{
    find_config_file, load_config, CacheRefresher, CacheStore, ForecastModel, Settings,
};
use fern::colors::{Color, ColoredLevelConfig};
use log::{error, info, LevelFilter};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Keeps the DWD forecast cache filled with the newest complete model runs"
)]
struct Cli {
    /// Path to config file (TOML format)
    /// Searched in order: this flag, $DWD_ARCHIVE_CONFIG, ./dwd-archive.toml,
    /// $XDG_CONFIG_HOME/dwd-archive/dwd-archive.toml, /etc/dwd-archive/dwd-archive.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long, env = "DWD_ARCHIVE_LEVEL")]
    level: Option<String>,

    /// Directory the forecast documents are written to
    #[arg(long, env = "DWD_ARCHIVE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Seconds to wait between refresh cycles
    #[arg(short, long, env = "DWD_ARCHIVE_WAIT_INTERVAL")]
    wait_interval: Option<u64>,

    /// Run a single refresh cycle and exit
    #[arg(long)]
    once: bool,
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

fn setup_logger(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let colors = ColoredLevelConfig::new()
        .trace(Color::White)
        .debug(Color::Cyan)
        .info(Color::Blue)
        .warn(Color::Yellow)
        .error(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}: {}",
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                colors.color(record.level()),
                record.target(),
                message
            ));
        })
        .level(level)
        .chain(std::io::stdout())
        .apply()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let source = find_config_file(cli.config.as_deref());
    let mut settings: Settings = load_config(&source)
        .with_context(|| format!("Failed to load settings from {}", source))?;
    if let Some(dir) = cli.cache_dir {
        settings.cache_dir = Some(dir);
    }
    if let Some(secs) = cli.wait_interval {
        settings.refresher.wait_interval_secs = secs;
    }

    let level = cli
        .level
        .as_deref()
        .or(settings.log_level.as_deref())
        .map(str::to_string)
        .or_else(|| std::env::var("RUST_LOG").ok())
        .map(|level| parse_level(&level))
        .unwrap_or(LevelFilter::Info);
    setup_logger(level)?;

    info!("Settings: {}", source);
    let cache_dir = settings.resolve_cache_dir()?;
    info!("Cache directory: {}", cache_dir.display());

    let stations = match settings.refresher.model {
        ForecastModel::Mosmix { .. } => {
            let locator = settings
                .station_locator(&cache_dir)
                .await?
                .context("Point forecasts need a station_catalog in the settings")?;
            info!("Loaded {} stations", locator.stations().len());
            Some(Arc::new(locator))
        }
        ForecastModel::CosmoD2 => None,
    };

    let cancel = CancellationToken::new();
    let refresher = CacheRefresher::builder()
        .scanner(Arc::new(settings.scanner(cancel.clone())))
        .maybe_stations(stations)
        .store(CacheStore::new(&cache_dir))
        .quantities(settings.quantities.clone())
        .pois(settings.pois.clone())
        .settings(settings.refresher.clone())
        .build();

    if cli.once {
        refresher.store().ensure_dir().await?;
        let report = refresher.refresh_all_at(Utc::now()).await?;
        info!(
            "Stored {} entries, {} failed",
            report.stored.len(),
            report.failed.len()
        );
        return Ok(());
    }

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested");
        shutdown.cancel();
    });

    refresher.run(cancel).await?;
    Ok(())
}
