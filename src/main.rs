use clap::Parser;
use color_eyre::Result;
use padmapper::config::AppConfig;
use padmapper::controller::event_collector::CollectorHandle;
use padmapper::engine::MappingEngineHandle;
use padmapper::mapping::{Profile, ProfileStore};
use padmapper::output::LoggingSink;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "padmapper", version)]
#[command(about = "Maps a game controller to keyboard, mouse and app shortcuts")]
struct Cli {
    #[arg(short, long, help = "Path to main config file, including filename.")]
    config: Option<PathBuf>,
    #[arg(short, long, help = "Profile to load instead of the configured one.")]
    profile: Option<PathBuf>,
    #[arg(long, help = "Limit max log level.")]
    log_level: Option<Level>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.log_level)?;

    let config_path = cli.config.unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load_or_create(&config_path).await?;
    info!("Using config {}", config_path.display());

    let profile = match cli.profile.or_else(|| config.profile.clone()) {
        Some(path) => {
            info!("Loading profile {}", path.display());
            Profile::load(&path)?
        }
        None => {
            warn!("No profile configured, starting with an empty profile");
            Profile::new("default")
        }
    };
    let store = ProfileStore::new(profile);

    let (mut engine, mut events) = MappingEngineHandle::spawn(
        "padmapper",
        config.engine.clone(),
        &store,
        Arc::new(LoggingSink),
    )?;
    let mut collector = CollectorHandle::spawn(None, engine.input())?;

    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    collector.shutdown().await?;
    engine.shutdown().await?;
    event_task.abort();
    Ok(())
}

fn setup(log_level: Option<Level>) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    let level = log_level.unwrap_or_else(|| {
        std::env::var("RUST_LOG")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(Level::INFO)
    });
    setup_logging_env(level);
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
