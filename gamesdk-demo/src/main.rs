use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use gamesdk_host::event::{EventHandler, User};
use gamesdk_host::log::tracing_log_hook;
use gamesdk_host::{
    Activity, Core, CreateFlags, CreateParams, Loader, LoaderConfig, LogLevel, ResultCode,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Load the native game SDK, publish an activity and pump callbacks")]
struct Args {
    /// Loader config file (TOML). Defaults to ~/.config/gamesdk/host.toml when present.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Application (client) ID.
    #[arg(long, env = "GAMESDK_CLIENT_ID", default_value_t = 1121410048996954192)]
    client_id: i64,

    /// Vendor SDK already on disk.
    #[arg(long, conflicts_with_all = ["sdk_url", "download"])]
    sdk: Option<PathBuf>,

    /// Fetch the vendor SDK from this URL (`file://` allowed).
    #[arg(long, conflicts_with = "download")]
    sdk_url: Option<String>,

    /// Download the vendor archive and extract the SDK from it.
    #[arg(long)]
    download: bool,

    /// Directory holding the bundled native objects.
    #[arg(long, env = "GAMESDK_RESOURCE_DIR")]
    resources: Option<PathBuf>,

    /// Fail instead of starting without a running desktop client.
    #[arg(long)]
    require_client: bool,

    #[arg(long, default_value = "details field")]
    details: String,

    #[arg(long, default_value = "state field")]
    state: String,

    /// Pump iterations before exiting. 0 runs until the pump fails.
    #[arg(long, default_value_t = 0)]
    ticks: u64,

    #[arg(long, default_value_t = 16)]
    interval_ms: u64,
}

struct LogEvents;

impl EventHandler for LogEvents {
    fn on_activity_join(&self, secret: &str) {
        tracing::info!(secret, "joining via invite");
    }

    fn on_activity_spectate(&self, secret: &str) {
        tracing::info!(secret, "spectating via invite");
    }

    fn on_activity_join_request(&self, user: &User) {
        tracing::info!(user = %user.username, id = user.id, "join request");
    }

    fn on_overlay_toggle(&self, locked: bool) {
        tracing::info!(locked, "overlay toggled");
    }
}

fn main() -> Result<()> {
    // JSON logs when GAMESDK_LOG_JSON=1, human-readable otherwise
    let json_logs = std::env::var("GAMESDK_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("gamesdk_host=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let args = Args::parse();
    let _cleanup = gamesdk_host::cleanup_on_exit();

    let mut config = match &args.config {
        Some(path) => {
            let mut config = LoaderConfig::load(path)?;
            config.apply_env(|key| std::env::var(key).ok());
            config
        }
        None => LoaderConfig::discover()?,
    };
    if let Some(dir) = &args.resources {
        config.resource_dir = Some(dir.clone());
    }

    let loader = Loader::new(config);
    let runtime = if let Some(sdk) = &args.sdk {
        loader.load_with_sdk(sdk)
    } else if let Some(url) = &args.sdk_url {
        loader.load_from_url(url)
    } else if args.download {
        loader.load_download()
    } else {
        loader.load()
    }
    .context("failed to load the native SDK")?;

    let mut params = CreateParams::new(&runtime)?;
    params.set_client_id(args.client_id);
    params.set_flags(if args.require_client {
        CreateFlags::DEFAULT
    } else {
        CreateFlags::NO_REQUIRE_DISCORD
    });
    params.register_event_handler(Arc::new(LogEvents));

    let core = match Core::new(&runtime, params) {
        Ok(core) => core,
        Err(e) if e.result() == Some(ResultCode::NotRunning) => {
            tracing::warn!("desktop client is not running, exiting");
            return Ok(());
        }
        Err(e) => return Err(e).context("session creation failed"),
    };
    core.set_log_hook(LogLevel::Debug, tracing_log_hook())?;

    let activity = Activity::new(args.details, args.state).started_now();
    core.activity_manager().update_activity(&activity)?;

    let overlay = core.overlay_manager();
    tracing::info!(
        enabled = overlay.is_enabled()?,
        locked = overlay.is_locked()?,
        "overlay state"
    );

    let interval = Duration::from_millis(args.interval_ms);
    let mut tick = 0u64;
    loop {
        if let Err(e) = core.run_callbacks() {
            tracing::error!("callback pump failed: {e}");
            break;
        }
        tick += 1;
        if args.ticks != 0 && tick >= args.ticks {
            break;
        }
        std::thread::sleep(interval);
    }

    if let Err(e) = core
        .activity_manager()
        .clear_activity()
        .and_then(|()| core.run_callbacks())
    {
        tracing::warn!("could not clear activity: {e}");
    }
    core.close();
    Ok(())
}
