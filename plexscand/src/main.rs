//! `plexscand` — watches media library directories and triggers partial
//! indexer rescans on an external Plex-like server.

mod daemon;
mod indexer;
mod logging;
mod signals;

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use plexscan_config::{Args, Settings};
use plexscan_core::{App, AppConfig};
use tracing::{error, info, warn};

use indexer::IndexerClient;

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let settings = Settings::load(&args).context("failed to load configuration")?;

    if settings.daemonize {
        daemon::daemonize().context("failed to daemonize")?;
    }

    let log_handle = logging::init(settings.log_level, settings.log_file.as_deref())
        .context("failed to initialize logging")?;

    if let Err(err) = run(args, settings, log_handle) {
        error!(error = %err, "fatal startup or runtime error");
        std::process::exit(1);
    }

    Ok(())
}

fn run(args: Args, settings: Settings, log_handle: logging::ReloadHandle) -> anyhow::Result<()> {
    let Some(plex_url) = settings.plex_url.as_deref() else {
        bail!("plex_url is not configured");
    };
    let base_url = url::Url::parse(plex_url).context("plex_url is not a valid URL")?;

    let indexer = IndexerClient::new(base_url, settings.plex_token.clone())
        .context("failed to construct indexer client")?;

    wait_for_connectivity(&indexer, Duration::from_secs(settings.startup_timeout_secs))?;

    let sections = indexer
        .discover_sections()
        .context("failed to discover library sections from indexer")?;

    let max_watches = fd_soft_ceiling();
    let config = AppConfig {
        debounce: Duration::from_secs(settings.scan_interval_secs),
        max_watches,
        ..Default::default()
    };

    let (mut app, control) =
        App::new(config, Box::new(indexer)).context("failed to initialize watcher")?;

    signals::spawn_signal_bridge(control).context("failed to install signal handlers")?;

    let mut roots_watched = 0usize;
    for section in &sections {
        for path in &section.paths {
            match app.register_root(path, section.section_id) {
                Ok(()) => roots_watched += 1,
                Err(err) => warn!(path = %path.display(), error = %err, "failed to watch library root"),
            }
        }
    }
    info!(
        sections = sections.len(),
        roots_watched, "startup discovery complete"
    );

    let original_plex_url = plex_url.to_string();
    app.run_with_reload(|app| reload_config(app, &args, &original_plex_url, &log_handle))
        .context("event loop terminated unexpectedly")?;
    info!("shutdown complete");
    Ok(())
}

/// SIGHUP handler body: re-reads the config file and applies the subset of
/// settings that can change without rebuilding the watch tree or the
/// dispatcher (B.5). `plex_url` changes are logged and ignored — rebuilding
/// the `Dispatcher` mid-flight could race an in-flight `scan` call.
fn reload_config(app: &mut App, args: &Args, original_plex_url: &str, log_handle: &logging::ReloadHandle) {
    let settings = match Settings::load(args) {
        Ok(settings) => settings,
        Err(err) => {
            warn!(error = %err, "failed to reload configuration, keeping previous settings");
            return;
        }
    };

    if settings.plex_url.as_deref() != Some(original_plex_url) {
        warn!("plex_url changed in config but is ignored until restart");
    }

    log_handle.set_level(settings.log_level);
    app.set_debounce(Duration::from_secs(settings.scan_interval_secs));
    app.set_dispatcher_token(settings.plex_token.as_deref());
    info!("configuration reloaded");
}

/// Polls connectivity with linear backoff until `timeout` elapses. Failing
/// to ever reach the indexer is one of the fatal startup conditions.
fn wait_for_connectivity(indexer: &IndexerClient, timeout: Duration) -> anyhow::Result<()> {
    use plexscan_core::Dispatcher;

    let deadline = Instant::now() + timeout;
    let mut backoff = Duration::from_millis(250);

    loop {
        if indexer.check_connectivity() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("could not reach the indexer within {:?}", timeout);
        }
        warn!(backoff = ?backoff, "indexer unreachable, retrying");
        thread::sleep(backoff.min(deadline.saturating_duration_since(Instant::now())));
        backoff = (backoff * 2).min(Duration::from_secs(5));
    }
}

/// `min(rlimit soft / 2, a generous fixed ceiling)`. Half the process fd
/// limit is reserved for sockets, the config/log file, and anything the
/// indexer HTTP client keeps open.
fn fd_soft_ceiling() -> usize {
    match rlimit::getrlimit(rlimit::Resource::NOFILE) {
        Ok((soft, _hard)) => ((soft / 2).min(16_384)) as usize,
        Err(err) => {
            warn!(error = %err, "failed to query fd rlimit, using a conservative default");
            1024
        }
    }
}
