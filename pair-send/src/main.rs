//! pair-send - Scheduled image-pair publishing daemon
//!
//! Posts one content folder per user at each configured time of day.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use libpairpost::content::FilesystemContent;
use libpairpost::logging::{LogFormat, LoggingConfig};
use libpairpost::{
    ApiConnector, CloudinaryStore, Config, Coordinator, HttpConnector, Pacing, PairpostError,
    ReadinessDelays, Result, RunSummary, ScheduleStore, Scheduler, UserStore,
};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "pair-send")]
#[command(version)]
#[command(about = "Publish scheduled image-pair posts for every configured user")]
#[command(long_about = "\
pair-send - Scheduled image-pair publishing daemon

DESCRIPTION:
    pair-send loads the configured users, then at every scheduled time of
    day walks through them one by one: it picks a content folder, uploads
    its images, publishes a post or carousel, and adds the user's reply
    when a reply folder exists. Users are spaced out by a random pause.

USAGE:
    # Run the daily scheduler in the foreground
    pair-send

    # Post for every user once and exit
    pair-send --once

    # JSON logs for a log collector
    pair-send --log-format json

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (a run in progress completes first)

CONFIGURATION:
    Configuration file: ~/.config/pairpost/config.toml
    Users file:         ~/.config/pairpost/users.json
    Schedule file:      ~/.config/pairpost/schedule.json

    CLOUDINARY_CLOUD_NAME, CLOUDINARY_API_KEY and CLOUDINARY_API_SECRET
    override the [media] section. A .env file in the working directory
    is loaded first.

EXIT CODES:
    0 - Clean shutdown, or every user posted with --once
    1 - Runtime error, or at least one user failed with --once
    2 - Configuration error
")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH", env = "PAIRPOST_CONFIG")]
    config: Option<PathBuf>,

    /// Post for every user once, print the results as JSON and exit
    #[arg(long)]
    once: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    LoggingConfig::from_env(cli.verbose)
        .with_format(cli.log_format)
        .init();

    match run(cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::error!(error = %e, "pair-send failed");
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// Returns whether every attempted post succeeded
async fn run(cli: Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let content = Arc::new(FilesystemContent::new(
        config.content_root(),
        config.replies_root(),
    ));

    let user_store = UserStore::open(config.users_file())?;
    let users = user_store.users(content.as_ref());
    info!(
        users = users.len(),
        with_replies = users.iter().filter(|u| u.has_reply_capability).count(),
        "loaded users"
    );
    if users.is_empty() {
        warn!(path = %user_store.path().display(), "no users configured");
    }

    refresh_content_index(&config, &content, &user_store);

    let media = Arc::new(CloudinaryStore::from_config(
        &config.media,
        config.threads.timeout,
    )?);
    let connector: Arc<dyn ApiConnector> = Arc::new(HttpConnector::new(
        config.threads.base_url.clone(),
        config.threads.timeout,
    )?);
    let coordinator = Coordinator::new(
        connector,
        media,
        content.clone(),
        ReadinessDelays::from(&config.timing),
        Pacing::try_from(&config.timing)?,
    );

    if cli.once {
        let results = coordinator.run(&users).await;
        let summary = RunSummary::from_results(&results);
        info!(%summary, "single run finished");

        let json = serde_json::to_string_pretty(&results)
            .map_err(|e| PairpostError::Runtime(format!("cannot render results: {}", e)))?;
        println!("{}", json);
        return Ok(summary.failed == 0);
    }

    let store = ScheduleStore::open(config.schedule_file())?;
    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    info!("pair-send daemon starting");
    let mut scheduler = Scheduler::new(
        store,
        coordinator,
        user_store,
        content,
        config.timing.poll_interval,
    );
    scheduler.run(shutdown).await;
    info!("pair-send daemon stopped");

    Ok(true)
}

/// Rewrite the content index; failures only cost the index
fn refresh_content_index(config: &Config, content: &FilesystemContent, users: &UserStore) {
    let path = config.content_index_file();
    let result = content
        .build_index(users.usernames())
        .and_then(|index| index.save(&path));

    match result {
        Ok(()) => info!(path = %path.display(), "content index refreshed"),
        Err(e) => warn!(path = %path.display(), error = %e, "could not refresh content index"),
    }
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::sync::atomic::Ordering;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| PairpostError::Runtime(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("received shutdown signal, stopping after the current tick");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}
