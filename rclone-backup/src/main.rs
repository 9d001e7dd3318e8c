//! rclone-backup - Main entry point
//!
//! Runs one backup pass and exits: 0 when every configured backup type
//! succeeded, 1 otherwise.

use anyhow::Result;
use clap::Parser;
use rand::Rng;
use rclone_backup::config::{self, Settings, SiteConfig};
use rclone_backup::executor::{BackupExecutor, RunContext};
use rclone_backup::report::auth::{ServiceAccountAuth, ServiceAccountKey};
use rclone_backup::report::SheetsClient;
use rclone_backup::transport::Rclone;
use rclone_backup::update::{SelfUpdater, UpdateOutcome};
use rclone_backup::utils::{log_rotation, logger, run_lock};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn, Instrument};

const API_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the site configuration file (JSON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the agent settings file (TOML)
    #[arg(short, long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Start immediately instead of after the randomised delay
    #[arg(long)]
    no_delay: bool,

    /// Do not check for a newer agent binary
    #[arg(long)]
    skip_update: bool,

    /// Print the effective settings as TOML and exit
    #[arg(long)]
    print_settings: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut settings = Settings::load(args.settings.as_deref())?;
    if let Some(level) = args.log_level.clone() {
        settings.log_level = level;
    }

    if args.print_settings {
        print!("{}", toml::to_string_pretty(&settings)?);
        return Ok(ExitCode::SUCCESS);
    }

    // One agent per log file: held until exit (or exec)
    let mut lock = run_lock::open(&settings.log_file)?;
    let _guard = match lock.try_write() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!(
                "Another rclone-backup run holds {}: {}",
                run_lock::lock_path(&settings.log_file).display(),
                e
            );
            return Ok(ExitCode::FAILURE);
        }
    };

    log_rotation::rotate(&settings.log_file, settings.max_log_archives)?;
    logger::init(&settings.log_level, &settings.log_file)?;

    info!(
        "Version: {} (host: {})",
        env!("CARGO_PKG_VERSION"),
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string())
    );

    if !args.no_delay && settings.startup_delay_secs > 0 {
        let secs = rand::thread_rng().gen_range(0.0..=settings.startup_delay_secs as f64);
        info!("Sleeping for {:.2} seconds...", secs);
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }

    if !args.skip_update {
        if let Some(code) = self_update(&settings).await {
            return Ok(code);
        }
    }

    let config_path = args
        .config
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_SITE_CONFIG_PATH));
    let site = match SiteConfig::from_file(&config_path)
        .and_then(|site| settings.validate_for(&site).map(|()| site))
    {
        Ok(site) => site,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let key = match ServiceAccountKey::from_file(&settings.credentials_file) {
        Ok(key) => key,
        Err(e) => {
            error!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let http = SheetsClient::http_client(API_TIMEOUT)?;
    let sheets = SheetsClient::new(http.clone(), ServiceAccountAuth::new(key, http));
    let transport = Rclone::new(
        settings.remote_name.clone(),
        settings.log_file.clone(),
        Duration::from_secs(settings.transfer_timeout_secs),
    );

    let ctx = RunContext::new(settings, site);
    let span = info_span!("run", run_id = %ctx.run_id);
    let executor = BackupExecutor::new(ctx, transport, sheets);

    match executor.run_once().instrument(span).await {
        Ok(summary) => Ok(ExitCode::from(summary.exit_code() as u8)),
        Err(e) => {
            error!("Backup run aborted: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Returns an exit code when the process should stop here (restart handed
/// to the service manager).
async fn self_update(settings: &Settings) -> Option<ExitCode> {
    let updater = match SelfUpdater::for_current_exe(settings.update.clone()) {
        Ok(updater) => updater,
        Err(e) => {
            warn!("Self-update unavailable: {}", e);
            return None;
        }
    };

    match updater.maybe_update().await {
        Ok(UpdateOutcome::Updated) => match updater.restart() {
            Ok(()) => Some(ExitCode::SUCCESS),
            Err(e) => {
                error!("{}", e);
                None
            }
        },
        Ok(UpdateOutcome::Disabled) => {
            debug!("Self-update disabled (no update url)");
            None
        }
        Ok(outcome) => {
            debug!("Self-update check: {:?}", outcome);
            None
        }
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}
