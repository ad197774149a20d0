use crate::identity;
use crate::RangeArgs;
use anyhow::{bail, Context, Result};
use dialoguer::Input;
use std::process::ExitCode;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use wosync_core::{AppConfig, ItemKind};
use wosync_db::ResultStore;
use wosync_scraper::worker::{execute as execute_worker, WorkerOutcome, WorkerSpec, WorkerTemplate};
use wosync_scraper::{
    ChromeSessionFactory, Primary, ProcessLauncher, ProfileManager, RangeReport, RangeRequest,
    RangeScraper, WorkerSupervisor,
};

/// Cancel `token` on Ctrl-C. The handler stays installed so a second Ctrl-C
/// does not kill the process while workers wind down.
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if token.is_cancelled() {
                warn!("Already stopping, waiting for sessions to close");
            } else {
                warn!("Interrupt received, finishing the current item and stopping");
                token.cancel();
            }
        }
    });
}

/// Process count from the flag, the config, or a one-time prompt that is
/// saved back to the config file.
fn resolve_process_count(flag: Option<u32>, configured: u32) -> Result<u32> {
    if let Some(count) = flag {
        return Ok(count);
    }
    if configured >= 1 {
        return Ok(configured);
    }

    let count: u32 = Input::new()
        .with_prompt("How many processes should run in parallel?")
        .default(1)
        .validate_with(|n: &u32| if *n >= 1 { Ok(()) } else { Err("must be at least 1") })
        .interact_text()
        .context("reading process count")?;

    // Reload without env overrides so they are not written to disk.
    let mut stored = AppConfig::load().context("loading configuration")?;
    stored.scraper.process_count = count;
    stored.save().context("saving process count")?;
    info!("Saved process count {} to configuration", count);
    Ok(count)
}

pub async fn scrape(kind: ItemKind, range: RangeArgs, prefix: Option<String>) -> Result<()> {
    let config = AppConfig::load_with_env().context("loading configuration")?;
    let process_count = resolve_process_count(range.processes, config.scraper.process_count)?;
    let headless = range
        .headless_override()
        .unwrap_or(config.scraper.headless_parallel);

    let request = match kind {
        ItemKind::Request => RangeRequest::requests(range.start, range.stop),
        ItemKind::Order => RangeRequest::orders(
            prefix.unwrap_or_else(|| config.scraper.order_prefix.clone()),
            range.start,
            range.stop,
        ),
    };

    let identity = identity::resolve(range.username.as_deref(), &config.general)?;

    let profiles_root = config.profiles_dir().context("resolving profiles directory")?;
    let mut browser = config.browser.clone();
    browser.profiles_dir = Some(profiles_root.clone());

    let mut database = config.database.clone();
    if database.prompt_password && database.password.is_none() {
        database.password = Some(identity::database_password()?);
    }

    let store = ResultStore::connect(&database)
        .await
        .context("connecting to the result database")?;

    let factory = ChromeSessionFactory::new(
        ProfileManager::new(&profiles_root),
        identity.clone(),
        browser.clone(),
        &config.portal,
    );
    let primary = match Primary::open(factory, config.scraper.headless_primary).await {
        Ok(primary) => primary,
        Err(e) => {
            store.close().await;
            return Err(e).context("opening the primary session");
        }
    };

    let supervisor = WorkerSupervisor::new(
        ProfileManager::new(&profiles_root),
        ProcessLauncher::current_exe()?,
    );
    let template = WorkerTemplate {
        identity,
        headless,
        browser,
        portal: config.portal.clone(),
        database,
    };

    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let mut scraper =
        RangeScraper::new(primary, store, supervisor, template).with_cancellation(cancel);
    let outcome = scraper.scrape_range(&request, process_count, headless).await;

    let (store, closed) = scraper.shutdown().await;
    store.close().await;
    if let Err(e) = closed {
        warn!("Primary session did not close cleanly: {}", e);
    }

    let report = outcome?;
    print_summary(&report);
    if !report.is_complete() {
        bail!(
            "range incomplete: {} of {} items scraped",
            report.attempted(),
            report.requested
        );
    }
    Ok(())
}

fn print_summary(report: &RangeReport) {
    println!(
        "{}: {} of {} items scraped",
        report.kind,
        report.attempted(),
        report.requested
    );
    for worker in &report.workers {
        let status = match &worker.outcome {
            WorkerOutcome::Completed(r) => format!(
                "completed ({} found, {} placeholders, {} write failures)",
                r.found, r.placeholders, r.write_failures
            ),
            WorkerOutcome::Interrupted(r) => format!("interrupted after {} items", r.attempted),
            WorkerOutcome::AuthenticationFailed(reason) => {
                format!("authentication failed: {reason}")
            }
            WorkerOutcome::Failed(reason) => format!("failed: {reason}"),
        };
        println!(
            "  worker {} ({} items): {}",
            worker.worker_index, worker.assigned, status
        );
    }
}

/// Hidden worker entry. Reads a `WorkerSpec` from stdin and prints the
/// outcome as one JSON line.
pub async fn worker() -> ExitCode {
    let outcome = match read_spec().await {
        Ok(spec) => {
            let cancel = CancellationToken::new();
            cancel_on_interrupt(cancel.clone());
            execute_worker(spec, cancel).await
        }
        Err(e) => WorkerOutcome::Failed(format!("{e:#}")),
    };

    match serde_json::to_string(&outcome) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("Could not report worker outcome: {}", e),
    }
    // Exit codes are small non-negative constants.
    ExitCode::from(u8::try_from(outcome.exit_code()).unwrap_or(1))
}

async fn read_spec() -> Result<WorkerSpec> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("reading worker spec")?;
    serde_json::from_str(&input).context("parsing worker spec")
}

pub fn config_path() -> Result<()> {
    println!("{}", AppConfig::config_path()?.display());
    Ok(())
}

pub fn config_show() -> Result<()> {
    let mut config = AppConfig::load_with_env()?;
    if config.database.password.is_some() {
        config.database.password = Some("<redacted>".to_string());
    }
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
