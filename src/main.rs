//! draftcache CLI - headless driver for the sync core.
//!
//! Useful for seeding the offline store, forcing refreshes, and watching
//! sync activity without a UI attached.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use draftcache::api::HttpTransport;
use draftcache::auth::{KeyringTokens, TokenProvider};
use draftcache::config::SyncConfig;
use draftcache::models::EntityKind;
use draftcache::store::OfflineStore;
use draftcache::sync::SyncCoordinator;

/// Initialize the tracing subscriber for logging.
///
/// Console output is filtered by RUST_LOG (default warn); everything at
/// debug and above also lands in a daily-rolled file under the cache dir.
/// The returned guard must live until exit or buffered lines are lost.
fn init_tracing(config: &SyncConfig) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let log_dir = config.cache_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir).context("Failed to create log directory")?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "draftcache.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_filter(filter))
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("debug")),
        )
        .init();
    Ok(guard)
}

fn print_usage() {
    println!("Usage: draftcache [COMMAND]");
    println!();
    println!("Commands:");
    println!("  --refresh         Force-refresh every collection (default)");
    println!("  --status          Show per-collection cache state");
    println!("  --watch           Run the sync loops and print change events");
    println!("  --clear-cache     Drop all cached data and validators");
    println!("  --set-token TOK   Store the API bearer token in the keychain");
    println!("  --clear-token     Remove the stored token");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("--refresh");

    // Token commands touch only the keychain; no sync core needed.
    match command {
        "--help" | "-h" => {
            print_usage();
            return Ok(());
        }
        "--set-token" => {
            let token = args.get(2).context("--set-token requires a token value")?;
            KeyringTokens::store_token(token)?;
            println!("Token stored");
            return Ok(());
        }
        "--clear-token" => {
            KeyringTokens::clear_token()?;
            println!("Token cleared");
            return Ok(());
        }
        _ => {}
    }

    let mut config = SyncConfig::load()?;
    if let Ok(url) = std::env::var("DRAFTCACHE_API_URL") {
        config.api_base_url = url;
    }

    let _log_guard = init_tracing(&config)?;
    info!(api = %config.api_base_url, "draftcache starting");

    let tokens: Arc<dyn TokenProvider> = Arc::new(KeyringTokens);
    let transport = HttpTransport::new(config.api_base_url.clone(), tokens)?;
    let store = Arc::new(OfflineStore::open(&config)?);
    let coordinator = Arc::new(SyncCoordinator::new(
        Arc::new(transport),
        Arc::clone(&store),
        config,
    ));

    match command {
        "--status" => status(&coordinator, &store).await,
        "--clear-cache" => {
            coordinator.clear_cache().await?;
            println!("Cache cleared");
            Ok(())
        }
        "--watch" => watch(&coordinator).await,
        "--refresh" => refresh_all(&coordinator).await,
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(2);
        }
    }
}

/// Force-refresh every collection concurrently. Per-key single-flight
/// makes this safe even if a watcher is running elsewhere.
async fn refresh_all(coordinator: &Arc<SyncCoordinator<HttpTransport>>) -> Result<()> {
    let results = futures::future::join_all(
        EntityKind::ALL.map(|kind| async move { (kind, coordinator.refresh(kind, true).await) }),
    )
    .await;

    let mut failures = 0;
    for (kind, result) in results {
        match result {
            Ok(outcome) if outcome.updated => {
                println!("{}: {} records", kind, outcome.records)
            }
            Ok(outcome) => println!("{}: unchanged ({} records)", kind, outcome.records),
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", kind, e);
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{} collection(s) failed to refresh", failures);
    }
    Ok(())
}

async fn status(
    coordinator: &Arc<SyncCoordinator<HttpTransport>>,
    store: &Arc<OfflineStore>,
) -> Result<()> {
    for kind in EntityKind::ALL {
        let count = store.count(kind)?;
        let fresh = store.is_fresh(kind)?;
        let updated = store.last_updated(kind)?;
        println!(
            "{:<14} {:>5} records  {:<8} updated {}",
            kind.to_string(),
            count,
            if fresh { "fresh" } else { "stale" },
            fmt_age(updated),
        );
    }
    println!(
        "footprint: {} KiB, state: {}",
        store.footprint_bytes()? / 1024,
        coordinator.key_state(EntityKind::Players).await.as_str(),
    );
    Ok(())
}

/// Run the background loops until Ctrl-C, printing change events.
async fn watch(coordinator: &Arc<SyncCoordinator<HttpTransport>>) -> Result<()> {
    let tasks = coordinator.start_background_tasks();
    let mut changes = coordinator.observe();

    println!("Watching for changes (Ctrl-C to stop)");
    loop {
        tokio::select! {
            event = changes.recv() => match event {
                Ok(event) => {
                    println!("{} {}: {} records", event.at.format("%H:%M:%S"), event.kind, event.records)
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    eprintln!("missed {} events", n)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    info!("Shutting down");
    coordinator.shutdown();
    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

fn fmt_age(at: Option<DateTime<Utc>>) -> String {
    match at {
        None => "never".to_string(),
        Some(at) => {
            let minutes = (Utc::now() - at).num_minutes();
            if minutes < 1 {
                "just now".to_string()
            } else if minutes < 60 {
                format!("{}m ago", minutes)
            } else {
                format!("{}h ago", minutes / 60)
            }
        }
    }
}
