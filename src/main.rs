//! NotifyHub Server — event-sourced notification backend
//!
//! Main entry point that wires all crates together and starts the consumer
//! and scheduler loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use notifyhub_core::config::AppConfig;
use notifyhub_core::error::AppError;
use notifyhub_core::health::{Health, Subsystem};
use notifyhub_eventlog::{Consumer, EventProcessor, InMemoryEventLog};
use notifyhub_projection::{CaseStore, NotificationStore};
use notifyhub_scheduler::{
    ExpiryService, PurgeService, ReminderService, ReplayValidator, run_timer,
};

/// Source application stamped on every event this process emits.
const SOURCE_APP: &str = "notifyhub-server";

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("NOTIFYHUB_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting NotifyHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Health registry ──────────────────────────────────
    let health = Arc::new(Health::new(config.log.partitions));

    // ── Step 2: Event log ────────────────────────────────────────
    tracing::info!(
        "Creating event log with {} partition(s)...",
        config.log.partitions
    );
    let log = Arc::new(InMemoryEventLog::new(config.log.partitions));
    health.set_ready(Subsystem::EventLog);

    // ── Step 3: Projection stores ────────────────────────────────
    let notification_store = Arc::new(NotificationStore::new());
    let case_store = Arc::new(CaseStore::new());

    // ── Step 4: Scheduler services ───────────────────────────────
    tracing::info!("Initializing scheduler services...");
    let reminder_service = Arc::new(ReminderService::new(
        log.clone(),
        health.clone(),
        SOURCE_APP,
    ));
    let expiry_service = Arc::new(ExpiryService::new(log.clone(), health.clone(), SOURCE_APP));
    let purge_service = Arc::new(PurgeService::new(
        log.clone(),
        health.clone(),
        SOURCE_APP,
        Duration::from_secs(config.scheduler.purge_grace_secs),
    ));
    let replay_validator = Arc::new(ReplayValidator::new(
        log.clone(),
        health.clone(),
        config.consumer.batch_size,
    ));

    // ── Step 5: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    // ── Step 6: Consumer loops ───────────────────────────────────
    tracing::info!("Starting consumer loops...");
    let consumers: Vec<(&str, Arc<dyn EventProcessor>, Subsystem)> = vec![
        (
            "notification-view",
            notification_store.clone(),
            Subsystem::NotificationView,
        ),
        ("case-view", case_store.clone(), Subsystem::CaseView),
        (
            "reminder-scheduler",
            reminder_service.clone(),
            Subsystem::ReminderService,
        ),
        (
            "expiry-scheduler",
            expiry_service.clone(),
            Subsystem::ExpiryService,
        ),
        (
            "purge-scheduler",
            purge_service.clone(),
            Subsystem::PurgeService,
        ),
    ];
    for (group, processor, subsystem) in consumers {
        let consumer = Consumer::new(
            log.clone(),
            group,
            processor,
            config.consumer.clone(),
            health.clone(),
            subsystem,
        );
        let cancel = shutdown_rx.clone();
        handles.push(tokio::spawn(async move { consumer.run(cancel).await }));
    }

    // ── Step 7: Initial replay validation ────────────────────────
    // Readiness of the validator subsystem rides on this first run, so
    // an empty log still flips it ready at startup.
    if let Err(e) = replay_validator.validate() {
        tracing::error!("Initial replay validation failed: {}", e);
    }

    // ── Step 8: Timer loops ──────────────────────────────────────
    tracing::info!("Starting scheduler timers...");
    {
        let service = reminder_service.clone();
        let cancel = shutdown_rx.clone();
        let interval = Duration::from_secs(config.scheduler.reminder_interval_secs);
        handles.push(tokio::spawn(async move {
            run_timer("reminder", interval, cancel, move || {
                let service = service.clone();
                async move { service.tick(chrono::Utc::now()).await }
            })
            .await;
        }));
    }
    {
        let service = expiry_service.clone();
        let cancel = shutdown_rx.clone();
        let interval = Duration::from_secs(config.scheduler.expiry_interval_secs);
        handles.push(tokio::spawn(async move {
            run_timer("expiry", interval, cancel, move || {
                let service = service.clone();
                async move { service.tick(chrono::Utc::now()).await }
            })
            .await;
        }));
    }
    {
        let service = purge_service.clone();
        let cancel = shutdown_rx.clone();
        let interval = Duration::from_secs(config.scheduler.purge_interval_secs);
        handles.push(tokio::spawn(async move {
            run_timer("purge", interval, cancel, move || {
                let service = service.clone();
                async move { service.tick(chrono::Utc::now()).await }
            })
            .await;
        }));
    }
    {
        let validator = replay_validator.clone();
        let cancel = shutdown_rx.clone();
        let interval = Duration::from_secs(config.scheduler.replay_interval_secs);
        handles.push(tokio::spawn(async move {
            run_timer("replay-validator", interval, cancel, move || {
                let validator = validator.clone();
                async move { validator.validate() }
            })
            .await;
        }));
    }

    // ── Step 9: Graceful shutdown ────────────────────────────────
    tracing::info!("NotifyHub running; press Ctrl+C to stop");
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping all loops...");
    let _ = shutdown_tx.send(true);

    for handle in handles {
        let _ = tokio::time::timeout(Duration::from_secs(10), handle).await;
    }

    tracing::info!("NotifyHub shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
