use std::sync::Arc;

use clap::Parser;
use barangay_core::clock::SystemClock;
use barangay_core::geo::{GeoTree, HierarchyResolver};
use barangay_core::model::UnitCode;
use barangay_server::cli::{Cli, Command};
use barangay_server::config::{AppConfig, LogFormat, StorageBackend};
use barangay_server::coordinator::MutationCoordinator;
use barangay_server::metrics::Metrics;
use barangay_server::reconcile::reconcile_unit;
use barangay_server::reference::{level_counts, load_geography};
use barangay_server::rest;
use barangay_storage::{InMemoryStore, PostgresStore, RegistryStore};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level));

    let registry = tracing_subscriber::registry().with(filter);

    match config.log.format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer().json();
            registry.with(fmt_layer).init();
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer().pretty();
            registry.with(fmt_layer).init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;
    init_logging(&config);

    match cli.command {
        Some(Command::Migrate) => run_migrate(&config).await,
        Some(Command::CheckGeography { file }) => run_check_geography(&file),
        Some(Command::Reconcile { unit_code }) => run_reconcile(&config, &unit_code).await,
        Some(Command::Serve) | None => run_serve(config).await,
    }
}

async fn connect_postgres(config: &AppConfig) -> Result<PostgresStore, Box<dyn std::error::Error>> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    Ok(PostgresStore::new(pool))
}

async fn run_migrate(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("running database migrations");
    let store = connect_postgres(config).await?;
    store.migrate().await?;
    tracing::info!("migrations completed successfully");
    Ok(())
}

fn run_check_geography(file: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let tree = load_geography(file)?;

    println!("Geography reference data is valid");
    println!("  Version: {}", tree.version());
    for (level, count) in level_counts(&tree) {
        println!("  {level}: {count}");
    }
    Ok(())
}

async fn run_reconcile(
    config: &AppConfig,
    unit_code: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.storage.backend != StorageBackend::Postgres {
        return Err("reconcile needs the postgres storage backend".into());
    }
    let store = connect_postgres(config).await?;
    let report = reconcile_unit(&store, &UnitCode::from(unit_code), &config.derivation).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_consistent() {
        std::process::exit(2);
    }
    Ok(())
}

fn load_resolver(config: &AppConfig) -> Result<HierarchyResolver, Box<dyn std::error::Error>> {
    match &config.reference_data.geography_path {
        Some(path) => {
            let tree = load_geography(path)?;
            tracing::info!(
                path = %path.display(),
                version = tree.version(),
                units = tree.len(),
                "geography reference data loaded"
            );
            Ok(HierarchyResolver::new(tree))
        }
        None => {
            tracing::warn!("no geography reference data configured, every placement will be rejected");
            Ok(HierarchyResolver::new(GeoTree::default()))
        }
    }
}

async fn run_serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        http_addr = %config.http_addr(),
        backend = ?config.storage.backend,
        "starting barangay registry server"
    );

    let resolver = Arc::new(load_resolver(&config)?);
    match config.storage.backend {
        StorageBackend::Memory => serve(config, Arc::new(InMemoryStore::new()), resolver).await,
        StorageBackend::Postgres => {
            let store = connect_postgres(&config).await?;
            store.migrate().await?;
            serve(config, Arc::new(store), resolver).await
        }
    }
}

async fn serve<S: RegistryStore + 'static>(
    config: AppConfig,
    store: Arc<S>,
    resolver: Arc<HierarchyResolver>,
) -> Result<(), Box<dyn std::error::Error>> {
    let metrics = Arc::new(Metrics::new());
    let clock = Arc::new(SystemClock::with_offset_minutes(
        config.clock.utc_offset_minutes,
    ));
    let coordinator = Arc::new(MutationCoordinator::new(
        store,
        resolver,
        config.access_policy(),
        config.derivation.clone(),
        clock,
        Arc::clone(&metrics),
    ));

    let router = rest::create_router(rest::AppState {
        coordinator,
        metrics,
    });

    let addr: std::net::SocketAddr = config.http_addr().parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => { tracing::info!("received SIGINT"); }
                _ = sigterm.recv() => { tracing::info!("received SIGTERM"); }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGTERM handler, using SIGINT only");
            let _ = ctrl_c.await;
            tracing::info!("received SIGINT");
        }
    }
}
