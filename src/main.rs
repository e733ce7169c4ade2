use anyhow::Result;
use clap::Parser;
use statsync::cli::{Cli, Command};
use statsync::config::{AppConfig, ProjectRegistry};
use statsync::manifest::{GithubClient, ManifestRepo, ManifestService};
use statsync::stats_repo::{StatsRepo, generators};
use statsync::sync::{SyncOrchestrator, SyncSettings};
use statsync::*;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate(args) => {
            args.execute()?;
            Ok(())
        }
        Command::Sync { project } => {
            let app_config = load_config(cli.config.as_deref())?;
            run_sync(app_config, project).await
        }
        Command::Serve => {
            let app_config = load_config(cli.config.as_deref())?;
            serve(app_config).await
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from_path(path),
        None => AppConfig::load(),
    }
}

type Orchestrator = SyncOrchestrator<StatsRepo, StatsRepo, ProjectRegistry>;

struct Services {
    stats_repo: Arc<StatsRepo>,
    manifest_repo: Arc<ManifestRepo>,
    projects: Arc<ProjectRegistry>,
    orchestrator: Arc<Orchestrator>,
}

async fn build_services(app_config: &AppConfig) -> Result<Services> {
    let pool = db::connect(&app_config.database.path, app_config.database.max_pool_size).await?;
    let stats_repo = Arc::new(StatsRepo::new(pool.clone()));
    stats_repo.init().await?;
    let manifest_repo = Arc::new(ManifestRepo::new(pool));
    manifest_repo.init().await?;

    let projects = Arc::new(ProjectRegistry::new(app_config.projects.clone()));
    let orchestrator = Arc::new(SyncOrchestrator::new(
        stats_repo.clone(),
        stats_repo.clone(),
        projects.clone(),
        generators::reference_generators(stats_repo.clone()),
        SyncSettings::from(&app_config.sync),
    ));
    Ok(Services {
        stats_repo,
        manifest_repo,
        projects,
        orchestrator,
    })
}

/// One pass over the selected projects; Ctrl-C cancels between generator calls.
async fn run_sync(app_config: AppConfig, project: Option<String>) -> Result<()> {
    let services = build_services(&app_config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received interrupt; cancelling sync");
            let _ = shutdown_tx.send(true);
        }
    });

    let project_ids = project
        .map(|p| vec![p])
        .unwrap_or_else(|| app_config.project_ids());
    let results =
        sync_worker::run_one_tick(&services.orchestrator, &project_ids, &shutdown_rx).await;
    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    for (project_id, result) in &results {
        match result {
            Ok(report) => println!("{}", serde_json::to_string(report)?),
            Err(e) => eprintln!("{}: {}", project_id, e),
        }
    }
    anyhow::ensure!(
        failed == 0,
        "{} of {} project syncs failed",
        failed,
        project_ids.len()
    );
    Ok(())
}

async fn serve(app_config: AppConfig) -> Result<()> {
    let services = build_services(&app_config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker_handle = sync_worker::spawn(
        services.orchestrator,
        sync_worker::SyncWorkerConfig {
            interval_secs: app_config.sync.interval_secs,
            schedule: app_config.sync.schedule.clone(),
            projects: app_config.project_ids(),
        },
        shutdown_rx,
    );

    let upstream = Arc::new(GithubClient::new(&app_config.upstream)?);
    let manifests = Arc::new(ManifestService::new(
        services.manifest_repo,
        services.projects,
        upstream,
    ));
    let app = routes::app(manifests, services.stats_repo);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            let _ = worker_handle.await;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
