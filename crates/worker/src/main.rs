use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crackhash_core::protocol::{RESULT_QUEUE, TASK_QUEUE};
use crackhash_core::queue::JsonQueue;
use crackhash_db::PgQueue;
use crackhash_worker::config::{TaskSource, WorkerConfig};
use crackhash_worker::executor::TaskExecutor;
use crackhash_worker::router::build_worker_router;
use crackhash_worker::runner::{run_local, QueueRunner};
use crackhash_worker::sink::{HttpResultSink, QueueResultSink, ResultSink};
use crackhash_worker::state::WorkerState;

/// How long each runner gets to stop after shutdown is requested.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crackhash_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().expect("Invalid worker configuration");
    tracing::info!(
        host = %config.host,
        port = config.port,
        mode = ?config.source,
        algorithm = %config.hash_algorithm,
        "Loaded worker configuration",
    );

    let executor = Arc::new(TaskExecutor::new(config.hash_algorithm));
    let cancel = CancellationToken::new();
    let mut runners: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    // --- Result sink and queue runner ---
    let sink: Arc<dyn ResultSink> = match config.source {
        TaskSource::Direct => {
            let manager_url = config
                .manager_url
                .as_deref()
                .expect("MANAGER_URL must be set in direct mode");
            Arc::new(
                HttpResultSink::new(manager_url, config.retry)
                    .expect("Failed to build HTTP client"),
            )
        }
        TaskSource::Queue => {
            let database_url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL must be set in queue mode");
            let db = crackhash_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            crackhash_db::health_check(&db)
                .await
                .expect("Database health check failed");
            crackhash_db::run_migrations(&db)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database ready");

            let sink: Arc<dyn ResultSink> = Arc::new(QueueResultSink::new(Arc::new(
                PgQueue::with_visibility_timeout(db.clone(), RESULT_QUEUE, config.queue_visibility),
            )));
            let tasks = JsonQueue::new(Arc::new(PgQueue::with_visibility_timeout(
                db,
                TASK_QUEUE,
                config.queue_visibility,
            )));

            let runner = QueueRunner::new(
                Arc::clone(&executor),
                tasks,
                Arc::clone(&sink),
                config.poll_interval,
            )
            .with_lease_renewal(config.queue_visibility / 3);
            let token = cancel.clone();
            runners.push((
                "queue runner",
                tokio::spawn(async move { runner.run(token).await }),
            ));
            sink
        }
    };

    // --- Local backlog runner ---
    let (tx, rx) = mpsc::channel(config.task_backlog);
    runners.push((
        "local runner",
        tokio::spawn(run_local(
            Arc::clone(&executor),
            rx,
            Arc::clone(&sink),
            cancel.clone(),
        )),
    ));

    let state = WorkerState {
        executor,
        tasks: tx,
    };
    let app = build_worker_router(state, Duration::from_secs(config.request_timeout_secs));

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting worker");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Worker stopped accepting connections, cleaning up");
    cancel.cancel();
    for (name, handle) in runners {
        if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, handle).await.is_err() {
            tracing::warn!(task = name, "Runner did not stop in time");
        }
    }
    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
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
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
