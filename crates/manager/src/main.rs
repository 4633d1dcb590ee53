use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crackhash_core::protocol::{IntakeMessage, INTAKE_QUEUE, RESULT_QUEUE, TASK_QUEUE};
use crackhash_core::queue::{JsonQueue, MessageQueue};
use crackhash_core::store::{MemoryRequestStore, RequestStore};
use crackhash_db::{PgQueue, PgRequestStore};
use crackhash_manager::background::health_monitor::HealthMonitor;
use crackhash_manager::background::result_consumer::ResultConsumer;
use crackhash_manager::background::timeout_sweep;
use crackhash_manager::client::{HttpWorkerClient, WorkerApi, DEFAULT_CALL_TIMEOUT};
use crackhash_manager::config::{CrackConfig, DeliveryMode, ServerConfig};
use crackhash_manager::delivery::TaskDelivery;
use crackhash_manager::engine::dispatcher::Dispatcher;
use crackhash_manager::pool::WorkerPool;
use crackhash_manager::router::build_app_router;
use crackhash_manager::state::AppState;
use crackhash_queue::MemoryQueue;

/// How long each background task gets to stop after shutdown is requested.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crackhash_manager=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let server_config = ServerConfig::from_env().expect("Invalid server configuration");
    let config = CrackConfig::from_env().expect("Invalid crack configuration");
    tracing::info!(
        host = %server_config.host,
        port = server_config.port,
        workers = config.worker_urls.len(),
        mode = ?config.delivery_mode,
        algorithm = %config.hash_algorithm,
        "Loaded manager configuration",
    );

    let pool = Arc::new(WorkerPool::new(config.worker_urls.clone()));
    let workers: Arc<dyn WorkerApi> = Arc::new(
        HttpWorkerClient::new(DEFAULT_CALL_TIMEOUT).expect("Failed to build HTTP client"),
    );

    // --- Store and channels ---
    let (store, intake, delivery, results): (
        Arc<dyn RequestStore>,
        JsonQueue<IntakeMessage>,
        TaskDelivery,
        Option<Arc<dyn MessageQueue>>,
    ) = match config.delivery_mode {
        DeliveryMode::Direct => {
            let store: Arc<dyn RequestStore> =
                Arc::new(MemoryRequestStore::new(config.store_max_requests));
            let intake = MemoryQueue::with_visibility_timeout(INTAKE_QUEUE, config.queue_visibility);
            (
                store,
                JsonQueue::new(Arc::new(intake)),
                TaskDelivery::Direct {
                    pool: Arc::clone(&pool),
                    workers: Arc::clone(&workers),
                    retry: config.retry,
                },
                None,
            )
        }
        DeliveryMode::Queue => {
            let database_url = config
                .database_url
                .as_deref()
                .expect("DATABASE_URL must be set in queue mode");

            let db = crackhash_db::create_pool(database_url)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            crackhash_db::health_check(&db)
                .await
                .expect("Database health check failed");
            crackhash_db::run_migrations(&db)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            let queue = |name: &str| {
                PgQueue::with_visibility_timeout(db.clone(), name, config.queue_visibility)
            };
            let store: Arc<dyn RequestStore> = Arc::new(PgRequestStore::new(db.clone()));
            let results: Arc<dyn MessageQueue> = Arc::new(queue(RESULT_QUEUE));
            (
                store,
                JsonQueue::new(Arc::new(queue(INTAKE_QUEUE))),
                TaskDelivery::Queue {
                    tasks: JsonQueue::new(Arc::new(queue(TASK_QUEUE))),
                },
                Some(results),
            )
        }
    };
    let delivery = Arc::new(delivery);

    // --- Background tasks ---
    let cancel = CancellationToken::new();
    let mut background: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    let dispatcher = Dispatcher::new(Arc::clone(&store), intake.clone(), Arc::clone(&delivery))
        .with_poll_interval(config.poll_interval);
    let token = cancel.clone();
    background.push((
        "dispatcher",
        tokio::spawn(async move { dispatcher.run(token).await }),
    ));

    let monitor = HealthMonitor::new(
        Arc::clone(&workers),
        Arc::clone(&pool),
        Arc::clone(&delivery),
        Arc::clone(&store),
        config.retry,
        config.healthcheck_interval,
    );
    let token = cancel.clone();
    background.push((
        "health monitor",
        tokio::spawn(async move { monitor.run(token).await }),
    ));

    background.push((
        "timeout sweep",
        tokio::spawn(timeout_sweep::run(
            Arc::clone(&store),
            config.healthcheck_interval,
            cancel.clone(),
        )),
    ));

    if let Some(results) = results {
        let consumer = ResultConsumer::new(Arc::clone(&store), results, config.poll_interval);
        let token = cancel.clone();
        background.push((
            "result consumer",
            tokio::spawn(async move { consumer.run(token).await }),
        ));
    }
    tracing::info!(tasks = background.len(), "Background tasks started");

    // --- App state ---
    let state = AppState {
        store,
        pool,
        workers,
        intake,
        config: Arc::new(config),
    };

    let app = build_app_router(state, &server_config);

    // --- Start server ---
    let addr = SocketAddr::new(
        server_config.host.parse().expect("Invalid HOST address"),
        server_config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    cancel.cancel();
    for (name, handle) in background {
        if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, handle).await.is_err() {
            tracing::warn!(task = name, "Background task did not stop in time");
        }
    }
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
