use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use clap::Parser;
use tower_http::trace::TraceLayer;

mod config;
mod db;
mod models;
mod observability;
mod routes;
mod scheduler;
mod trim;

#[cfg(test)]
mod tests;

#[derive(Parser, Debug)]
#[command(version, about = "Scythe retention service", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./scythe.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the trim service (default)
    Serve,
    /// Run database migrations and exit
    ///
    /// Useful for init containers or CI/CD pipelines. Connects to the
    /// database, runs any pending migrations, and exits.
    Migrate,
    /// Start a trim cycle immediately and exit
    ///
    /// The scheduled batch continuations are worked off by a running
    /// `serve` process sharing the same database.
    Trim,
    /// Write a starter configuration file
    Init {
        /// Path to create the config file (defaults to ./scythe.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Shared state for the admin router.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub controller: Arc<trim::TrimController>,
}

const DEFAULT_CONFIG_PATH: &str = "scythe.toml";

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Migrate) => run_migrate(args.config.as_deref()).await,
        Some(Command::Trim) => run_trim(args.config.as_deref()).await,
        Some(Command::Init { output, force }) => run_init(output, force),
        Some(Command::Serve) | None => run_server(args.config.as_deref()).await,
    }
}

fn load_config(explicit_config_path: Option<&str>) -> config::ScytheConfig {
    let path = explicit_config_path.unwrap_or(DEFAULT_CONFIG_PATH);
    match config::ScytheConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {path}: {e}");
            eprintln!("Run `scythe init` to create a starter config file.");
            std::process::exit(1);
        }
    }
}

async fn connect_db(config: &config::ScytheConfig) -> Arc<db::DbPool> {
    match db::DbPool::from_config(&config.database).await {
        Ok(pool) => Arc::new(pool),
        Err(db::DbError::NotConfigured) => {
            tracing::error!(
                "No database configured. Add a [database] section to the config file."
            );
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to connect to database");
            std::process::exit(1);
        }
    }
}

async fn migrate_if_configured(config: &config::ScytheConfig, db: &db::DbPool) {
    if !config.database.run_migrations_on_startup() {
        return;
    }
    if let Err(e) = db.run_migrations().await {
        tracing::error!(error = %e, "Failed to run migrations");
        std::process::exit(1);
    }
}

/// Wire the trim services to their database-backed collaborators.
fn build_trim_services(
    config: &config::ScytheConfig,
    db: &Arc<db::DbPool>,
) -> (Arc<trim::TrimController>, Arc<trim::BatchExecutor>) {
    let task_scheduler: Arc<dyn scheduler::TaskScheduler> =
        Arc::new(scheduler::DbScheduler::new(db.scheduled_tasks()));
    let lock = trim::TrimLock::new(db.leases(), config.trim.max_runtime_secs);

    let controller = Arc::new(trim::TrimController::new(
        db.interactions(),
        db.trim_runs(),
        Arc::clone(&task_scheduler),
        config.trim.clone(),
    ));
    let executor = Arc::new(trim::BatchExecutor::new(
        db.interactions(),
        db.trim_runs(),
        task_scheduler,
        lock,
        config.trim.clone(),
    ));

    (controller, executor)
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/admin/trim", post(routes::admin::trigger_trim))
        .route("/admin/trim/state", get(routes::admin::trim_state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn run_server(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);
    observability::init_tracing(&config.observability);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting scythe");

    let db = connect_db(&config).await;
    migrate_if_configured(&config, &db).await;

    let (controller, executor) = build_trim_services(&config, &db);

    // The daily trigger must exist before the dispatcher starts polling.
    {
        let task_scheduler = scheduler::DbScheduler::new(db.scheduled_tasks());
        let settings = db.settings();
        if let Err(e) = scheduler::ensure_daily_trigger(
            &task_scheduler,
            settings.as_ref(),
            config.trim.schedule_offset_minutes,
        )
        .await
        {
            tracing::error!(error = %e, "Failed to schedule the daily trim trigger");
        }
    }

    {
        let tasks = db.scheduled_tasks();
        let controller = Arc::clone(&controller);
        let executor = Arc::clone(&executor);
        let poll_interval = std::time::Duration::from_secs(config.trim.poll_secs.max(1));
        tokio::spawn(async move {
            scheduler::start_task_dispatcher(tasks, controller, executor, poll_interval).await;
        });
    }

    let state = AppState {
        db: Arc::clone(&db),
        controller,
    };
    let app = build_router(state);

    let addr = config.server.bind_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "Failed to bind admin interface");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "Admin interface listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

async fn run_migrate(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);
    observability::init_tracing(&config.observability);

    let db = connect_db(&config).await;
    if let Err(e) = db.run_migrations().await {
        tracing::error!(error = %e, "Migration failed");
        std::process::exit(1);
    }
    tracing::info!("Migrations complete");
}

async fn run_trim(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);
    observability::init_tracing(&config.observability);

    let db = connect_db(&config).await;
    migrate_if_configured(&config, &db).await;

    let (controller, _executor) = build_trim_services(&config, &db);
    let response = controller.manual_trigger().await;

    println!(
        "{}",
        serde_json::to_string_pretty(&response).expect("response serializes")
    );
    if !response.success {
        std::process::exit(1);
    }
}

const STARTER_CONFIG: &str = r#"[server]
host = "127.0.0.1"
port = 8710

[database]
type = "sqlite"
path = "scythe.db"

[observability.logging]
level = "info"
format = "pretty"

[trim]
cap = 150000
target = 100000
batch_size = 1000
"#;

fn run_init(output: Option<String>, force: bool) {
    let path = output.unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    if std::path::Path::new(&path).exists() && !force {
        eprintln!("Config file already exists: {path}\nUse --force to overwrite.");
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&path, STARTER_CONFIG) {
        eprintln!("Failed to write config file: {e}");
        std::process::exit(1);
    }

    println!("Created config file: {path}");
    println!();
    println!("To start the service, run:");
    println!("  scythe serve --config {path}");
}
