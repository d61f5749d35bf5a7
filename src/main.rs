use std::sync::Arc;

use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tokio::signal;
use tracing_subscriber::EnvFilter;

use unioncase::{
    auth::jwt::JwtService,
    config::AppConfig,
    db,
    notify::{LogDispatch, NotificationDispatch, SmtpDispatch},
    routes,
    state::AppState,
    Scheduler,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        smtp_enabled = config.smtp_host.is_some(),
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    run_migrations(&pool)?;

    let dispatch: Arc<dyn NotificationDispatch> = match SmtpDispatch::from_config(&config)? {
        Some(smtp) => Arc::new(smtp),
        None => {
            tracing::warn!("SMTP_HOST not set, notifications will only be logged");
            Arc::new(LogDispatch)
        }
    };
    let jwt = JwtService::from_config(&config)?;
    let state = AppState::new(pool, config, dispatch, jwt);

    let scheduler = Scheduler::new(state.clone());
    tokio::spawn(async move { scheduler.run().await });

    let router = routes::create_router(state.clone());
    let addr = format!(
        "{}:{}",
        state.config.server_host, state.config.server_port
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "api server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn run_migrations(pool: &db::PgPool) -> anyhow::Result<()> {
    let mut conn = pool.get()?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|err| anyhow::anyhow!("failed to run migrations: {err}"))?;
    Ok(())
}

async fn shutdown_signal() {
    if signal::ctrl_c().await.is_ok() {
        tracing::info!("received shutdown signal");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
