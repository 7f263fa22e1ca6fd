//! StoreOps - E-commerce Operations Back Office

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storeops::{api, db, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let db = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to the database")?;
    sqlx::migrate!("./migrations").run(&db).await.context("failed to run migrations")?;

    let nats = match config.nats_url.as_deref() {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(url, "connected to NATS");
                Some(client)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "NATS unavailable, events will not be published");
                None
            }
        },
        None => None,
    };

    if let (Some(username), Some(password)) = (config.admin_username.as_deref(), config.admin_password.as_deref()) {
        if db::users::ensure_admin(&db, username, password).await? {
            tracing::info!(username, "created bootstrap admin account");
        }
    }

    let port = config.port;
    let state = AppState::new(config, db, nats);
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    tracing::info!("StoreOps listening on 0.0.0.0:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
