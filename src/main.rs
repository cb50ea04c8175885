//! Newsdesk - a newsroom content service

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsdesk::{
    api,
    config::Config,
    db,
    services::mailer_from_config,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsdesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Newsdesk...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    let mailer = mailer_from_config(&config.mail)?;
    if !config.mail.enabled {
        tracing::info!("Mail disabled, notifications will be logged");
    }

    let state = api::build_state(pool, &config, mailer).await?;

    // Staff accounts only come from configuration
    if let Some(staff) = &config.staff {
        state.user_service.ensure_staff(staff).await?;
    }

    // Start rate limiter cleanup task (runs every 5 minutes)
    {
        let limiter = state.rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(300));
            loop {
                interval.tick().await;
                limiter.cleanup().await;
            }
        });
    }

    // Build router
    let app = api::build_router(state, &config.server.cors_origin);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
