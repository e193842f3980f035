use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use residence_portal::{app, config::Config, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded ({})", config.app_env);

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    if let Some(ref admin) = config.bootstrap_admin {
        if let Err(e) = state
            .auth
            .ensure_bootstrap_admin(&admin.house_number, &admin.password)
            .await
        {
            tracing::error!("❌ Failed to provision bootstrap admin: {}", e);
            return Err(e.into());
        }
    }

    let cleanup_auth = state.auth.clone();
    let cleanup_interval = Duration::from_secs(config.session_cleanup_interval_secs);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(cleanup_interval).await;
            tracing::info!("🧹 Purging expired sessions...");
            match cleanup_auth.purge_expired_sessions().await {
                Ok(removed) => {
                    tracing::info!("✅ Purged {} expired sessions", removed);
                }
                Err(e) => {
                    tracing::error!("❌ Session purge failed: {}", e);
                }
            }
        }
    });

    let addr = config.bind_addr;
    let app = app::router(state);

    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
