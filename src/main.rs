// Yatube server

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use yatube::{api::create_router, app_state::AppState, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    let address = config.server_address();

    let app_state = AppState::new(config).await?;
    let app = create_router(app_state);

    info!("Yatube server starting on http://{}", address);
    info!("  GET    /                         - index feed (cached)");
    info!("  GET    /group/{{slug}}             - group feed");
    info!("  GET    /profile/{{username}}       - author profile");
    info!("  GET    /follow                   - subscription feed");
    info!("  GET    /posts/{{id}}               - post detail");
    info!("  POST   /create                   - create post");

    let listener = TcpListener::bind(address.as_str()).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
