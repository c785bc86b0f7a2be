use std::sync::Arc;

use anyhow::Context;

use bazaar_api::{app, config::ApiConfig};
use bazaar_events::{EventBus, InMemoryEventBus, Notification};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env()?;
    bazaar_observability::init_with(config.log_format);

    // Email and in-app delivery live outside this service; log what is published.
    let bus: Arc<InMemoryEventBus<Notification>> = Arc::new(InMemoryEventBus::new());
    let notifications = bus.subscribe();
    tokio::task::spawn_blocking(move || {
        while let Ok(n) = notifications.recv() {
            tracing::info!(topic = n.topic(), vendor_id = %n.vendor_id(), "notification published");
        }
    });

    let services = Arc::new(app::services::build_services(bus));
    let router = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router).await.context("http server failed")?;
    Ok(())
}
