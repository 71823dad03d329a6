use idm_axum::Idm;
use idm_demo::{config::ServerConfig, crm::DemoRoleResolver, demo};
use idm_store::MemoryStore;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    let bind_addr = config.bind_addr;
    let purge_interval = config.purge_interval();
    let store = Arc::new(MemoryStore::with_default_ttl(config.idm.cache_ttl()));
    let idm = Idm::builder(config.idm)
        .store(store.clone())
        .role_resolver(Arc::new(DemoRoleResolver::new(&config.demo)))
        .build()
        .expect("invalid idm configuration");

    tracing::info!("Discovering identity provider...");
    idm.warm()
        .await
        .expect("failed to discover identity provider");

    // Spawn periodic store purge task
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(purge_interval);
        loop {
            interval.tick().await;
            let purged = store.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Purged expired store entries");
            }
        }
    });

    let app = demo::router(idm).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .await
        .expect("server error");
}
