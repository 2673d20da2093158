use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Import our modules
use chatflow::{
    api::{rate_limiter::RateLimiter, routes},
    config::Config,
    orchestrator::{ChatOrchestrator, GroqNamer},
    providers::{groq::GroqClient, LiveProviderAdapter},
    storage::{db::init_db, repository::SeaOrmChatRepository},
    stream::SmootherConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config
    let config = Arc::new(RwLock::new(Config::load()?));

    // Initialize database
    let db_url = config.read().await.database_url.clone();
    let db_conn = init_db(&db_url).await?;

    let repository = Arc::new(SeaOrmChatRepository::new(db_conn));

    // Provider adapter and chat namer share the upstream credentials
    let (provider, namer) = {
        let cfg = config.read().await;
        let provider = Arc::new(LiveProviderAdapter::new(&cfg));
        let namer = Arc::new(GroqNamer::new(
            GroqClient::new(cfg.groq_base_url.clone(), cfg.groq_api_key.clone()),
            cfg.naming_model.clone(),
        ));
        (provider, namer)
    };

    let orchestrator = Arc::new(ChatOrchestrator::new(
        repository.clone(),
        provider,
        namer,
        SmootherConfig::default(),
    ));

    // Create application state
    let state = routes::AppState {
        config: config.clone(),
        orchestrator,
    };

    let limiter = {
        let cfg = config.read().await;
        RateLimiter::new(cfg.effective_rate_limit(), cfg.effective_rate_window_secs())
    };

    // Periodic rate limiter cleanup
    let cleanup_limiter = limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup_expired().await;
        }
    });

    let app = routes::create_router(state, limiter)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let port = config.read().await.server_port;
    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 Server listening on {}", addr);
    tracing::info!("💬 Chat streaming: POST /api/v1/chats/send");

    axum::serve(listener, app).await?;

    Ok(())
}
