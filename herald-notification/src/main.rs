use std::sync::Arc;

use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

use herald_notification::clock::SystemClock;
use herald_notification::config::AppConfig;
use herald_notification::events;
use herald_notification::refs::TagResolver;
use herald_notification::repository::PgNotificationStore;
use herald_notification::{router, AppState, SERVICE_NAME};
use herald_shared::clients::db::{checkout, create_pool};
use herald_shared::clients::rabbitmq::RabbitMQClient;
use herald_shared::middleware::{init_metrics, init_tracing};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(SERVICE_NAME);

    let config = AppConfig::load()?;
    let port = config.port;

    // Set JWT_SECRET env var for the auth extractor
    std::env::set_var("JWT_SECRET", &config.jwt_secret);

    let pool = create_pool(&config.database_url, config.db_pool_size)?;
    {
        let mut conn = checkout(&pool)?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
        tracing::info!(count = applied.len(), "database migrations applied");
    }

    let metrics = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "prometheus recorder not installed");
            None
        }
    };

    let rabbitmq = if config.enable_subscribers {
        Some(RabbitMQClient::connect(&config.rabbitmq_url).await?)
    } else {
        None
    };
    let enable_subscribers = rabbitmq.is_some();

    let store = PgNotificationStore::new(pool, Arc::new(SystemClock));
    let state = Arc::new(AppState {
        store: Arc::new(store),
        resolver: Arc::new(TagResolver),
        config,
        rabbitmq,
        metrics,
    });

    if enable_subscribers {
        // Spawn notification request subscriber
        let request_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = events::subscriber::listen_notification_requests(request_state).await {
                tracing::error!(error = %e, "notification request subscriber failed");
            }
        });

        // Spawn user replica subscriber
        let user_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = events::subscriber::listen_user_events(user_state).await {
                tracing::error!(error = %e, "user event subscriber failed");
            }
        });
    }

    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "herald-notification starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
