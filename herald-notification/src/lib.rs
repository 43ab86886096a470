use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use herald_shared::clients::rabbitmq::RabbitMQClient;
use herald_shared::middleware::metrics_middleware;

pub mod choices;
pub mod clock;
pub mod config;
pub mod events;
pub mod models;
pub mod refs;
pub mod repository;
pub mod routes;
pub mod schema;
pub mod services;

use config::AppConfig;
use refs::ObjectResolver;
use repository::NotificationStore;

pub const SERVICE_NAME: &str = "herald-notification";

pub struct AppState {
    pub store: Arc<dyn NotificationStore>,
    pub resolver: Arc<dyn ObjectResolver>,
    pub config: AppConfig,
    pub rabbitmq: Option<RabbitMQClient>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        // Consumer
        .route("/notifications", get(routes::notifications::list_notifications))
        .route("/notifications/unread-count", get(routes::notifications::unread_count))
        .route("/notifications/recent", get(routes::notifications::recent))
        .route("/notifications/mark-all-read", post(routes::notifications::mark_all_read))
        .route("/notifications/mark-all-unread", post(routes::notifications::mark_all_unread))
        .route("/notifications/archive-all", post(routes::notifications::archive_all))
        .route("/notifications/unarchive-all", post(routes::notifications::unarchive_all))
        .route("/notifications/:id", get(routes::notifications::get_notification))
        .route("/notifications/:id/read", post(routes::notifications::mark_read))
        .route("/notifications/:id/unread", post(routes::notifications::mark_unread))
        .route("/notifications/:id/toggle-read", post(routes::notifications::toggle_read))
        .route("/notifications/:id/archive", post(routes::notifications::archive))
        .route("/notifications/:id/unarchive", post(routes::notifications::unarchive))
        // Admin
        .route(
            "/admin/notifications",
            get(routes::admin::list_notifications).post(routes::admin::create_notification),
        )
        .route("/admin/notifications/actions", post(routes::admin::bulk_action))
        .route("/admin/notifications/stats", get(routes::admin::stats))
        .route("/admin/notifications/purge-expired", post(routes::admin::purge_expired))
        .route("/admin/notifications/:id/send", post(routes::admin::send))
        .route("/admin/notifications/:id/resend", post(routes::admin::resend))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
