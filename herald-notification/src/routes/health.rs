use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use herald_shared::types::api::{HealthCheck, HealthResponse, HealthStatus};

use crate::{AppState, SERVICE_NAME};

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let mut checks = vec![match state.store.ping() {
        Ok(()) => HealthCheck {
            name: "database".into(),
            status: HealthStatus::Healthy,
            message: None,
        },
        Err(e) => HealthCheck {
            name: "database".into(),
            status: HealthStatus::Unhealthy,
            message: Some(e.to_string()),
        },
    }];

    if let Some(rabbitmq) = &state.rabbitmq {
        let connected = rabbitmq.is_connected();
        checks.push(HealthCheck {
            name: "rabbitmq".into(),
            status: if connected { HealthStatus::Healthy } else { HealthStatus::Degraded },
            message: (!connected).then(|| "channel closed".to_string()),
        });
    }

    Json(HealthResponse::healthy(SERVICE_NAME, env!("CARGO_PKG_VERSION")).with_checks(checks))
}

/// Prometheus text exposition. Empty when no recorder is installed.
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics.as_ref().map(|handle| handle.render()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::routes::testing::{body_json, TestApp};

    #[tokio::test]
    async fn health_reports_database_check() {
        let app = TestApp::new();
        let response = app
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "herald-notification");
        assert_eq!(body["checks"][0]["name"], "database");
    }

    #[tokio::test]
    async fn metrics_is_empty_without_recorder() {
        let response = TestApp::new()
            .router()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
