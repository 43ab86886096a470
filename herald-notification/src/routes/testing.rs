//! Shared fixtures for route tests: an app wired to the in-memory store.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use chrono::{TimeZone, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use uuid::Uuid;

use herald_shared::middleware::DEFAULT_JWT_SECRET;
use herald_shared::types::auth::{Claims, UserRole};

use crate::clock::ManualClock;
use crate::config::AppConfig;
use crate::models::{NewNotification, Notification};
use crate::refs::{ObjectRef, TagResolver};
use crate::repository::{MemoryNotificationStore, NotificationStore};
use crate::AppState;

pub(crate) struct TestApp {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryNotificationStore>,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        let store = Arc::new(MemoryNotificationStore::new(clock.clone()));
        let dyn_store: Arc<dyn NotificationStore> = store.clone();
        let state = Arc::new(AppState {
            store: dyn_store,
            resolver: Arc::new(TagResolver),
            config: AppConfig::default(),
            rabbitmq: None,
            metrics: None,
        });
        Self { clock, store, state }
    }

    pub fn router(&self) -> Router {
        crate::router(self.state.clone())
    }

    /// Register an active user in the replica.
    pub fn user(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.store.upsert_user(id, &format!("{id}@example.com"), true).unwrap();
        id
    }

    pub fn notify(&self, recipient: Option<Uuid>, action: &str) -> Notification {
        self.store
            .insert(NewNotification::new(ObjectRef::system(), action, self.store.clock().now()).recipient(recipient))
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        use tower::ServiceExt;
        self.router().oneshot(request).await.unwrap()
    }
}

pub(crate) fn token(user_id: Uuid, role: UserRole) -> String {
    let claims = Claims::new(user_id, role, 300);
    encode(&Header::default(), &claims, &EncodingKey::from_secret(DEFAULT_JWT_SECRET.as_bytes())).unwrap()
}

pub(crate) fn get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

pub(crate) fn post(uri: &str, token: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::post(uri).header(header::AUTHORIZATION, format!("Bearer {token}"));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub(crate) async fn body_json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
