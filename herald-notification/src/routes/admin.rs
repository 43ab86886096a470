use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herald_shared::errors::{AppError, AppResult, ErrorCode};
use herald_shared::middleware::AdminUser;
use herald_shared::types::api::{AffectedCount, ApiResponse};
use herald_shared::types::pagination::{Paginated, PaginationParams};

use crate::models::Notification;
use crate::refs::ObjectRef;
use crate::repository::{GroupCount, NotificationQuery};
use crate::routes::notifications::{NotificationFilters, NotificationView};
use crate::services::admin::{self as admin_service, AdminAction};
use crate::services::creation::{CreateOptions, Created, NotificationServiceFactory, ServiceContext, ServiceKind};
use crate::services::notification_service;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AdminListParams {
    pub recipient_id: Option<Uuid>,
    pub group_id: Option<String>,
    #[serde(default)]
    pub global: bool,
}

/// GET /admin/notifications
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Query(params): Query<PaginationParams>,
    Query(scope): Query<AdminListParams>,
    Query(filters): Query<NotificationFilters>,
) -> AppResult<Json<ApiResponse<Paginated<NotificationView>>>> {
    let mut query = filters.apply(NotificationQuery::all());
    if let Some(recipient) = scope.recipient_id {
        query = query.by_user(recipient);
    }
    if scope.global {
        query = query.global();
    }
    if let Some(group) = scope.group_id {
        query = query.grouped_by(group);
    }

    let (items, total) = state
        .store
        .find_page(&query, params.limit() as i64, params.offset() as i64)?;
    let page = Paginated::new(items, total as u64, &params).map(|n| NotificationView::new(&state, n));
    Ok(Json(ApiResponse::ok(page)))
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    #[serde(default = "default_service_type")]
    pub service_type: String,
    pub recipient_id: Option<Uuid>,
    pub sender_type: Option<String>,
    pub sender_id: Option<i64>,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    #[serde(default)]
    pub context: Option<serde_json::Value>,
    #[serde(flatten)]
    pub options: CreateOptions,
}

fn default_service_type() -> String {
    ServiceKind::Default.as_str().to_string()
}

/// POST /admin/notifications
pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<CreateNotificationRequest>,
) -> AppResult<Json<ApiResponse<Created>>> {
    let kind: ServiceKind = req.service_type.parse()?;
    let sender = ObjectRef::from_parts(req.sender_type.as_deref(), req.sender_id)?;
    let entity = match (req.entity_type, req.entity_id) {
        (Some(object_type), Some(object_id)) => Some(ObjectRef::new(object_type, object_id)),
        (None, None) => None,
        _ => {
            return Err(AppError::new(
                ErrorCode::ValidationError,
                "entity_type and entity_id must be given together",
            ))
        }
    };

    let ctx = ServiceContext {
        recipient: req.recipient_id,
        sender,
        entity,
        context: req.context,
    };
    let created = NotificationServiceFactory::get_service(kind, ctx).create_notification(state.store.as_ref(), &req.options)?;

    tracing::info!(
        admin_id = %admin.id,
        notification_id = %created.notification.id,
        strategy = %kind,
        "notification created by admin"
    );
    Ok(Json(ApiResponse::ok(created)))
}

#[derive(Debug, Deserialize)]
pub struct BulkActionRequest {
    pub action: AdminAction,
    pub ids: Vec<Uuid>,
}

/// POST /admin/notifications/actions
pub async fn bulk_action(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<BulkActionRequest>,
) -> AppResult<Json<ApiResponse<AffectedCount>>> {
    let affected = admin_service::apply_action(state.store.as_ref(), req.action, req.ids)?;

    tracing::info!(admin_id = %admin.id, action = ?req.action, affected, "admin bulk action");
    Ok(Json(ApiResponse::ok_with_message(
        AffectedCount::new(affected),
        format!("{affected} notification(s) {}", req.action),
    )))
}

#[derive(Debug, Serialize)]
pub struct NotificationStats {
    pub total: i64,
    pub unread: i64,
    pub expired: i64,
    pub by_user: Vec<GroupCount>,
    pub by_scope: Vec<GroupCount>,
    pub by_priority: Vec<GroupCount>,
    pub by_delivery_method: Vec<GroupCount>,
    pub by_severity: Vec<GroupCount>,
}

/// GET /admin/notifications/stats
pub async fn stats(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
) -> AppResult<Json<ApiResponse<NotificationStats>>> {
    let store = state.store.as_ref();
    let all = NotificationQuery::all();

    let stats = NotificationStats {
        total: store.count(&all)?,
        unread: store.count(&all.clone().unread())?,
        expired: store.count(&all.clone().expired())?,
        by_user: store.count_by_user(&all)?,
        by_scope: store.count_by_scope(&all)?,
        by_priority: store.count_by_priority(&all)?,
        by_delivery_method: store.count_by_delivery_method(&all)?,
        by_severity: store.count_by_severity(&all)?,
    };
    Ok(Json(ApiResponse::ok(stats)))
}

/// POST /admin/notifications/purge-expired
pub async fn purge_expired(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
) -> AppResult<Json<ApiResponse<AffectedCount>>> {
    let deleted = state.store.delete_all_expired()?;
    tracing::info!(admin_id = %admin.id, deleted, "expired notifications purged");
    Ok(Json(ApiResponse::ok(AffectedCount::new(deleted))))
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub sent: bool,
    pub notification: Notification,
}

/// POST /admin/notifications/:id/send
pub async fn send(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SendResponse>>> {
    let mut notification = state.store.get_required(id)?;
    let sent = notification_service::send_notification(state.store.as_ref(), &mut notification)?;
    Ok(Json(ApiResponse::ok(SendResponse { sent, notification })))
}

/// POST /admin/notifications/:id/resend
pub async fn resend(
    State(state): State<Arc<AppState>>,
    AdminUser(_admin): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<SendResponse>>> {
    let notification = state.store.get_required(id)?;
    if !notification_service::resend_notification(&notification) {
        return Err(AppError::bad_request("notification has not been sent yet"));
    }
    Ok(Json(ApiResponse::ok(SendResponse { sent: true, notification })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Duration;
    use serde_json::json;

    use herald_shared::types::auth::UserRole;

    use crate::clock::Clock;
    use crate::models::NewNotification;
    use crate::refs::ObjectRef;
    use crate::repository::{NotificationQuery, NotificationStore};
    use crate::routes::testing::{body_json, get, post, token, TestApp};

    fn admin_token() -> String {
        token(uuid::Uuid::new_v4(), UserRole::Admin)
    }

    #[tokio::test]
    async fn regular_users_are_forbidden() {
        let app = TestApp::new();
        let user = app.user();
        let response = app.send(get("/admin/notifications/stats", &token(user, UserRole::User))).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn create_grouped_via_form() {
        let app = TestApp::new();
        let user = app.user();
        let form = json!({
            "service_type": "grouped",
            "recipient_id": user,
            "sender_type": "user",
            "sender_id": 7,
            "action": "liked your post",
            "group_id": "post-42-likes",
            "priority": "high",
        });

        let body = body_json(app.send(post("/admin/notifications", &admin_token(), Some(form.clone()))).await).await;
        assert_eq!(body["data"]["created"], true);
        assert_eq!(body["data"]["notification"]["priority"], "high");

        let body = body_json(app.send(post("/admin/notifications", &admin_token(), Some(form))).await).await;
        assert_eq!(body["data"]["created"], false);
        assert_eq!(app.store.count(&NotificationQuery::all()).unwrap(), 1);
    }

    #[tokio::test]
    async fn half_sender_reference_is_rejected() {
        let app = TestApp::new();
        let form = json!({"sender_type": "user", "action": "hello"});
        let response = app.send(post("/admin/notifications", &admin_token(), Some(form))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "E5004");
        assert_eq!(
            body["error"]["message"],
            "You must specify an object ID for the selected sender type."
        );

        let form = json!({"sender_id": 3, "action": "hello"});
        let response = app.send(post("/admin/notifications", &admin_token(), Some(form))).await;
        assert_eq!(body_json(response).await["error"]["code"], "E5004");
        assert_eq!(app.store.count(&NotificationQuery::all()).unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_sender_and_unknown_type() {
        let app = TestApp::new();
        let response = app
            .send(post("/admin/notifications", &admin_token(), Some(json!({"action": "hello"}))))
            .await;
        assert_eq!(body_json(response).await["error"]["code"], "E5003");

        let form = json!({"service_type": "pigeon", "sender_type": "system", "sender_id": 0, "action": "hello"});
        let response = app.send(post("/admin/notifications", &admin_token(), Some(form))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "E5002");
        assert_eq!(app.store.count(&NotificationQuery::all()).unwrap(), 0);
    }

    #[tokio::test]
    async fn oversized_lifetime_is_rejected() {
        let app = TestApp::new();
        let form = json!({
            "service_type": "expiring",
            "sender_type": "system",
            "sender_id": 0,
            "action": "flash sale",
            "expires_in_hours": 10_000_000_000i64,
        });
        let response = app.send(post("/admin/notifications", &admin_token(), Some(form))).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "E0002");
        assert_eq!(app.store.count(&NotificationQuery::all()).unwrap(), 0);
    }

    #[tokio::test]
    async fn bulk_action_reports_count() {
        let app = TestApp::new();
        let user = app.user();
        let a = app.notify(Some(user), "a");
        let b = app.notify(Some(user), "b");
        app.notify(Some(user), "c");

        let body = body_json(
            app.send(post(
                "/admin/notifications/actions",
                &admin_token(),
                Some(json!({"action": "mark_read", "ids": [a.id, b.id]})),
            ))
            .await,
        )
        .await;
        assert_eq!(body["data"]["affected"], 2);
        assert_eq!(body["message"], "2 notification(s) marked as read");
        assert_eq!(app.store.count(&NotificationQuery::all().read()).unwrap(), 2);
    }

    #[tokio::test]
    async fn stats_and_purge() {
        let app = TestApp::new();
        let user = app.user();
        app.notify(Some(user), "a");
        app.notify(None, "global");
        let short = NewNotification::new(ObjectRef::system(), "short", app.clock.now())
            .expires_in(Duration::hours(1))
            .unwrap();
        app.store.insert(short).unwrap();
        app.clock.advance(Duration::hours(2));

        let body = body_json(app.send(get("/admin/notifications/stats", &admin_token())).await).await;
        assert_eq!(body["data"]["total"], 3);
        assert_eq!(body["data"]["expired"], 1);
        assert_eq!(body["data"]["by_user"][0]["key"], serde_json::Value::Null);
        assert_eq!(body["data"]["by_user"][0]["total"], 2);

        let body = body_json(app.send(post("/admin/notifications/purge-expired", &admin_token(), None)).await).await;
        assert_eq!(body["data"]["affected"], 1);
    }

    #[tokio::test]
    async fn send_then_resend() {
        let app = TestApp::new();
        let n = app.notify(None, "maintenance");
        let resend_uri = format!("/admin/notifications/{}/resend", n.id);

        let response = app.send(post(&resend_uri, &admin_token(), None)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let send_uri = format!("/admin/notifications/{}/send", n.id);
        let body = body_json(app.send(post(&send_uri, &admin_token(), None)).await).await;
        assert_eq!(body["data"]["sent"], true);
        let body = body_json(app.send(post(&send_uri, &admin_token(), None)).await).await;
        assert_eq!(body["data"]["sent"], false);

        let response = app.send(post(&resend_uri, &admin_token(), None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_list_filters_global() {
        let app = TestApp::new();
        let user = app.user();
        app.notify(Some(user), "mine");
        app.notify(None, "everyone");

        let body = body_json(app.send(get("/admin/notifications?global=true", &admin_token())).await).await;
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["items"][0]["action"], "everyone");
    }
}
