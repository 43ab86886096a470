use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herald_shared::errors::AppResult;
use herald_shared::types::api::{AffectedCount, ApiResponse};
use herald_shared::types::auth::AuthUser;
use herald_shared::types::pagination::{Paginated, PaginationParams};

use crate::choices::{DeliveryMethod, Priority, Scope, Severity};
use crate::models::Notification;
use crate::repository::query::DEFAULT_RECENT_LIMIT;
use crate::repository::NotificationQuery;
use crate::services::notification_service;
use crate::AppState;

/// Optional list filters, shared by the consumer and admin listings.
#[derive(Debug, Default, Deserialize)]
pub struct NotificationFilters {
    pub read: Option<bool>,
    pub visible: Option<bool>,
    pub priority: Option<Priority>,
    pub severity: Option<Severity>,
    pub scope: Option<Scope>,
    pub delivery_method: Option<DeliveryMethod>,
    #[serde(default)]
    pub include_expired: bool,
}

impl NotificationFilters {
    pub fn apply(&self, mut query: NotificationQuery) -> NotificationQuery {
        if let Some(read) = self.read {
            query = if read { query.read() } else { query.unread() };
        }
        if let Some(visible) = self.visible {
            query = if visible { query.visible() } else { query.hidden() };
        }
        if let Some(priority) = self.priority {
            query = query.by_priority(priority);
        }
        if let Some(severity) = self.severity {
            query = query.by_severity(severity);
        }
        if let Some(scope) = self.scope {
            query = query.by_scope(scope);
        }
        if let Some(method) = self.delivery_method {
            query = query.by_delivery_method(method);
        }
        if !self.include_expired {
            query = query.not_expired();
        }
        query
    }
}

/// A notification as shown to its recipient.
#[derive(Debug, Serialize)]
pub struct NotificationView {
    #[serde(flatten)]
    pub notification: Notification,
    pub display_message: String,
    pub time_ago: String,
    pub time_since: String,
    pub created_label: String,
    pub is_expired: bool,
    pub high_severity: bool,
}

impl NotificationView {
    pub fn new(state: &AppState, notification: Notification) -> Self {
        let now = state.store.clock().now();
        Self {
            display_message: notification.get_display_message(state.resolver.as_ref()),
            time_ago: notification.human_readable_time(now),
            time_since: notification.time_since_created(now),
            created_label: notification.natural_day(),
            is_expired: notification.is_expired(now),
            high_severity: notification.is_high_severity(),
            notification,
        }
    }
}

/// GET /notifications
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(params): Query<PaginationParams>,
    Query(filters): Query<NotificationFilters>,
) -> AppResult<Json<ApiResponse<Paginated<NotificationView>>>> {
    let query = filters.apply(NotificationQuery::all().by_user(auth_user.id));
    let (items, total) = state
        .store
        .find_page(&query, params.limit() as i64, params.offset() as i64)?;

    let page = Paginated::new(items, total as u64, &params).map(|n| NotificationView::new(&state, n));
    Ok(Json(ApiResponse::ok(page)))
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

/// GET /notifications/unread-count
pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<UnreadCountResponse>>> {
    let query = NotificationQuery::all()
        .by_user(auth_user.id)
        .unread()
        .visible()
        .not_expired();
    let count = state.store.count(&query)?;

    Ok(Json(ApiResponse::ok(UnreadCountResponse { count })))
}

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    #[serde(default = "default_recent_limit")]
    pub limit: i64,
}

fn default_recent_limit() -> i64 {
    DEFAULT_RECENT_LIMIT
}

/// GET /notifications/recent
pub async fn recent(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Query(params): Query<RecentParams>,
) -> AppResult<Json<ApiResponse<Vec<NotificationView>>>> {
    let query = NotificationQuery::all()
        .by_user(auth_user.id)
        .visible()
        .not_expired()
        .recent(params.limit.min(100));
    let items = state
        .store
        .find(&query)?
        .into_iter()
        .map(|n| NotificationView::new(&state, n))
        .collect();

    Ok(Json(ApiResponse::ok(items)))
}

/// GET /notifications/:id
pub async fn get_notification(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<NotificationView>>> {
    let notification = notification_service::fetch_for_user(state.store.as_ref(), id, auth_user.id)?;
    Ok(Json(ApiResponse::ok(NotificationView::new(&state, notification))))
}

#[derive(Debug, Serialize)]
pub struct ChangeResponse {
    pub changed: bool,
    pub notification: Notification,
}

type ChangeFn = fn(&dyn crate::repository::NotificationStore, &mut Notification) -> AppResult<bool>;

fn change_one(state: &AppState, id: Uuid, user_id: Uuid, change: ChangeFn) -> AppResult<ChangeResponse> {
    let mut notification = notification_service::fetch_for_user(state.store.as_ref(), id, user_id)?;
    let changed = change(state.store.as_ref(), &mut notification)?;
    Ok(ChangeResponse { changed, notification })
}

/// POST /notifications/:id/read
pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ChangeResponse>>> {
    let response = change_one(&state, id, auth_user.id, notification_service::mark_as_read)?;
    Ok(Json(ApiResponse::ok(response)))
}

/// POST /notifications/:id/unread
pub async fn mark_unread(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ChangeResponse>>> {
    let response = change_one(&state, id, auth_user.id, notification_service::mark_as_unread)?;
    Ok(Json(ApiResponse::ok(response)))
}

/// POST /notifications/:id/toggle-read
pub async fn toggle_read(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ChangeResponse>>> {
    let response = change_one(&state, id, auth_user.id, |store, n| {
        notification_service::toggle_read_status(store, n).map(|()| true)
    })?;
    Ok(Json(ApiResponse::ok(response)))
}

/// POST /notifications/:id/archive
pub async fn archive(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ChangeResponse>>> {
    let response = change_one(&state, id, auth_user.id, notification_service::archive)?;
    Ok(Json(ApiResponse::ok(response)))
}

/// POST /notifications/:id/unarchive
pub async fn unarchive(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ChangeResponse>>> {
    let response = change_one(&state, id, auth_user.id, notification_service::unarchive)?;
    Ok(Json(ApiResponse::ok(response)))
}

/// POST /notifications/mark-all-read
pub async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<AffectedCount>>> {
    let affected = state.store.mark_all_as_read(auth_user.id)?;
    Ok(Json(ApiResponse::ok(AffectedCount::new(affected))))
}

/// POST /notifications/mark-all-unread
pub async fn mark_all_unread(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<AffectedCount>>> {
    let affected = state.store.mark_all_as_unread(auth_user.id)?;
    Ok(Json(ApiResponse::ok(AffectedCount::new(affected))))
}

/// POST /notifications/archive-all
pub async fn archive_all(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<AffectedCount>>> {
    let affected = state.store.archive_all(auth_user.id)?;
    Ok(Json(ApiResponse::ok(AffectedCount::new(affected))))
}

/// POST /notifications/unarchive-all
pub async fn unarchive_all(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
) -> AppResult<Json<ApiResponse<AffectedCount>>> {
    let affected = state.store.unarchive_all(auth_user.id)?;
    Ok(Json(ApiResponse::ok(AffectedCount::new(affected))))
}
