//! Notification creation strategies.
//!
//! Each strategy is built from a [`ServiceContext`] (who, from whom, about
//! what) and called with per-notification [`CreateOptions`]. Strategies are a
//! closed set; string tags coming from the outside are parsed into a
//! [`ServiceKind`] first and rejected there when unknown.

use std::fmt;
use std::str::FromStr;

use metrics::counter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use herald_shared::errors::{AppError, AppResult, ErrorCode};

use crate::choices::{DeliveryMethod, Priority, Scope, Severity};
use crate::models::{NewNotification, Notification};
use crate::refs::ObjectRef;
use crate::repository::NotificationStore;

pub const DEFAULT_EXPIRES_IN_HOURS: i64 = 24;

/// Parameters shared by every notification a service instance creates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceContext {
    pub recipient: Option<Uuid>,
    pub sender: Option<ObjectRef>,
    pub entity: Option<ObjectRef>,
    pub context: Option<serde_json::Value>,
}

impl ServiceContext {
    pub fn new(recipient: Option<Uuid>, sender: ObjectRef) -> Self {
        Self {
            recipient,
            sender: Some(sender),
            ..Self::default()
        }
    }

    pub fn entity(mut self, entity: Option<ObjectRef>) -> Self {
        self.entity = entity;
        self
    }

    pub fn context(mut self, context: Option<serde_json::Value>) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateOptions {
    #[validate(length(min = 1, max = 255, message = "action must be 1 to 255 characters"))]
    pub action: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub delivery_method: Option<DeliveryMethod>,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    #[validate(length(max = 100, message = "group_id must be at most 100 characters"))]
    pub group_id: Option<String>,
    #[serde(default)]
    #[validate(range(min = 1, max = 87600, message = "expires_in_hours must be between 1 and 87600"))]
    pub expires_in_hours: Option<i64>,
}

impl CreateOptions {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn expires_in_hours(mut self, hours: i64) -> Self {
        self.expires_in_hours = Some(hours);
        self
    }
}

/// Outcome of a creation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Created {
    pub notification: Notification,
    /// False when a grouped call overwrote an existing row.
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Default,
    Grouped,
    Expiring,
}

impl ServiceKind {
    pub const ALL: &'static [ServiceKind] = &[ServiceKind::Default, ServiceKind::Grouped, ServiceKind::Expiring];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Default => "default",
            ServiceKind::Grouped => "grouped",
            ServiceKind::Expiring => "expiring",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(ServiceKind::Default),
            "grouped" => Ok(ServiceKind::Grouped),
            "expiring" => Ok(ServiceKind::Expiring),
            other => Err(AppError::new(
                ErrorCode::UnknownServiceType,
                format!("unknown notification service type: {other:?}"),
            )),
        }
    }
}

/// Validate options and assemble the row every strategy starts from.
fn prepare(
    store: &dyn NotificationStore,
    ctx: &ServiceContext,
    options: &CreateOptions,
    default_priority: Priority,
) -> AppResult<NewNotification> {
    options.validate()?;
    let sender = ctx
        .sender
        .clone()
        .ok_or_else(|| AppError::new(ErrorCode::SenderRequired, "a notification needs a sender"))?;

    Ok(NewNotification::new(sender, options.action.clone(), store.clock().now())
        .recipient(ctx.recipient)
        .entity(ctx.entity.clone())
        .context(ctx.context.clone())
        .priority(options.priority.unwrap_or(default_priority))
        .severity(options.severity.unwrap_or_default())
        .delivery_method(options.delivery_method.unwrap_or_default())
        .scope(options.scope.unwrap_or_default()))
}

fn record(kind: ServiceKind, created: &Created) {
    if created.created {
        counter!("notifications_created_total", "strategy" => kind.as_str()).increment(1);
    }
    tracing::debug!(
        notification_id = %created.notification.id,
        recipient_id = ?created.notification.recipient_id,
        strategy = %kind,
        created = created.created,
        "notification stored"
    );
}

/// Always inserts a new row.
#[derive(Debug, Clone)]
pub struct DefaultNotificationService {
    ctx: ServiceContext,
}

impl DefaultNotificationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn create_notification(&self, store: &dyn NotificationStore, options: &CreateOptions) -> AppResult<Created> {
        let new = prepare(store, &self.ctx, options, Priority::default())?;
        let created = Created {
            notification: store.insert(new)?,
            created: true,
        };
        record(ServiceKind::Default, &created);
        Ok(created)
    }
}

/// Keeps one row per `(recipient, group_id)`, refreshing it on every call.
#[derive(Debug, Clone)]
pub struct GroupNotificationService {
    ctx: ServiceContext,
}

impl GroupNotificationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn create_notification(&self, store: &dyn NotificationStore, options: &CreateOptions) -> AppResult<Created> {
        let group_id = options
            .group_id
            .clone()
            .ok_or_else(|| AppError::new(ErrorCode::ValidationError, "group_id is required for grouped notifications"))?;
        let new = prepare(store, &self.ctx, options, Priority::default())?.group_id(Some(group_id));

        let (notification, created) = store.upsert_grouped(new)?;
        let created = Created { notification, created };
        record(ServiceKind::Grouped, &created);
        Ok(created)
    }
}

/// Inserts a row that expires after `expires_in_hours` (24 unless given).
#[derive(Debug, Clone)]
pub struct ExpiringNotificationService {
    ctx: ServiceContext,
}

impl ExpiringNotificationService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn create_notification(&self, store: &dyn NotificationStore, options: &CreateOptions) -> AppResult<Created> {
        let hours = options.expires_in_hours.unwrap_or(DEFAULT_EXPIRES_IN_HOURS);
        let new = prepare(store, &self.ctx, options, Priority::Low)?.expires_in_hours(hours)?;

        let created = Created {
            notification: store.insert(new)?,
            created: true,
        };
        record(ServiceKind::Expiring, &created);
        Ok(created)
    }
}

#[derive(Debug, Clone)]
pub enum NotificationService {
    Default(DefaultNotificationService),
    Grouped(GroupNotificationService),
    Expiring(ExpiringNotificationService),
}

impl NotificationService {
    pub fn kind(&self) -> ServiceKind {
        match self {
            NotificationService::Default(_) => ServiceKind::Default,
            NotificationService::Grouped(_) => ServiceKind::Grouped,
            NotificationService::Expiring(_) => ServiceKind::Expiring,
        }
    }

    pub fn create_notification(&self, store: &dyn NotificationStore, options: &CreateOptions) -> AppResult<Created> {
        match self {
            NotificationService::Default(service) => service.create_notification(store, options),
            NotificationService::Grouped(service) => service.create_notification(store, options),
            NotificationService::Expiring(service) => service.create_notification(store, options),
        }
    }
}

pub struct NotificationServiceFactory;

impl NotificationServiceFactory {
    pub fn get_service(kind: ServiceKind, ctx: ServiceContext) -> NotificationService {
        match kind {
            ServiceKind::Default => NotificationService::Default(DefaultNotificationService::new(ctx)),
            ServiceKind::Grouped => NotificationService::Grouped(GroupNotificationService::new(ctx)),
            ServiceKind::Expiring => NotificationService::Expiring(ExpiringNotificationService::new(ctx)),
        }
    }

    pub fn get_service_by_tag(tag: &str, ctx: ServiceContext) -> AppResult<NotificationService> {
        Ok(Self::get_service(tag.parse()?, ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use crate::clock::{Clock, ManualClock};
    use crate::repository::{MemoryNotificationStore, NotificationQuery};

    fn setup() -> (Arc<ManualClock>, MemoryNotificationStore, Uuid) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()));
        let store = MemoryNotificationStore::new(clock.clone());
        let user = Uuid::new_v4();
        store.upsert_user(user, "member@example.com", true).unwrap();
        (clock, store, user)
    }

    fn ctx(user: Uuid) -> ServiceContext {
        ServiceContext::new(Some(user), ObjectRef::new("user", 7))
    }

    fn total(store: &MemoryNotificationStore) -> i64 {
        store.count(&NotificationQuery::all()).unwrap()
    }

    #[test]
    fn default_inserts_every_time() {
        let (_, store, user) = setup();
        let service = NotificationServiceFactory::get_service(ServiceKind::Default, ctx(user));

        let first = service.create_notification(&store, &CreateOptions::new("liked")).unwrap();
        service.create_notification(&store, &CreateOptions::new("liked")).unwrap();

        assert!(first.created);
        assert_eq!(first.notification.priority, Priority::Medium);
        assert_eq!(first.notification.severity, Severity::Info);
        assert_eq!(first.notification.delivery_method, DeliveryMethod::Web);
        assert_eq!(total(&store), 2);
    }

    #[test]
    fn grouped_twice_keeps_one_row_with_latest_content() {
        let (clock, store, user) = setup();

        let first = NotificationServiceFactory::get_service(
            ServiceKind::Grouped,
            ctx(user).context(Some(serde_json::json!({"likes": 1}))),
        )
        .create_notification(&store, &CreateOptions::new("liked your post").group_id("post-42-likes"))
        .unwrap();
        assert!(first.created);

        let mut stored = first.notification.clone();
        crate::services::notification_service::mark_as_read(&store, &mut stored).unwrap();
        clock.advance(Duration::minutes(3));

        let second = NotificationServiceFactory::get_service(
            ServiceKind::Grouped,
            ctx(user).context(Some(serde_json::json!({"likes": 2}))),
        )
        .create_notification(
            &store,
            &CreateOptions::new("and 1 other liked your post").group_id("post-42-likes"),
        )
        .unwrap();

        assert!(!second.created);
        assert_eq!(total(&store), 1);
        let row = store.get_required(first.notification.id).unwrap();
        assert_eq!(row.action, "and 1 other liked your post");
        assert_eq!(row.context, Some(serde_json::json!({"likes": 2})));
        assert!(!row.is_read);
        assert_eq!(row.modified_at, first.notification.created_at + Duration::minutes(3));
    }

    #[test]
    fn grouped_needs_group_id() {
        let (_, store, user) = setup();
        let err = GroupNotificationService::new(ctx(user))
            .create_notification(&store, &CreateOptions::new("liked"))
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));
        assert_eq!(total(&store), 0);
    }

    #[test]
    fn expiring_defaults_and_expiry() {
        let (clock, store, user) = setup();

        let day = ExpiringNotificationService::new(ctx(user))
            .create_notification(&store, &CreateOptions::new("flash sale"))
            .unwrap();
        assert_eq!(day.notification.priority, Priority::Low);
        assert_eq!(day.notification.expires_at, Some(day.notification.created_at + Duration::hours(24)));

        let hour = ExpiringNotificationService::new(ctx(user))
            .create_notification(&store, &CreateOptions::new("code expires").expires_in_hours(1))
            .unwrap();
        assert!(!hour.notification.is_expired(clock.now()));
        clock.advance(Duration::hours(2));
        assert!(hour.notification.is_expired(clock.now()));
    }

    #[test]
    fn expiring_rejects_out_of_range_lifetime() {
        let (_, store, user) = setup();
        let service = ExpiringNotificationService::new(ctx(user));

        let err = service
            .create_notification(&store, &CreateOptions::new("x").expires_in_hours(10_000_000_000))
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ValidationError));
        assert_eq!(total(&store), 0);

        let longest = service
            .create_notification(&store, &CreateOptions::new("x").expires_in_hours(87_600))
            .unwrap();
        assert_eq!(
            longest.notification.expires_at,
            Some(longest.notification.created_at + Duration::hours(87_600))
        );
    }

    #[test]
    fn unknown_tag_creates_nothing() {
        let (_, store, user) = setup();
        let err = NotificationServiceFactory::get_service_by_tag("carrier-pigeon", ctx(user)).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::UnknownServiceType));
        assert_eq!(total(&store), 0);

        let service = NotificationServiceFactory::get_service_by_tag("expiring", ctx(user)).unwrap();
        assert_eq!(service.kind(), ServiceKind::Expiring);
    }

    #[test]
    fn missing_sender_is_rejected_before_writing() {
        let (_, store, user) = setup();
        let ctx = ServiceContext {
            recipient: Some(user),
            ..ServiceContext::default()
        };
        let err = DefaultNotificationService::new(ctx)
            .create_notification(&store, &CreateOptions::new("liked"))
            .unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::SenderRequired));
        assert_eq!(total(&store), 0);
    }

    #[test]
    fn options_are_validated() {
        let (_, store, user) = setup();
        let service = DefaultNotificationService::new(ctx(user));

        for options in [
            CreateOptions::new(""),
            CreateOptions::new("x".repeat(256)),
            CreateOptions::new("ok").group_id("g".repeat(101)),
            CreateOptions::new("ok").expires_in_hours(0),
            CreateOptions::new("ok").expires_in_hours(87_601),
        ] {
            let err = service.create_notification(&store, &options).unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::ValidationError));
        }
        assert_eq!(total(&store), 0);
    }

    #[test]
    fn service_kind_round_trips_through_tags() {
        for kind in ServiceKind::ALL {
            assert_eq!(kind.as_str().parse::<ServiceKind>().unwrap(), *kind);
        }
    }
}
