//! Composable, side-effect free filters over the notification collection.
//!
//! A [`NotificationQuery`] only describes a selection. Relative filters
//! ("expired", "created today", ...) are resolved against the store's clock
//! when the query is evaluated, so the same query value can be reused.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::choices::{DeliveryMethod, Priority, Scope, Severity};
use crate::models::Notification;
use crate::refs::ObjectRef;

pub const DEFAULT_RECENT_LIMIT: i64 = 10;
pub const DEFAULT_EXPIRING_SOON_HOURS: i64 = 24;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Read(bool),
    Visible(bool),
    Expired,
    NotExpired,
    HasExpiry,
    Recipient(Uuid),
    Global,
    Scope(Scope),
    Priority(Priority),
    DeliveryMethod(DeliveryMethod),
    SeverityIn(Vec<Severity>),
    Entity(ObjectRef),
    Group(String),
    CreatedToday,
    CreatedWithin(Duration),
    UpdatedWithin(Duration),
    ExpiresToday,
    ExpiringWithin(Duration),
    ActiveRecipient,
    Ids(Vec<Uuid>),
}

impl Filter {
    /// Evaluate against one record. `is_active` answers whether a user account
    /// is active.
    pub fn matches(&self, n: &Notification, now: DateTime<Utc>, is_active: &dyn Fn(Uuid) -> bool) -> bool {
        match self {
            Filter::Read(read) => n.is_read == *read,
            Filter::Visible(visible) => n.is_visible == *visible,
            Filter::Expired => n.expires_at.is_some_and(|at| at <= now),
            Filter::NotExpired => n.expires_at.map_or(true, |at| at > now),
            Filter::HasExpiry => n.expires_at.is_some(),
            Filter::Recipient(user) => n.recipient_id == Some(*user),
            Filter::Global => n.recipient_id.is_none(),
            Filter::Scope(scope) => n.scope == *scope,
            Filter::Priority(priority) => n.priority == *priority,
            Filter::DeliveryMethod(method) => n.delivery_method == *method,
            Filter::SeverityIn(severities) => severities.contains(&n.severity),
            Filter::Entity(entity) => {
                n.entity_type.as_deref() == Some(entity.object_type.as_str())
                    && n.entity_id == Some(entity.object_id)
            }
            Filter::Group(group) => n.group_id.as_deref() == Some(group.as_str()),
            Filter::CreatedToday => {
                let (start, end) = day_bounds(now);
                n.created_at >= start && n.created_at < end
            }
            Filter::CreatedWithin(window) => n.created_at >= now - *window,
            Filter::UpdatedWithin(window) => n.modified_at >= now - *window,
            Filter::ExpiresToday => {
                let (start, end) = day_bounds(now);
                n.expires_at.is_some_and(|at| at >= start && at < end)
            }
            Filter::ExpiringWithin(window) => {
                n.expires_at.is_some_and(|at| at >= now && at <= now + *window)
            }
            Filter::ActiveRecipient => n.recipient_id.is_some_and(is_active),
            Filter::Ids(ids) => ids.contains(&n.id),
        }
    }
}

/// Start and end of the UTC calendar day containing `now`.
pub fn day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN));
    (start, start + Duration::days(1))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationQuery {
    filters: Vec<Filter>,
    limit: Option<i64>,
}

impl NotificationQuery {
    /// Every notification.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn unread(self) -> Self {
        self.filter(Filter::Read(false))
    }

    pub fn read(self) -> Self {
        self.filter(Filter::Read(true))
    }

    pub fn visible(self) -> Self {
        self.filter(Filter::Visible(true))
    }

    pub fn hidden(self) -> Self {
        self.filter(Filter::Visible(false))
    }

    pub fn expired(self) -> Self {
        self.filter(Filter::Expired)
    }

    pub fn not_expired(self) -> Self {
        self.filter(Filter::NotExpired)
    }

    pub fn with_expiry(self) -> Self {
        self.filter(Filter::HasExpiry)
    }

    pub fn by_user(self, user_id: Uuid) -> Self {
        self.filter(Filter::Recipient(user_id))
    }

    /// Notifications without a recipient.
    pub fn global(self) -> Self {
        self.filter(Filter::Global)
    }

    pub fn by_scope(self, scope: Scope) -> Self {
        self.filter(Filter::Scope(scope))
    }

    pub fn by_priority(self, priority: Priority) -> Self {
        self.filter(Filter::Priority(priority))
    }

    pub fn by_delivery_method(self, method: DeliveryMethod) -> Self {
        self.filter(Filter::DeliveryMethod(method))
    }

    pub fn by_severity(self, severity: Severity) -> Self {
        self.filter(Filter::SeverityIn(vec![severity]))
    }

    pub fn for_entity(self, entity_type: impl Into<String>, entity_id: i64) -> Self {
        self.filter(Filter::Entity(ObjectRef::new(entity_type, entity_id)))
    }

    pub fn grouped_by(self, group_id: impl Into<String>) -> Self {
        self.filter(Filter::Group(group_id.into()))
    }

    pub fn created_today(self) -> Self {
        self.filter(Filter::CreatedToday)
    }

    pub fn created_in_last(self, days: i64) -> Self {
        self.filter(Filter::CreatedWithin(Duration::days(days)))
    }

    pub fn updated_in_last(self, hours: i64) -> Self {
        self.filter(Filter::UpdatedWithin(Duration::hours(hours)))
    }

    /// Expiry falls on the current UTC day, whether already passed or not.
    pub fn expired_today(self) -> Self {
        self.filter(Filter::ExpiresToday)
    }

    /// Expiry within `[now, now + hours]`.
    pub fn expiring_soon(self, hours: i64) -> Self {
        self.filter(Filter::ExpiringWithin(Duration::hours(hours)))
    }

    pub fn high_priority(self) -> Self {
        self.by_priority(Priority::High)
    }

    pub fn critical_notifications(self) -> Self {
        self.filter(Filter::SeverityIn(vec![Severity::Warning, Severity::Error]))
    }

    /// Keep only the `limit` most recently created rows. Reads only; bulk
    /// mutations reject limited queries.
    pub fn recent(mut self, limit: i64) -> Self {
        self.limit = Some(limit.max(0));
        self
    }

    pub fn for_active_users(self) -> Self {
        self.filter(Filter::ActiveRecipient)
    }

    pub fn with_ids(self, ids: Vec<Uuid>) -> Self {
        self.filter(Filter::Ids(ids))
    }

    pub fn matches(&self, n: &Notification, now: DateTime<Utc>, is_active: &dyn Fn(Uuid) -> bool) -> bool {
        self.filters.iter().all(|f| f.matches(n, now, is_active))
    }
}

/// Column an aggregate groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    User,
    Scope,
    Priority,
    DeliveryMethod,
    Severity,
}

/// Value of the grouping column for one aggregate row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum GroupKey {
    User(Option<Uuid>),
    Scope(Scope),
    Priority(Priority),
    DeliveryMethod(DeliveryMethod),
    Severity(Severity),
}

impl GroupKey {
    pub fn of(n: &Notification, by: GroupBy) -> Self {
        match by {
            GroupBy::User => GroupKey::User(n.recipient_id),
            GroupBy::Scope => GroupKey::Scope(n.scope),
            GroupBy::Priority => GroupKey::Priority(n.priority),
            GroupBy::DeliveryMethod => GroupKey::DeliveryMethod(n.delivery_method),
            GroupBy::Severity => GroupKey::Severity(n.severity),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub key: GroupKey,
    pub total: i64,
}

/// Order aggregate rows by count descending, ties by key.
pub fn sort_counts(counts: &mut [GroupCount]) {
    counts.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.key.cmp(&b.key)));
}

/// Set-based change applied to every row a query selects.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkUpdate {
    SetRead(bool),
    SetVisible(bool),
    SetSent(bool),
    SetPriority(Priority),
    ExpireAt(DateTime<Utc>),
    /// Push `expires_at` later. Rows without an expiry keep none.
    ExtendExpiry(Duration),
}

impl BulkUpdate {
    pub fn apply(&self, n: &mut Notification) {
        match self {
            BulkUpdate::SetRead(read) => n.is_read = *read,
            BulkUpdate::SetVisible(visible) => n.is_visible = *visible,
            BulkUpdate::SetSent(sent) => n.is_sent = *sent,
            BulkUpdate::SetPriority(priority) => n.priority = *priority,
            BulkUpdate::ExpireAt(at) => n.expires_at = Some(*at),
            BulkUpdate::ExtendExpiry(by) => n.expires_at = n.expires_at.map(|at| at + *by),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewNotification;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, 15, 30, 0).unwrap()
    }

    fn notification() -> Notification {
        NewNotification::new(ObjectRef::system(), "ping", now()).into_notification()
    }

    fn everyone_active(_: Uuid) -> bool {
        true
    }

    #[test]
    fn filters_chain_by_value() {
        let base = NotificationQuery::all().unread();
        let narrowed = base.clone().high_priority();
        assert_eq!(base.filters().len(), 1);
        assert_eq!(narrowed.filters().len(), 2);
    }

    #[test]
    fn not_expired_includes_permanent_rows() {
        let mut n = notification();
        let q = NotificationQuery::all().not_expired();
        assert!(q.matches(&n, now(), &everyone_active));

        n.expires_at = Some(now());
        assert!(!q.matches(&n, now(), &everyone_active));
        assert!(NotificationQuery::all().expired().matches(&n, now(), &everyone_active));
    }

    #[test]
    fn expiring_soon_window() {
        let q = NotificationQuery::all().expiring_soon(DEFAULT_EXPIRING_SOON_HOURS);
        let mut n = notification();

        n.expires_at = Some(now() + Duration::hours(12));
        assert!(q.matches(&n, now(), &everyone_active));

        n.expires_at = Some(now() + Duration::hours(48));
        assert!(!q.matches(&n, now(), &everyone_active));

        n.expires_at = Some(now() - Duration::hours(1));
        assert!(!q.matches(&n, now(), &everyone_active));

        n.expires_at = None;
        assert!(!q.matches(&n, now(), &everyone_active));
    }

    #[test]
    fn created_today_uses_utc_day() {
        let q = NotificationQuery::all().created_today();
        let mut n = notification();
        assert!(q.matches(&n, now(), &everyone_active));

        let (start, _) = day_bounds(now());
        n.created_at = start - Duration::seconds(1);
        assert!(!q.matches(&n, now(), &everyone_active));
        n.created_at = start;
        assert!(q.matches(&n, now(), &everyone_active));
    }

    #[test]
    fn created_in_last_includes_the_window_edge() {
        let q = NotificationQuery::all().created_in_last(7);
        let mut n = notification();

        n.created_at = now() - Duration::days(7);
        assert!(q.matches(&n, now(), &everyone_active));
        n.created_at = now() - Duration::days(7) - Duration::seconds(1);
        assert!(!q.matches(&n, now(), &everyone_active));
    }

    #[test]
    fn updated_in_last_includes_the_window_edge() {
        let q = NotificationQuery::all().updated_in_last(6);
        let mut n = notification();

        n.modified_at = now() - Duration::hours(6);
        assert!(q.matches(&n, now(), &everyone_active));
        n.modified_at = now() - Duration::hours(6) - Duration::seconds(1);
        assert!(!q.matches(&n, now(), &everyone_active));
    }

    #[test]
    fn saving_moves_a_row_into_updated_in_last() {
        use std::sync::Arc;

        use crate::clock::ManualClock;
        use crate::repository::{MemoryNotificationStore, NotificationStore};

        let clock = Arc::new(ManualClock::new(now()));
        let store = MemoryNotificationStore::new(clock.clone());
        let mut n = store.insert(NewNotification::new(ObjectRef::system(), "ping", now())).unwrap();

        clock.advance(Duration::hours(3));
        let recent = NotificationQuery::all().updated_in_last(1);
        assert_eq!(store.count(&recent).unwrap(), 0);

        n.is_read = true;
        store.save(&mut n).unwrap();
        assert_eq!(store.count(&recent).unwrap(), 1);
        assert_eq!(store.count(&NotificationQuery::all().created_in_last(0)).unwrap(), 0);
    }

    #[test]
    fn expired_today_covers_past_and_future_parts_of_the_day() {
        let q = NotificationQuery::all().expired_today();
        let mut n = notification();
        n.expires_at = Some(now() - Duration::hours(2));
        assert!(q.matches(&n, now(), &everyone_active));
        n.expires_at = Some(now() + Duration::hours(2));
        assert!(q.matches(&n, now(), &everyone_active));
        n.expires_at = Some(now() + Duration::days(1));
        assert!(!q.matches(&n, now(), &everyone_active));
    }

    #[test]
    fn critical_matches_warning_and_error() {
        let q = NotificationQuery::all().critical_notifications();
        let mut n = notification();
        assert!(!q.matches(&n, now(), &everyone_active));
        n.severity = Severity::Warning;
        assert!(q.matches(&n, now(), &everyone_active));
        n.severity = Severity::Error;
        assert!(q.matches(&n, now(), &everyone_active));
    }

    #[test]
    fn active_recipient_excludes_global_and_inactive() {
        let active = Uuid::new_v4();
        let inactive = Uuid::new_v4();
        let lookup = move |id: Uuid| id == active;
        let q = NotificationQuery::all().for_active_users();

        let mut n = notification();
        assert!(!q.matches(&n, now(), &lookup));
        n.recipient_id = Some(inactive);
        assert!(!q.matches(&n, now(), &lookup));
        n.recipient_id = Some(active);
        assert!(q.matches(&n, now(), &lookup));
    }

    #[test]
    fn entity_filter_needs_type_and_id() {
        let mut n = notification();
        n.entity_type = Some("post".into());
        n.entity_id = Some(42);

        assert!(NotificationQuery::all().for_entity("post", 42).matches(&n, now(), &everyone_active));
        assert!(!NotificationQuery::all().for_entity("post", 43).matches(&n, now(), &everyone_active));
        assert!(!NotificationQuery::all().for_entity("comment", 42).matches(&n, now(), &everyone_active));
    }

    #[test]
    fn extend_expiry_leaves_permanent_rows_alone() {
        let mut permanent = notification();
        BulkUpdate::ExtendExpiry(Duration::days(7)).apply(&mut permanent);
        assert_eq!(permanent.expires_at, None);

        let mut expiring = notification();
        expiring.expires_at = Some(now());
        BulkUpdate::ExtendExpiry(Duration::days(7)).apply(&mut expiring);
        assert_eq!(expiring.expires_at, Some(now() + Duration::days(7)));
    }

    #[test]
    fn counts_sort_descending_then_by_key() {
        let mut counts = vec![
            GroupCount { key: GroupKey::Priority(Priority::High), total: 2 },
            GroupCount { key: GroupKey::Priority(Priority::Low), total: 5 },
            GroupCount { key: GroupKey::Priority(Priority::Medium), total: 2 },
        ];
        sort_counts(&mut counts);
        let keys: Vec<_> = counts.iter().map(|c| c.key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                GroupKey::Priority(Priority::Low),
                GroupKey::Priority(Priority::Medium),
                GroupKey::Priority(Priority::High),
            ]
        );
    }

    #[test]
    fn recent_clamps_negative_limits() {
        assert_eq!(NotificationQuery::all().recent(-3).limit(), Some(0));
        assert_eq!(NotificationQuery::all().recent(DEFAULT_RECENT_LIMIT).limit(), Some(10));
    }
}
