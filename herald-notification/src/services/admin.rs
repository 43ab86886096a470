use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herald_shared::errors::AppResult;

use crate::choices::Priority;
use crate::repository::{BulkUpdate, NotificationQuery, NotificationStore};

pub const EXTEND_EXPIRATION_DAYS: i64 = 7;

/// Bulk action an administrator applies to a hand-picked set of notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    MarkRead,
    MarkUnread,
    Archive,
    Unarchive,
    Delete,
    MarkSent,
    MarkUnsent,
    PriorityHigh,
    PriorityLow,
    ExpireNow,
    ExtendExpiration,
}

impl AdminAction {
    pub fn description(&self) -> &'static str {
        match self {
            AdminAction::MarkRead => "marked as read",
            AdminAction::MarkUnread => "marked as unread",
            AdminAction::Archive => "archived",
            AdminAction::Unarchive => "unarchived",
            AdminAction::Delete => "deleted",
            AdminAction::MarkSent => "marked as sent",
            AdminAction::MarkUnsent => "marked as unsent",
            AdminAction::PriorityHigh => "set to high priority",
            AdminAction::PriorityLow => "set to low priority",
            AdminAction::ExpireNow => "expired",
            AdminAction::ExtendExpiration => "extended by 7 days",
        }
    }
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Apply `action` to the given ids in one statement. Returns the number of
/// notifications affected.
pub fn apply_action(store: &dyn NotificationStore, action: AdminAction, ids: Vec<Uuid>) -> AppResult<usize> {
    let selection = NotificationQuery::all().with_ids(ids);

    let affected = match action {
        AdminAction::MarkRead => store.update(&selection, BulkUpdate::SetRead(true))?,
        AdminAction::MarkUnread => store.update(&selection, BulkUpdate::SetRead(false))?,
        AdminAction::Archive => store.update(&selection, BulkUpdate::SetVisible(false))?,
        AdminAction::Unarchive => store.update(&selection, BulkUpdate::SetVisible(true))?,
        AdminAction::Delete => store.delete(&selection)?,
        AdminAction::MarkSent => store.update(&selection, BulkUpdate::SetSent(true))?,
        AdminAction::MarkUnsent => store.update(&selection, BulkUpdate::SetSent(false))?,
        AdminAction::PriorityHigh => store.update(&selection, BulkUpdate::SetPriority(Priority::High))?,
        AdminAction::PriorityLow => store.update(&selection, BulkUpdate::SetPriority(Priority::Low))?,
        AdminAction::ExpireNow => store.update(&selection, BulkUpdate::ExpireAt(store.clock().now()))?,
        AdminAction::ExtendExpiration => store.update(
            &selection.with_expiry(),
            BulkUpdate::ExtendExpiry(Duration::days(EXTEND_EXPIRATION_DAYS)),
        )?,
    };

    tracing::info!(action = ?action, affected, "admin bulk action applied");
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use crate::clock::{Clock, ManualClock};
    use crate::models::{NewNotification, Notification};
    use crate::refs::ObjectRef;
    use crate::repository::MemoryNotificationStore;

    fn setup() -> (Arc<ManualClock>, MemoryNotificationStore, Vec<Notification>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()));
        let store = MemoryNotificationStore::new(clock.clone());
        let now = store.clock().now();
        let rows = vec![
            store.insert(NewNotification::new(ObjectRef::system(), "a", now)).unwrap(),
            store
                .insert(NewNotification::new(ObjectRef::system(), "b", now).expires_in(Duration::hours(3)).unwrap())
                .unwrap(),
            store.insert(NewNotification::new(ObjectRef::system(), "c", now)).unwrap(),
        ];
        (clock, store, rows)
    }

    fn ids(rows: &[Notification]) -> Vec<Uuid> {
        rows.iter().map(|n| n.id).collect()
    }

    #[test]
    fn actions_touch_only_selected_rows() {
        let (_, store, rows) = setup();
        let picked = ids(&rows[..2]);

        assert_eq!(apply_action(&store, AdminAction::MarkRead, picked.clone()).unwrap(), 2);
        assert!(!store.get_required(rows[2].id).unwrap().is_read);

        assert_eq!(apply_action(&store, AdminAction::PriorityHigh, picked.clone()).unwrap(), 2);
        assert_eq!(store.get_required(rows[0].id).unwrap().priority, Priority::High);
        assert_eq!(store.get_required(rows[2].id).unwrap().priority, Priority::Medium);

        assert_eq!(apply_action(&store, AdminAction::MarkSent, picked.clone()).unwrap(), 2);
        assert_eq!(apply_action(&store, AdminAction::Archive, picked).unwrap(), 2);
        assert!(!store.get_required(rows[1].id).unwrap().is_visible);
    }

    #[test]
    fn extend_expiration_skips_permanent_rows() {
        let (clock, store, rows) = setup();
        let affected = apply_action(&store, AdminAction::ExtendExpiration, ids(&rows)).unwrap();
        assert_eq!(affected, 1);
        assert_eq!(
            store.get_required(rows[1].id).unwrap().expires_at,
            Some(clock.now() + Duration::hours(3) + Duration::days(EXTEND_EXPIRATION_DAYS))
        );
        assert_eq!(store.get_required(rows[0].id).unwrap().expires_at, None);
    }

    #[test]
    fn expire_now_then_purge() {
        let (_, store, rows) = setup();
        assert_eq!(apply_action(&store, AdminAction::ExpireNow, ids(&rows[..1])).unwrap(), 1);
        assert_eq!(store.delete_all_expired().unwrap(), 1);
        assert!(store.get(rows[0].id).unwrap().is_none());
    }

    #[test]
    fn delete_reports_count() {
        let (_, store, rows) = setup();
        assert_eq!(apply_action(&store, AdminAction::Delete, ids(&rows)).unwrap(), 3);
        assert_eq!(apply_action(&store, AdminAction::Delete, ids(&rows)).unwrap(), 0);
    }

    #[test]
    fn actions_deserialize_from_snake_case() {
        let action: AdminAction = serde_json::from_str("\"extend_expiration\"").unwrap();
        assert_eq!(action, AdminAction::ExtendExpiration);
    }
}
