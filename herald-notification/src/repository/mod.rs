pub mod memory;
pub mod pg;
pub mod query;

use uuid::Uuid;

use herald_shared::errors::{AppError, AppResult, ErrorCode};

use crate::clock::Clock;
use crate::models::{NewNotification, Notification};

pub use memory::MemoryNotificationStore;
pub use pg::PgNotificationStore;
pub use query::{BulkUpdate, Filter, GroupBy, GroupCount, GroupKey, NotificationQuery};

/// Persistence boundary for notifications.
///
/// Reads return rows newest first. Every bulk method is a single set-based
/// statement and bumps `modified_at` on the rows it touches.
pub trait NotificationStore: Send + Sync {
    fn clock(&self) -> &dyn Clock;

    fn insert(&self, new: NewNotification) -> AppResult<Notification>;

    /// Insert, or overwrite the row sharing `(recipient_id, group_id)`.
    /// Returns the row and whether it was newly created.
    fn upsert_grouped(&self, new: NewNotification) -> AppResult<(Notification, bool)>;

    fn get(&self, id: Uuid) -> AppResult<Option<Notification>>;

    /// Write every column of an already loaded row back, stamping `modified_at`.
    fn save(&self, notification: &mut Notification) -> AppResult<()>;

    fn find(&self, query: &NotificationQuery) -> AppResult<Vec<Notification>>;

    /// One page of matches plus the total number of matches.
    fn find_page(&self, query: &NotificationQuery, limit: i64, offset: i64) -> AppResult<(Vec<Notification>, i64)>;

    fn count(&self, query: &NotificationQuery) -> AppResult<i64>;

    /// Match counts per distinct value of `by`, largest first.
    fn count_by(&self, query: &NotificationQuery, by: GroupBy) -> AppResult<Vec<GroupCount>>;

    fn update(&self, query: &NotificationQuery, change: BulkUpdate) -> AppResult<usize>;

    fn delete(&self, query: &NotificationQuery) -> AppResult<usize>;

    /// Create or refresh a replicated user account.
    fn upsert_user(&self, id: Uuid, email: &str, is_active: bool) -> AppResult<()>;

    fn set_user_active(&self, id: Uuid, is_active: bool) -> AppResult<usize>;

    /// Drop a replicated user; their notifications go with them.
    fn remove_user(&self, id: Uuid) -> AppResult<usize>;

    fn ping(&self) -> AppResult<()>;

    fn get_required(&self, id: Uuid) -> AppResult<Notification> {
        self.get(id)?
            .ok_or_else(|| AppError::new(ErrorCode::NotificationNotFound, "notification not found"))
    }

    fn mark_all_as_read(&self, user_id: Uuid) -> AppResult<usize> {
        self.update(&NotificationQuery::all().by_user(user_id).unread(), BulkUpdate::SetRead(true))
    }

    fn mark_all_as_unread(&self, user_id: Uuid) -> AppResult<usize> {
        self.update(&NotificationQuery::all().by_user(user_id).read(), BulkUpdate::SetRead(false))
    }

    fn archive_all(&self, user_id: Uuid) -> AppResult<usize> {
        self.update(&NotificationQuery::all().by_user(user_id).visible(), BulkUpdate::SetVisible(false))
    }

    fn unarchive_all(&self, user_id: Uuid) -> AppResult<usize> {
        self.update(&NotificationQuery::all().by_user(user_id).hidden(), BulkUpdate::SetVisible(true))
    }

    /// Remove every expired notification, for all users.
    fn delete_all_expired(&self) -> AppResult<usize> {
        self.delete(&NotificationQuery::all().expired())
    }

    fn count_by_user(&self, query: &NotificationQuery) -> AppResult<Vec<GroupCount>> {
        self.count_by(query, GroupBy::User)
    }

    fn count_by_scope(&self, query: &NotificationQuery) -> AppResult<Vec<GroupCount>> {
        self.count_by(query, GroupBy::Scope)
    }

    fn count_by_priority(&self, query: &NotificationQuery) -> AppResult<Vec<GroupCount>> {
        self.count_by(query, GroupBy::Priority)
    }

    fn count_by_delivery_method(&self, query: &NotificationQuery) -> AppResult<Vec<GroupCount>> {
        self.count_by(query, GroupBy::DeliveryMethod)
    }

    fn count_by_severity(&self, query: &NotificationQuery) -> AppResult<Vec<GroupCount>> {
        self.count_by(query, GroupBy::Severity)
    }
}

/// Bulk statements must cover the whole selection.
pub(crate) fn ensure_unbounded(query: &NotificationQuery) -> AppResult<()> {
    if query.limit().is_some() {
        return Err(AppError::Validation("bulk changes cannot use a limited query".into()));
    }
    Ok(())
}

pub(crate) fn ensure_grouped(new: &NewNotification) -> AppResult<()> {
    if new.group_id.is_none() {
        return Err(AppError::Validation("grouped notifications need a group_id".into()));
    }
    Ok(())
}
