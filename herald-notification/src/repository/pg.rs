use std::sync::Arc;

use chrono::{DateTime, Utc};
use diesel::dsl::{count_star, sql};
use diesel::pg::data_types::PgInterval;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::Bool;
use diesel::upsert::{excluded, DecoratableTarget};
use uuid::Uuid;

use herald_shared::clients::db::{checkout, DbPool};
use herald_shared::errors::{AppError, AppResult, ErrorCode};

use crate::choices::{DeliveryMethod, Priority, Scope, Severity};
use crate::clock::Clock;
use crate::models::{NewNotification, NewUser, Notification, NotificationChangeset};
use crate::repository::query::{
    day_bounds, sort_counts, BulkUpdate, Filter, GroupBy, GroupCount, GroupKey, NotificationQuery,
};
use crate::repository::{ensure_grouped, ensure_unbounded, NotificationStore};
use crate::schema::{notifications, users};

type Predicate = Box<dyn BoxableExpression<notifications::table, Pg, SqlType = Bool>>;

/// Translate one filter into a SQL condition.
fn filter_predicate(filter: &Filter, now: DateTime<Utc>) -> Predicate {
    use crate::schema::notifications::dsl::*;

    match filter {
        Filter::Read(read) => Box::new(is_read.eq(*read)),
        Filter::Visible(visible) => Box::new(is_visible.eq(*visible)),
        Filter::Expired => Box::new(expires_at.is_not_null().and(expires_at.assume_not_null().le(now))),
        Filter::NotExpired => Box::new(expires_at.is_null().or(expires_at.assume_not_null().gt(now))),
        Filter::HasExpiry => Box::new(expires_at.is_not_null()),
        Filter::Recipient(user) => Box::new(recipient_id.assume_not_null().eq(*user)),
        Filter::Global => Box::new(recipient_id.is_null()),
        Filter::Scope(value) => Box::new(scope.eq(*value)),
        Filter::Priority(value) => Box::new(priority.eq(*value)),
        Filter::DeliveryMethod(value) => Box::new(delivery_method.eq(*value)),
        Filter::SeverityIn(values) => Box::new(severity.eq_any(values.clone())),
        Filter::Entity(entity) => Box::new(
            entity_type
                .assume_not_null()
                .eq(entity.object_type.clone())
                .and(entity_id.assume_not_null().eq(entity.object_id)),
        ),
        Filter::Group(group) => Box::new(group_id.assume_not_null().eq(group.clone())),
        Filter::CreatedToday => {
            let (start, end) = day_bounds(now);
            Box::new(created_at.ge(start).and(created_at.lt(end)))
        }
        Filter::CreatedWithin(window) => Box::new(created_at.ge(now - *window)),
        Filter::UpdatedWithin(window) => Box::new(modified_at.ge(now - *window)),
        Filter::ExpiresToday => {
            let (start, end) = day_bounds(now);
            Box::new(
                expires_at
                    .is_not_null()
                    .and(expires_at.assume_not_null().ge(start))
                    .and(expires_at.assume_not_null().lt(end)),
            )
        }
        Filter::ExpiringWithin(window) => Box::new(
            expires_at
                .is_not_null()
                .and(expires_at.assume_not_null().ge(now))
                .and(expires_at.assume_not_null().le(now + *window)),
        ),
        Filter::ActiveRecipient => Box::new(
            recipient_id
                .assume_not_null()
                .eq_any(users::table.filter(users::is_active.eq(true)).select(users::id)),
        ),
        Filter::Ids(ids) => Box::new(id.eq_any(ids.clone())),
    }
}

/// AND of every filter in the query. An empty query selects everything.
fn predicate(query: &NotificationQuery, now: DateTime<Utc>) -> Predicate {
    query
        .filters()
        .iter()
        .fold(Box::new(sql::<Bool>("TRUE")) as Predicate, |acc, filter| {
            Box::new(acc.and(filter_predicate(filter, now)))
        })
}

fn not_found() -> AppError {
    AppError::new(ErrorCode::NotificationNotFound, "notification not found")
}

/// Store backed by the `notifications` and `users` tables.
pub struct PgNotificationStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl PgNotificationStore {
    pub fn new(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Rewrite a limited query as an id list, so that set-based statements
    /// see exactly the rows a read would return.
    fn pin(&self, conn: &mut PgConnection, query: &NotificationQuery) -> AppResult<NotificationQuery> {
        let Some(limit) = query.limit() else {
            return Ok(query.clone());
        };
        let ids = notifications::table
            .filter(predicate(query, self.clock.now()))
            .order((notifications::created_at.desc(), notifications::id.desc()))
            .limit(limit)
            .select(notifications::id)
            .load::<Uuid>(conn)?;
        Ok(NotificationQuery::all().with_ids(ids))
    }
}

impl NotificationStore for PgNotificationStore {
    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn insert(&self, new: NewNotification) -> AppResult<Notification> {
        let mut conn = checkout(&self.pool)?;

        let notification = diesel::insert_into(notifications::table)
            .values(&new)
            .get_result::<Notification>(&mut conn)?;

        tracing::debug!(notification_id = %notification.id, "notification inserted");
        Ok(notification)
    }

    fn upsert_grouped(&self, new: NewNotification) -> AppResult<(Notification, bool)> {
        use crate::schema::notifications::dsl::*;

        ensure_grouped(&new)?;
        let mut conn = checkout(&self.pool)?;

        // xmax is zero only for a freshly inserted tuple.
        let (notification, created) = diesel::insert_into(notifications)
            .values(&new)
            .on_conflict((recipient_id, group_id))
            .filter_target(group_id.is_not_null())
            .do_update()
            .set((
                sender_type.eq(excluded(sender_type)),
                sender_id.eq(excluded(sender_id)),
                action.eq(excluded(action)),
                entity_type.eq(excluded(entity_type)),
                entity_id.eq(excluded(entity_id)),
                context.eq(excluded(context)),
                priority.eq(excluded(priority)),
                severity.eq(excluded(severity)),
                delivery_method.eq(excluded(delivery_method)),
                is_read.eq(false),
                modified_at.eq(excluded(modified_at)),
            ))
            .returning((crate::schema::notifications::all_columns, sql::<Bool>("xmax = 0")))
            .get_result::<(Notification, bool)>(&mut conn)?;

        Ok((notification, created))
    }

    fn get(&self, notification_id: Uuid) -> AppResult<Option<Notification>> {
        let mut conn = checkout(&self.pool)?;
        let notification = notifications::table
            .find(notification_id)
            .first::<Notification>(&mut conn)
            .optional()?;
        Ok(notification)
    }

    fn save(&self, notification: &mut Notification) -> AppResult<()> {
        let mut conn = checkout(&self.pool)?;
        notification.modified_at = self.clock.now();

        let updated = diesel::update(notifications::table.find(notification.id))
            .set(NotificationChangeset::from(&*notification))
            .execute(&mut conn)?;

        if updated == 0 {
            return Err(not_found());
        }
        Ok(())
    }

    fn find(&self, query: &NotificationQuery) -> AppResult<Vec<Notification>> {
        let mut conn = checkout(&self.pool)?;

        let mut statement = notifications::table
            .filter(predicate(query, self.clock.now()))
            .order((notifications::created_at.desc(), notifications::id.desc()))
            .into_boxed();
        if let Some(limit) = query.limit() {
            statement = statement.limit(limit);
        }

        Ok(statement.load::<Notification>(&mut conn)?)
    }

    fn find_page(&self, query: &NotificationQuery, limit: i64, offset: i64) -> AppResult<(Vec<Notification>, i64)> {
        let mut conn = checkout(&self.pool)?;
        let now = self.clock.now();

        let matching: i64 = notifications::table
            .filter(predicate(query, now))
            .count()
            .get_result(&mut conn)?;
        let total = query.limit().map_or(matching, |cap| matching.min(cap));

        let offset = offset.max(0);
        let take = (total - offset).clamp(0, limit.max(0));
        let items = notifications::table
            .filter(predicate(query, now))
            .order((notifications::created_at.desc(), notifications::id.desc()))
            .limit(take)
            .offset(offset)
            .load::<Notification>(&mut conn)?;

        Ok((items, total))
    }

    fn count(&self, query: &NotificationQuery) -> AppResult<i64> {
        let mut conn = checkout(&self.pool)?;
        let matching: i64 = notifications::table
            .filter(predicate(query, self.clock.now()))
            .count()
            .get_result(&mut conn)?;
        Ok(query.limit().map_or(matching, |cap| matching.min(cap)))
    }

    fn count_by(&self, query: &NotificationQuery, by: GroupBy) -> AppResult<Vec<GroupCount>> {
        let mut conn = checkout(&self.pool)?;
        let query = self.pin(&mut conn, query)?;
        let now = self.clock.now();

        macro_rules! grouped {
            ($column:expr, $value:ty, $key:path) => {
                notifications::table
                    .filter(predicate(&query, now))
                    .group_by($column)
                    .select(($column, count_star()))
                    .load::<($value, i64)>(&mut conn)?
                    .into_iter()
                    .map(|(value, total)| GroupCount { key: $key(value), total })
                    .collect::<Vec<_>>()
            };
        }

        let mut counts = match by {
            GroupBy::User => grouped!(notifications::recipient_id, Option<Uuid>, GroupKey::User),
            GroupBy::Scope => grouped!(notifications::scope, Scope, GroupKey::Scope),
            GroupBy::Priority => grouped!(notifications::priority, Priority, GroupKey::Priority),
            GroupBy::DeliveryMethod => {
                grouped!(notifications::delivery_method, DeliveryMethod, GroupKey::DeliveryMethod)
            }
            GroupBy::Severity => grouped!(notifications::severity, Severity, GroupKey::Severity),
        };
        sort_counts(&mut counts);
        Ok(counts)
    }

    fn update(&self, query: &NotificationQuery, change: BulkUpdate) -> AppResult<usize> {
        use crate::schema::notifications::dsl::*;

        ensure_unbounded(query)?;
        let mut conn = checkout(&self.pool)?;
        let now = self.clock.now();
        let target = notifications.filter(predicate(query, now));

        let affected = match change.clone() {
            BulkUpdate::SetRead(value) => diesel::update(target)
                .set((is_read.eq(value), modified_at.eq(now)))
                .execute(&mut conn)?,
            BulkUpdate::SetVisible(value) => diesel::update(target)
                .set((is_visible.eq(value), modified_at.eq(now)))
                .execute(&mut conn)?,
            BulkUpdate::SetSent(value) => diesel::update(target)
                .set((is_sent.eq(value), modified_at.eq(now)))
                .execute(&mut conn)?,
            BulkUpdate::SetPriority(value) => diesel::update(target)
                .set((priority.eq(value), modified_at.eq(now)))
                .execute(&mut conn)?,
            BulkUpdate::ExpireAt(at) => diesel::update(target)
                .set((expires_at.eq(Some(at)), modified_at.eq(now)))
                .execute(&mut conn)?,
            BulkUpdate::ExtendExpiry(by) => {
                let micros = by
                    .num_microseconds()
                    .ok_or_else(|| AppError::Validation("expiry extension is too large".into()))?;
                diesel::update(target)
                    .set((
                        expires_at.eq(expires_at + PgInterval::from_microseconds(micros)),
                        modified_at.eq(now),
                    ))
                    .execute(&mut conn)?
            }
        };

        tracing::debug!(?change, affected, "bulk notification update");
        Ok(affected)
    }

    fn delete(&self, query: &NotificationQuery) -> AppResult<usize> {
        ensure_unbounded(query)?;
        let mut conn = checkout(&self.pool)?;

        let deleted = diesel::delete(notifications::table.filter(predicate(query, self.clock.now())))
            .execute(&mut conn)?;

        tracing::debug!(deleted, "bulk notification delete");
        Ok(deleted)
    }

    fn upsert_user(&self, user_id: Uuid, email: &str, is_active: bool) -> AppResult<()> {
        let mut conn = checkout(&self.pool)?;

        let new_user = NewUser {
            id: user_id,
            email: email.to_string(),
            is_active,
        };
        diesel::insert_into(users::table)
            .values(&new_user)
            .on_conflict(users::id)
            .do_update()
            .set((
                users::email.eq(excluded(users::email)),
                users::is_active.eq(excluded(users::is_active)),
            ))
            .execute(&mut conn)?;

        Ok(())
    }

    fn set_user_active(&self, user_id: Uuid, is_active: bool) -> AppResult<usize> {
        let mut conn = checkout(&self.pool)?;
        let updated = diesel::update(users::table.find(user_id))
            .set(users::is_active.eq(is_active))
            .execute(&mut conn)?;
        Ok(updated)
    }

    fn remove_user(&self, user_id: Uuid) -> AppResult<usize> {
        let mut conn = checkout(&self.pool)?;
        // notifications.recipient_id cascades
        let deleted = diesel::delete(users::table.find(user_id)).execute(&mut conn)?;
        Ok(deleted)
    }

    fn ping(&self) -> AppResult<()> {
        let mut conn = checkout(&self.pool)?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }
}
