use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use herald_shared::errors::{AppError, AppResult, ErrorCode};

use crate::clock::Clock;
use crate::models::{NewNotification, Notification};
use crate::repository::query::{sort_counts, BulkUpdate, GroupBy, GroupCount, GroupKey, NotificationQuery};
use crate::repository::{ensure_grouped, ensure_unbounded, NotificationStore};

#[derive(Debug, Default)]
struct State {
    rows: Vec<Notification>,
    /// user id -> is_active
    users: HashMap<Uuid, bool>,
}

impl State {
    fn is_active(&self, id: Uuid) -> bool {
        self.users.get(&id).copied().unwrap_or(false)
    }

    fn check_recipient(&self, recipient: Option<Uuid>) -> AppResult<()> {
        match recipient {
            Some(user) if !self.users.contains_key(&user) => Err(AppError::Database(DieselError::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation,
                Box::new(format!("recipient {user} does not exist")),
            ))),
            _ => Ok(()),
        }
    }

    fn matching(&self, query: &NotificationQuery, now: chrono::DateTime<chrono::Utc>) -> Vec<&Notification> {
        let is_active = |id: Uuid| self.is_active(id);
        let mut rows: Vec<&Notification> = self
            .rows
            .iter()
            .filter(|n| query.matches(n, now, &is_active))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        if let Some(limit) = query.limit() {
            rows.truncate(limit as usize);
        }
        rows
    }
}

/// Store kept entirely in process memory. Same semantics as the PostgreSQL
/// store, including the foreign key on recipients and the atomic grouped
/// upsert (the write lock is held across check and write).
pub struct MemoryNotificationStore {
    clock: Arc<dyn Clock>,
    state: RwLock<State>,
}

impl MemoryNotificationStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> AppResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| AppError::internal("notification store lock poisoned"))
    }

    fn write(&self) -> AppResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| AppError::internal("notification store lock poisoned"))
    }
}

impl NotificationStore for MemoryNotificationStore {
    fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn insert(&self, new: NewNotification) -> AppResult<Notification> {
        let mut state = self.write()?;
        state.check_recipient(new.recipient_id)?;
        let notification = new.into_notification();
        state.rows.push(notification.clone());
        Ok(notification)
    }

    fn upsert_grouped(&self, new: NewNotification) -> AppResult<(Notification, bool)> {
        ensure_grouped(&new)?;
        let mut state = self.write()?;
        state.check_recipient(new.recipient_id)?;

        let existing = state
            .rows
            .iter_mut()
            .find(|n| n.recipient_id == new.recipient_id && n.group_id == new.group_id);

        if let Some(row) = existing {
            row.sender_type = new.sender_type;
            row.sender_id = new.sender_id;
            row.action = new.action;
            row.entity_type = new.entity_type;
            row.entity_id = new.entity_id;
            row.context = new.context;
            row.priority = new.priority;
            row.severity = new.severity;
            row.delivery_method = new.delivery_method;
            row.is_read = false;
            row.modified_at = new.modified_at;
            return Ok((row.clone(), false));
        }

        let notification = new.into_notification();
        state.rows.push(notification.clone());
        Ok((notification, true))
    }

    fn get(&self, id: Uuid) -> AppResult<Option<Notification>> {
        Ok(self.read()?.rows.iter().find(|n| n.id == id).cloned())
    }

    fn save(&self, notification: &mut Notification) -> AppResult<()> {
        let mut state = self.write()?;
        state.check_recipient(notification.recipient_id)?;
        let row = state
            .rows
            .iter_mut()
            .find(|n| n.id == notification.id)
            .ok_or_else(|| AppError::new(ErrorCode::NotificationNotFound, "notification not found"))?;

        notification.modified_at = self.clock.now();
        *row = notification.clone();
        Ok(())
    }

    fn find(&self, query: &NotificationQuery) -> AppResult<Vec<Notification>> {
        let state = self.read()?;
        Ok(state
            .matching(query, self.clock.now())
            .into_iter()
            .cloned()
            .collect())
    }

    fn find_page(&self, query: &NotificationQuery, limit: i64, offset: i64) -> AppResult<(Vec<Notification>, i64)> {
        let state = self.read()?;
        let rows = state.matching(query, self.clock.now());
        let total = rows.len() as i64;
        let page = rows
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    fn count(&self, query: &NotificationQuery) -> AppResult<i64> {
        let state = self.read()?;
        Ok(state.matching(query, self.clock.now()).len() as i64)
    }

    fn count_by(&self, query: &NotificationQuery, by: GroupBy) -> AppResult<Vec<GroupCount>> {
        let state = self.read()?;
        let mut totals: HashMap<GroupKey, i64> = HashMap::new();
        for n in state.matching(query, self.clock.now()) {
            *totals.entry(GroupKey::of(n, by)).or_default() += 1;
        }

        let mut counts: Vec<GroupCount> = totals
            .into_iter()
            .map(|(key, total)| GroupCount { key, total })
            .collect();
        sort_counts(&mut counts);
        Ok(counts)
    }

    fn update(&self, query: &NotificationQuery, change: BulkUpdate) -> AppResult<usize> {
        ensure_unbounded(query)?;
        let now = self.clock.now();
        let mut state = self.write()?;

        let selected: Vec<bool> = state
            .rows
            .iter()
            .map(|n| query.matches(n, now, &|id| state.is_active(id)))
            .collect();
        let mut affected = 0;
        for (row, hit) in state.rows.iter_mut().zip(selected) {
            if hit {
                change.apply(row);
                row.modified_at = now;
                affected += 1;
            }
        }
        Ok(affected)
    }

    fn delete(&self, query: &NotificationQuery) -> AppResult<usize> {
        ensure_unbounded(query)?;
        let now = self.clock.now();
        let mut state = self.write()?;

        let keep: Vec<bool> = state
            .rows
            .iter()
            .map(|n| !query.matches(n, now, &|id| state.is_active(id)))
            .collect();
        let before = state.rows.len();
        let mut keep = keep.into_iter();
        state.rows.retain(|_| keep.next().unwrap_or(true));
        Ok(before - state.rows.len())
    }

    fn upsert_user(&self, id: Uuid, _email: &str, is_active: bool) -> AppResult<()> {
        self.write()?.users.insert(id, is_active);
        Ok(())
    }

    fn set_user_active(&self, id: Uuid, is_active: bool) -> AppResult<usize> {
        let mut state = self.write()?;
        match state.users.get_mut(&id) {
            Some(active) => {
                *active = is_active;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    fn remove_user(&self, id: Uuid) -> AppResult<usize> {
        let mut state = self.write()?;
        if state.users.remove(&id).is_none() {
            return Ok(0);
        }
        state.rows.retain(|n| n.recipient_id != Some(id));
        Ok(1)
    }

    fn ping(&self) -> AppResult<()> {
        self.read().map(|_| ())
    }
}
