use std::fmt;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use herald_shared::errors::{AppError, AppResult};

use crate::choices::{DeliveryMethod, Priority, Scope, Severity};
use crate::refs::{ObjectRef, ObjectResolver};
use crate::schema::{notifications, users};

/// One notification instance.
///
/// Generalized shape: `<recipient> <action> <on entity> <with context> <at time>`,
/// e.g. `john_doe liked post:42 {"post_title": "Great Tips"} (5 minutes ago)`.
/// A missing recipient makes the notification global.
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = notifications)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub sender_type: String,
    pub sender_id: i64,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub context: Option<serde_json::Value>,
    pub is_read: bool,
    pub is_sent: bool,
    pub is_visible: bool,
    pub priority: Priority,
    pub severity: Severity,
    pub delivery_method: DeliveryMethod,
    pub scope: Scope,
    pub group_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Notification {
    pub fn sender(&self) -> ObjectRef {
        ObjectRef::new(self.sender_type.clone(), self.sender_id)
    }

    pub fn entity(&self) -> Option<ObjectRef> {
        match (&self.entity_type, self.entity_id) {
            (Some(t), Some(id)) => Some(ObjectRef::new(t.clone(), id)),
            _ => None,
        }
    }

    pub fn is_global(&self) -> bool {
        self.recipient_id.is_none()
    }

    /// Expired once `expires_at` is reached. Permanent notifications never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    pub fn is_high_severity(&self) -> bool {
        self.severity.is_critical()
    }

    pub fn get_group_display(&self) -> &str {
        self.group_id.as_deref().unwrap_or("Ungrouped")
    }

    /// `Action: <action>[, Context: <json>][, Related Entity: <label>]`
    pub fn get_display_message(&self, resolver: &dyn ObjectResolver) -> String {
        let mut message = format!("Action: {}", self.action);
        if let Some(context) = self.context.as_ref().filter(|c| !is_empty_json(c)) {
            message.push_str(&format!(", Context: {context}"));
        }
        if let Some(label) = self.entity().and_then(|e| resolver.resolve(&e)) {
            message.push_str(&format!(", Related Entity: {label}"));
        }
        message
    }

    pub fn human_readable_time(&self, now: DateTime<Utc>) -> String {
        let seconds = (now - self.created_at).num_seconds();
        if seconds < 60 {
            "just now".to_string()
        } else if seconds < 3_600 {
            let minutes = seconds / 60;
            format!("{minutes} minute{} ago", plural(minutes))
        } else if seconds < 86_400 {
            let hours = seconds / 3_600;
            format!("{hours} hour{} ago", plural(hours))
        } else if seconds < 172_800 {
            "yesterday".to_string()
        } else {
            self.created_at.format("%b %d, %Y").to_string()
        }
    }

    /// Age in at most two adjacent units, e.g. `1 day, 3 hours ago`.
    pub fn time_since_created(&self, now: DateTime<Utc>) -> String {
        const UNITS: [(i64, &str); 6] = [
            (365 * 86_400, "year"),
            (30 * 86_400, "month"),
            (7 * 86_400, "week"),
            (86_400, "day"),
            (3_600, "hour"),
            (60, "minute"),
        ];

        let seconds = (now - self.created_at).num_seconds().max(0);
        let Some(first) = UNITS.iter().position(|(size, _)| seconds >= *size) else {
            return "0 minutes ago".to_string();
        };

        let (size, name) = UNITS[first];
        let count = seconds / size;
        let mut parts = vec![format!("{count} {name}{}", plural(count))];
        if let Some(&(next_size, next_name)) = UNITS.get(first + 1) {
            let rest = (seconds - count * size) / next_size;
            if rest > 0 {
                parts.push(format!("{rest} {next_name}{}", plural(rest)));
            }
        }
        format!("{} ago", parts.join(", "))
    }

    /// Creation instant as `March 10, 2024, 3:30 p.m.` (UTC).
    pub fn natural_day(&self) -> String {
        let at = self.created_at;
        format!("{} {}, {}, {}", month_abbrev(at.month()), at.day(), at.year(), clock_label(at.hour(), at.minute()))
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.recipient_id {
            Some(user) => write!(f, "Notification(id={}, action={}, user={user})", self.id, self.action),
            None => write!(f, "Notification(id={}, action={}, global)", self.id, self.action),
        }
    }
}

fn plural(n: i64) -> &'static str {
    if n > 1 { "s" } else { "" }
}

fn month_abbrev(month: u32) -> &'static str {
    match month {
        1 => "Jan.",
        2 => "Feb.",
        3 => "March",
        4 => "April",
        5 => "May",
        6 => "June",
        7 => "July",
        8 => "Aug.",
        9 => "Sept.",
        10 => "Oct.",
        11 => "Nov.",
        _ => "Dec.",
    }
}

fn clock_label(hour: u32, minute: u32) -> String {
    match (hour, minute) {
        (0, 0) => "midnight".to_string(),
        (12, 0) => "noon".to_string(),
        _ => {
            let meridiem = if hour < 12 { "a.m." } else { "p.m." };
            let h = match hour % 12 {
                0 => 12,
                h => h,
            };
            if minute == 0 {
                format!("{h} {meridiem}")
            } else {
                format!("{h}:{minute:02} {meridiem}")
            }
        }
    }
}

fn is_empty_json(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = notifications)]
pub struct NewNotification {
    pub id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub sender_type: String,
    pub sender_id: i64,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub context: Option<serde_json::Value>,
    pub is_read: bool,
    pub is_sent: bool,
    pub is_visible: bool,
    pub priority: Priority,
    pub severity: Severity,
    pub delivery_method: DeliveryMethod,
    pub scope: Scope,
    pub group_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl NewNotification {
    /// A fresh row with column defaults, stamped at `now`.
    pub fn new(sender: ObjectRef, action: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            recipient_id: None,
            sender_type: sender.object_type,
            sender_id: sender.object_id,
            action: action.into(),
            entity_type: None,
            entity_id: None,
            context: None,
            is_read: false,
            is_sent: false,
            is_visible: true,
            priority: Priority::default(),
            severity: Severity::default(),
            delivery_method: DeliveryMethod::default(),
            scope: Scope::default(),
            group_id: None,
            expires_at: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn recipient(mut self, recipient_id: Option<Uuid>) -> Self {
        self.recipient_id = recipient_id;
        self
    }

    pub fn entity(mut self, entity: Option<ObjectRef>) -> Self {
        let (entity_type, entity_id) = match entity {
            Some(e) => (Some(e.object_type), Some(e.object_id)),
            None => (None, None),
        };
        self.entity_type = entity_type;
        self.entity_id = entity_id;
        self
    }

    pub fn context(mut self, context: Option<serde_json::Value>) -> Self {
        self.context = context;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn delivery_method(mut self, delivery_method: DeliveryMethod) -> Self {
        self.delivery_method = delivery_method;
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn group_id(mut self, group_id: Option<String>) -> Self {
        self.group_id = group_id;
        self
    }

    /// Expire `ttl` after creation. Fails when the instant is not representable.
    pub fn expires_in(mut self, ttl: Duration) -> AppResult<Self> {
        let at = self
            .created_at
            .checked_add_signed(ttl)
            .ok_or_else(|| AppError::Validation(format!("expiry {ttl} after creation is out of range")))?;
        self.expires_at = Some(at);
        Ok(self)
    }

    pub fn expires_in_hours(self, hours: i64) -> AppResult<Self> {
        let ttl = Duration::try_hours(hours)
            .ok_or_else(|| AppError::Validation(format!("expires_in_hours {hours} is out of range")))?;
        self.expires_in(ttl)
    }

    /// The row this insert would produce, as the store would return it.
    pub fn into_notification(self) -> Notification {
        Notification {
            id: self.id,
            recipient_id: self.recipient_id,
            sender_type: self.sender_type,
            sender_id: self.sender_id,
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            context: self.context,
            is_read: self.is_read,
            is_sent: self.is_sent,
            is_visible: self.is_visible,
            priority: self.priority,
            severity: self.severity,
            delivery_method: self.delivery_method,
            scope: self.scope,
            group_id: self.group_id,
            expires_at: self.expires_at,
            created_at: self.created_at,
            modified_at: self.modified_at,
        }
    }
}

/// Full-row update used when a single loaded notification is saved back.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = notifications, treat_none_as_null = true)]
pub struct NotificationChangeset<'a> {
    pub recipient_id: Option<Uuid>,
    pub sender_type: &'a str,
    pub sender_id: i64,
    pub action: &'a str,
    pub entity_type: Option<&'a str>,
    pub entity_id: Option<i64>,
    pub context: Option<&'a serde_json::Value>,
    pub is_read: bool,
    pub is_sent: bool,
    pub is_visible: bool,
    pub priority: Priority,
    pub severity: Severity,
    pub delivery_method: DeliveryMethod,
    pub scope: Scope,
    pub group_id: Option<&'a str>,
    pub expires_at: Option<DateTime<Utc>>,
    pub modified_at: DateTime<Utc>,
}

impl<'a> From<&'a Notification> for NotificationChangeset<'a> {
    fn from(n: &'a Notification) -> Self {
        Self {
            recipient_id: n.recipient_id,
            sender_type: &n.sender_type,
            sender_id: n.sender_id,
            action: &n.action,
            entity_type: n.entity_type.as_deref(),
            entity_id: n.entity_id,
            context: n.context.as_ref(),
            is_read: n.is_read,
            is_sent: n.is_sent,
            is_visible: n.is_visible,
            priority: n.priority,
            severity: n.severity,
            delivery_method: n.delivery_method,
            scope: n.scope,
            group_id: n.group_id.as_deref(),
            expires_at: n.expires_at,
            modified_at: n.modified_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Serialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub is_active: bool,
}
