use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ Event envelope wrapping all domain events.
///
/// Routing key format: `herald.{domain}.{entity}.{action}`
/// Example: `herald.notification.requested`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub data: T,
}

/// RabbitMQ routing keys
pub mod routing_keys {
    // Auth events
    pub const AUTH_USER_REGISTERED: &str = "herald.auth.user.registered";
    pub const AUTH_USER_BANNED: &str = "herald.auth.user.banned";
    pub const AUTH_USER_DELETED: &str = "herald.auth.user.deleted";

    // Notification events
    pub const NOTIFICATION_REQUESTED: &str = "herald.notification.requested";
}

/// Common event data payloads
pub mod payloads {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct UserRegistered {
        pub credential_id: Uuid,
        pub email: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct UserBanned {
        pub credential_id: Uuid,
        pub is_banned: bool,
        pub ban_until: Option<chrono::DateTime<chrono::Utc>>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct UserDeleted {
        pub credential_id: Uuid,
    }

    /// Weak reference to an object owned by another service.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ObjectRefPayload {
        pub object_type: String,
        pub object_id: i64,
    }

    /// Ask the notification service to create a notification.
    ///
    /// `service_type` selects the creation strategy (`default`, `grouped`,
    /// `expiring`). Enumerated fields travel as their lowercase names and are
    /// parsed by the consumer.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct NotificationRequested {
        pub service_type: String,
        pub recipient_id: Option<Uuid>,
        pub sender: Option<ObjectRefPayload>,
        pub entity: Option<ObjectRefPayload>,
        pub action: String,
        #[serde(default)]
        pub context: Option<serde_json::Value>,
        #[serde(default)]
        pub group_id: Option<String>,
        #[serde(default)]
        pub expires_in_hours: Option<i64>,
        #[serde(default)]
        pub priority: Option<String>,
        #[serde(default)]
        pub severity: Option<String>,
        #[serde(default)]
        pub delivery_method: Option<String>,
        #[serde(default)]
        pub scope: Option<String>,
    }
}
