use uuid::Uuid;

use herald_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::Notification;
use crate::repository::NotificationStore;

/// Load a notification on behalf of a user. Rows addressed to someone else
/// (or to nobody) are reported as missing.
pub fn fetch_for_user(store: &dyn NotificationStore, id: Uuid, user_id: Uuid) -> AppResult<Notification> {
    let notification = store.get_required(id)?;
    if notification.recipient_id != Some(user_id) {
        return Err(AppError::new(ErrorCode::NotificationNotFound, "notification not found"));
    }
    Ok(notification)
}

/// Returns whether anything was written.
pub fn mark_as_read(store: &dyn NotificationStore, notification: &mut Notification) -> AppResult<bool> {
    if notification.is_read {
        return Ok(false);
    }
    notification.is_read = true;
    store.save(notification)?;
    Ok(true)
}

pub fn mark_as_unread(store: &dyn NotificationStore, notification: &mut Notification) -> AppResult<bool> {
    if !notification.is_read {
        return Ok(false);
    }
    notification.is_read = false;
    store.save(notification)?;
    Ok(true)
}

/// Flip `is_read`. Always writes.
pub fn toggle_read_status(store: &dyn NotificationStore, notification: &mut Notification) -> AppResult<()> {
    notification.is_read = !notification.is_read;
    store.save(notification)
}

pub fn archive(store: &dyn NotificationStore, notification: &mut Notification) -> AppResult<bool> {
    if !notification.is_visible {
        return Ok(false);
    }
    notification.is_visible = false;
    store.save(notification)?;
    Ok(true)
}

pub fn unarchive(store: &dyn NotificationStore, notification: &mut Notification) -> AppResult<bool> {
    if notification.is_visible {
        return Ok(false);
    }
    notification.is_visible = true;
    store.save(notification)?;
    Ok(true)
}

/// Hand an unsent notification over for delivery. The transport itself lives
/// outside this service; here the row is flagged and the dispatch logged.
pub fn send_notification(store: &dyn NotificationStore, notification: &mut Notification) -> AppResult<bool> {
    if notification.is_sent {
        return Ok(false);
    }
    notification.is_sent = true;
    store.save(notification)?;

    tracing::info!(
        notification_id = %notification.id,
        recipient_id = ?notification.recipient_id,
        delivery_method = %notification.delivery_method,
        "notification dispatched"
    );
    Ok(true)
}

/// Dispatch an already sent notification again. No state changes.
pub fn resend_notification(notification: &Notification) -> bool {
    if !notification.is_sent {
        return false;
    }
    tracing::info!(
        notification_id = %notification.id,
        recipient_id = ?notification.recipient_id,
        delivery_method = %notification.delivery_method,
        "notification re-dispatched"
    );
    true
}
