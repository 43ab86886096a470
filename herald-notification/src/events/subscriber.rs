use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use futures_lite::StreamExt;
use lapin::options::BasicAckOptions;

use herald_shared::errors::{AppError, AppResult, ErrorCode};
use herald_shared::types::event::{payloads, routing_keys, Event};

use crate::choices::{DeliveryMethod, ParseChoiceError, Priority, Scope, Severity};
use crate::refs::ObjectRef;
use crate::repository::NotificationStore;
use crate::services::creation::{CreateOptions, Created, NotificationServiceFactory, ServiceContext, ServiceKind};
use crate::AppState;

fn parse_choice<T>(value: Option<&str>) -> AppResult<Option<T>>
where
    T: FromStr<Err = ParseChoiceError>,
{
    value
        .map(str::parse::<T>)
        .transpose()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))
}

/// Create the notification described by a `notification.requested` event.
pub fn handle_notification_requested(
    store: &dyn NotificationStore,
    request: payloads::NotificationRequested,
) -> AppResult<Created> {
    let kind: ServiceKind = request.service_type.parse()?;

    let options = CreateOptions {
        action: request.action,
        priority: parse_choice::<Priority>(request.priority.as_deref())?,
        severity: parse_choice::<Severity>(request.severity.as_deref())?,
        delivery_method: parse_choice::<DeliveryMethod>(request.delivery_method.as_deref())?,
        scope: parse_choice::<Scope>(request.scope.as_deref())?,
        group_id: request.group_id,
        expires_in_hours: request.expires_in_hours,
    };
    let ctx = ServiceContext {
        recipient: request.recipient_id,
        sender: request.sender.map(ObjectRef::from),
        entity: request.entity.map(ObjectRef::from),
        context: request.context,
    };

    NotificationServiceFactory::get_service(kind, ctx).create_notification(store, &options)
}

pub fn handle_user_registered(store: &dyn NotificationStore, data: &payloads::UserRegistered) -> AppResult<()> {
    store.upsert_user(data.credential_id, &data.email, true)
}

pub fn handle_user_banned(store: &dyn NotificationStore, data: &payloads::UserBanned) -> AppResult<usize> {
    store.set_user_active(data.credential_id, !data.is_banned)
}

pub fn handle_user_deleted(store: &dyn NotificationStore, data: &payloads::UserDeleted) -> AppResult<usize> {
    store.remove_user(data.credential_id)
}

/// Listen for notification requests from other services.
/// Bad requests are logged and acknowledged; they are never redelivered.
pub async fn listen_notification_requests(state: Arc<AppState>) -> anyhow::Result<()> {
    let rabbitmq = state.rabbitmq.as_ref().context("rabbitmq client not configured")?;
    let mut consumer = rabbitmq
        .subscribe("herald-notification.requested", &[routing_keys::NOTIFICATION_REQUESTED])
        .await?;

    tracing::info!("listening for notification requests");

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                match serde_json::from_slice::<Event<payloads::NotificationRequested>>(&delivery.data) {
                    Ok(event) => {
                        let source = event.source.clone();
                        match handle_notification_requested(state.store.as_ref(), event.data) {
                            Ok(created) => {
                                tracing::info!(
                                    notification_id = %created.notification.id,
                                    created = created.created,
                                    source = %source,
                                    "notification request handled"
                                );
                            }
                            Err(e) => {
                                tracing::error!(error = %e, source = %source, "failed to handle notification request");
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to deserialize notification.requested event");
                    }
                }

                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "notification request consumer error");
            }
        }
    }

    Ok(())
}

/// Keep the local users replica in step with the auth service.
pub async fn listen_user_events(state: Arc<AppState>) -> anyhow::Result<()> {
    let rabbitmq = state.rabbitmq.as_ref().context("rabbitmq client not configured")?;
    let mut consumer = rabbitmq
        .subscribe(
            "herald-notification.users",
            &[
                routing_keys::AUTH_USER_REGISTERED,
                routing_keys::AUTH_USER_BANNED,
                routing_keys::AUTH_USER_DELETED,
            ],
        )
        .await?;

    tracing::info!("listening for user events");

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                let routing_key = delivery.routing_key.to_string();
                let store = state.store.as_ref();

                let result = if routing_key == routing_keys::AUTH_USER_REGISTERED {
                    serde_json::from_slice::<Event<payloads::UserRegistered>>(&delivery.data)
                        .map_err(anyhow::Error::from)
                        .and_then(|event| {
                            tracing::info!(user_id = %event.data.credential_id, "received user.registered event");
                            handle_user_registered(store, &event.data).map_err(anyhow::Error::from)
                        })
                } else if routing_key == routing_keys::AUTH_USER_BANNED {
                    serde_json::from_slice::<Event<payloads::UserBanned>>(&delivery.data)
                        .map_err(anyhow::Error::from)
                        .and_then(|event| {
                            tracing::info!(
                                user_id = %event.data.credential_id,
                                is_banned = event.data.is_banned,
                                "received user.banned event"
                            );
                            handle_user_banned(store, &event.data)
                                .map(|_| ())
                                .map_err(anyhow::Error::from)
                        })
                } else if routing_key == routing_keys::AUTH_USER_DELETED {
                    serde_json::from_slice::<Event<payloads::UserDeleted>>(&delivery.data)
                        .map_err(anyhow::Error::from)
                        .and_then(|event| {
                            tracing::info!(user_id = %event.data.credential_id, "received user.deleted event");
                            handle_user_deleted(store, &event.data)
                                .map(|_| ())
                                .map_err(anyhow::Error::from)
                        })
                } else {
                    tracing::warn!(routing_key = %routing_key, "unexpected routing key");
                    Ok(())
                };

                if let Err(e) = result {
                    tracing::error!(error = %e, routing_key = %routing_key, "failed to handle user event");
                }

                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "user event consumer error");
            }
        }
    }

    Ok(())
}
