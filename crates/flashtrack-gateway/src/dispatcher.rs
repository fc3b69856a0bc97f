use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use flashtrack_db::Database;
use flashtrack_types::events::GatewayEvent;
use flashtrack_types::models::Notification;

use crate::registry::{Delivery, Registration, Registry};

/// Best-effort real-time delivery of persisted notifications.
///
/// Notifications are always written to the store before they reach the
/// dispatcher, so a failed push only delays them until the recipient pulls
/// the list or reconnects.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Registry,
    db: Arc<Database>,
}

/// A freshly attached connection: its registry slot, the unread backlog to
/// flush first, and the live event stream.
pub struct Session {
    pub registration: Registration,
    pub backlog: Vec<Notification>,
    pub rx: mpsc::UnboundedReceiver<GatewayEvent>,
}

impl Dispatcher {
    pub fn new(registry: Registry, db: Arc<Database>) -> Self {
        Self { registry, db }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Push a stored notification to its recipient if they are connected.
    /// Never fails the caller; problems are logged.
    pub fn dispatch(&self, notification: &Notification) -> Delivery {
        let recipient = notification.user_id;
        let delivery = self
            .registry
            .send(recipient, GatewayEvent::Notification(notification.clone()));

        match delivery {
            Delivery::Delivered => {
                debug!("Notification {} pushed to account {}", notification.id, recipient)
            }
            Delivery::Offline => {
                debug!("Account {} offline, notification {} kept for pull", recipient, notification.id)
            }
            Delivery::Failed => warn!(
                "Dropped dead channel for account {} while pushing notification {}",
                recipient, notification.id
            ),
        }

        delivery
    }

    /// Register a new channel for `account_id` and load its unread backlog,
    /// newest first. The channel is registered before the backlog is read so
    /// nothing created in between is missed; callers skip live events whose
    /// id already appeared in the backlog.
    pub async fn connect(&self, account_id: i64) -> Result<Session> {
        let (registration, rx) = self.registry.attach(account_id);

        let db = self.db.clone();
        let rows = tokio::task::spawn_blocking(move || db.list_notifications(account_id, true)).await??;
        let backlog = rows.into_iter().map(|row| row.into_notification()).collect();

        Ok(Session {
            registration,
            backlog,
            rx,
        })
    }
}
