use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use flashtrack_types::events::GatewayEvent;

/// Outbound half of a live connection.
pub type ChannelSender = mpsc::UnboundedSender<GatewayEvent>;

/// What happened to a targeted send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No live channel for the account.
    Offline,
    /// The channel was dead and has been unregistered.
    Failed,
}

/// Live notification channels: at most one per account.
///
/// Locks are never held across an await point, so a plain std `RwLock`
/// is enough and lets [`Registration`] clean up synchronously on drop.
#[derive(Clone, Default)]
pub struct Registry {
    channels: Arc<RwLock<HashMap<i64, Entry>>>,
}

struct Entry {
    conn_id: Uuid,
    tx: ChannelSender,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `tx` as the account's channel, replacing any previous one.
    /// The replaced sender is dropped, which closes the old connection's
    /// receiver. Returns the id of the new connection.
    pub fn register(&self, account_id: i64, tx: ChannelSender) -> Uuid {
        let conn_id = Uuid::new_v4();
        let replaced = self.write().insert(account_id, Entry { conn_id, tx });
        if let Some(old) = replaced {
            debug!("Account {} reconnected, replacing channel {}", account_id, old.conn_id);
        }
        conn_id
    }

    /// Register a fresh channel and return a guard that unregisters it when
    /// dropped, together with the receiving half.
    pub fn attach(&self, account_id: i64) -> (Registration, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn_id = self.register(account_id, tx);
        let registration = Registration {
            registry: self.clone(),
            account_id,
            conn_id,
        };
        (registration, rx)
    }

    /// Remove whatever channel the account has. No-op if there is none.
    pub fn unregister(&self, account_id: i64) -> bool {
        self.write().remove(&account_id).is_some()
    }

    /// Remove the account's channel only if it is still `conn_id`; a newer
    /// connection that replaced it is left alone.
    pub fn unregister_connection(&self, account_id: i64, conn_id: Uuid) -> bool {
        let mut channels = self.write();
        match channels.get(&account_id) {
            Some(entry) if entry.conn_id == conn_id => {
                channels.remove(&account_id);
                true
            }
            _ => false,
        }
    }

    /// Send a targeted event. A failed write unregisters the dead channel.
    pub fn send(&self, account_id: i64, event: GatewayEvent) -> Delivery {
        let (conn_id, result) = {
            let channels = self.read();
            match channels.get(&account_id) {
                Some(entry) => (entry.conn_id, entry.tx.send(event)),
                None => return Delivery::Offline,
            }
        };

        match result {
            Ok(()) => Delivery::Delivered,
            Err(_) => {
                self.unregister_connection(account_id, conn_id);
                Delivery::Failed
            }
        }
    }

    pub fn is_connected(&self, account_id: i64) -> bool {
        self.read().contains_key(&account_id)
    }

    pub fn connection_id(&self, account_id: i64) -> Option<Uuid> {
        self.read().get(&account_id).map(|entry| entry.conn_id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<i64, Entry>> {
        self.channels.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<i64, Entry>> {
        self.channels.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Scoped ownership of a registry slot. Dropping it unregisters the
/// connection unless a newer one has already taken over.
pub struct Registration {
    registry: Registry,
    account_id: i64,
    conn_id: Uuid,
}

impl Registration {
    pub fn account_id(&self) -> i64 {
        self.account_id
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.registry.unregister_connection(self.account_id, self.conn_id) {
            debug!("Channel {} for account {} unregistered", self.conn_id, self.account_id);
        }
    }
}
