use serde::{Deserialize, Serialize};

use crate::models::Notification;

/// Events sent over the notification gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Connection accepted; `unread` backlog frames follow immediately.
    Ready { account_id: i64, unread: usize },

    /// A notification for the connected account
    Notification(Notification),
}

impl GatewayEvent {
    /// Id of the carried notification, if any.
    pub fn notification_id(&self) -> Option<i64> {
        match self {
            Self::Notification(n) => Some(n.id),
            Self::Ready { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_wire_shape() {
        let event = GatewayEvent::Notification(Notification {
            id: 3,
            user_id: 9,
            title: "New Task Assigned".into(),
            message: "You have been assigned to complaint #1: Leak".into(),
            kind: "assignment".into(),
            complaint_id: Some(1),
            is_read: false,
            created_at: Utc::now(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Notification");
        assert_eq!(json["data"]["type"], "assignment");
        assert_eq!(json["data"]["complaint_id"], 1);
        assert_eq!(event.notification_id(), Some(3));

        let ready = serde_json::to_value(GatewayEvent::Ready { account_id: 9, unread: 2 }).unwrap();
        assert_eq!(ready, serde_json::json!({ "type": "Ready", "data": { "account_id": 9, "unread": 2 } }));
    }
}
