use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;

use flashtrack_gateway::connection;
use flashtrack_types::api::{MarkReadRequest, NotificationList};
use flashtrack_types::models::Notification;

use crate::access::Caller;
use crate::auth::AppStateInner;
use crate::error::{ApiError, AuthError, NotFoundError};
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::authenticate;
use crate::with_db;

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread: bool,
}

/// Browsers cannot set headers on a WebSocket handshake, so the token may
/// also come as a query parameter.
#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

pub async fn list(
    State(state): State<Arc<AppStateInner>>,
    Extension(caller): Extension<Caller>,
    ApiQuery(query): ApiQuery<NotificationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let notifications = list_notifications(&state, &caller, query.unread).await?;
    Ok(Json(NotificationList { notifications }))
}

pub async fn mark_read(
    State(state): State<Arc<AppStateInner>>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    mark_notification_read(&state, &caller, req.notification_id).await?;
    Ok(Json(serde_json::json!({ "message": "Notification marked as read" })))
}

pub async fn ws_upgrade(
    State(state): State<Arc<AppStateInner>>,
    ApiQuery(query): ApiQuery<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let header = match headers.get(header::AUTHORIZATION) {
        Some(value) => Some(value.to_str().map_err(|_| AuthError::Malformed)?.to_string()),
        None => query.token.map(|token| format!("Bearer {}", token)),
    };

    let caller = authenticate(&state, header.as_deref()).await?;
    debug!("Gateway upgrade for {} ({})", caller.name, caller.id);

    let dispatcher = state.dispatcher.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, caller.id, caller.name)))
}

/// The caller's notifications, newest first.
pub async fn list_notifications(
    state: &AppStateInner,
    caller: &Caller,
    unread_only: bool,
) -> Result<Vec<Notification>, ApiError> {
    let account_id = caller.id;
    let rows = with_db(&state.db, move |db| db.list_notifications(account_id, unread_only)).await?;
    Ok(rows.into_iter().map(|row| row.into_notification()).collect())
}

/// Someone else's notification is reported exactly like a missing one.
pub async fn mark_notification_read(state: &AppStateInner, caller: &Caller, notification_id: i64) -> Result<(), ApiError> {
    let account_id = caller.id;
    let updated = with_db(&state.db, move |db| db.mark_notification_read(notification_id, account_id)).await?;
    if updated {
        Ok(())
    } else {
        Err(NotFoundError::Notification.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complaints::{assign_staff, create_complaint};
    use crate::testing;
    use flashtrack_types::api::{AssignStaffRequest, CreateComplaintRequest};
    use flashtrack_types::models::Role;

    async fn assigned_notification(state: &AppStateInner) -> (Caller, Caller, i64) {
        let resident = testing::caller(state, "res", Role::Resident, 1);
        let admin = testing::caller(state, "adm", Role::Admin, 1);
        let staff = testing::caller(state, "sam", Role::Staff, 1);
        let req = CreateComplaintRequest {
            title: "Broken light".into(),
            description: "stairwell".into(),
            category_id: 3,
        };
        let c = create_complaint(state, &resident, req).await.unwrap();
        let req = AssignStaffRequest {
            complaint_id: c.id,
            staff_id: staff.id,
        };
        assign_staff(state, &admin, req).await.unwrap();

        let id = list_notifications(state, &staff, true).await.unwrap()[0].id;
        (staff, resident, id)
    }

    #[tokio::test]
    async fn test_mark_read_moves_out_of_unread() {
        let state = testing::state();
        let (staff, _, id) = assigned_notification(&state).await;

        mark_notification_read(&state, &staff, id).await.unwrap();
        assert!(list_notifications(&state, &staff, true).await.unwrap().is_empty());

        let all = list_notifications(&state, &staff, false).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].is_read);
    }

    #[tokio::test]
    async fn test_foreign_notification_looks_missing() {
        let state = testing::state();
        let (staff, resident, id) = assigned_notification(&state).await;

        let err = mark_notification_read(&state, &resident, id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(NotFoundError::Notification)));
        let err = mark_notification_read(&state, &resident, 9999).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(NotFoundError::Notification)));

        // untouched for the owner
        assert_eq!(list_notifications(&state, &staff, true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_flushes_unread_backlog() {
        let state = testing::state();
        let (staff, _, id) = assigned_notification(&state).await;

        let session = state.dispatcher.connect(staff.id).await.unwrap();
        let backlog: Vec<i64> = session.backlog.iter().map(|n| n.id).collect();
        assert_eq!(backlog, vec![id]);
    }
}
