pub mod access;
pub mod auth;
pub mod complaints;
pub mod error;
pub mod extract;
pub mod feedback;
pub mod middleware;
pub mod notifications;
pub mod staff;
pub mod token;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};
use tracing::error;

use flashtrack_db::Database;

use crate::auth::AppState;
use crate::error::{ApiError, StoreError};

/// Every HTTP route. CORS and tracing layers are added by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/api/complaints", get(complaints::list).post(complaints::create))
        .route("/api/admin/assign", put(complaints::assign))
        .route("/api/staff/resolve/{complaint_id}", put(complaints::resolve))
        .route("/api/staff", get(staff::list))
        .route("/api/staff/points", get(staff::points))
        .route("/api/feedback", get(feedback::list).post(feedback::submit))
        .route("/api/feedback/check", post(feedback::check))
        .route("/api/notifications", get(notifications::list))
        .route("/api/notifications/read", post(notifications::mark_read))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::require_auth));

    // Authenticates itself: the token may arrive as a query parameter
    let ws_route = Router::new().route("/api/ws/notifications", get(notifications::ws_upgrade));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(ws_route)
        .with_state(state)
}

/// Run a store call on the blocking pool.
pub(crate) async fn with_db<F, T>(db: &Arc<Database>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Store(StoreError::Unavailable)
        })?
        .map_err(ApiError::from)
}


#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use flashtrack_types::models::Role;

    use super::*;

    async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                req = req.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_http_lifecycle() {
        let state = testing::state();
        let admin = testing::caller(&state, "adm", Role::Admin, 1);
        let staff = testing::caller(&state, "sam", Role::Staff, 1);
        let admin_token = state.tokens.issue(admin.id).unwrap();
        let staff_token = state.tokens.issue(staff.id).unwrap();
        let app = router(state);

        let (status, body) = call(
            &app,
            "POST",
            "/auth/register",
            None,
            Some(json!({
                "name": "Ana",
                "email": "ana@x.com",
                "password": "password123",
                "role": "user",
                "society_id": 1
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["id"].as_i64().is_some());

        let (status, body) = call(
            &app,
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "ana@x.com", "password": "password123" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["role"], "resident");
        let resident_token = body["token"].as_str().unwrap().to_string();

        let leak = json!({ "title": "Leak", "description": "kitchen pipe", "category_id": 2 });
        let (status, body) = call(&app, "POST", "/api/complaints", Some(resident_token.as_str()), Some(leak.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "pending");
        let complaint_id = body["id"].as_i64().unwrap();

        let (status, body) = call(&app, "POST", "/api/complaints", Some(staff_token.as_str()), Some(leak)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "forbidden");

        let assign = json!({ "complaint_id": complaint_id, "staff_id": staff.id });
        let (status, body) = call(&app, "PUT", "/api/admin/assign", Some(admin_token.as_str()), Some(assign)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["complaint"]["status"], "in-progress");
        assert_eq!(body["complaint"]["staff_id"], staff.id);

        let uri = format!("/api/staff/resolve/{}", complaint_id);
        let (status, body) = call(&app, "PUT", &uri, Some(staff_token.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["complaint"]["status"], "resolved");

        let rating = json!({ "complaint_id": complaint_id, "rating": 5, "comment": "great" });
        let (status, body) = call(&app, "POST", "/api/feedback", Some(resident_token.as_str()), Some(rating.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["feedback"]["points"], 10);

        let (status, _) = call(&app, "POST", "/api/feedback", Some(resident_token.as_str()), Some(rating)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(&app, "GET", "/api/staff/points", Some(staff_token.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_points"], 10);
        assert_eq!(body["tasks_completed"], 1);

        let (status, body) = call(&app, "GET", "/api/notifications?unread=true", Some(staff_token.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["notifications"][0]["type"], "assignment");
    }

    #[tokio::test]
    async fn test_bad_request_bodies_use_error_shape() {
        let state = testing::state();
        let resident = testing::caller(&state, "res", Role::Resident, 1);
        let token = state.tokens.issue(resident.id).unwrap();
        let app = router(state);

        let untitled = json!({ "description": "kitchen pipe", "category_id": 2 });
        let (status, body) = call(&app, "POST", "/api/complaints", Some(token.as_str()), Some(untitled)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing field: title");

        let wrong_type = json!({ "title": "Leak", "description": "kitchen pipe", "category_id": "two" });
        let (status, body) = call(&app, "POST", "/api/complaints", Some(token.as_str()), Some(wrong_type)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("invalid request"));

        let (status, body) = call(&app, "PUT", "/api/staff/resolve/abc", Some(token.as_str()), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = call(&app, "GET", "/api/notifications?unread=maybe", Some(token.as_str()), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = call(&app, "POST", "/auth/login", None, Some(json!({ "email": "a@x.com" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing field: password");
    }

    #[tokio::test]
    async fn test_protected_routes_need_token() {
        let state = testing::state();
        let app = router(state);

        let (status, body) = call(&app, "GET", "/api/complaints", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing credential");

        let (status, _) = call(&app, "GET", "/api/complaints", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_token_for_deleted_account_rejected() {
        let state = testing::state();
        let token = state.tokens.issue(4242).unwrap();
        let app = router(state);

        let (status, body) = call(&app, "GET", "/api/complaints", Some(token.as_str()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "account no longer exists");
    }
}
