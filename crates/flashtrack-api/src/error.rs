use std::borrow::Cow;

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use flashtrack_types::models::{Role, TransitionError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing credential")]
    Missing,
    #[error("malformed credential")]
    Malformed,
    #[error("credential expired")]
    Expired,
    #[error("credential signature invalid")]
    BadSignature,
    #[error("account no longer exists")]
    UnknownAccount,
    #[error("wrong password")]
    WrongPassword,
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("role {0} may not perform this action")]
    WrongRole(Role),
    #[error("entity belongs to another society")]
    WrongTenant,
    #[error("caller does not own this entity")]
    NotOwner,
}

#[derive(Debug, Error)]
pub enum NotFoundError {
    #[error("account not found")]
    Account,
    #[error("complaint not found")]
    Complaint,
    #[error("staff not found")]
    Staff,
    #[error("notification not found")]
    Notification,
}

#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("feedback already submitted for this complaint")]
    DuplicateFeedback,
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error("email already registered")]
    EmailTaken,
    #[error("admin already exists for this society")]
    AdminExists,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing field: {0}")]
    MissingField(Cow<'static, str>),
    #[error("{field} must be between {min} and {max}")]
    OutOfRange {
        field: &'static str,
        min: i64,
        max: i64,
    },
    #[error("selected user is not a staff member")]
    NotStaff,
    #[error("invalid request: {0}")]
    Malformed(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable")]
    Unavailable,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Access(#[from] AccessError),
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Store failures are logged here and surface only as a generic 500.
impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        error!("Store failure: {:#}", e);
        Self::Store(StoreError::Unavailable)
    }
}

impl From<TransitionError> for ApiError {
    fn from(e: TransitionError) -> Self {
        match e {
            TransitionError::WrongState { .. } => ConflictError::InvalidTransition(e.to_string()).into(),
            TransitionError::NotAssignee => AccessError::NotOwner.into(),
            TransitionError::Inconsistent { .. } => anyhow::Error::new(e).into(),
        }
    }
}

/// Body rejections name the missing field when serde reports one; anything
/// else unreadable is `Malformed`.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let detail = rejection.body_text();
        match missing_field(&detail) {
            Some(field) => ValidationError::MissingField(field.into()).into(),
            None => ValidationError::Malformed(detail).into(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ValidationError::Malformed(rejection.body_text()).into()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ValidationError::Malformed(rejection.body_text()).into()
    }
}

/// Pull `title` out of serde's "missing field `title` at line 1 column 2".
fn missing_field(detail: &str) -> Option<String> {
    let rest = detail.split("missing field `").nth(1)?;
    let end = rest.find('`')?;
    Some(rest[..end].to_string())
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::Access(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Role and tenant failures look the same from outside
        let message = match &self {
            Self::Access(_) => "forbidden".to_string(),
            Self::Store(_) => "internal server error".to_string(),
            other => other.to_string(),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_name() {
        let detail = "Failed to deserialize the JSON body into the target type: missing field `title` at line 1 column 45";
        assert_eq!(missing_field(detail).as_deref(), Some("title"));
        assert_eq!(missing_field("invalid type: string \"x\", expected i64"), None);
    }

    #[test]
    fn test_status_classes() {
        let cases: [(ApiError, StatusCode); 6] = [
            (AuthError::Expired.into(), StatusCode::UNAUTHORIZED),
            (AccessError::WrongTenant.into(), StatusCode::FORBIDDEN),
            (NotFoundError::Notification.into(), StatusCode::NOT_FOUND),
            (ConflictError::DuplicateFeedback.into(), StatusCode::CONFLICT),
            (ValidationError::Malformed("x".into()).into(), StatusCode::BAD_REQUEST),
            (StoreError::Unavailable.into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }
}
