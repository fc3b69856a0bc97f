use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ComplaintState, Notification, Role};

// -- JWT Claims --

/// JWT claims. Only the account id is trusted; role and society are always
/// re-read from the account store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub iat: usize,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub society_id: i64,
    #[serde(default, alias = "fcm_token")]
    pub push_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: i64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: AccountSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub society_id: i64,
    pub society_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
}

// -- Complaints --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateComplaintRequest {
    pub title: String,
    pub description: String,
    pub category_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssignStaffRequest {
    pub complaint_id: i64,
    pub staff_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplaintResponse {
    pub id: i64,
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    pub state: ComplaintState,
    pub resident_id: i64,
    pub resident_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_name: Option<String>,
    pub society_id: i64,
    pub category_id: i64,
    pub category_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Response for assign/resolve: the updated complaint plus a human message.
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub complaint: ComplaintResponse,
    pub message: String,
}

// -- Feedback --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitFeedbackRequest {
    pub complaint_id: i64,
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub id: i64,
    pub complaint_id: i64,
    pub user_id: i64,
    pub staff_id: i64,
    pub rating: i64,
    pub comment: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SubmitFeedbackResponse {
    pub message: String,
    pub feedback: FeedbackResponse,
}

/// Admin view of a feedback record with names resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackDetail {
    #[serde(flatten)]
    pub feedback: FeedbackResponse,
    pub complaint_title: String,
    pub user_name: String,
    pub staff_name: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckPendingRequest {
    pub complaint_ids: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckPendingResponse {
    pub pending: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffPointsResponse {
    pub staff_id: i64,
    pub total_points: i64,
    pub tasks_completed: i64,
}

// -- Notifications --

#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationList {
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MarkReadRequest {
    pub notification_id: i64,
}
