//! Database row types. These map directly to SQLite rows and are kept apart
//! from the flashtrack-types API models so the store stays independent.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::warn;

use flashtrack_types::api::{ComplaintResponse, FeedbackDetail, FeedbackResponse, StaffPointsResponse};
use flashtrack_types::models::{ComplaintState, ComplaintStatus, Notification, Role};

/// Result of a write whose preconditions are re-checked at commit time.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    /// The write committed.
    Applied(T),
    /// A uniqueness constraint rejected the write.
    Conflict,
    /// The row no longer matched the guarded precondition.
    Stale,
}

/// Result of creating an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewAccountOutcome {
    Created(i64),
    EmailTaken,
    AdminExists,
}

pub struct AccountRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub society_id: i64,
    pub push_token: Option<String>,
    pub created_at: String,
}

impl AccountRow {
    pub fn role(&self) -> Result<Role> {
        self.role
            .parse()
            .map_err(|e| anyhow!("account {} has corrupt role: {}", self.id, e))
    }
}

pub struct NewAccount<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
    pub society_id: i64,
    pub push_token: Option<&'a str>,
}

pub struct ComplaintRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub resident_id: i64,
    pub resident_name: String,
    pub staff_id: Option<i64>,
    pub staff_name: Option<String>,
    pub society_id: i64,
    pub category_id: i64,
    pub category_name: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ComplaintRow {
    pub fn state(&self) -> Result<ComplaintState> {
        let status: ComplaintStatus = self
            .status
            .parse()
            .map_err(|e| anyhow!("complaint {} has corrupt status: {}", self.id, e))?;
        Ok(ComplaintState::from_parts(status, self.staff_id)?)
    }

    pub fn into_response(self) -> Result<ComplaintResponse> {
        let state = self.state()?;
        Ok(ComplaintResponse {
            created_at: parse_timestamp(&self.created_at, "complaint", self.id),
            updated_at: parse_timestamp(&self.updated_at, "complaint", self.id),
            id: self.id,
            title: self.title,
            description: self.description,
            state,
            resident_id: self.resident_id,
            resident_name: self.resident_name,
            staff_name: self.staff_name,
            society_id: self.society_id,
            category_id: self.category_id,
            category_name: self.category_name,
        })
    }
}

pub struct NewComplaint<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub resident_id: i64,
    pub society_id: i64,
    pub category_id: i64,
}

pub struct NotificationRow {
    pub id: i64,
    pub account_id: i64,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub complaint_id: Option<i64>,
    pub is_read: bool,
    pub created_at: String,
}

impl NotificationRow {
    pub fn into_notification(self) -> Notification {
        Notification {
            created_at: parse_timestamp(&self.created_at, "notification", self.id),
            id: self.id,
            user_id: self.account_id,
            title: self.title,
            message: self.message,
            kind: self.kind,
            complaint_id: self.complaint_id,
            is_read: self.is_read,
        }
    }
}

pub struct NewNotification {
    pub account_id: i64,
    pub title: String,
    pub message: String,
    pub kind: &'static str,
    pub complaint_id: Option<i64>,
}

pub struct FeedbackRow {
    pub id: i64,
    pub complaint_id: i64,
    pub resident_id: i64,
    pub staff_id: i64,
    pub rating: i64,
    pub comment: String,
    pub points: i64,
    pub created_at: String,
    pub complaint_title: String,
    pub resident_name: String,
    pub staff_name: String,
}

impl FeedbackRow {
    pub fn into_response(self) -> FeedbackResponse {
        FeedbackResponse {
            created_at: parse_timestamp(&self.created_at, "feedback", self.id),
            id: self.id,
            complaint_id: self.complaint_id,
            user_id: self.resident_id,
            staff_id: self.staff_id,
            rating: self.rating,
            comment: self.comment,
            points: self.points,
        }
    }

    pub fn into_detail(mut self) -> FeedbackDetail {
        let complaint_title = std::mem::take(&mut self.complaint_title);
        let user_name = std::mem::take(&mut self.resident_name);
        let staff_name = std::mem::take(&mut self.staff_name);
        FeedbackDetail {
            feedback: self.into_response(),
            complaint_title,
            user_name,
            staff_name,
        }
    }
}

pub struct NewFeedback<'a> {
    pub complaint_id: i64,
    pub resident_id: i64,
    pub rating: i64,
    pub comment: &'a str,
}

impl NewFeedback<'_> {
    /// Two points per star.
    pub fn points(&self) -> i64 {
        self.rating * 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaffPointsRow {
    pub staff_id: i64,
    pub total_points: i64,
    pub tasks_completed: i64,
}

impl From<StaffPointsRow> for StaffPointsResponse {
    fn from(row: StaffPointsRow) -> Self {
        Self {
            staff_id: row.staff_id,
            total_points: row.total_points,
            tasks_completed: row.tasks_completed,
        }
    }
}

/// Parse a stored timestamp. Rows written by SQLite's `datetime('now')` lack
/// a timezone, so fall back to naive UTC before giving up.
fn parse_timestamp(raw: &str, table: &str, id: i64) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {} '{}': {}", raw, table, id, e);
            DateTime::default()
        })
}
