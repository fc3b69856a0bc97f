use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Account role. Fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Older clients still send `"user"` for residents.
    #[serde(alias = "user")]
    Resident,
    Staff,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resident => "resident",
            Self::Staff => "staff",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resident" | "user" => Ok(Self::Resident),
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComplaintStatus {
    Pending,
    InProgress,
    Resolved,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Resolved => "resolved",
        }
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplaintStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in-progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown variant '{0}'")]
pub struct UnknownVariant(pub String);

/// Lifecycle state of a complaint.
///
/// The assigned staff member only exists once the complaint has left
/// `pending`, so the status/staff pairing can never disagree. Serializes
/// flat as `{"status": "...", "staff_id": N}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ComplaintState {
    Pending,
    InProgress { staff_id: i64 },
    Resolved { staff_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("complaint is {actual}, expected {expected}")]
    WrongState {
        actual: ComplaintStatus,
        expected: ComplaintStatus,
    },

    #[error("complaint is not assigned to this staff member")]
    NotAssignee,

    #[error("stored complaint has status {status} with staff {staff_id:?}")]
    Inconsistent {
        status: ComplaintStatus,
        staff_id: Option<i64>,
    },
}

impl ComplaintState {
    /// Rebuild the state from its stored columns.
    pub fn from_parts(status: ComplaintStatus, staff_id: Option<i64>) -> Result<Self, TransitionError> {
        match (status, staff_id) {
            (ComplaintStatus::Pending, None) => Ok(Self::Pending),
            (ComplaintStatus::InProgress, Some(staff_id)) => Ok(Self::InProgress { staff_id }),
            (ComplaintStatus::Resolved, Some(staff_id)) => Ok(Self::Resolved { staff_id }),
            (status, staff_id) => Err(TransitionError::Inconsistent { status, staff_id }),
        }
    }

    pub fn status(&self) -> ComplaintStatus {
        match self {
            Self::Pending => ComplaintStatus::Pending,
            Self::InProgress { .. } => ComplaintStatus::InProgress,
            Self::Resolved { .. } => ComplaintStatus::Resolved,
        }
    }

    pub fn staff_id(&self) -> Option<i64> {
        match self {
            Self::Pending => None,
            Self::InProgress { staff_id } | Self::Resolved { staff_id } => Some(*staff_id),
        }
    }

    /// pending -> in-progress. Reassignment is not allowed.
    pub fn assign(self, staff_id: i64) -> Result<Self, TransitionError> {
        match self {
            Self::Pending => Ok(Self::InProgress { staff_id }),
            other => Err(TransitionError::WrongState {
                actual: other.status(),
                expected: ComplaintStatus::Pending,
            }),
        }
    }

    /// in-progress -> resolved, only by the assigned staff member.
    pub fn resolve(self, caller_id: i64) -> Result<Self, TransitionError> {
        match self {
            Self::InProgress { staff_id } if staff_id == caller_id => Ok(Self::Resolved { staff_id }),
            Self::InProgress { .. } => Err(TransitionError::NotAssignee),
            Self::Resolved { staff_id } if staff_id != caller_id => Err(TransitionError::NotAssignee),
            other => Err(TransitionError::WrongState {
                actual: other.status(),
                expected: ComplaintStatus::InProgress,
            }),
        }
    }
}

/// Notification kinds produced by the complaint lifecycle.
pub mod kind {
    pub const ASSIGNMENT: &str = "assignment";
    pub const RESOLVED: &str = "resolved";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complaint_id: Option<i64>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_only_from_pending() {
        let state = ComplaintState::Pending.assign(7).unwrap();
        assert_eq!(state, ComplaintState::InProgress { staff_id: 7 });
        assert_eq!(state.staff_id(), Some(7));

        let err = state.assign(8).unwrap_err();
        assert_eq!(
            err,
            TransitionError::WrongState {
                actual: ComplaintStatus::InProgress,
                expected: ComplaintStatus::Pending,
            }
        );

        let resolved = ComplaintState::Resolved { staff_id: 7 };
        assert!(resolved.assign(7).is_err());
    }

    #[test]
    fn test_resolve_rules() {
        let err = ComplaintState::Pending.resolve(7).unwrap_err();
        assert!(matches!(err, TransitionError::WrongState { actual: ComplaintStatus::Pending, .. }));

        let in_progress = ComplaintState::InProgress { staff_id: 7 };
        assert_eq!(in_progress.resolve(8).unwrap_err(), TransitionError::NotAssignee);
        assert_eq!(in_progress.resolve(7).unwrap(), ComplaintState::Resolved { staff_id: 7 });

        let resolved = ComplaintState::Resolved { staff_id: 7 };
        assert!(matches!(resolved.resolve(7), Err(TransitionError::WrongState { .. })));
        assert_eq!(resolved.resolve(9).unwrap_err(), TransitionError::NotAssignee);
    }

    #[test]
    fn test_from_parts_rejects_mismatched_staff() {
        assert!(ComplaintState::from_parts(ComplaintStatus::Pending, Some(3)).is_err());
        assert!(ComplaintState::from_parts(ComplaintStatus::InProgress, None).is_err());
        assert_eq!(
            ComplaintState::from_parts(ComplaintStatus::Resolved, Some(3)).unwrap(),
            ComplaintState::Resolved { staff_id: 3 }
        );
    }

    #[test]
    fn test_state_serializes_flat() {
        let json = serde_json::to_value(ComplaintState::InProgress { staff_id: 4 }).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "in-progress", "staff_id": 4 }));

        let json = serde_json::to_value(ComplaintState::Pending).unwrap();
        assert_eq!(json, serde_json::json!({ "status": "pending" }));
    }

    #[test]
    fn test_role_accepts_legacy_user() {
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::Resident);
        assert_eq!("user".parse::<Role>().unwrap(), Role::Resident);
        assert!("janitor".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Resident).unwrap(), "\"resident\"");
    }
}
