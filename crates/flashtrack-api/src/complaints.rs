use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use flashtrack_db::models::{NewComplaint, NewNotification, WriteOutcome};
use flashtrack_types::api::{AssignStaffRequest, ComplaintResponse, CreateComplaintRequest, TransitionResponse};
use flashtrack_types::models::{Role, kind};

use crate::access::{Action, Caller, authorize, require_tenant};
use crate::auth::AppStateInner;
use crate::error::{ApiError, ConflictError, NotFoundError, ValidationError};
use crate::extract::{ApiJson, ApiPath};
use crate::with_db;

pub async fn create(
    State(state): State<Arc<AppStateInner>>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<CreateComplaintRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let complaint = create_complaint(&state, &caller, req).await?;
    Ok((StatusCode::CREATED, Json(complaint)))
}

pub async fn list(
    State(state): State<Arc<AppStateInner>>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(list_complaints(&state, &caller).await?))
}

pub async fn assign(
    State(state): State<Arc<AppStateInner>>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<AssignStaffRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let complaint = assign_staff(&state, &caller, req).await?;
    Ok(Json(TransitionResponse {
        complaint,
        message: "Staff assigned successfully".into(),
    }))
}

pub async fn resolve(
    State(state): State<Arc<AppStateInner>>,
    Extension(caller): Extension<Caller>,
    ApiPath(complaint_id): ApiPath<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let complaint = resolve_complaint(&state, &caller, complaint_id).await?;
    Ok(Json(TransitionResponse {
        complaint,
        message: "Complaint marked as resolved".into(),
    }))
}

pub async fn create_complaint(
    state: &AppStateInner,
    caller: &Caller,
    req: CreateComplaintRequest,
) -> Result<ComplaintResponse, ApiError> {
    authorize(caller, Action::CreateComplaint)?;

    let title = req.title.trim().to_string();
    let description = req.description.trim().to_string();
    if title.is_empty() {
        return Err(ValidationError::MissingField("title".into()).into());
    }
    if description.is_empty() {
        return Err(ValidationError::MissingField("description".into()).into());
    }

    let resident_id = caller.id;
    let society_id = caller.society_id;
    let category_id = req.category_id;
    let row = with_db(&state.db, move |db| {
        db.insert_complaint(&NewComplaint {
            title: &title,
            description: &description,
            resident_id,
            society_id,
            category_id,
        })
    })
    .await?;

    info!("Complaint {} opened by {} in society {}", row.id, resident_id, society_id);
    Ok(row.into_response()?)
}

/// Residents see their own complaints, staff see what is assigned to them,
/// admins see the whole society. Newest first.
pub async fn list_complaints(state: &AppStateInner, caller: &Caller) -> Result<Vec<ComplaintResponse>, ApiError> {
    let (resident_id, staff_id) = match caller.role {
        Role::Resident => (Some(caller.id), None),
        Role::Staff => (None, Some(caller.id)),
        Role::Admin => (None, None),
    };

    let society_id = caller.society_id;
    let rows = with_db(&state.db, move |db| db.list_complaints(society_id, resident_id, staff_id)).await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id;
            row.into_response()
                .map_err(|e| warn!("Skipping corrupt complaint {}: {}", id, e))
                .ok()
        })
        .collect())
}

/// pending -> in-progress. Checks run cheapest first and the store re-checks
/// the same conditions when it commits.
pub async fn assign_staff(
    state: &AppStateInner,
    caller: &Caller,
    req: AssignStaffRequest,
) -> Result<ComplaintResponse, ApiError> {
    authorize(caller, Action::AssignStaff)?;

    let AssignStaffRequest { complaint_id, staff_id } = req;
    let (complaint, staff) = with_db(&state.db, move |db| {
        Ok((db.get_complaint(complaint_id)?, db.get_account_by_id(staff_id)?))
    })
    .await?;

    let complaint = complaint.ok_or(NotFoundError::Complaint)?;
    require_tenant(caller, complaint.society_id)?;
    let staff = staff.ok_or(NotFoundError::Staff)?;
    require_tenant(caller, staff.society_id)?;
    if staff.role()? != Role::Staff {
        return Err(ValidationError::NotStaff.into());
    }
    complaint.state()?.assign(staff.id)?;

    let notification = NewNotification {
        account_id: staff.id,
        title: "New Task Assigned".into(),
        message: format!("You have been assigned to complaint #{}: {}", complaint.id, complaint.title),
        kind: kind::ASSIGNMENT,
        complaint_id: Some(complaint.id),
    };
    let society_id = caller.society_id;
    let outcome = with_db(&state.db, move |db| {
        db.assign_staff(complaint_id, staff_id, society_id, &notification)
    })
    .await?;

    let (row, notification) = applied(outcome, "complaint is no longer pending")?;
    info!("Complaint {} assigned to {} ({}) by {}", row.id, staff.name, staff_id, caller.id);

    state.dispatcher.dispatch(&notification.into_notification());
    Ok(row.into_response()?)
}

/// in-progress -> resolved, by the assigned staff member only. The resident
/// is notified so they can leave feedback.
pub async fn resolve_complaint(
    state: &AppStateInner,
    caller: &Caller,
    complaint_id: i64,
) -> Result<ComplaintResponse, ApiError> {
    authorize(caller, Action::ResolveComplaint)?;

    let complaint = with_db(&state.db, move |db| db.get_complaint(complaint_id))
        .await?
        .ok_or(NotFoundError::Complaint)?;
    require_tenant(caller, complaint.society_id)?;
    complaint.state()?.resolve(caller.id)?;

    let notification = NewNotification {
        account_id: complaint.resident_id,
        title: "Complaint Resolved".into(),
        message: format!(
            "Your complaint #{}: {} has been resolved. Please rate the service.",
            complaint.id, complaint.title
        ),
        kind: kind::RESOLVED,
        complaint_id: Some(complaint.id),
    };
    let staff_id = caller.id;
    let outcome = with_db(&state.db, move |db| {
        db.resolve_complaint(complaint_id, staff_id, &notification)
    })
    .await?;

    let (row, notification) = applied(outcome, "complaint is no longer in progress")?;
    info!("Complaint {} resolved by {}", row.id, staff_id);

    state.dispatcher.dispatch(&notification.into_notification());
    Ok(row.into_response()?)
}

fn applied<T>(outcome: WriteOutcome<T>, stale: &str) -> Result<T, ApiError> {
    match outcome {
        WriteOutcome::Applied(value) => Ok(value),
        WriteOutcome::Conflict | WriteOutcome::Stale => {
            Err(ConflictError::InvalidTransition(stale.to_string()).into())
        }
    }
}
