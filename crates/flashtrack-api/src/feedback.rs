use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};

use flashtrack_db::models::{NewFeedback, WriteOutcome};
use flashtrack_types::api::{
    CheckPendingRequest, CheckPendingResponse, FeedbackDetail, FeedbackResponse, SubmitFeedbackRequest,
    SubmitFeedbackResponse,
};
use flashtrack_types::models::ComplaintState;

use crate::access::{Action, Caller, authorize, require_owner, require_tenant};
use crate::auth::AppStateInner;
use crate::error::{ApiError, ConflictError, NotFoundError, ValidationError};
use crate::extract::ApiJson;
use crate::with_db;

const MIN_RATING: i64 = 1;
const MAX_RATING: i64 = 5;

pub async fn submit(
    State(state): State<Arc<AppStateInner>>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<SubmitFeedbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let feedback = submit_feedback(&state, &caller, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubmitFeedbackResponse {
            message: "Feedback submitted successfully".into(),
            feedback,
        }),
    ))
}

pub async fn check(
    State(state): State<Arc<AppStateInner>>,
    Extension(caller): Extension<Caller>,
    ApiJson(req): ApiJson<CheckPendingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pending = check_pending(&state, &caller, req.complaint_ids).await?;
    Ok(Json(CheckPendingResponse { pending }))
}

pub async fn list(
    State(state): State<Arc<AppStateInner>>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(list_society_feedback(&state, &caller).await?))
}

/// Rate a resolved complaint. Exactly one record per complaint; the record
/// and the assignee's points ledger are written in one transaction.
pub async fn submit_feedback(
    state: &AppStateInner,
    caller: &Caller,
    req: SubmitFeedbackRequest,
) -> Result<FeedbackResponse, ApiError> {
    authorize(caller, Action::SubmitFeedback)?;
    if !(MIN_RATING..=MAX_RATING).contains(&req.rating) {
        return Err(ValidationError::OutOfRange {
            field: "rating",
            min: MIN_RATING,
            max: MAX_RATING,
        }
        .into());
    }

    let complaint_id = req.complaint_id;
    let complaint = with_db(&state.db, move |db| db.get_complaint(complaint_id))
        .await?
        .ok_or(NotFoundError::Complaint)?;
    require_owner(caller, complaint.resident_id)?;
    require_tenant(caller, complaint.society_id)?;

    let current = complaint.state()?;
    if !matches!(current, ComplaintState::Resolved { .. }) {
        return Err(ConflictError::InvalidTransition(format!(
            "complaint is {}, feedback needs resolved",
            current.status()
        ))
        .into());
    }

    let resident_id = caller.id;
    let rating = req.rating;
    let comment = req.comment.trim().to_string();
    let outcome = with_db(&state.db, move |db| {
        db.record_feedback(&NewFeedback {
            complaint_id,
            resident_id,
            rating,
            comment: &comment,
        })
    })
    .await?;

    match outcome {
        WriteOutcome::Applied(row) => {
            info!(
                "Feedback {} on complaint {}: rating {}, {} points to staff {}",
                row.id, complaint_id, row.rating, row.points, row.staff_id
            );
            Ok(row.into_response())
        }
        WriteOutcome::Conflict => Err(ConflictError::DuplicateFeedback.into()),
        WriteOutcome::Stale => {
            warn!("Complaint {} changed under feedback submission", complaint_id);
            Err(ConflictError::InvalidTransition("complaint is no longer resolved".into()).into())
        }
    }
}

/// The subset of `complaint_ids` the caller has not rated yet, in input order.
pub async fn check_pending(
    state: &AppStateInner,
    caller: &Caller,
    complaint_ids: Vec<i64>,
) -> Result<Vec<i64>, ApiError> {
    if complaint_ids.is_empty() {
        return Ok(Vec::new());
    }

    let resident_id = caller.id;
    let (complaint_ids, rated) = with_db(&state.db, move |db| {
        let rated = db.rated_complaint_ids(resident_id, &complaint_ids)?;
        Ok((complaint_ids, rated))
    })
    .await?;

    Ok(complaint_ids.into_iter().filter(|id| !rated.contains(id)).collect())
}

pub async fn list_society_feedback(state: &AppStateInner, caller: &Caller) -> Result<Vec<FeedbackDetail>, ApiError> {
    authorize(caller, Action::ViewSocietyFeedback)?;

    let society_id = caller.society_id;
    let rows = with_db(&state.db, move |db| db.list_feedback_for_society(society_id)).await?;
    Ok(rows.into_iter().map(|row| row.into_detail()).collect())
}
