use std::sync::Arc;

use axum::{Extension, Json, extract::State, response::IntoResponse};
use tracing::warn;

use flashtrack_types::api::{StaffMember, StaffPointsResponse};

use crate::access::{Action, Caller, authorize};
use crate::auth::AppStateInner;
use crate::error::ApiError;
use crate::with_db;

pub async fn list(
    State(state): State<Arc<AppStateInner>>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(list_staff(&state, &caller).await?))
}

pub async fn points(
    State(state): State<Arc<AppStateInner>>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(staff_points(&state, &caller).await?))
}

/// Staff members of the admin's society, by name.
pub async fn list_staff(state: &AppStateInner, caller: &Caller) -> Result<Vec<StaffMember>, ApiError> {
    authorize(caller, Action::ListStaff)?;

    let society_id = caller.society_id;
    let rows = with_db(&state.db, move |db| db.list_staff(society_id)).await?;

    Ok(rows
        .into_iter()
        .filter_map(|row| match row.role() {
            Ok(role) => Some(StaffMember {
                id: row.id,
                name: row.name,
                email: row.email,
                role,
            }),
            Err(e) => {
                warn!("Skipping account {} with corrupt role: {}", row.id, e);
                None
            }
        })
        .collect())
}

/// The caller's ledger; zeros until their first rated task.
pub async fn staff_points(state: &AppStateInner, caller: &Caller) -> Result<StaffPointsResponse, ApiError> {
    authorize(caller, Action::ViewPoints)?;

    let staff_id = caller.id;
    let row = with_db(&state.db, move |db| db.get_staff_points(staff_id)).await?;

    Ok(row.map(StaffPointsResponse::from).unwrap_or(StaffPointsResponse {
        staff_id,
        total_points: 0,
        tasks_completed: 0,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AccessError;
    use crate::testing;
    use flashtrack_types::models::Role;

    #[tokio::test]
    async fn test_list_staff_is_tenant_scoped() {
        let state = testing::state();
        let admin = testing::caller(&state, "adm", Role::Admin, 1);
        testing::caller(&state, "zoe", Role::Staff, 1);
        testing::caller(&state, "amy", Role::Staff, 1);
        testing::caller(&state, "res", Role::Resident, 1);
        testing::caller(&state, "far", Role::Staff, 2);

        let names: Vec<String> = list_staff(&state, &admin)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["amy", "zoe"]);
    }

    #[tokio::test]
    async fn test_points_default_to_zero() {
        let state = testing::state();
        let staff = testing::caller(&state, "sam", Role::Staff, 1);

        let points = staff_points(&state, &staff).await.unwrap();
        assert_eq!((points.staff_id, points.total_points, points.tasks_completed), (staff.id, 0, 0));

        let resident = testing::caller(&state, "res", Role::Resident, 1);
        let err = staff_points(&state, &resident).await.unwrap_err();
        assert!(matches!(err, ApiError::Access(AccessError::WrongRole(Role::Resident))));
    }
}
