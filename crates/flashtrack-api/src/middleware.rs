use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::access::Caller;
use crate::auth::{AppState, AppStateInner};
use crate::error::{ApiError, AuthError};
use crate::with_db;

/// Resolve a raw `Authorization` value to the account as it is stored now.
/// A valid token for a deleted account is rejected.
pub async fn authenticate(state: &AppStateInner, header: Option<&str>) -> Result<Caller, ApiError> {
    let account = state.tokens.validate(header)?;
    let row = with_db(&state.db, move |db| db.get_account_by_id(account.id))
        .await?
        .ok_or(AuthError::UnknownAccount)?;

    Ok(Caller::from_row(row)?)
}

/// Extract and validate the bearer token, then expose the caller to handlers
/// as an `Extension<Caller>`.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|v| v.to_str().map(str::to_owned).map_err(|_| AuthError::Malformed))
        .transpose()?;

    let caller = authenticate(&state, header.as_deref()).await?;
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
