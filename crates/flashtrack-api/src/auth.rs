use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use rand_core::OsRng;
use tracing::info;

use flashtrack_db::Database;
use flashtrack_db::models::{NewAccount, NewAccountOutcome};
use flashtrack_gateway::dispatcher::Dispatcher;
use flashtrack_types::api::{AccountSummary, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::access::Caller;
use crate::error::{ApiError, AuthError, ConflictError, NotFoundError, ValidationError};
use crate::extract::ApiJson;
use crate::token::TokenValidator;
use crate::with_db;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;
const UNKNOWN_SOCIETY: &str = "Unknown";

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub tokens: TokenValidator,
    pub dispatcher: Dispatcher,
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = register_account(&state, req).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id,
            message: "User registered successfully".into(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(login_account(&state, req).await?))
}

pub async fn register_account(state: &AppStateInner, req: RegisterRequest) -> Result<i64, ApiError> {
    let name = req.name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(ValidationError::MissingField("name".into()).into());
    }
    if email.is_empty() {
        return Err(ValidationError::MissingField("email".into()).into());
    }
    if req.password.is_empty() {
        return Err(ValidationError::MissingField("password".into()).into());
    }
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&req.password.chars().count()) {
        return Err(ValidationError::OutOfRange {
            field: "password",
            min: MIN_PASSWORD_LEN as i64,
            max: MAX_PASSWORD_LEN as i64,
        }
        .into());
    }

    // Hash password with Argon2id off the async runtime
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(anyhow::Error::from)??;

    let role = req.role;
    let society_id = req.society_id;
    let push_token = req.push_token;
    let outcome = with_db(&state.db, {
        let email = email.clone();
        move |db| {
            db.create_account(&NewAccount {
                name: &name,
                email: &email,
                password_hash: &password_hash,
                role,
                society_id,
                push_token: push_token.as_deref(),
            })
        }
    })
    .await?;

    match outcome {
        NewAccountOutcome::Created(id) => {
            info!("Registered {} account {} ({}) in society {}", role, id, email, society_id);
            Ok(id)
        }
        NewAccountOutcome::EmailTaken => Err(ConflictError::EmailTaken.into()),
        NewAccountOutcome::AdminExists => Err(ConflictError::AdminExists.into()),
    }
}

pub async fn login_account(state: &AppStateInner, req: LoginRequest) -> Result<LoginResponse, ApiError> {
    let email = req.email.trim().to_lowercase();
    let account = with_db(&state.db, move |db| db.get_account_by_email(&email))
        .await?
        .ok_or(NotFoundError::Account)?;

    let hash = account.password.clone();
    let password = req.password;
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(anyhow::Error::from)??;
    if !verified {
        return Err(AuthError::WrongPassword.into());
    }

    let caller = Caller::from_row(account)?;
    let token = state.tokens.issue(caller.id)?;

    let society_id = caller.society_id;
    let society_name = with_db(&state.db, move |db| db.get_society_name(society_id))
        .await?
        .unwrap_or_else(|| UNKNOWN_SOCIETY.to_string());

    info!("{} ({}) logged in", caller.email, caller.id);

    Ok(LoginResponse {
        token,
        user: AccountSummary {
            id: caller.id,
            name: caller.name,
            email: caller.email,
            role: caller.role,
            society_id,
            society_name,
        },
    })
}

pub(crate) fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?;
    Ok(hash.to_string())
}

/// `Ok(false)` for a wrong password; `Err` only if the stored hash is corrupt.
fn verify_password(password: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("stored password hash unreadable: {}", e))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}
