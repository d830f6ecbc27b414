use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{extract::State, Json};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::user::{self, UserRole};
use crate::error::{AppError, AppResult};
use crate::services::notify::Notification;
use crate::services::otp::OtpService;
use crate::utils::jwt::issue_token;
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserInfo,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: UserRole,
}

impl From<user::Model> for UserInfo {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            phone: user.phone,
            role: user.role,
        }
    }
}

fn auth_response(state: &AppState, user: user::Model) -> AppResult<AuthResponse> {
    let token = issue_token(&user, &state.config.jwt_secret, state.config.jwt_expiration_hours)?;
    Ok(AuthResponse {
        token,
        user: user.into(),
    })
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?
        .to_string())
}

/// Insert a new account after checking the email is free.
pub async fn create_user(
    db: &DatabaseConnection,
    payload: RegisterRequest,
    role: UserRole,
) -> AppResult<user::Model> {
    let email = payload.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(AppError::Validation("Email address is invalid".to_string()));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }

    let existing = user::Entity::find()
        .filter(user::Column::Email.eq(&email))
        .one(db)
        .await?;
    if existing.is_some() {
        return Err(AppError::Conflict("Email already registered".to_string()));
    }

    let user = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set(hash_password(&payload.password)?),
        name: Set(payload.name.trim().to_string()),
        phone: Set(payload.phone.map(|p| p.trim().to_string()).filter(|p| !p.is_empty())),
        role: Set(role),
        created_at: Set(Utc::now().fixed_offset()),
    }
    .insert(db)
    .await?;

    tracing::info!(user_id = %user.id, role = ?role, "Account registered");
    Ok(user)
}

/// Register a rider account
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = create_user(&state.db, payload, UserRole::Rider).await?;
    Ok(Json(auth_response(&state, user)?))
}

/// Register a driver account. Vehicles are added afterwards.
pub async fn register_driver(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = create_user(&state.db, payload, UserRole::Driver).await?;
    Ok(Json(auth_response(&state, user)?))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let user = user::Entity::find()
        .filter(user::Column::Email.eq(payload.email.trim().to_lowercase()))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| AppError::Internal(format!("Failed to parse password hash: {}", e)))?;

    Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .map_err(|_| AppError::Unauthorized("Invalid email or password".to_string()))?;

    Ok(Json(auth_response(&state, user)?))
}

#[derive(Debug, Deserialize)]
pub struct OtpRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct OtpIssued {
    pub phone: String,
    pub expires_in_seconds: i64,
}

/// Send a one-time code to a phone number
pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<OtpRequest>,
) -> AppResult<Json<OtpIssued>> {
    let phone = payload.phone.trim().to_string();
    if phone.is_empty() {
        return Err(AppError::Validation("Phone number is required".to_string()));
    }

    let code = OtpService::new(state.otp.as_ref(), state.config.otp_ttl_seconds).issue(&phone);
    state
        .notifier
        .notify(Notification::VerificationCode {
            destination: phone.clone(),
            code,
        })
        .await;

    Ok(Json(OtpIssued {
        phone,
        expires_in_seconds: state.config.otp_ttl_seconds,
    }))
}

#[derive(Debug, Deserialize)]
pub struct OtpVerifyRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct OtpVerified {
    pub verified: bool,
    /// Present when the phone belongs to an existing account.
    pub session: Option<AuthResponse>,
}

/// Check a one-time code; signs the owner of the phone in when there is one
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<OtpVerifyRequest>,
) -> AppResult<Json<OtpVerified>> {
    let phone = payload.phone.trim().to_string();
    OtpService::new(state.otp.as_ref(), state.config.otp_ttl_seconds).verify(&phone, &payload.code)?;

    let owner = user::Entity::find()
        .filter(user::Column::Phone.eq(&phone))
        .one(&state.db)
        .await?;

    let session = owner.map(|user| auth_response(&state, user)).transpose()?;

    Ok(Json(OtpVerified {
        verified: true,
        session,
    }))
}
