use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use uuid::Uuid;

use melon_types::{
    AuthResponse, ChangePasswordRequest, LoginRequest, SessionResponse, SignupRequest,
};

use super::{ApiError, ApiResult};
use crate::db::repositories::{ProfileRepository, UserRepository};
use crate::state::AppState;

const MIN_PASSWORD_LENGTH: usize = 6;

fn get_user_from_headers(state: &AppState, headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let token = headers
        .get("X-Session-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))?;

    state
        .get_authenticated_user_id_from_token(token)
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::InternalError(format!("Failed to hash password: {}", e)))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// POST /api/auth/signup - Create an account with email and password
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(ApiError::BadRequest("Invalid email address".to_string()));
    }
    if payload.password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let repo = UserRepository::new(state.db.pool.clone());
    let exists = repo
        .email_exists(&email)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    if exists {
        return Err(ApiError::BadRequest("Email already registered".to_string()));
    }

    let password_hash = hash_password(&payload.password)?;
    let user_id = Uuid::new_v4();
    repo.create(&user_id, &email, &password_hash)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let session_token = state
        .session_manager
        .create_session(user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    tracing::info!("New signup: {}", user_id);

    Ok(Json(AuthResponse {
        user_id,
        session_token,
        // Profile creation happens in onboarding
        onboarding_completed: false,
    }))
}

/// POST /api/auth/login - Log in with email and password
///
/// Unknown emails and wrong passwords produce the same response so
/// the endpoint cannot be used to probe for accounts.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = payload.email.trim().to_lowercase();

    let repo = UserRepository::new(state.db.pool.clone());
    let user = repo
        .get_by_email(&email)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(ApiError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    let session_token = state
        .session_manager
        .create_session(user.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let profile_repo = ProfileRepository::new(state.db.pool.clone());
    let onboarding_completed = profile_repo
        .get_by_user_id(&user.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .map(|p| p.onboarding_completed)
        .unwrap_or(false);

    Ok(Json(AuthResponse {
        user_id: user.id,
        session_token,
        onboarding_completed,
    }))
}

/// POST /api/auth/logout - Delete the current session
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let token = headers
        .get("X-Session-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))?;

    state
        .session_manager
        .delete_session(token)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "message": "Logged out successfully"
    })))
}

/// GET /api/auth/session - Describe the current session
pub async fn session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SessionResponse>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    let profile_repo = ProfileRepository::new(state.db.pool.clone());
    let profile = profile_repo
        .get_by_user_id(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(SessionResponse {
        user_id,
        onboarding_completed: profile
            .as_ref()
            .map(|p| p.onboarding_completed)
            .unwrap_or(false),
        username: profile.map(|p| p.username),
    }))
}

/// POST /api/auth/password - Change password, re-verifying the current one
pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    if payload.new_password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let user_id = get_user_from_headers(&state, &headers)?;

    let repo = UserRepository::new(state.db.pool.clone());
    let user = repo
        .get_by_id(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !verify_password(&payload.current_password, &user.password_hash) {
        return Err(ApiError::Unauthorized(
            "Current password is incorrect".to_string(),
        ));
    }

    let new_hash = hash_password(&payload.new_password)?;
    repo.update_password_hash(&user_id, &new_hash)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    tracing::info!("Password changed for user {} at {}", user_id, Utc::now());

    Ok(Json(serde_json::json!({
        "message": "Password updated"
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("correct horse").expect("hash");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_hashes_are_salted() {
        let first = hash_password("same input").expect("hash");
        let second = hash_password("same input").expect("hash");
        assert_ne!(first, second);
    }
}
