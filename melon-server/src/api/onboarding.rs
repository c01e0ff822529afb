use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use melon_types::{CheckUsernameResponse, OnboardingRequest, Profile};

use super::{ApiError, ApiResult};
use crate::db::repositories::ProfileRepository;
use crate::state::AppState;
use crate::validation;

fn get_user_from_headers(state: &AppState, headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let token = headers
        .get("X-Session-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))?;

    state
        .get_authenticated_user_id_from_token(token)
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))
}

#[derive(Deserialize)]
pub struct CheckUsernameQuery {
    pub username: String,
}

/// GET /api/check-username - Username availability for the onboarding
/// form. Malformed names simply read as unavailable. An authenticated
/// caller's own current username stays available to them so profile
/// editing can round-trip.
pub async fn check_username(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CheckUsernameQuery>,
) -> ApiResult<Json<CheckUsernameResponse>> {
    if validation::validate_username(&query.username).is_err() {
        return Ok(Json(CheckUsernameResponse { available: false }));
    }

    let caller = headers
        .get("X-Session-Token")
        .and_then(|v| v.to_str().ok())
        .and_then(|token| state.get_authenticated_user_id_from_token(token));

    let repo = ProfileRepository::new(state.db.pool.clone());
    let taken = repo
        .username_taken(&query.username, caller.as_ref())
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(CheckUsernameResponse { available: !taken }))
}

/// POST /api/onboarding - Complete signup by creating the profile
pub async fn complete_onboarding(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<OnboardingRequest>,
) -> ApiResult<Json<Profile>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    validation::validate_username(&payload.username).map_err(ApiError::BadRequest)?;
    validation::validate_display_name(&payload.display_name).map_err(ApiError::BadRequest)?;
    validation::validate_interests(&payload.interests).map_err(ApiError::BadRequest)?;

    let repo = ProfileRepository::new(state.db.pool.clone());

    if repo
        .get_by_user_id(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .is_some()
    {
        return Err(ApiError::BadRequest(
            "Onboarding already completed".to_string(),
        ));
    }

    let taken = repo
        .username_taken(&payload.username, None)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    if taken {
        return Err(ApiError::BadRequest("Username already taken".to_string()));
    }

    let interests: Vec<String> = payload
        .interests
        .iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect();

    let now = Utc::now();
    let profile = Profile {
        user_id,
        username: payload.username,
        display_name: payload.display_name.trim().to_string(),
        bio: None,
        avatar_url: None,
        interests,
        onboarding_completed: true,
        created_at: now,
        updated_at: now,
    };

    repo.create(&profile)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    tracing::info!("Onboarding completed for user {}", user_id);

    Ok(Json(profile))
}
