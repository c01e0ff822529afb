use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use uuid::Uuid;

use crate::{
    api::{ApiError, ApiResult},
    db::repositories::{FollowRepository, ProfileRepository},
    state::AppState,
};
use melon_types::FollowStatus;

/// Extract user ID from session token header
fn get_user_from_headers(state: &AppState, headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let token = headers
        .get("X-Session-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))?;

    state
        .get_authenticated_user_id_from_token(token)
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))
}

fn parse_user_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid user ID".to_string()))
}

/// Followable means the target has a profile, not just an account
fn verify_target_exists(state: &AppState, user_id: &Uuid) -> Result<(), ApiError> {
    let repo = ProfileRepository::new(state.db.pool.clone());
    repo.get_by_user_id(user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    Ok(())
}

/// POST /api/users/:id/follow - Follow a user
pub async fn follow_user(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<FollowStatus>> {
    let target_id = parse_user_id(&target_id)?;
    let follower_id = get_user_from_headers(&state, &headers)?;

    if follower_id == target_id {
        return Err(ApiError::BadRequest(
            "You cannot follow yourself".to_string(),
        ));
    }

    verify_target_exists(&state, &target_id)?;

    let repo = FollowRepository::new(state.db.pool.clone());
    let created = repo
        .follow(&follower_id, &target_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    if created {
        tracing::info!("User {} followed {}", follower_id, target_id);
    }

    let status = repo
        .get_follow_status(&follower_id, &target_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(status))
}

/// DELETE /api/users/:id/follow - Unfollow a user
pub async fn unfollow_user(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<FollowStatus>> {
    let target_id = parse_user_id(&target_id)?;
    let follower_id = get_user_from_headers(&state, &headers)?;

    let repo = FollowRepository::new(state.db.pool.clone());
    let removed = repo
        .unfollow(&follower_id, &target_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    if !removed {
        return Err(ApiError::NotFound("Not following this user".to_string()));
    }

    let status = repo
        .get_follow_status(&follower_id, &target_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(status))
}

/// GET /api/users/:id/follow-status - Both directions relative to the caller
pub async fn get_follow_status(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<FollowStatus>> {
    let target_id = parse_user_id(&target_id)?;
    let viewer_id = get_user_from_headers(&state, &headers)?;

    let repo = FollowRepository::new(state.db.pool.clone());
    let status = repo
        .get_follow_status(&viewer_id, &target_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(status))
}
