use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use uuid::Uuid;

use crate::{
    api::{ApiError, ApiResult},
    db::repositories::{PostRepository, ReactionRepository},
    state::AppState,
};
use melon_types::{ReactionEmoji, ToggleReactionRequest, ToggleReactionResponse};

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

/// POST /api/posts/:id/reactions - Toggle the caller's reaction
///
/// Same emoji removes it, a different emoji replaces it. The response
/// carries the refreshed counts so the client never has to guess.
pub async fn toggle_reaction(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ToggleReactionRequest>,
) -> ApiResult<Json<ToggleReactionResponse>> {
    let post_id = Uuid::parse_str(&post_id)
        .map_err(|_| ApiError::BadRequest("Invalid post ID".to_string()))?;

    let emoji = ReactionEmoji::parse(&payload.emoji)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid reaction emoji: {}", payload.emoji)))?;

    let user_id = get_user_from_headers(&state, &headers)?;

    let pool = state.db.pool.clone();
    let post_repo = PostRepository::new(pool.clone());
    let reaction_repo = ReactionRepository::new(pool);

    // Verify post exists
    post_repo
        .get_by_id(&post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    let outcome = reaction_repo
        .toggle(&post_id, &user_id, emoji)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let reaction_counts = reaction_repo
        .get_counts(&post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(ToggleReactionResponse {
        reaction_counts,
        viewer_reaction: outcome.map(|e| e.as_str().to_string()),
    }))
}
