use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::posts::{enrich_posts, PageQuery},
    api::{ApiError, ApiResult},
    db::repositories::{FollowRepository, PostRepository, ProfileRepository},
    state::AppState,
    storage, validation,
};
use melon_types::{ConnectionEntry, ImageUpload, Post, ProfileView, UpdateProfileRequest};

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

/// GET /api/profiles/:username - Public profile with stats
pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ProfileView>> {
    let pool = state.db.pool.clone();
    let profile_repo = ProfileRepository::new(pool.clone());
    let post_repo = PostRepository::new(pool.clone());
    let follow_repo = FollowRepository::new(pool);

    let profile = profile_repo
        .get_by_username(&username)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    let post_count = post_repo
        .get_post_count(&profile.user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    let follower_count = follow_repo
        .get_follower_count(&profile.user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    let following_count = follow_repo
        .get_following_count(&profile.user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    // Follow status only makes sense for someone else's profile
    let viewer_id = get_user_from_headers(&state, &headers).ok();
    let follow_status = match viewer_id {
        Some(viewer_id) if viewer_id != profile.user_id => Some(
            follow_repo
                .get_follow_status(&viewer_id, &profile.user_id)
                .map_err(|e| ApiError::InternalError(e.to_string()))?,
        ),
        _ => None,
    };

    Ok(Json(ProfileView {
        user_id: profile.user_id,
        username: profile.username,
        display_name: profile.display_name,
        bio: profile.bio,
        avatar_url: profile.avatar_url,
        interests: profile.interests,
        post_count,
        follower_count,
        following_count,
        follow_status,
    }))
}

/// GET /api/profiles/:username/posts - A user's top-level posts
pub async fn get_profile_posts(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Post>>> {
    let pool = state.db.pool.clone();
    let profile_repo = ProfileRepository::new(pool.clone());
    let post_repo = PostRepository::new(pool);

    profile_repo
        .get_by_username(&username)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    let mut posts = post_repo
        .get_by_username(&username, query.limit, query.offset)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let viewer_id = get_user_from_headers(&state, &headers).ok();
    enrich_posts(&state, viewer_id.as_ref(), &mut posts)?;

    Ok(Json(posts))
}

/// PUT /api/profiles/me - Edit the caller's profile
///
/// Every field is optional; omitted fields keep their current value.
/// An empty bio clears it.
pub async fn update_my_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<melon_types::Profile>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    let repo = ProfileRepository::new(state.db.pool.clone());
    let mut profile = repo
        .get_by_user_id(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    if let Some(username) = payload.username {
        validation::validate_username(&username).map_err(ApiError::BadRequest)?;
        let taken = repo
            .username_taken(&username, Some(&user_id))
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
        if taken {
            return Err(ApiError::BadRequest("Username already taken".to_string()));
        }
        profile.username = username;
    }

    if let Some(display_name) = payload.display_name {
        validation::validate_display_name(&display_name).map_err(ApiError::BadRequest)?;
        profile.display_name = display_name.trim().to_string();
    }

    if let Some(bio) = payload.bio {
        validation::validate_bio(&bio).map_err(ApiError::BadRequest)?;
        let bio = bio.trim().to_string();
        profile.bio = if bio.is_empty() { None } else { Some(bio) };
    }

    if let Some(interests) = payload.interests {
        validation::validate_interests(&interests).map_err(ApiError::BadRequest)?;
        profile.interests = interests
            .iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .collect();
    }

    repo.update(&profile)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let updated = repo
        .get_by_user_id(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::InternalError("Profile vanished after update".to_string()))?;

    Ok(Json(updated))
}

/// PUT /api/profiles/me/avatar - Replace the caller's avatar
///
/// The previous file is deleted first; losing that race only leaks a
/// file, so failures are logged and ignored.
pub async fn upload_avatar(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ImageUpload>,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    if storage::extension_for(&payload.content_type).is_none() {
        return Err(ApiError::BadRequest(format!(
            "Unsupported image type: {}",
            payload.content_type
        )));
    }
    let bytes = B64
        .decode(payload.data.as_bytes())
        .map_err(|_| ApiError::BadRequest("Invalid image encoding".to_string()))?;
    if bytes.len() > storage::MAX_IMAGE_BYTES {
        return Err(ApiError::BadRequest(
            "Image exceeds the 5 MiB limit".to_string(),
        ));
    }

    let repo = ProfileRepository::new(state.db.pool.clone());
    let profile = repo
        .get_by_user_id(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    if let Some(old_url) = &profile.avatar_url {
        if let Err(e) = state.image_store.delete_public_path(old_url).await {
            tracing::warn!("Failed to delete old avatar for {}: {}", user_id, e);
        }
    }

    let avatar_url = state
        .image_store
        .save_avatar(&user_id, &payload.content_type, &bytes)
        .await
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    repo.update_avatar_url(&user_id, Some(&avatar_url))
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "avatar_url": avatar_url
    })))
}

/// DELETE /api/profiles/me/avatar - Remove the caller's avatar
pub async fn delete_avatar(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    let repo = ProfileRepository::new(state.db.pool.clone());
    let profile = repo
        .get_by_user_id(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    if let Some(old_url) = &profile.avatar_url {
        if let Err(e) = state.image_store.delete_public_path(old_url).await {
            tracing::warn!("Failed to delete avatar file for {}: {}", user_id, e);
        }
    }

    repo.update_avatar_url(&user_id, None)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "message": "Avatar removed"
    })))
}

#[derive(Deserialize)]
pub struct ConnectionsQuery {
    pub list: String,
}

/// GET /api/profiles/:username/connections?list=followers|following
///
/// Each entry carries the caller's own follow status toward that user
/// so the list can render follow buttons without extra requests.
pub async fn get_connections(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
    Query(query): Query<ConnectionsQuery>,
) -> ApiResult<Json<Vec<ConnectionEntry>>> {
    let pool = state.db.pool.clone();
    let profile_repo = ProfileRepository::new(pool.clone());
    let follow_repo = FollowRepository::new(pool);

    let profile = profile_repo
        .get_by_username(&username)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    let members = match query.list.as_str() {
        "followers" => follow_repo
            .get_followers(&profile.user_id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?,
        "following" => follow_repo
            .get_following(&profile.user_id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?,
        other => {
            return Err(ApiError::BadRequest(format!(
                "Invalid connection list: {}",
                other
            )))
        }
    };

    let viewer_id = get_user_from_headers(&state, &headers).ok();

    let mut entries = Vec::with_capacity(members.len());
    for member in members {
        let follow_status = match viewer_id {
            Some(viewer_id) if viewer_id != member.user_id => follow_repo
                .get_follow_status(&viewer_id, &member.user_id)
                .map_err(|e| ApiError::InternalError(e.to_string()))?,
            _ => Default::default(),
        };
        entries.push(ConnectionEntry {
            user_id: member.user_id,
            username: member.username,
            display_name: member.display_name,
            avatar_url: member.avatar_url,
            bio: member.bio,
            follow_status,
        });
    }

    Ok(Json(entries))
}
