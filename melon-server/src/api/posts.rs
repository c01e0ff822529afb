use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    api::{ApiError, ApiResult},
    db::repositories::{PostRepository, ProfileRepository, ReactionRepository},
    state::AppState,
    storage, tags, validation,
};
use melon_types::{
    CreatePostRequest, CreateReplyRequest, FeedScope, Post, Profile, ReactionCounts,
    TagPageResponse,
};

/// Replies may nest one level under a direct reply and no further
const MAX_REPLY_DEPTH: i32 = 2;

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

#[derive(Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    scope: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    25
}

/// Fill in reaction counts and the viewer's own reaction for a page of
/// posts. Done post by post; pages are small.
pub(crate) fn enrich_posts(
    state: &AppState,
    viewer_id: Option<&Uuid>,
    posts: &mut [Post],
) -> Result<(), ApiError> {
    let reaction_repo = ReactionRepository::new(state.db.pool.clone());

    for post in posts.iter_mut() {
        post.reaction_counts = reaction_repo
            .get_counts(&post.id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?;

        if let Some(viewer_id) = viewer_id {
            if let Ok(Some(reaction)) = reaction_repo.get_reaction(&post.id, viewer_id) {
                post.viewer_reaction = Some(reaction.emoji.as_str().to_string());
            }
        }
    }

    Ok(())
}

fn parse_post_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid post ID".to_string()))
}

/// Posting requires a completed profile, not just an account
fn get_author_profile(state: &AppState, user_id: &Uuid) -> Result<Profile, ApiError> {
    let repo = ProfileRepository::new(state.db.pool.clone());
    let profile = repo
        .get_by_user_id(user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::Forbidden("Complete onboarding before posting".to_string()))?;

    if !profile.onboarding_completed {
        return Err(ApiError::Forbidden(
            "Complete onboarding before posting".to_string(),
        ));
    }

    Ok(profile)
}

/// POST /api/posts - Create a top-level post
pub async fn create_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePostRequest>,
) -> ApiResult<Json<Post>> {
    // Validate content before touching auth, cheapest check first
    validation::validate_post_content(&payload.content).map_err(ApiError::BadRequest)?;

    if payload.images.len() > storage::MAX_IMAGES_PER_POST {
        return Err(ApiError::BadRequest(format!(
            "A post can carry at most {} images",
            storage::MAX_IMAGES_PER_POST
        )));
    }

    let author_id = get_user_from_headers(&state, &headers)?;
    let author = get_author_profile(&state, &author_id)?;

    // Decode and validate every image before anything touches disk
    let mut decoded: Vec<(String, Vec<u8>)> = Vec::with_capacity(payload.images.len());
    for upload in &payload.images {
        if storage::extension_for(&upload.content_type).is_none() {
            return Err(ApiError::BadRequest(format!(
                "Unsupported image type: {}",
                upload.content_type
            )));
        }
        let bytes = B64
            .decode(upload.data.as_bytes())
            .map_err(|_| ApiError::BadRequest("Invalid image encoding".to_string()))?;
        if bytes.len() > storage::MAX_IMAGE_BYTES {
            return Err(ApiError::BadRequest(
                "Image exceeds the 5 MiB limit".to_string(),
            ));
        }
        decoded.push((upload.content_type.clone(), bytes));
    }

    let post_id = Uuid::new_v4();
    let mut image_urls = Vec::with_capacity(decoded.len());
    for (content_type, bytes) in &decoded {
        let url = state
            .image_store
            .save_post_image(&post_id, content_type, bytes)
            .await
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
        image_urls.push(url);
    }

    let post = Post {
        id: post_id,
        user_id: author_id,
        author_username: author.username,
        author_display_name: author.display_name,
        author_avatar_url: author.avatar_url,
        content: payload.content.trim().to_string(),
        tags: tags::prepare_tags(&payload.tags),
        image_urls,
        parent_post_id: None,
        created_at: Utc::now(),
        reaction_counts: ReactionCounts::default(),
        viewer_reaction: None,
        reply_count: 0,
        depth: 0,
    };

    let post_repo = PostRepository::new(state.db.pool.clone());
    post_repo
        .create(&post)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    tracing::info!("User {} created post {}", author_id, post_id);

    Ok(Json(post))
}

/// GET /api/feed - Top-level posts, either everyone's or just the
/// accounts the caller follows
pub async fn get_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FeedQuery>,
) -> ApiResult<Json<Vec<Post>>> {
    let scope = match query.scope.as_deref() {
        None => FeedScope::default(),
        Some(raw) => FeedScope::parse(raw)
            .ok_or_else(|| ApiError::BadRequest(format!("Invalid feed scope: {}", raw)))?,
    };

    // Optional for the global feed, required for home
    let viewer_id = get_user_from_headers(&state, &headers).ok();

    let post_repo = PostRepository::new(state.db.pool.clone());
    let mut posts = match scope {
        FeedScope::Everyone => post_repo
            .get_feed(query.limit, query.offset)
            .map_err(|e| ApiError::InternalError(e.to_string()))?,
        FeedScope::Home => {
            let viewer_id = viewer_id.ok_or_else(|| {
                ApiError::Unauthorized("Home feed requires a session".to_string())
            })?;
            post_repo
                .get_home_feed(&viewer_id, query.limit, query.offset)
                .map_err(|e| ApiError::InternalError(e.to_string()))?
        }
    };

    enrich_posts(&state, viewer_id.as_ref(), &mut posts)?;

    Ok(Json(posts))
}

/// GET /api/posts/:id - A single post at any depth
pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Post>> {
    let post_id = parse_post_id(&post_id)?;
    let viewer_id = get_user_from_headers(&state, &headers).ok();

    let post_repo = PostRepository::new(state.db.pool.clone());
    let mut post = post_repo
        .get_by_id(&post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    post.depth = post_repo
        .get_depth(&post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    enrich_posts(&state, viewer_id.as_ref(), std::slice::from_mut(&mut post))?;

    Ok(Json(post))
}

/// GET /api/posts/:id/replies - The thread under a post, depth-annotated
pub async fn get_replies(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Post>>> {
    let post_id = parse_post_id(&post_id)?;
    let viewer_id = get_user_from_headers(&state, &headers).ok();

    let post_repo = PostRepository::new(state.db.pool.clone());

    // Verify post exists
    post_repo
        .get_by_id(&post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    let mut replies = post_repo
        .get_replies(&post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    enrich_posts(&state, viewer_id.as_ref(), &mut replies)?;

    Ok(Json(replies))
}

/// POST /api/posts/:id/replies - Reply to a post
///
/// Replies inherit the thread root's tags so tag pages keep whole
/// conversations together, and may not nest below the second level.
pub async fn create_reply(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateReplyRequest>,
) -> ApiResult<Json<Post>> {
    validation::validate_post_content(&payload.content).map_err(ApiError::BadRequest)?;

    let parent_post_id = parse_post_id(&post_id)?;
    let author_id = get_user_from_headers(&state, &headers)?;
    let author = get_author_profile(&state, &author_id)?;

    let post_repo = PostRepository::new(state.db.pool.clone());
    let parent = post_repo
        .get_by_id(&parent_post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    let parent_depth = post_repo
        .get_depth(&parent.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    if parent_depth >= MAX_REPLY_DEPTH {
        return Err(ApiError::BadRequest(
            "Replies are limited to two levels".to_string(),
        ));
    }

    let inherited_tags = if parent.parent_post_id.is_none() {
        parent.tags.clone()
    } else {
        post_repo
            .get_thread_root(&parent.id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?
            .map(|root| root.tags)
            // Orphaned thread: fall back to the parent's own tags
            .unwrap_or_else(|| parent.tags.clone())
    };

    let reply = Post {
        id: Uuid::new_v4(),
        user_id: author_id,
        author_username: author.username,
        author_display_name: author.display_name,
        author_avatar_url: author.avatar_url,
        content: payload.content.trim().to_string(),
        tags: inherited_tags,
        image_urls: Vec::new(),
        parent_post_id: Some(parent.id),
        created_at: Utc::now(),
        reaction_counts: ReactionCounts::default(),
        viewer_reaction: None,
        reply_count: 0,
        depth: parent_depth + 1,
    };

    post_repo
        .create_reply(&reply, &parent.user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(reply))
}

/// DELETE /api/posts/:id - Author-only post removal
///
/// Image files go first; a file that will not delete is logged and
/// skipped rather than blocking the row delete. Replies stay behind.
pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let post_id = parse_post_id(&post_id)?;
    let user_id = get_user_from_headers(&state, &headers)?;

    let post_repo = PostRepository::new(state.db.pool.clone());
    let post = post_repo
        .get_by_id(&post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    if post.user_id != user_id {
        return Err(ApiError::Forbidden(
            "You can only delete your own posts".to_string(),
        ));
    }

    if !post.image_urls.is_empty() {
        if let Err(e) = state.image_store.delete_post_images(&post_id).await {
            tracing::warn!("Failed to delete images for post {}: {}", post_id, e);
        }
    }

    post_repo
        .delete_with_references(&post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    tracing::info!("User {} deleted post {}", user_id, post_id);

    Ok(Json(serde_json::json!({
        "message": "Post deleted successfully",
        "post_id": post_id
    })))
}

/// GET /api/tags/:slug - A tag's label and its posts
pub async fn get_tag_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<TagPageResponse>> {
    let slug = tags::normalize_tag(&slug)
        .ok_or_else(|| ApiError::BadRequest("Invalid tag".to_string()))?;
    let viewer_id = get_user_from_headers(&state, &headers).ok();

    let post_repo = PostRepository::new(state.db.pool.clone());
    let mut posts = post_repo
        .get_by_tag(&slug, query.limit, query.offset)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    enrich_posts(&state, viewer_id.as_ref(), &mut posts)?;

    Ok(Json(TagPageResponse {
        label: tags::preset_label(&slug).map(|l| l.to_string()),
        slug,
        posts,
    }))
}
