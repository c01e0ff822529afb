use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use uuid::Uuid;

use crate::{
    api::posts::PageQuery,
    api::{ApiError, ApiResult},
    db::repositories::NotificationRepository,
    state::AppState,
};
use melon_types::{Notification, UnreadCountResponse};

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

/// GET /api/notifications - The caller's inbox, newest first
pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    let repo = NotificationRepository::new(state.db.pool.clone());
    let notifications = repo
        .list_for_user(&user_id, query.limit, query.offset)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(notifications))
}

/// GET /api/notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<UnreadCountResponse>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    let repo = NotificationRepository::new(state.db.pool.clone());
    let unread = repo
        .unread_count(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(UnreadCountResponse { unread }))
}

/// PUT /api/notifications/:id/read - Mark one notification read
pub async fn mark_read(
    State(state): State<AppState>,
    Path(notification_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let notification_id = Uuid::parse_str(&notification_id)
        .map_err(|_| ApiError::BadRequest("Invalid notification ID".to_string()))?;
    let user_id = get_user_from_headers(&state, &headers)?;

    let repo = NotificationRepository::new(state.db.pool.clone());
    let recipient = repo
        .get_recipient(&notification_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Notification not found".to_string()))?;

    if recipient != user_id {
        return Err(ApiError::Forbidden(
            "You can only mark your own notifications read".to_string(),
        ));
    }

    repo.mark_read(&notification_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "message": "Notification marked read"
    })))
}

/// PUT /api/notifications/read-all - Clear the caller's unread badge
pub async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    let repo = NotificationRepository::new(state.db.pool.clone());
    let updated = repo
        .mark_all_read(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "message": "All notifications marked read",
        "updated": updated
    })))
}
