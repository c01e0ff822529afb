use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{NotificationKind, ReactionEmoji};

// DateTime fields travel over the wire as RFC3339 strings
mod datetime_format {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&date.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<DateTime<Utc>>()
            .map_err(serde::de::Error::custom)
    }
}

/// Public-facing user record. Created during onboarding, one per
/// authenticated account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub interests: Vec<String>,
    pub onboarding_completed: bool,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "datetime_format")]
    pub updated_at: DateTime<Utc>,
}

/// Per-emoji reaction tallies for a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCounts {
    #[serde(rename = "👏", default)]
    pub clap: i64,
    #[serde(rename = "💖", default)]
    pub heart: i64,
    #[serde(rename = "🤣", default)]
    pub laugh: i64,
}

impl ReactionCounts {
    pub fn get(&self, emoji: ReactionEmoji) -> i64 {
        match emoji {
            ReactionEmoji::Clap => self.clap,
            ReactionEmoji::Heart => self.heart,
            ReactionEmoji::Laugh => self.laugh,
        }
    }

    pub fn set(&mut self, emoji: ReactionEmoji, count: i64) {
        match emoji {
            ReactionEmoji::Clap => self.clap = count,
            ReactionEmoji::Heart => self.heart = count,
            ReactionEmoji::Laugh => self.laugh = count,
        }
    }

    pub fn total(&self) -> i64 {
        self.clap + self.heart + self.laugh
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub author_username: String,
    pub author_display_name: String,
    #[serde(default)]
    pub author_avatar_url: Option<String>,
    pub content: String,
    pub tags: Vec<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    /// Set on replies; top-level posts carry None
    #[serde(default)]
    pub parent_post_id: Option<Uuid>,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reaction_counts: ReactionCounts,
    /// Viewer's own reaction on this post (if authenticated)
    #[serde(default)]
    pub viewer_reaction: Option<String>,
    /// Number of direct replies to this post
    #[serde(default)]
    pub reply_count: i32,
    /// Nesting depth within a thread (0 = top-level)
    #[serde(default)]
    pub depth: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub emoji: ReactionEmoji,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
}

/// Both directions of the follow relationship between the viewer and
/// another user. "Mutual" is simply both flags true, derived at
/// render time rather than stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowStatus {
    pub is_following: bool,
    pub is_followed_by: bool,
}

impl FollowStatus {
    pub fn is_mutual(&self) -> bool {
        self.is_following && self.is_followed_by
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    /// Recipient of the notification. Never equal to `actor_id`.
    pub user_id: Uuid,
    pub actor_id: Uuid,
    /// Absent for follow notifications.
    #[serde(default)]
    pub post_id: Option<Uuid>,
    pub kind: NotificationKind,
    #[serde(default)]
    pub reaction_emoji: Option<String>,
    pub is_read: bool,
    #[serde(with = "datetime_format")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub actor_username: String,
    #[serde(default)]
    pub actor_display_name: String,
    #[serde(default)]
    pub actor_avatar_url: Option<String>,
    /// Leading content of the target post, for inbox rendering
    #[serde(default)]
    pub post_snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileView {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub interests: Vec<String>,
    pub post_count: i64,
    pub follower_count: i64,
    pub following_count: i64,
    /// Viewer's relationship to this profile; absent for the viewer's
    /// own profile or unauthenticated requests.
    #[serde(default)]
    pub follow_status: Option<FollowStatus>,
}

/// One row in a followers/following listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub follow_status: FollowStatus,
}

// Request and response bodies

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub session_token: String,
    pub onboarding_completed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub onboarding_completed: bool,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OnboardingRequest {
    pub username: String,
    pub display_name: String,
    pub interests: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub interests: Option<Vec<String>>,
}

/// Raw upload payload: base64 file bytes plus the declared MIME type.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImageUpload {
    pub data: String,
    pub content_type: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageUpload>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateReplyRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleReactionResponse {
    pub reaction_counts: ReactionCounts,
    /// The caller's reaction after the toggle (None after toggle-off)
    pub viewer_reaction: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckUsernameResponse {
    pub available: bool,
}

/// Tag page payload: the slug as normalized, its display label when
/// it is a preset, and the posts carrying it
#[derive(Debug, Serialize, Deserialize)]
pub struct TagPageResponse {
    pub slug: String,
    pub label: Option<String>,
    pub posts: Vec<Post>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub unread: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}
