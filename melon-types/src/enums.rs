use serde::{Deserialize, Serialize};

/// The preset emoji a post can be reacted with. A user holds at most
/// one reaction per post, so switching emoji replaces the old one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionEmoji {
    #[serde(rename = "👏")]
    Clap,
    #[serde(rename = "💖")]
    Heart,
    #[serde(rename = "🤣")]
    Laugh,
}

impl ReactionEmoji {
    pub const ALL: [ReactionEmoji; 3] =
        [ReactionEmoji::Clap, ReactionEmoji::Heart, ReactionEmoji::Laugh];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReactionEmoji::Clap => "👏",
            ReactionEmoji::Heart => "💖",
            ReactionEmoji::Laugh => "🤣",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "👏" => Some(ReactionEmoji::Clap),
            "💖" => Some(ReactionEmoji::Heart),
            "🤣" => Some(ReactionEmoji::Laugh),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Reaction,
    Reply,
    Follow,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Reaction => "reaction",
            NotificationKind::Reply => "reply",
            NotificationKind::Follow => "follow",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reaction" => Some(NotificationKind::Reaction),
            "reply" => Some(NotificationKind::Reply),
            "follow" => Some(NotificationKind::Follow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedScope {
    /// Posts from users the viewer follows, plus their own.
    Home,
    /// All top-level posts.
    #[default]
    Everyone,
}

impl FeedScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedScope::Home => "home",
            FeedScope::Everyone => "everyone",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "home" => Some(FeedScope::Home),
            "everyone" => Some(FeedScope::Everyone),
            _ => None,
        }
    }
}
