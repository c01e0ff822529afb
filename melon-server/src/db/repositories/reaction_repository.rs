use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::warn;
use uuid::Uuid;

use melon_types::{Reaction, ReactionCounts, ReactionEmoji};

use crate::db::DbPool;

pub struct ReactionRepository {
    pool: DbPool,
}

impl ReactionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Toggle a user's reaction on a post. At most one reaction per
    /// (post, user) exists:
    /// - no current reaction: the emoji is set
    /// - same emoji: the reaction is removed
    /// - different emoji: the reaction is replaced and its timestamp
    ///   refreshed
    ///
    /// Returns the reaction left standing, or None when it was removed.
    /// When a reaction is set or replaced the post's author is notified
    /// in the same transaction, unless they reacted to their own post.
    /// A failed notification insert is logged and the toggle commits
    /// anyway.
    pub fn toggle(
        &self,
        post_id: &Uuid,
        user_id: &Uuid,
        emoji: ReactionEmoji,
    ) -> Result<Option<ReactionEmoji>> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT emoji FROM reactions WHERE post_id = ? AND user_id = ?",
                (post_id.to_string(), user_id.to_string()),
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing.as_deref().and_then(ReactionEmoji::parse) {
            None => {
                tx.execute(
                    "INSERT INTO reactions (post_id, user_id, emoji, created_at)
                     VALUES (?, ?, ?, ?)",
                    (
                        post_id.to_string(),
                        user_id.to_string(),
                        emoji.as_str(),
                        Utc::now().to_rfc3339(),
                    ),
                )
                .context("Failed to insert reaction")?;
                Some(emoji)
            }
            Some(current) if current == emoji => {
                tx.execute(
                    "DELETE FROM reactions WHERE post_id = ? AND user_id = ?",
                    (post_id.to_string(), user_id.to_string()),
                )
                .context("Failed to remove reaction")?;
                None
            }
            Some(_) => {
                tx.execute(
                    "UPDATE reactions SET emoji = ?, created_at = ?
                     WHERE post_id = ? AND user_id = ?",
                    (
                        emoji.as_str(),
                        Utc::now().to_rfc3339(),
                        post_id.to_string(),
                        user_id.to_string(),
                    ),
                )
                .context("Failed to switch reaction")?;
                Some(emoji)
            }
        };

        if let Some(active) = outcome {
            let author_id: Option<String> = tx
                .query_row(
                    "SELECT user_id FROM posts WHERE id = ?",
                    [post_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(author_id) = author_id {
                if author_id != user_id.to_string() {
                    let inserted = tx.execute(
                        "INSERT INTO notifications (id, user_id, actor_id, post_id, kind, reaction_emoji, is_read, created_at)
                         VALUES (?, ?, ?, ?, 'reaction', ?, 0, ?)",
                        (
                            Uuid::new_v4().to_string(),
                            author_id,
                            user_id.to_string(),
                            post_id.to_string(),
                            active.as_str(),
                            Utc::now().to_rfc3339(),
                        ),
                    );
                    if let Err(e) = inserted {
                        warn!("Failed to record reaction notification: {}", e);
                    }
                }
            }
        }

        tx.commit().context("Failed to commit reaction toggle")?;
        Ok(outcome)
    }

    /// Per-emoji reaction counts for a post
    pub fn get_counts(&self, post_id: &Uuid) -> Result<ReactionCounts> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT emoji, COUNT(*) FROM reactions WHERE post_id = ? GROUP BY emoji",
        )?;

        let rows = stmt.query_map([post_id.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = ReactionCounts::default();
        for row in rows {
            let (emoji, count) = row?;
            if let Some(emoji) = ReactionEmoji::parse(&emoji) {
                counts.set(emoji, count);
            }
        }

        Ok(counts)
    }

    /// The viewer's current reaction on a post, if any
    pub fn get_reaction(&self, post_id: &Uuid, user_id: &Uuid) -> Result<Option<Reaction>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT post_id, user_id, emoji, created_at
             FROM reactions WHERE post_id = ? AND user_id = ?",
        )?;

        let reaction = stmt
            .query_row((post_id.to_string(), user_id.to_string()), |row| {
                let emoji: String = row.get(2)?;
                Ok(Reaction {
                    post_id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
                    user_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap(),
                    emoji: ReactionEmoji::parse(&emoji).unwrap(),
                    created_at: row.get::<_, String>(3)?.parse::<DateTime<Utc>>().unwrap(),
                })
            })
            .optional()?;

        Ok(reaction)
    }
}
