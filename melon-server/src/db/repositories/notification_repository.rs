use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use melon_types::{Notification, NotificationKind};

use crate::db::DbPool;

pub struct NotificationRepository {
    pool: DbPool,
}

impl NotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// List a user's notifications, newest first, enriched with the
    /// actor's profile and a snippet of the referenced post. Deleted
    /// posts leave the snippet empty rather than dropping the row.
    pub fn list_for_user(&self, user_id: &Uuid, limit: i64, offset: i64) -> Result<Vec<Notification>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT n.id, n.user_id, n.actor_id, n.post_id, n.kind, n.reaction_emoji,
                    n.is_read, n.created_at,
                    pr.username, pr.display_name, pr.avatar_url,
                    substr(p.content, 1, 80) as post_snippet
             FROM notifications n
             JOIN profiles pr ON n.actor_id = pr.user_id
             LEFT JOIN posts p ON n.post_id = p.id
             WHERE n.user_id = ?1
             ORDER BY n.created_at DESC
             LIMIT ?2 OFFSET ?3",
        )?;

        let notifications = stmt
            .query_map(
                rusqlite::params![user_id.to_string(), limit, offset],
                |row| {
                    let post_id_str: Option<String> = row.get(3)?;
                    let kind: String = row.get(4)?;
                    Ok(Notification {
                        id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
                        user_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap(),
                        actor_id: Uuid::parse_str(&row.get::<_, String>(2)?).unwrap(),
                        post_id: post_id_str.and_then(|s| Uuid::parse_str(&s).ok()),
                        kind: NotificationKind::parse(&kind).unwrap(),
                        reaction_emoji: row.get(5)?,
                        is_read: row.get(6)?,
                        created_at: row.get::<_, String>(7)?.parse::<DateTime<Utc>>().unwrap(),
                        actor_username: row.get(8)?,
                        actor_display_name: row.get(9)?,
                        actor_avatar_url: row.get(10)?,
                        post_snippet: row.get(11)?,
                    })
                },
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(notifications)
    }

    pub fn unread_count(&self, user_id: &Uuid) -> Result<i64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// The recipient of a notification, used for ownership checks
    pub fn get_recipient(&self, notification_id: &Uuid) -> Result<Option<Uuid>> {
        let conn = self.pool.get()?;
        let recipient: Option<String> = conn
            .query_row(
                "SELECT user_id FROM notifications WHERE id = ?",
                [notification_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(recipient.and_then(|s| Uuid::parse_str(&s).ok()))
    }

    /// Mark a single notification read. Already-read rows are a no-op.
    pub fn mark_read(&self, notification_id: &Uuid) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE id = ?",
            [notification_id.to_string()],
        )
        .context("Failed to mark notification read")?;
        Ok(())
    }

    /// Mark everything the user has unread as read. Returns how many
    /// rows flipped.
    pub fn mark_all_read(&self, user_id: &Uuid) -> Result<usize> {
        let conn = self.pool.get()?;
        let updated = conn
            .execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0",
                [user_id.to_string()],
            )
            .context("Failed to mark notifications read")?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> NotificationRepository {
        let db = Database::in_memory().expect("Failed to create test database");
        db.initialize().expect("Failed to initialize schema");
        db.seed_test_data().expect("Failed to seed test data");
        NotificationRepository::new(db.pool)
    }

    fn sakura_id() -> Uuid {
        Uuid::parse_str("550e8400-e29b-41d4-a716-446655440001").unwrap()
    }

    fn unread_reaction_id() -> Uuid {
        Uuid::parse_str("950e8400-e29b-41d4-a716-446655440002").unwrap()
    }

    #[test]
    fn test_list_is_enriched_and_newest_first() {
        let repo = setup();
        let notifications = repo.list_for_user(&sakura_id(), 25, 0).expect("list");

        assert_eq!(notifications.len(), 4);
        for pair in notifications.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }

        // Newest is yuki's heart on the illustration post
        let newest = &notifications[0];
        assert_eq!(newest.kind, NotificationKind::Reaction);
        assert_eq!(newest.reaction_emoji.as_deref(), Some("💖"));
        assert_eq!(newest.actor_username, "yuki");
        assert_eq!(
            newest.post_snippet.as_deref(),
            Some("新しいイラストが完成しました！")
        );

        // The follow notification carries no post reference
        let follow = notifications
            .iter()
            .find(|n| n.kind == NotificationKind::Follow)
            .expect("follow notification");
        assert!(follow.post_id.is_none());
        assert!(follow.post_snippet.is_none());
    }

    #[test]
    fn test_unread_count_matches_seed() {
        let repo = setup();
        assert_eq!(repo.unread_count(&sakura_id()).expect("count"), 2);
    }

    #[test]
    fn test_mark_read_flips_one_row() {
        let repo = setup();

        repo.mark_read(&unread_reaction_id()).expect("mark read");
        assert_eq!(repo.unread_count(&sakura_id()).expect("count"), 1);

        // Marking again changes nothing
        repo.mark_read(&unread_reaction_id()).expect("mark read");
        assert_eq!(repo.unread_count(&sakura_id()).expect("count"), 1);
    }

    #[test]
    fn test_mark_all_read() {
        let repo = setup();
        let flipped = repo.mark_all_read(&sakura_id()).expect("mark all");
        assert_eq!(flipped, 2);
        assert_eq!(repo.unread_count(&sakura_id()).expect("count"), 0);

        let flipped = repo.mark_all_read(&sakura_id()).expect("mark all");
        assert_eq!(flipped, 0);
    }

    #[test]
    fn test_recipient_lookup() {
        let repo = setup();
        assert_eq!(
            repo.get_recipient(&unread_reaction_id()).expect("query"),
            Some(sakura_id())
        );
        assert_eq!(repo.get_recipient(&Uuid::new_v4()).expect("query"), None);
    }

    #[test]
    fn test_snippet_survives_post_deletion() {
        let repo = setup();
        {
            let conn = repo.pool.get().expect("conn");
            conn.execute(
                "DELETE FROM posts WHERE id = '650e8400-e29b-41d4-a716-446655440001'",
                [],
            )
            .expect("delete");
        }

        let notifications = repo.list_for_user(&sakura_id(), 25, 0).expect("list");
        assert_eq!(notifications.len(), 4);
        let newest = &notifications[0];
        assert!(newest.post_id.is_some());
        assert!(newest.post_snippet.is_none());
    }
}
