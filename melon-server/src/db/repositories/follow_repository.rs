use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use melon_types::{FollowStatus, Profile};

use crate::db::DbPool;

pub struct FollowRepository {
    pool: DbPool,
}

impl FollowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Follow a user. Returns true when a new follow edge was created,
    /// false when it already existed. The followed user is notified in
    /// the same transaction, but only for a genuinely new edge, so
    /// re-following never duplicates the notification.
    pub fn follow(&self, follower_id: &Uuid, following_id: &Uuid) -> Result<bool> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let changed = tx
            .execute(
                "INSERT OR IGNORE INTO follows (follower_id, following_id, created_at)
                 VALUES (?, ?, ?)",
                (
                    follower_id.to_string(),
                    following_id.to_string(),
                    Utc::now().to_rfc3339(),
                ),
            )
            .context("Failed to create follow")?;

        if changed == 1 {
            let inserted = tx.execute(
                "INSERT INTO notifications (id, user_id, actor_id, post_id, kind, reaction_emoji, is_read, created_at)
                 VALUES (?, ?, ?, NULL, 'follow', NULL, 0, ?)",
                (
                    Uuid::new_v4().to_string(),
                    following_id.to_string(),
                    follower_id.to_string(),
                    Utc::now().to_rfc3339(),
                ),
            );
            if let Err(e) = inserted {
                warn!("Failed to record follow notification: {}", e);
            }
        }

        tx.commit().context("Failed to commit follow")?;
        Ok(changed == 1)
    }

    /// Remove a follow edge. Returns true when an edge was removed.
    pub fn unfollow(&self, follower_id: &Uuid, following_id: &Uuid) -> Result<bool> {
        let conn = self.pool.get()?;
        let removed = conn
            .execute(
                "DELETE FROM follows WHERE follower_id = ? AND following_id = ?",
                (follower_id.to_string(), following_id.to_string()),
            )
            .context("Failed to remove follow")?;
        Ok(removed > 0)
    }

    /// Both directions of the relationship between viewer and subject
    pub fn get_follow_status(&self, viewer_id: &Uuid, subject_id: &Uuid) -> Result<FollowStatus> {
        let conn = self.pool.get()?;

        let is_following: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM follows WHERE follower_id = ? AND following_id = ?",
            (viewer_id.to_string(), subject_id.to_string()),
            |row| row.get(0),
        )?;

        let is_followed_by: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM follows WHERE follower_id = ? AND following_id = ?",
            (subject_id.to_string(), viewer_id.to_string()),
            |row| row.get(0),
        )?;

        Ok(FollowStatus {
            is_following,
            is_followed_by,
        })
    }

    /// Profiles following a user, newest follow first
    pub fn get_followers(&self, user_id: &Uuid) -> Result<Vec<Profile>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT pr.user_id, pr.username, pr.display_name, pr.bio, pr.avatar_url,
                    pr.interests, pr.onboarding_completed, pr.created_at, pr.updated_at
             FROM follows f
             JOIN profiles pr ON f.follower_id = pr.user_id
             WHERE f.following_id = ?
             ORDER BY f.created_at DESC",
        )?;

        let profiles = stmt
            .query_map([user_id.to_string()], Self::map_profile_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(profiles)
    }

    /// Profiles a user follows, newest follow first
    pub fn get_following(&self, user_id: &Uuid) -> Result<Vec<Profile>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT pr.user_id, pr.username, pr.display_name, pr.bio, pr.avatar_url,
                    pr.interests, pr.onboarding_completed, pr.created_at, pr.updated_at
             FROM follows f
             JOIN profiles pr ON f.following_id = pr.user_id
             WHERE f.follower_id = ?
             ORDER BY f.created_at DESC",
        )?;

        let profiles = stmt
            .query_map([user_id.to_string()], Self::map_profile_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(profiles)
    }

    pub fn get_follower_count(&self, user_id: &Uuid) -> Result<i64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE following_id = ?",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn get_following_count(&self, user_id: &Uuid) -> Result<i64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_profile_row(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
        let interests_json: String = row.get(5)?;
        Ok(Profile {
            user_id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
            username: row.get(1)?,
            display_name: row.get(2)?,
            bio: row.get(3)?,
            avatar_url: row.get(4)?,
            interests: serde_json::from_str(&interests_json).unwrap_or_default(),
            onboarding_completed: row.get(6)?,
            created_at: row.get::<_, String>(7)?.parse::<DateTime<Utc>>().unwrap(),
            updated_at: row.get::<_, String>(8)?.parse::<DateTime<Utc>>().unwrap(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> FollowRepository {
        let db = Database::in_memory().expect("Failed to create test database");
        db.initialize().expect("Failed to initialize schema");
        db.seed_test_data().expect("Failed to seed test data");
        FollowRepository::new(db.pool)
    }

    fn sakura_id() -> Uuid {
        Uuid::parse_str("550e8400-e29b-41d4-a716-446655440001").unwrap()
    }

    fn kenta_id() -> Uuid {
        Uuid::parse_str("550e8400-e29b-41d4-a716-446655440002").unwrap()
    }

    fn yuki_id() -> Uuid {
        Uuid::parse_str("550e8400-e29b-41d4-a716-446655440003").unwrap()
    }

    fn follow_notification_count(repo: &FollowRepository, recipient: &Uuid) -> i64 {
        let conn = repo.pool.get().expect("conn");
        conn.query_row(
            "SELECT COUNT(*) FROM notifications WHERE user_id = ? AND kind = 'follow'",
            [recipient.to_string()],
            |row| row.get(0),
        )
        .expect("count")
    }

    #[test]
    fn test_mutual_follow_status() {
        let repo = setup();

        // sakura and kenta follow each other in the seed data
        let status = repo
            .get_follow_status(&sakura_id(), &kenta_id())
            .expect("status");
        assert!(status.is_following);
        assert!(status.is_followed_by);
        assert!(status.is_mutual());

        // yuki follows sakura one-way
        let status = repo
            .get_follow_status(&yuki_id(), &sakura_id())
            .expect("status");
        assert!(status.is_following);
        assert!(!status.is_followed_by);
        assert!(!status.is_mutual());
    }

    #[test]
    fn test_follow_notifies_once_even_when_repeated() {
        let repo = setup();
        let before = follow_notification_count(&repo, &yuki_id());

        assert!(repo.follow(&kenta_id(), &yuki_id()).expect("follow"));
        assert_eq!(follow_notification_count(&repo, &yuki_id()), before + 1);

        // Re-following is a no-op and must not notify again
        assert!(!repo.follow(&kenta_id(), &yuki_id()).expect("follow"));
        assert_eq!(follow_notification_count(&repo, &yuki_id()), before + 1);
    }

    #[test]
    fn test_unfollow_removes_edge() {
        let repo = setup();
        assert!(repo.unfollow(&yuki_id(), &sakura_id()).expect("unfollow"));

        let status = repo
            .get_follow_status(&yuki_id(), &sakura_id())
            .expect("status");
        assert!(!status.is_following);

        // Second unfollow finds nothing to remove
        assert!(!repo.unfollow(&yuki_id(), &sakura_id()).expect("unfollow"));
    }

    #[test]
    fn test_follower_and_following_lists() {
        let repo = setup();

        // sakura is followed by kenta and yuki
        let followers = repo.get_followers(&sakura_id()).expect("followers");
        assert_eq!(followers.len(), 2);
        let usernames: Vec<&str> = followers.iter().map(|p| p.username.as_str()).collect();
        assert!(usernames.contains(&"kenta"));
        assert!(usernames.contains(&"yuki"));

        // yuki follows only sakura
        let following = repo.get_following(&yuki_id()).expect("following");
        assert_eq!(following.len(), 1);
        assert_eq!(following[0].username, "sakura");
    }

    #[test]
    fn test_counts_match_lists() {
        let repo = setup();
        assert_eq!(repo.get_follower_count(&sakura_id()).expect("count"), 2);
        assert_eq!(repo.get_following_count(&sakura_id()).expect("count"), 1);
        assert_eq!(repo.get_following_count(&yuki_id()).expect("count"), 1);
        assert_eq!(repo.get_follower_count(&yuki_id()).expect("count"), 0);
    }

    #[test]
    fn test_self_follow_is_ignored() {
        let repo = setup();
        // The schema forbids follower_id = following_id; INSERT OR
        // IGNORE swallows the violation and reports no new edge
        assert!(!repo.follow(&sakura_id(), &sakura_id()).expect("follow"));
        let status = repo
            .get_follow_status(&sakura_id(), &sakura_id())
            .expect("status");
        assert!(!status.is_following);
    }
}
