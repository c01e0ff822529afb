use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use melon_types::Profile;

use crate::db::DbPool;

pub struct ProfileRepository {
    pool: DbPool,
}

impl ProfileRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Profile> {
        let interests_json: String = row.get(5)?;
        Ok(Profile {
            user_id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
            username: row.get(1)?,
            display_name: row.get(2)?,
            bio: row.get(3)?,
            avatar_url: row.get(4)?,
            interests: serde_json::from_str(&interests_json).unwrap_or_default(),
            onboarding_completed: row.get::<_, i32>(6)? == 1,
            created_at: row.get::<_, String>(7)?.parse::<DateTime<Utc>>().unwrap(),
            updated_at: row.get::<_, String>(8)?.parse::<DateTime<Utc>>().unwrap(),
        })
    }

    /// Create a profile (completes onboarding for the user)
    pub fn create(&self, profile: &Profile) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO profiles (user_id, username, display_name, bio, avatar_url, interests,
                                   onboarding_completed, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            (
                profile.user_id.to_string(),
                &profile.username,
                &profile.display_name,
                &profile.bio,
                &profile.avatar_url,
                serde_json::to_string(&profile.interests)?,
                if profile.onboarding_completed { 1 } else { 0 },
                profile.created_at.to_rfc3339(),
                profile.updated_at.to_rfc3339(),
            ),
        )
        .context("Failed to create profile")?;
        Ok(())
    }

    /// Get profile by user ID
    pub fn get_by_user_id(&self, user_id: &Uuid) -> Result<Option<Profile>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, username, display_name, bio, avatar_url, interests,
                    onboarding_completed, created_at, updated_at
             FROM profiles
             WHERE user_id = ?",
        )?;

        let profile = stmt
            .query_row([user_id.to_string()], Self::map_row)
            .optional()?;

        Ok(profile)
    }

    /// Get profile by username
    pub fn get_by_username(&self, username: &str) -> Result<Option<Profile>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, username, display_name, bio, avatar_url, interests,
                    onboarding_completed, created_at, updated_at
             FROM profiles
             WHERE username = ?",
        )?;

        let profile = stmt.query_row([username], Self::map_row).optional()?;

        Ok(profile)
    }

    /// Check whether a username is taken, optionally excluding one user
    /// (so a profile edit can keep its current name)
    pub fn username_taken(&self, username: &str, exclude_user: Option<&Uuid>) -> Result<bool> {
        let conn = self.pool.get()?;
        let count: i64 = match exclude_user {
            Some(user_id) => conn.query_row(
                "SELECT COUNT(*) FROM profiles WHERE username = ? AND user_id != ?",
                (username, user_id.to_string()),
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM profiles WHERE username = ?",
                [username],
                |row| row.get(0),
            )?,
        };
        Ok(count > 0)
    }

    /// Update the mutable profile fields
    pub fn update(&self, profile: &Profile) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE profiles
             SET username = ?, display_name = ?, bio = ?, interests = ?, updated_at = ?
             WHERE user_id = ?",
            (
                &profile.username,
                &profile.display_name,
                &profile.bio,
                serde_json::to_string(&profile.interests)?,
                Utc::now().to_rfc3339(),
                profile.user_id.to_string(),
            ),
        )
        .context("Failed to update profile")?;
        Ok(())
    }

    /// Set or clear the avatar URL
    pub fn update_avatar_url(&self, user_id: &Uuid, avatar_url: Option<&str>) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE profiles SET avatar_url = ?, updated_at = ? WHERE user_id = ?",
            (
                avatar_url,
                Utc::now().to_rfc3339(),
                user_id.to_string(),
            ),
        )
        .context("Failed to update avatar URL")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> ProfileRepository {
        let db = Database::in_memory().expect("Failed to create test database");
        db.initialize().expect("Failed to initialize schema");
        db.seed_test_data().expect("Failed to seed test data");
        ProfileRepository::new(db.pool)
    }

    fn sakura_id() -> Uuid {
        Uuid::parse_str("550e8400-e29b-41d4-a716-446655440001").unwrap()
    }

    #[test]
    fn test_get_by_username_and_id_agree() {
        let repo = setup();
        let by_name = repo
            .get_by_username("sakura")
            .expect("query")
            .expect("seeded profile");
        let by_id = repo
            .get_by_user_id(&sakura_id())
            .expect("query")
            .expect("seeded profile");

        assert_eq!(by_name.user_id, by_id.user_id);
        assert_eq!(by_name.interests, vec!["illustration", "chat"]);
        assert!(by_name.onboarding_completed);
    }

    #[test]
    fn test_username_taken_excludes_self() {
        let repo = setup();
        assert!(repo.username_taken("sakura", None).expect("query"));
        assert!(!repo
            .username_taken("sakura", Some(&sakura_id()))
            .expect("query"));
        assert!(repo
            .username_taken("sakura", Some(&Uuid::new_v4()))
            .expect("query"));
        assert!(!repo.username_taken("unclaimed", None).expect("query"));
    }

    #[test]
    fn test_update_profile_fields() {
        let repo = setup();
        let mut profile = repo
            .get_by_user_id(&sakura_id())
            .expect("query")
            .expect("seeded profile");

        profile.display_name = "さくらんぼ".to_string();
        profile.bio = None;
        profile.interests = vec!["general".to_string()];
        repo.update(&profile).expect("update");

        let reloaded = repo
            .get_by_user_id(&sakura_id())
            .expect("query")
            .expect("profile");
        assert_eq!(reloaded.display_name, "さくらんぼ");
        assert_eq!(reloaded.bio, None);
        assert_eq!(reloaded.interests, vec!["general"]);
    }

    #[test]
    fn test_avatar_url_set_and_clear() {
        let repo = setup();
        repo.update_avatar_url(&sakura_id(), Some("/images/avatars/x.png"))
            .expect("set");
        let profile = repo
            .get_by_user_id(&sakura_id())
            .expect("query")
            .expect("profile");
        assert_eq!(profile.avatar_url.as_deref(), Some("/images/avatars/x.png"));

        repo.update_avatar_url(&sakura_id(), None).expect("clear");
        let profile = repo
            .get_by_user_id(&sakura_id())
            .expect("query")
            .expect("profile");
        assert_eq!(profile.avatar_url, None);
    }
}
