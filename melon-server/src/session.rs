use crate::db::Database;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

/// How long a session lives without being used
const SESSION_TTL_DAYS: i64 = 30;

/// Token-based login state, persisted in the sessions table so a
/// server restart does not sign everyone out.
#[derive(Clone)]
pub struct SessionManager {
    db: Database,
}

impl SessionManager {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn fresh_expiry() -> String {
        (Utc::now() + Duration::days(SESSION_TTL_DAYS)).to_rfc3339()
    }

    /// Issue a UUID v4 token for the user, valid for 30 days.
    pub fn create_session(&self, user_id: Uuid) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        let conn = self.db.connection()?;
        conn.execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                token,
                user_id.to_string(),
                Utc::now().to_rfc3339(),
                Self::fresh_expiry(),
            ],
        )
        .context("Failed to create session")?;

        tracing::info!("Created session for user {}", user_id);
        Ok(token)
    }

    /// Resolve a token to its user. A hit pushes the expiry out
    /// another 30 days so active users stay signed in; an expired row
    /// is deleted on sight.
    pub fn validate_session(&self, token: &str) -> Result<Uuid> {
        let conn = self.db.connection()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT user_id, expires_at FROM sessions WHERE token = ?1",
                rusqlite::params![token],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .context("Failed to look up session")?;

        let (user_id_str, expires_at_str) = match row {
            Some(row) => row,
            None => bail!("Session not found"),
        };

        let expires_at = DateTime::parse_from_rfc3339(&expires_at_str)
            .context("Failed to parse expiry time")?
            .with_timezone(&Utc);
        if expires_at < Utc::now() {
            self.delete_session(token)?;
            bail!("Session has expired");
        }

        conn.execute(
            "UPDATE sessions SET expires_at = ?1 WHERE token = ?2",
            rusqlite::params![Self::fresh_expiry(), token],
        )
        .context("Failed to refresh session expiry")?;

        Uuid::parse_str(&user_id_str).context("Failed to parse user ID")
    }

    /// Drop the session row, signing that token out.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.db.connection()?;
        let removed = conn
            .execute(
                "DELETE FROM sessions WHERE token = ?1",
                rusqlite::params![token],
            )
            .context("Failed to delete session")?;
        tracing::debug!("Deleted {} session rows", removed);
        Ok(())
    }

    /// Sweep all sessions past their expiry time. Runs from a
    /// periodic background task.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.db.connection()?;
        let swept = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                rusqlite::params![Utc::now().to_rfc3339()],
            )
            .context("Failed to cleanup expired sessions")?;

        if swept > 0 {
            tracing::info!("Cleaned up {} expired sessions", swept);
        }
        Ok(swept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_USER: &str = "550e8400-e29b-41d4-a716-446655440099";

    fn setup() -> (SessionManager, Database) {
        let db = Database::in_memory().expect("Failed to create test database");
        db.initialize().expect("Failed to initialize database");

        let conn = db.connection().expect("Failed to get connection");
        conn.execute(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                TEST_USER,
                "session-test@example.com",
                "not-a-real-hash",
                Utc::now().to_rfc3339(),
            ],
        )
        .expect("Failed to create test user");

        (SessionManager::new(db.clone()), db)
    }

    fn user_id() -> Uuid {
        Uuid::parse_str(TEST_USER).unwrap()
    }

    #[test]
    fn test_create_session() {
        let (manager, _db) = setup();

        let token = manager
            .create_session(user_id())
            .expect("Failed to create session");
        assert!(Uuid::parse_str(&token).is_ok(), "Token should be a valid UUID");
    }

    #[test]
    fn test_validate_session() {
        let (manager, _db) = setup();

        let token = manager
            .create_session(user_id())
            .expect("Failed to create session");
        let validated = manager
            .validate_session(&token)
            .expect("Failed to validate session");
        assert_eq!(user_id(), validated);
    }

    #[test]
    fn test_validate_invalid_session() {
        let (manager, _db) = setup();
        assert!(manager.validate_session("invalid-token").is_err());
    }

    #[test]
    fn test_validation_refreshes_expiry() {
        let (manager, db) = setup();

        let token = manager
            .create_session(user_id())
            .expect("Failed to create session");

        // Age the session down to its last valid day
        let conn = db.connection().expect("Failed to get connection");
        conn.execute(
            "UPDATE sessions SET expires_at = ?1 WHERE token = ?2",
            rusqlite::params![(Utc::now() + Duration::days(1)).to_rfc3339(), token],
        )
        .expect("Failed to age session");

        manager
            .validate_session(&token)
            .expect("Failed to validate session");

        let stored: String = conn
            .query_row(
                "SELECT expires_at FROM sessions WHERE token = ?1",
                rusqlite::params![token],
                |row| row.get(0),
            )
            .expect("Failed to read expiry");
        let refreshed = DateTime::parse_from_rfc3339(&stored)
            .expect("Failed to parse expiry")
            .with_timezone(&Utc);
        assert!(refreshed > Utc::now() + Duration::days(29));
    }

    #[test]
    fn test_delete_session() {
        let (manager, _db) = setup();

        let token = manager
            .create_session(user_id())
            .expect("Failed to create session");
        manager
            .delete_session(&token)
            .expect("Failed to delete session");
        assert!(
            manager.validate_session(&token).is_err(),
            "Session should be invalid after deletion"
        );
    }

    #[test]
    fn test_cleanup_expired_sessions() {
        let (manager, db) = setup();

        let token = manager
            .create_session(user_id())
            .expect("Failed to create session");

        // Push the session past its expiry, then sweep
        let conn = db.connection().expect("Failed to get connection");
        conn.execute(
            "UPDATE sessions SET expires_at = ?1 WHERE token = ?2",
            rusqlite::params![(Utc::now() - Duration::days(1)).to_rfc3339(), token],
        )
        .expect("Failed to expire session");

        let cleaned = manager
            .cleanup_expired_sessions()
            .expect("Failed to cleanup");
        assert_eq!(cleaned, 1);
        assert!(manager.validate_session(&token).is_err());
    }

    #[test]
    fn test_session_token_uniqueness() {
        let (manager, _db) = setup();

        let token1 = manager
            .create_session(user_id())
            .expect("Failed to create session 1");
        let token2 = manager
            .create_session(user_id())
            .expect("Failed to create session 2");
        let token3 = manager
            .create_session(user_id())
            .expect("Failed to create session 3");

        assert_ne!(token1, token2);
        assert_ne!(token2, token3);
        assert_ne!(token1, token3);
    }
}
