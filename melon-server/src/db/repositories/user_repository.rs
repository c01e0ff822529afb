use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use crate::db::DbPool;

/// Authentication identity row. Stays inside the server crate so the
/// password hash can never leak into an API response.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    #[allow(dead_code)]
    pub created_at: DateTime<Utc>,
}

pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new user with a pre-hashed password
    pub fn create(&self, id: &Uuid, email: &str, password_hash: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO users (id, email, password_hash, created_at)
             VALUES (?, ?, ?, ?)",
            (
                id.to_string(),
                email,
                password_hash,
                Utc::now().to_rfc3339(),
            ),
        )
        .context("Failed to create user")?;
        Ok(())
    }

    /// Get user by ID
    pub fn get_by_id(&self, user_id: &Uuid) -> Result<Option<AuthUser>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, email, password_hash, created_at
             FROM users
             WHERE id = ?",
        )?;

        let user = stmt
            .query_row([user_id.to_string()], |row| {
                Ok(AuthUser {
                    id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                    created_at: row.get::<_, String>(3)?.parse::<DateTime<Utc>>().unwrap(),
                })
            })
            .optional()?;

        Ok(user)
    }

    /// Get user by email (login lookup)
    pub fn get_by_email(&self, email: &str) -> Result<Option<AuthUser>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, email, password_hash, created_at
             FROM users
             WHERE email = ?",
        )?;

        let user = stmt
            .query_row([email], |row| {
                Ok(AuthUser {
                    id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
                    email: row.get(1)?,
                    password_hash: row.get(2)?,
                    created_at: row.get::<_, String>(3)?.parse::<DateTime<Utc>>().unwrap(),
                })
            })
            .optional()?;

        Ok(user)
    }

    /// Check whether an email is already registered
    pub fn email_exists(&self, email: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE email = ?",
            [email],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Replace a user's password hash
    pub fn update_password_hash(&self, user_id: &Uuid, password_hash: &str) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE users SET password_hash = ? WHERE id = ?",
            [password_hash, &user_id.to_string()],
        )
        .context("Failed to update password hash")?;
        Ok(())
    }
}
