use anyhow::{Context, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use super::schema::{SCHEMA, TEST_DATA};

/// SQLite in-memory database identifier
const MEMORY_DB_PATH: &str = ":memory:";

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Pooled SQLite handle shared across request handlers.
#[derive(Clone)]
pub struct Database {
    pub pool: DbPool,
}

impl Database {
    /// Open a pool for the given path, or an in-memory database when
    /// the path is ":memory:" in any casing.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = path.as_ref().to_string_lossy();
        let manager = if raw.trim().eq_ignore_ascii_case(MEMORY_DB_PATH) {
            SqliteConnectionManager::memory()
        } else {
            SqliteConnectionManager::file(path.as_ref())
        };
        let pool = Pool::new(manager).context("Failed to create database connection pool")?;
        Ok(Self { pool })
    }

    /// In-memory pool, used by tests.
    #[allow(dead_code)]
    pub fn in_memory() -> Result<Self> {
        Self::new(MEMORY_DB_PATH)
    }

    /// Apply the schema, then the column additions that postdate it.
    /// Everything here can run against an already-current file.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(SCHEMA)
            .context("Failed to initialize database schema")?;

        // ALTER TABLE has no IF NOT EXISTS, so these fail quietly on
        // databases that already carry the columns
        let _ = conn.execute("ALTER TABLE posts ADD COLUMN image_urls TEXT", []);
        let _ = conn.execute(
            "ALTER TABLE notifications ADD COLUMN reaction_emoji TEXT",
            [],
        );

        // Unread-badge index arrived after the notifications table itself
        let _ = conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_notifications_unread ON notifications(user_id, is_read)",
            [],
        );

        Ok(())
    }

    /// Load the fixture rows. Inserts are OR IGNORE, so reseeding an
    /// already-seeded database is a no-op.
    pub fn seed_test_data(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(TEST_DATA)
            .context("Failed to seed test data")?;
        Ok(())
    }

    pub fn connection(&self) -> Result<DbConnection> {
        self.pool
            .get()
            .context("Failed to get database connection from pool")
    }
}
