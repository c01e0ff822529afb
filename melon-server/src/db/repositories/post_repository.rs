use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::warn;
use uuid::Uuid;

use melon_types::{Post, ReactionCounts};

use crate::db::DbPool;

/// Shared SELECT list so every query feeds the same row mapping.
/// reply_count is computed as a correlated subquery.
const POST_COLUMNS: &str = "p.id, p.user_id, pr.username, pr.display_name, pr.avatar_url,
                    p.content, p.tags, p.image_urls, p.parent_post_id, p.created_at,
                    (SELECT COUNT(*) FROM posts WHERE parent_post_id = p.id) as reply_count";

pub struct PostRepository {
    pool: DbPool,
}

impl PostRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Post> {
        let tags_json: String = row.get(6)?;
        let image_urls_json: Option<String> = row.get(7)?;
        let parent_post_id_str: Option<String> = row.get(8)?;
        Ok(Post {
            id: Uuid::parse_str(&row.get::<_, String>(0)?).unwrap(),
            user_id: Uuid::parse_str(&row.get::<_, String>(1)?).unwrap(),
            author_username: row.get(2)?,
            author_display_name: row.get(3)?,
            author_avatar_url: row.get(4)?,
            content: row.get(5)?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            image_urls: image_urls_json
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
            parent_post_id: parent_post_id_str.and_then(|s| Uuid::parse_str(&s).ok()),
            created_at: row.get::<_, String>(9)?.parse::<DateTime<Utc>>().unwrap(),
            reaction_counts: ReactionCounts::default(), // Populated by the API layer
            viewer_reaction: None, // Populated by the API layer if authenticated
            reply_count: row.get(10)?,
            depth: 0,
        })
    }

    /// Create a new top-level post
    pub fn create(&self, post: &Post) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO posts (id, user_id, content, tags, image_urls, parent_post_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                post.id.to_string(),
                post.user_id.to_string(),
                &post.content,
                serde_json::to_string(&post.tags)?,
                if post.image_urls.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&post.image_urls)?)
                },
                post.parent_post_id.map(|id| id.to_string()),
                post.created_at.to_rfc3339(),
            ),
        )
        .context("Failed to create post")?;
        Ok(())
    }

    /// Create a reply and, in the same transaction, notify the parent
    /// post's author. Self-replies never notify, and a notification
    /// failure is logged without failing the reply.
    pub fn create_reply(&self, reply: &Post, parent_author_id: &Uuid) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO posts (id, user_id, content, tags, image_urls, parent_post_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            (
                reply.id.to_string(),
                reply.user_id.to_string(),
                &reply.content,
                serde_json::to_string(&reply.tags)?,
                None::<String>,
                reply.parent_post_id.map(|id| id.to_string()),
                reply.created_at.to_rfc3339(),
            ),
        )
        .context("Failed to create reply")?;

        if *parent_author_id != reply.user_id {
            let inserted = tx.execute(
                "INSERT INTO notifications (id, user_id, actor_id, post_id, kind, reaction_emoji, is_read, created_at)
                 VALUES (?, ?, ?, ?, 'reply', NULL, 0, ?)",
                (
                    Uuid::new_v4().to_string(),
                    parent_author_id.to_string(),
                    reply.user_id.to_string(),
                    reply.parent_post_id.map(|id| id.to_string()),
                    Utc::now().to_rfc3339(),
                ),
            );
            if let Err(e) = inserted {
                warn!("Failed to record reply notification: {}", e);
            }
        }

        tx.commit().context("Failed to commit reply")?;
        Ok(())
    }

    /// Get top-level posts, newest first
    pub fn get_feed(&self, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let conn = self.pool.get()?;
        let query = format!(
            "SELECT {POST_COLUMNS}
             FROM posts p
             JOIN profiles pr ON p.user_id = pr.user_id
             WHERE p.parent_post_id IS NULL
             ORDER BY p.created_at DESC
             LIMIT ? OFFSET ?"
        );
        let mut stmt = conn.prepare(&query)?;

        let posts = stmt
            .query_map([limit, offset], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    /// Get top-level posts authored by users the viewer follows, plus
    /// the viewer's own
    pub fn get_home_feed(&self, viewer_id: &Uuid, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let conn = self.pool.get()?;
        let query = format!(
            "SELECT {POST_COLUMNS}
             FROM posts p
             JOIN profiles pr ON p.user_id = pr.user_id
             WHERE p.parent_post_id IS NULL
               AND (p.user_id IN (SELECT following_id FROM follows WHERE follower_id = ?1)
                    OR p.user_id = ?1)
             ORDER BY p.created_at DESC
             LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&query)?;

        let posts = stmt
            .query_map(
                rusqlite::params![viewer_id.to_string(), limit, offset],
                Self::map_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    /// Get top-level posts carrying a tag. Tags are stored as a JSON
    /// array, so membership goes through json_each.
    pub fn get_by_tag(&self, tag: &str, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let conn = self.pool.get()?;
        let query = format!(
            "SELECT {POST_COLUMNS}
             FROM posts p
             JOIN profiles pr ON p.user_id = pr.user_id
             WHERE p.parent_post_id IS NULL
               AND EXISTS (SELECT 1 FROM json_each(p.tags) WHERE json_each.value = ?1)
             ORDER BY p.created_at DESC
             LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&query)?;

        let posts = stmt
            .query_map(rusqlite::params![tag, limit, offset], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    /// Get top-level posts by username (profile page)
    pub fn get_by_username(&self, username: &str, limit: i64, offset: i64) -> Result<Vec<Post>> {
        let conn = self.pool.get()?;
        let query = format!(
            "SELECT {POST_COLUMNS}
             FROM posts p
             JOIN profiles pr ON p.user_id = pr.user_id
             WHERE p.parent_post_id IS NULL AND pr.username = ?1
             ORDER BY p.created_at DESC
             LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&query)?;

        let posts = stmt
            .query_map(rusqlite::params![username, limit, offset], Self::map_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    /// Get a single post by ID (any depth)
    pub fn get_by_id(&self, post_id: &Uuid) -> Result<Option<Post>> {
        let conn = self.pool.get()?;
        let query = format!(
            "SELECT {POST_COLUMNS}
             FROM posts p
             JOIN profiles pr ON p.user_id = pr.user_id
             WHERE p.id = ?"
        );
        let mut stmt = conn.prepare(&query)?;

        let post = stmt
            .query_row([post_id.to_string()], Self::map_row)
            .optional()?;

        Ok(post)
    }

    /// Fetch the reply tree under a post, depth-annotated (direct
    /// replies are depth 1)
    pub fn get_replies(&self, parent_post_id: &Uuid) -> Result<Vec<Post>> {
        let conn = self.pool.get()?;

        // Recursive CTE so a future relaxation of the two-level cap
        // needs no query change
        let mut stmt = conn.prepare(
            "WITH RECURSIVE reply_tree AS (
                SELECT p.id, p.user_id, p.content, p.tags, p.image_urls,
                       p.parent_post_id, p.created_at, 1 as depth
                FROM posts p
                WHERE p.parent_post_id = ?

                UNION ALL

                SELECT p.id, p.user_id, p.content, p.tags, p.image_urls,
                       p.parent_post_id, p.created_at, rt.depth + 1
                FROM posts p
                INNER JOIN reply_tree rt ON p.parent_post_id = rt.id
            )
            SELECT rt.id, rt.user_id, pr.username, pr.display_name, pr.avatar_url,
                   rt.content, rt.tags, rt.image_urls, rt.parent_post_id, rt.created_at,
                   (SELECT COUNT(*) FROM posts WHERE parent_post_id = rt.id) as reply_count,
                   rt.depth
            FROM reply_tree rt
            JOIN profiles pr ON rt.user_id = pr.user_id
            ORDER BY rt.depth ASC, rt.created_at ASC",
        )?;

        let replies = stmt
            .query_map([parent_post_id.to_string()], |row| {
                let mut post = Self::map_row(row)?;
                post.depth = row.get(11)?;
                Ok(post)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(replies)
    }

    /// Number of ancestors above a post (0 for top-level)
    pub fn get_depth(&self, post_id: &Uuid) -> Result<i32> {
        let conn = self.pool.get()?;
        let depth: i32 = conn.query_row(
            "WITH RECURSIVE chain AS (
                SELECT parent_post_id FROM posts WHERE id = ?
                UNION ALL
                SELECT p.parent_post_id
                FROM posts p
                INNER JOIN chain c ON p.id = c.parent_post_id
            )
            SELECT COUNT(*) FROM chain WHERE parent_post_id IS NOT NULL",
            [post_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(depth)
    }

    /// Walk up the parent chain to the thread's top-level post
    pub fn get_thread_root(&self, post_id: &Uuid) -> Result<Option<Post>> {
        let conn = self.pool.get()?;
        let root_id: Option<String> = conn
            .query_row(
                "WITH RECURSIVE chain(id, parent_post_id) AS (
                    SELECT id, parent_post_id FROM posts WHERE id = ?
                    UNION ALL
                    SELECT p.id, p.parent_post_id
                    FROM posts p
                    INNER JOIN chain c ON p.id = c.parent_post_id
                )
                SELECT id FROM chain WHERE parent_post_id IS NULL",
                [post_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match root_id {
            Some(id) => self.get_by_id(&Uuid::parse_str(&id).context("Invalid root post id")?),
            None => Ok(None),
        }
    }

    /// Delete a post together with its reactions and the notifications
    /// that point at it. Replies stay behind as orphans; image files
    /// are the caller's concern and go first.
    pub fn delete_with_references(&self, post_id: &Uuid) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM reactions WHERE post_id = ?",
            [post_id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM notifications WHERE post_id = ?",
            [post_id.to_string()],
        )?;
        tx.execute("DELETE FROM posts WHERE id = ?", [post_id.to_string()])?;

        tx.commit().context("Failed to delete post")?;
        Ok(())
    }

    /// Every post ID in the database, for the image sweep
    pub fn get_all_ids(&self) -> Result<Vec<String>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT id FROM posts")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Get post count for a user (top-level posts only)
    pub fn get_post_count(&self, user_id: &Uuid) -> Result<i64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE user_id = ? AND parent_post_id IS NULL",
            [user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> PostRepository {
        let db = Database::in_memory().expect("Failed to create test database");
        db.initialize().expect("Failed to initialize schema");
        db.seed_test_data().expect("Failed to seed test data");
        PostRepository::new(db.pool)
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

    fn illustration_post_id() -> Uuid {
        Uuid::parse_str("650e8400-e29b-41d4-a716-446655440001").unwrap()
    }

    #[test]
    fn test_feed_excludes_replies() {
        let repo = setup();
        let posts = repo.get_feed(50, 0).expect("feed");
        assert_eq!(posts.len(), 4);
        assert!(posts.iter().all(|p| p.parent_post_id.is_none()));

        // Newest first
        for pair in posts.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }

    #[test]
    fn test_home_feed_restricted_to_followed_authors() {
        let repo = setup();

        // yuki follows only sakura, so the home feed is sakura's posts
        // plus yuki's own
        let posts = repo.get_home_feed(&yuki_id(), 50, 0).expect("home feed");
        assert!(!posts.is_empty());
        assert!(posts
            .iter()
            .all(|p| p.user_id == sakura_id() || p.user_id == yuki_id()));
        assert!(posts.iter().any(|p| p.user_id == sakura_id()));
    }

    #[test]
    fn test_create_and_fetch_roundtrip() {
        let repo = setup();
        let post = Post {
            id: Uuid::new_v4(),
            user_id: kenta_id(),
            author_username: String::new(),
            author_display_name: String::new(),
            author_avatar_url: None,
            content: "ラフ画を上げました".to_string(),
            tags: vec!["illustration".to_string(), "progress".to_string()],
            image_urls: vec!["/images/abc/1.png".to_string()],
            parent_post_id: None,
            created_at: Utc::now(),
            reaction_counts: ReactionCounts::default(),
            viewer_reaction: None,
            reply_count: 0,
            depth: 0,
        };
        repo.create(&post).expect("create");

        let fetched = repo.get_by_id(&post.id).expect("query").expect("found");
        assert_eq!(fetched.content, "ラフ画を上げました");
        assert_eq!(fetched.tags, vec!["illustration", "progress"]);
        assert_eq!(fetched.image_urls, vec!["/images/abc/1.png"]);
        assert_eq!(fetched.author_username, "kenta");
        assert_eq!(fetched.reply_count, 0);
    }

    #[test]
    fn test_reply_tree_is_depth_annotated() {
        let repo = setup();
        let replies = repo
            .get_replies(&illustration_post_id())
            .expect("reply tree");

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0].depth, 1);
        assert_eq!(replies[1].depth, 2);
        assert_eq!(replies[1].parent_post_id, Some(replies[0].id));
    }

    #[test]
    fn test_get_depth_counts_ancestors() {
        let repo = setup();
        let replies = repo
            .get_replies(&illustration_post_id())
            .expect("reply tree");

        assert_eq!(repo.get_depth(&illustration_post_id()).expect("depth"), 0);
        assert_eq!(repo.get_depth(&replies[0].id).expect("depth"), 1);
        assert_eq!(repo.get_depth(&replies[1].id).expect("depth"), 2);
    }

    #[test]
    fn test_thread_root_from_nested_reply() {
        let repo = setup();
        let replies = repo
            .get_replies(&illustration_post_id())
            .expect("reply tree");

        let root = repo
            .get_thread_root(&replies[1].id)
            .expect("query")
            .expect("root");
        assert_eq!(root.id, illustration_post_id());
    }

    #[test]
    fn test_create_reply_notifies_parent_author() {
        let repo = setup();
        let parent = repo
            .get_by_id(&illustration_post_id())
            .expect("query")
            .expect("post");

        let reply = Post {
            id: Uuid::new_v4(),
            user_id: yuki_id(),
            author_username: String::new(),
            author_display_name: String::new(),
            author_avatar_url: None,
            content: "わたしも好きです".to_string(),
            tags: parent.tags.clone(),
            image_urls: Vec::new(),
            parent_post_id: Some(parent.id),
            created_at: Utc::now(),
            reaction_counts: ReactionCounts::default(),
            viewer_reaction: None,
            reply_count: 0,
            depth: 0,
        };
        repo.create_reply(&reply, &parent.user_id).expect("reply");

        let conn_pool = repo.pool.clone();
        let conn = conn_pool.get().expect("conn");
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM notifications
                 WHERE user_id = ? AND actor_id = ? AND kind = 'reply'",
                (parent.user_id.to_string(), yuki_id().to_string()),
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_self_reply_does_not_notify() {
        let repo = setup();
        let parent = repo
            .get_by_id(&illustration_post_id())
            .expect("query")
            .expect("post");

        let before: i64 = {
            let conn = repo.pool.get().expect("conn");
            conn.query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
                .expect("count")
        };

        let reply = Post {
            id: Uuid::new_v4(),
            user_id: parent.user_id,
            author_username: String::new(),
            author_display_name: String::new(),
            author_avatar_url: None,
            content: "補足です".to_string(),
            tags: parent.tags.clone(),
            image_urls: Vec::new(),
            parent_post_id: Some(parent.id),
            created_at: Utc::now(),
            reaction_counts: ReactionCounts::default(),
            viewer_reaction: None,
            reply_count: 0,
            depth: 0,
        };
        repo.create_reply(&reply, &parent.user_id).expect("reply");

        let after: i64 = {
            let conn = repo.pool.get().expect("conn");
            conn.query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
                .expect("count")
        };
        assert_eq!(after, before);
    }

    #[test]
    fn test_get_by_tag_top_level_only() {
        let repo = setup();
        let posts = repo.get_by_tag("illustration", 50, 0).expect("tag feed");

        // The seeded depth-1 reply also carries the tag but must not
        // appear in a tag feed
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, illustration_post_id());
    }

    #[test]
    fn test_delete_removes_reactions_and_notifications_but_orphans_replies() {
        let repo = setup();
        let replies = repo
            .get_replies(&illustration_post_id())
            .expect("reply tree");

        repo.delete_with_references(&illustration_post_id())
            .expect("delete");

        assert!(repo
            .get_by_id(&illustration_post_id())
            .expect("query")
            .is_none());

        let conn = repo.pool.get().expect("conn");
        let reaction_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM reactions WHERE post_id = ?",
                [illustration_post_id().to_string()],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(reaction_count, 0);

        let notification_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM notifications WHERE post_id = ?",
                [illustration_post_id().to_string()],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(notification_count, 0);

        // Replies survive as orphans
        for reply in &replies {
            assert!(repo.get_by_id(&reply.id).expect("query").is_some());
        }
    }

    #[test]
    fn test_post_count_ignores_replies() {
        let repo = setup();
        // sakura authored one top-level post and one nested reply
        assert_eq!(repo.get_post_count(&sakura_id()).expect("count"), 1);
    }

    #[test]
    fn test_get_all_ids_covers_replies_too() {
        let repo = setup();
        let ids = repo.get_all_ids().expect("ids");
        // 4 seeded posts + 2 seeded replies
        assert_eq!(ids.len(), 6);
        assert!(ids.contains(&illustration_post_id().to_string()));
    }
}
