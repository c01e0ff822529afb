/// SQL schema for the Melon database: every table, constraint, and
/// index, applied as one idempotent batch.
pub const SCHEMA: &str = r#"
-- Users table (authentication identity)
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT UNIQUE NOT NULL,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

-- Profiles table (public identity, created at onboarding)
CREATE TABLE IF NOT EXISTS profiles (
    user_id TEXT PRIMARY KEY,
    username TEXT UNIQUE NOT NULL,
    display_name TEXT NOT NULL,
    bio TEXT,
    avatar_url TEXT,
    interests TEXT NOT NULL DEFAULT '[]',
    onboarding_completed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_profiles_username ON profiles(username);

-- Posts table. Replies are posts with a non-null parent_post_id;
-- tags and image_urls are stored as JSON arrays.
CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    content TEXT NOT NULL CHECK(length(content) <= 500),
    tags TEXT NOT NULL DEFAULT '[]',
    image_urls TEXT,
    parent_post_id TEXT,
    created_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (parent_post_id) REFERENCES posts(id)
);

-- Feeds sort newest-first
CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at DESC);

-- Reply listings scan by parent
CREATE INDEX IF NOT EXISTS idx_posts_parent_post_id ON posts(parent_post_id);

CREATE INDEX IF NOT EXISTS idx_posts_user_id ON posts(user_id);

-- Reactions table. The composite primary key enforces the exclusive
-- single-reaction-per-post invariant: switching emoji updates the
-- row in place rather than inserting a second one.
CREATE TABLE IF NOT EXISTS reactions (
    post_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    emoji TEXT NOT NULL CHECK(emoji IN ('👏', '💖', '🤣')),
    created_at TEXT NOT NULL,
    PRIMARY KEY (post_id, user_id),
    FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_reactions_post_id ON reactions(post_id);
CREATE INDEX IF NOT EXISTS idx_reactions_user_id ON reactions(user_id);

-- Follows are directed edges; mutuality is two opposite rows
CREATE TABLE IF NOT EXISTS follows (
    follower_id TEXT NOT NULL,
    following_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (follower_id, following_id),
    CHECK (follower_id != following_id),
    FOREIGN KEY (follower_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (following_id) REFERENCES users(id) ON DELETE CASCADE
);

-- Follower and following lists each scan their own side
CREATE INDEX IF NOT EXISTS idx_follows_follower ON follows(follower_id);
CREATE INDEX IF NOT EXISTS idx_follows_following ON follows(following_id);

-- Notifications table. user_id is the recipient; a row is never
-- created with user_id = actor_id.
CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    actor_id TEXT NOT NULL,
    post_id TEXT,
    kind TEXT NOT NULL CHECK(kind IN ('reaction', 'reply', 'follow')),
    reaction_emoji TEXT,
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (actor_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_notifications_user_id ON notifications(user_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_notifications_unread ON notifications(user_id, is_read);

-- Sessions table for authentication
CREATE TABLE IF NOT EXISTS sessions (
    token TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
"#;

/// Fixture rows for development and the repository tests:
/// - 3 users with completed profiles (sakura, kenta, yuki)
/// - Tagged posts plus a two-level reply chain
/// - Reactions demonstrating the exclusive single-reaction model
/// - A mutual follow pair and an unread notification
///
/// Seed users carry a placeholder password hash and cannot log in;
/// create real accounts through the signup endpoint.
pub const TEST_DATA: &str = r#"
-- ============================================================================
-- SEED USERS
-- ============================================================================
INSERT OR IGNORE INTO users (id, email, password_hash, created_at) VALUES
    ('550e8400-e29b-41d4-a716-446655440001', 'sakura@example.com', '$argon2id$v=19$m=19456,t=2,p=1$c2VlZGRhdGFvbmx5$seed-data-placeholder', '2024-06-01T09:00:00Z'),
    ('550e8400-e29b-41d4-a716-446655440002', 'kenta@example.com', '$argon2id$v=19$m=19456,t=2,p=1$c2VlZGRhdGFvbmx5$seed-data-placeholder', '2024-06-02T09:00:00Z'),
    ('550e8400-e29b-41d4-a716-446655440003', 'yuki@example.com', '$argon2id$v=19$m=19456,t=2,p=1$c2VlZGRhdGFvbmx5$seed-data-placeholder', '2024-06-03T09:00:00Z');

INSERT OR IGNORE INTO profiles (user_id, username, display_name, bio, avatar_url, interests, onboarding_completed, created_at, updated_at) VALUES
    ('550e8400-e29b-41d4-a716-446655440001', 'sakura', 'さくら', 'イラストを描いています 🎨', NULL, '["illustration","chat"]', 1, '2024-06-01T09:05:00Z', '2024-06-01T09:05:00Z'),
    ('550e8400-e29b-41d4-a716-446655440002', 'kenta', 'ケンタ', '毎日進捗を上げる人', NULL, '["progress","question"]', 1, '2024-06-02T09:05:00Z', '2024-06-02T09:05:00Z'),
    ('550e8400-e29b-41d4-a716-446655440003', 'yuki', 'ゆき', NULL, NULL, '["general"]', 1, '2024-06-03T09:05:00Z', '2024-06-03T09:05:00Z');

-- ============================================================================
-- TOP-LEVEL POSTS
-- ============================================================================
INSERT OR IGNORE INTO posts (id, user_id, content, tags, image_urls, created_at) VALUES
    ('650e8400-e29b-41d4-a716-446655440001', '550e8400-e29b-41d4-a716-446655440001', '新しいイラストが完成しました！', '["illustration"]', NULL, '2024-06-10T10:00:00Z'),
    ('650e8400-e29b-41d4-a716-446655440002', '550e8400-e29b-41d4-a716-446655440002', '今日の進捗: ログイン画面ができた', '["progress"]', NULL, '2024-06-10T11:00:00Z'),
    ('650e8400-e29b-41d4-a716-446655440003', '550e8400-e29b-41d4-a716-446655440003', 'はじめまして！よろしくお願いします', '["general","chat"]', NULL, '2024-06-10T12:00:00Z'),
    ('650e8400-e29b-41d4-a716-446655440004', '550e8400-e29b-41d4-a716-446655440002', 'おすすめのペンタブありますか？', '["question"]', NULL, '2024-06-11T09:00:00Z');

-- ============================================================================
-- REPLY POSTS (two-level thread under sakura's illustration post)
-- ============================================================================
INSERT OR IGNORE INTO posts (id, user_id, content, tags, image_urls, parent_post_id, created_at) VALUES
    ('850e8400-e29b-41d4-a716-446655440001', '550e8400-e29b-41d4-a716-446655440002', 'すごい！色使いがきれいですね', '["illustration"]', NULL, '650e8400-e29b-41d4-a716-446655440001', '2024-06-10T10:15:00Z'),
    ('850e8400-e29b-41d4-a716-446655440002', '550e8400-e29b-41d4-a716-446655440001', 'ありがとうございます！', '["illustration"]', NULL, '850e8400-e29b-41d4-a716-446655440001', '2024-06-10T10:30:00Z');

-- ============================================================================
-- REACTIONS (at most one row per post/user pair)
-- ============================================================================
INSERT OR IGNORE INTO reactions (post_id, user_id, emoji, created_at) VALUES
    ('650e8400-e29b-41d4-a716-446655440001', '550e8400-e29b-41d4-a716-446655440002', '👏', '2024-06-10T10:10:00Z'),
    ('650e8400-e29b-41d4-a716-446655440001', '550e8400-e29b-41d4-a716-446655440003', '💖', '2024-06-10T12:10:00Z'),
    ('650e8400-e29b-41d4-a716-446655440002', '550e8400-e29b-41d4-a716-446655440001', '👏', '2024-06-10T11:10:00Z'),
    ('650e8400-e29b-41d4-a716-446655440003', '550e8400-e29b-41d4-a716-446655440001', '🤣', '2024-06-10T12:20:00Z');

-- ============================================================================
-- SOCIAL CONNECTIONS (sakura and kenta follow each other; yuki follows sakura)
-- ============================================================================
INSERT OR IGNORE INTO follows (follower_id, following_id, created_at) VALUES
    ('550e8400-e29b-41d4-a716-446655440001', '550e8400-e29b-41d4-a716-446655440002', '2024-06-05T09:00:00Z'),
    ('550e8400-e29b-41d4-a716-446655440002', '550e8400-e29b-41d4-a716-446655440001', '2024-06-05T10:00:00Z'),
    ('550e8400-e29b-41d4-a716-446655440003', '550e8400-e29b-41d4-a716-446655440001', '2024-06-06T09:00:00Z');

-- ============================================================================
-- NOTIFICATIONS
-- ============================================================================
INSERT OR IGNORE INTO notifications (id, user_id, actor_id, post_id, kind, reaction_emoji, is_read, created_at) VALUES
    ('950e8400-e29b-41d4-a716-446655440001', '550e8400-e29b-41d4-a716-446655440001', '550e8400-e29b-41d4-a716-446655440002', '650e8400-e29b-41d4-a716-446655440001', 'reaction', '👏', 1, '2024-06-10T10:10:00Z'),
    ('950e8400-e29b-41d4-a716-446655440002', '550e8400-e29b-41d4-a716-446655440001', '550e8400-e29b-41d4-a716-446655440003', '650e8400-e29b-41d4-a716-446655440001', 'reaction', '💖', 0, '2024-06-10T12:10:00Z'),
    ('950e8400-e29b-41d4-a716-446655440003', '550e8400-e29b-41d4-a716-446655440001', '550e8400-e29b-41d4-a716-446655440002', '650e8400-e29b-41d4-a716-446655440001', 'reply', NULL, 0, '2024-06-10T10:15:00Z'),
    ('950e8400-e29b-41d4-a716-446655440004', '550e8400-e29b-41d4-a716-446655440001', '550e8400-e29b-41d4-a716-446655440003', NULL, 'follow', NULL, 1, '2024-06-06T09:00:00Z');
"#;
