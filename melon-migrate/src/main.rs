use anyhow::{Context, Result};
use clap::Parser;
use melon_server::db::Database;
use melon_types::ReactionEmoji;
use uuid::Uuid;

/// Melon Reaction Cleanup Utility
///
/// This tool repairs reaction data written before reactions became exclusive:
/// rows using retired emoji are removed, and any post/user pair holding more
/// than one reaction row is collapsed down to its most recent one.
#[derive(Parser, Debug)]
#[command(name = "melon-migrate")]
#[command(about = "Clean up legacy reaction rows in a Melon database", long_about = None)]
struct Args {
    /// SQLite database file to clean up
    #[arg(short, long, default_value = "./melon.db")]
    database: String,

    /// Report what would change without writing anything
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Run without asking for confirmation
    #[arg(short = 'y', long)]
    yes: bool,
}

/// Counters accumulated over a cleanup run
#[derive(Debug, Default)]
struct MigrationStats {
    /// Total number of reaction rows in the database before cleanup
    rows_scanned: usize,
    /// Rows removed because their emoji is no longer supported
    unsupported_removed: usize,
    /// Number of post/user pairs that held more than one row
    pairs_collapsed: usize,
    /// Duplicate rows removed while collapsing pairs
    duplicate_rows_removed: usize,
    /// Per-pair failures that did not stop the run
    errors: Vec<String>,
}

impl MigrationStats {
    fn new() -> Self {
        Self::default()
    }

    /// Record rows deleted for carrying a retired emoji
    fn record_unsupported(&mut self, count: usize) {
        self.unsupported_removed += count;
    }

    /// Record a collapsed pair and how many extra rows it shed
    fn record_pair(&mut self, removed: usize) {
        if removed > 0 {
            self.pairs_collapsed += 1;
            self.duplicate_rows_removed += removed;
        }
    }

    fn record_error(&mut self, error: String) {
        self.errors.push(error);
    }
}

/// A post/user pair holding more than one reaction row
#[derive(Debug)]
struct DuplicatePair {
    post_id: Uuid,
    user_id: Uuid,
    rows: usize,
}

/// The emoji the application currently accepts
fn supported_emoji() -> Vec<&'static str> {
    ReactionEmoji::ALL.iter().map(|e| e.as_str()).collect()
}

/// Count every reaction row in the database
fn count_reaction_rows(db: &Database) -> Result<usize> {
    let conn = db.pool.get().context("Failed to get database connection")?;

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM reactions", [], |row| row.get(0))
        .context("Failed to count reaction rows")?;

    Ok(count as usize)
}

/// Count rows whose emoji is outside the supported set
fn count_unsupported(db: &Database) -> Result<usize> {
    let conn = db.pool.get().context("Failed to get database connection")?;

    let glyphs = supported_emoji();
    let placeholders = vec!["?"; glyphs.len()].join(", ");
    let sql = format!("SELECT COUNT(*) FROM reactions WHERE emoji NOT IN ({placeholders})");

    let count: i64 = conn
        .query_row(&sql, rusqlite::params_from_iter(glyphs.iter()), |row| {
            row.get(0)
        })
        .context("Failed to count unsupported reactions")?;

    Ok(count as usize)
}

/// Delete rows whose emoji is outside the supported set
fn delete_unsupported(db: &Database) -> Result<usize> {
    let conn = db.pool.get().context("Failed to get database connection")?;

    let glyphs = supported_emoji();
    let placeholders = vec!["?"; glyphs.len()].join(", ");
    let sql = format!("DELETE FROM reactions WHERE emoji NOT IN ({placeholders})");

    let removed = conn
        .execute(&sql, rusqlite::params_from_iter(glyphs.iter()))
        .context("Failed to delete unsupported reactions")?;

    Ok(removed)
}

/// Find every post/user pair with more than one supported reaction row
///
/// Unsupported emoji are ignored here because they are deleted outright
/// before pairs are collapsed.
fn find_duplicate_pairs(db: &Database) -> Result<Vec<DuplicatePair>> {
    let conn = db.pool.get().context("Failed to get database connection")?;

    let glyphs = supported_emoji();
    let placeholders = vec!["?"; glyphs.len()].join(", ");
    let sql = format!(
        "SELECT post_id, user_id, COUNT(*) as copies FROM reactions
         WHERE emoji IN ({placeholders})
         GROUP BY post_id, user_id HAVING copies > 1"
    );

    let mut stmt = conn.prepare(&sql).context("Failed to prepare query")?;

    let pairs = stmt
        .query_map(rusqlite::params_from_iter(glyphs.iter()), |row| {
            let post_id: String = row.get(0)?;
            let user_id: String = row.get(1)?;
            let rows: i64 = row.get(2)?;

            Ok(DuplicatePair {
                post_id: Uuid::parse_str(&post_id)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
                user_id: Uuid::parse_str(&user_id)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?,
                rows: rows as usize,
            })
        })
        .context("Failed to execute query")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to collect duplicate pairs")?;

    Ok(pairs)
}

/// Collapse one pair down to its most recent row
fn collapse_pair(
    pair: &DuplicatePair,
    db: &Database,
    stats: &mut MigrationStats,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        stats.record_pair(pair.rows - 1);
        return Ok(());
    }

    let conn = db.pool.get().context("Failed to get database connection")?;

    // Keep the newest row; rowid breaks created_at ties in favor of the
    // later insert.
    let removed = conn
        .execute(
            "DELETE FROM reactions WHERE post_id = ?1 AND user_id = ?2 AND rowid NOT IN (
                SELECT rowid FROM reactions WHERE post_id = ?1 AND user_id = ?2
                ORDER BY created_at DESC, rowid DESC LIMIT 1
            )",
            rusqlite::params![pair.post_id.to_string(), pair.user_id.to_string()],
        )
        .with_context(|| format!("Failed to collapse reactions for post {}", pair.post_id))?;

    stats.record_pair(removed);

    Ok(())
}

/// Open the database and make sure it has a reactions table.
fn connect_database(path: &str) -> Result<Database> {
    println!("Opening {}", path);

    if !std::path::Path::new(path).exists() {
        anyhow::bail!("Database file not found: {}", path);
    }

    let db = Database::new(path).context("Failed to open database connection")?;

    let conn = db
        .pool
        .get()
        .context("Failed to get database connection from pool")?;

    // Check if reactions table exists
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='reactions'",
            [],
            |row| row.get::<_, i32>(0).map(|count| count > 0),
        )
        .context("Failed to check for reactions table")?;

    if !table_exists {
        anyhow::bail!("Database schema is invalid - reactions table not found");
    }

    println!("Schema check passed");

    Ok(db)
}

/// Print the summary block shown at the end of a run.
fn display_stats(stats: &MigrationStats, dry_run: bool) {
    println!();
    println!("Cleanup Summary");
    println!("===============");
    println!();
    println!("Reaction rows scanned: {}", stats.rows_scanned);
    println!("Retired emoji rows removed: {}", stats.unsupported_removed);
    println!("Post/user pairs collapsed: {}", stats.pairs_collapsed);
    println!("Duplicate rows removed: {}", stats.duplicate_rows_removed);

    if !stats.errors.is_empty() {
        println!();
        println!("Errors encountered: {}", stats.errors.len());
        for (i, error) in stats.errors.iter().enumerate() {
            println!("  {}. {}", i + 1, error);
        }
    }

    println!();
    if dry_run {
        println!("Dry run only. The database was not modified.");
    } else {
        println!("Cleanup complete.");
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    println!("Melon Reaction Cleanup Utility");
    println!("==============================");
    println!();
    println!("Database: {}", args.database);
    println!("Dry run: {}", args.dry_run);
    println!();

    let db = connect_database(&args.database)?;

    // Scan current state before touching anything
    println!("Scanning reactions...");
    let rows_scanned = count_reaction_rows(&db)?;
    let unsupported = count_unsupported(&db)?;
    let pairs = find_duplicate_pairs(&db)?;
    println!(
        "Found {} reaction rows ({} with retired emoji, {} pairs with duplicates)",
        rows_scanned,
        unsupported,
        pairs.len()
    );

    // Handle a clean database
    if unsupported == 0 && pairs.is_empty() {
        println!("All reaction rows already satisfy the one-per-pair rule - nothing to clean up.");
        return Ok(());
    }

    // Ask first unless -y was given
    if !args.yes && !args.dry_run {
        println!(
            "This will rewrite reaction rows for {} pairs and remove {} retired rows.",
            pairs.len(),
            unsupported
        );
        println!("Do you want to continue? (y/N): ");

        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .context("Failed to read user input")?;

        let input = input.trim().to_lowercase();
        if input != "y" && input != "yes" {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let mut stats = MigrationStats::new();
    stats.rows_scanned = rows_scanned;

    // Remove retired emoji first so a retired row can never win a collapse
    if args.dry_run {
        stats.record_unsupported(unsupported);
    } else {
        let removed = delete_unsupported(&db)?;
        stats.record_unsupported(removed);
    }

    // Collapse each duplicated pair
    println!();
    println!("Collapsing duplicated pairs...");
    for (i, pair) in pairs.iter().enumerate() {
        // Progress line every 100 pairs
        if (i + 1) % 100 == 0 {
            println!("Processed {} / {} pairs...", i + 1, pairs.len());
        }

        if let Err(e) = collapse_pair(pair, &db, &mut stats, args.dry_run) {
            // Keep going; the failure lands in the summary
            let error_msg = format!(
                "Error collapsing reactions for post {} user {}: {:#}",
                pair.post_id, pair.user_id, e
            );
            eprintln!("ERROR: {}", error_msg);
            stats.record_error(error_msg);
        }
    }

    println!("Finished processing {} pairs", pairs.len());

    display_stats(&stats, args.dry_run);

    Ok(())
}
