//! Embedded schema migrations.

use anyhow::{Context, anyhow};
use diesel::{Connection, SqliteConnection, connection::SimpleConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};

use crate::db::connection::sqlite_path;

/// Embedded Diesel migrations bundled with this crate.
///
/// These are applied by `run_sqlite` to bring the database schema up to date.
pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Runs pending Diesel migrations on a SQLite database at the given URL.
///
/// This sets the SQLite journal mode to WAL and applies all embedded migrations, returning an error on failure.
pub fn run_sqlite(url: &str) -> anyhow::Result<()> {
    let path = sqlite_path(url);
    let mut conn = SqliteConnection::establish(path)
        .with_context(|| format!("open sqlite database {path}"))?;
    conn.batch_execute("PRAGMA journal_mode=WAL;")?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!(e))?;
    tracing::debug!(path, applied = applied.len(), "migrations applied");

    Ok(())
}

/// Runs pending migrations for the given database URL.
///
/// Bare paths and `sqlite:` URLs go to SQLite. Only SQLite is supported, so
/// `postgres://` URLs are rejected.
pub fn run_all(database_url: &str) -> anyhow::Result<()> {
    if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        anyhow::bail!("Unsupported DATABASE_URL (only SQLite is supported): {database_url}");
    }
    run_sqlite(database_url)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn migrations_apply_on_temp_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        let path = temp.path().to_string_lossy().to_string();

        run_sqlite(&path).expect("migration run");
        // Re-running is a no-op.
        run_all(&format!("sqlite:{path}")).expect("second run");

        let mut conn = SqliteConnection::establish(&path).unwrap();

        conn.batch_execute(
            "INSERT INTO market_bars (symbol, timeframe, ts, source)
             VALUES ('AAPL', '1 min', '2024-01-02T14:30:00.000Z', 'test')",
        )
        .unwrap();
    }

    #[test]
    fn postgres_urls_are_rejected() {
        let err = run_all("postgres://localhost/bars").unwrap_err();
        assert!(err.to_string().contains("only SQLite"));
    }
}
