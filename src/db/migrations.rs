//! Schema migrations: every `.sql` file under `migrations/` runs once, in
//! filename order, with the applied set tracked in `schema_migrations`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rusqlite::Connection;

const MIGRATIONS_DIR: &str = "migrations";

pub fn apply_pending(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .context("creating schema_migrations table")?;

    let dir = Path::new(MIGRATIONS_DIR);
    if !dir.exists() {
        tracing::warn!("no {MIGRATIONS_DIR}/ directory, nothing to migrate");
        return Ok(());
    }

    let mut pending: Vec<PathBuf> = fs::read_dir(dir)
        .context("reading migrations directory")?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "sql"))
        .collect();
    pending.sort();

    for path in pending {
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => continue,
        };

        let applied: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE name = ?1)",
                [&name],
                |row| row.get(0),
            )
            .context("querying schema_migrations")?;
        if applied {
            continue;
        }

        let sql =
            fs::read_to_string(&path).with_context(|| format!("reading migration {name}"))?;
        conn.execute_batch(&sql)
            .with_context(|| format!("running migration {name}"))?;
        conn.execute("INSERT INTO schema_migrations (name) VALUES (?1)", [&name])
            .with_context(|| format!("recording migration {name}"))?;

        tracing::info!(migration = %name, "schema migration applied");
    }

    Ok(())
}
