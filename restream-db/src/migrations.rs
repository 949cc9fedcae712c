use std::path::Path;

use crate::RestreamDatabase;

const MIGRATIONS_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER NOT NULL PRIMARY KEY,
    description TEXT NOT NULL,
    createtime TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

#[derive(Debug, rust_embed::Embed)]
#[folder = "migrations/"]
struct Migrations;

/// Applies every embedded migration that is not yet recorded, in version
/// order, each in its own transaction.
pub async fn migrate(db: &RestreamDatabase) -> anyhow::Result<()> {
    let mut conn = db.connect()?;
    conn.execute_batch(MIGRATIONS_TABLE_SQL).await?;

    let mut migrations = load_migrations()?;
    migrations.sort_by_key(|m| m.version);

    for migration in migrations {
        if is_migration_applied(&conn, migration.version).await? {
            continue;
        }
        log::info!(
            "Db: applying migration {} ({})",
            migration.version,
            migration.description
        );
        let tx = conn.transaction().await?;
        tx.execute_batch(&migration.sql).await?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            (migration.version, migration.description.as_str()),
        )
        .await?;
        tx.commit().await?;
    }

    Ok(())
}

async fn is_migration_applied(conn: &turso::Connection, version: i64) -> anyhow::Result<bool> {
    let mut rows = conn
        .query("SELECT 1 FROM _migrations WHERE version = ?1", (version,))
        .await?;
    Ok(rows.next().await?.is_some())
}

struct Migration {
    version: i64,
    description: String,
    sql: String,
}

fn load_migrations() -> anyhow::Result<Vec<Migration>> {
    let mut migrations = Vec::new();
    for path in Migrations::iter() {
        let Some(file) = Migrations::get(&path) else {
            continue;
        };
        let name = Path::new(path.as_ref())
            .file_name()
            .and_then(|x| x.to_str())
            .unwrap_or("");
        // <VERSION>_<DESCRIPTION>.sql
        let Some((version, rest)) = name.split_once('_') else {
            continue;
        };
        let Some(description) = rest.strip_suffix(".sql") else {
            continue;
        };

        migrations.push(Migration {
            version: version.parse()?,
            description: description.replace('_', " "),
            sql: std::str::from_utf8(file.data.as_ref())?.to_owned(),
        });
    }
    Ok(migrations)
}
