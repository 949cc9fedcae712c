//! Embedded persistence for stream definitions, programs, videos and
//! platforms. Every record is a JSON blob in the generic `kvs` table,
//! addressed by `(module, key)`.

use std::path::Path;

use turso::{Builder, Connection, Database};

pub mod kv;
pub mod migrations;
pub mod platform;
pub mod store;
pub mod stream;
pub mod video;

pub use store::KvStore;
pub use video::UploadDirResolver;

/// Local database file, opened in WAL mode with every embedded migration
/// applied.
pub struct RestreamDatabase {
    db: Database,
}

impl RestreamDatabase {
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        let url = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("database path {} is not UTF-8", path.display()))?;
        let db = Builder::new_local(url).build().await?;

        let conn = db.connect()?;
        conn.pragma_update("journal_mode", "wal").await?;

        let db = Self { db };
        migrations::migrate(&db).await?;
        Ok(db)
    }

    pub fn connect(&self) -> anyhow::Result<Connection> {
        self.db.connect().map_err(anyhow::Error::from)
    }
}
