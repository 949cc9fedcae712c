use std::sync::Arc;

use async_trait::async_trait;
use restream_core::{
    model::{StreamDefinition, StreamProgram},
    service::StreamRepository,
};
use uuid::Uuid;

use crate::{RestreamDatabase, stream};

/// [`StreamRepository`] over the `kvs` table.
pub struct KvStore {
    db: Arc<RestreamDatabase>,
}

impl KvStore {
    pub fn new(db: Arc<RestreamDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StreamRepository for KvStore {
    async fn create(&self, s: &StreamDefinition) -> anyhow::Result<()> {
        let conn = self.db.connect()?;
        if stream::by_id(s.id, &conn).await?.is_some() {
            anyhow::bail!("stream {} already exists", s.id);
        }
        stream::save(s, &conn).await
    }

    async fn get(&self, id: Uuid) -> anyhow::Result<Option<StreamDefinition>> {
        stream::by_id(id, &self.db.connect()?).await
    }

    async fn list(&self) -> anyhow::Result<Vec<StreamDefinition>> {
        stream::query_all(&self.db.connect()?).await
    }

    async fn update(&self, s: &StreamDefinition) -> anyhow::Result<()> {
        stream::save(s, &self.db.connect()?).await
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        stream::delete(id, &self.db.connect()?).await?;
        Ok(())
    }

    async fn get_program(&self, stream_id: Uuid) -> anyhow::Result<Option<StreamProgram>> {
        stream::program(stream_id, &self.db.connect()?).await
    }

    async fn upsert_program(&self, program: &StreamProgram) -> anyhow::Result<()> {
        stream::save_program(program, &self.db.connect()?).await
    }
}
