use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use restream_core::{model::Video, service::MediaResolver};
use turso::Connection;
use uuid::Uuid;

use crate::{RestreamDatabase, kv};

const MODULE_NAME: &str = "video";

pub async fn query_all(conn: &Connection) -> anyhow::Result<Vec<Video>> {
    let mut videos: Vec<Video> = kv::values(MODULE_NAME, conn).await?;
    videos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(videos)
}

pub async fn by_id(id: Uuid, conn: &Connection) -> anyhow::Result<Option<Video>> {
    kv::value(MODULE_NAME, &id.to_string(), conn).await
}

/// Records a file that already sits in the upload directory.
pub async fn insert(
    filename: &str,
    original_name: &str,
    size: u64,
    conn: &Connection,
) -> anyhow::Result<Video> {
    let video = Video {
        id: Uuid::new_v4(),
        filename: filename.to_string(),
        original_name: original_name.to_string(),
        size,
        duration: 0,
        created_at: Utc::now(),
    };
    kv::put(MODULE_NAME, &video.id.to_string(), &video, conn).await?;
    Ok(video)
}

pub async fn delete(id: Uuid, conn: &Connection) -> anyhow::Result<bool> {
    kv::delete(MODULE_NAME, &id.to_string(), conn).await
}

/// Resolves videos to files under the upload directory.
pub struct UploadDirResolver {
    db: Arc<RestreamDatabase>,
    upload_dir: PathBuf,
}

impl UploadDirResolver {
    pub fn new(db: Arc<RestreamDatabase>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            db,
            upload_dir: upload_dir.into(),
        }
    }
}

#[async_trait]
impl MediaResolver for UploadDirResolver {
    async fn resolve(&self, video_id: Uuid) -> anyhow::Result<PathBuf> {
        let conn = self.db.connect()?;
        let video = by_id(video_id, &conn)
            .await?
            .ok_or_else(|| anyhow::anyhow!("video {} not found", video_id))?;
        Ok(self.upload_dir.join(video.filename))
    }
}
