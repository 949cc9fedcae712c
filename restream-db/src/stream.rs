use restream_core::model::{StreamDefinition, StreamProgram};
use turso::Connection;
use uuid::Uuid;

use crate::kv;

const STREAM_MODULE: &str = "stream";
const PROGRAM_MODULE: &str = "program";

/// All streams, newest first.
pub async fn query_all(conn: &Connection) -> anyhow::Result<Vec<StreamDefinition>> {
    let mut streams: Vec<StreamDefinition> = kv::values(STREAM_MODULE, conn).await?;
    streams.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(streams)
}

pub async fn by_id(id: Uuid, conn: &Connection) -> anyhow::Result<Option<StreamDefinition>> {
    kv::value(STREAM_MODULE, &id.to_string(), conn).await
}

pub async fn save(stream: &StreamDefinition, conn: &Connection) -> anyhow::Result<()> {
    kv::put(STREAM_MODULE, &stream.id.to_string(), stream, conn).await
}

/// Removes the stream together with its program.
pub async fn delete(id: Uuid, conn: &Connection) -> anyhow::Result<bool> {
    let key = id.to_string();
    kv::delete(PROGRAM_MODULE, &key, conn).await?;
    kv::delete(STREAM_MODULE, &key, conn).await
}

pub async fn program(stream_id: Uuid, conn: &Connection) -> anyhow::Result<Option<StreamProgram>> {
    kv::value(PROGRAM_MODULE, &stream_id.to_string(), conn).await
}

pub async fn save_program(program: &StreamProgram, conn: &Connection) -> anyhow::Result<()> {
    kv::put(PROGRAM_MODULE, &program.stream_id.to_string(), program, conn).await
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::kv::test_db;

    fn stream(name: &str, age_secs: i64) -> StreamDefinition {
        let created = Utc::now() - Duration::seconds(age_secs);
        StreamDefinition {
            id: Uuid::new_v4(),
            name: name.into(),
            video_id: None,
            destinations: vec!["rtmp://a.example/live/key".into()],
            bitrate: 2500,
            resolution: "1280x720".into(),
            fps: 30,
            loop_input: true,
            status: "idle".into(),
            created_at: created,
            updated_at: created,
        }
    }

    #[tokio::test]
    async fn test_save_and_list_newest_first() {
        let (_dir, db) = test_db::open().await;
        let conn = db.connect().unwrap();
        let old = stream("old", 60);
        let new = stream("new", 0);
        save(&old, &conn).await.unwrap();
        save(&new, &conn).await.unwrap();

        let names: Vec<_> = query_all(&conn)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["new", "old"]);
        assert_eq!(by_id(old.id, &conn).await.unwrap(), Some(old));
    }

    #[tokio::test]
    async fn test_delete_removes_program() {
        let (_dir, db) = test_db::open().await;
        let conn = db.connect().unwrap();
        let s = stream("s", 0);
        save(&s, &conn).await.unwrap();
        save_program(&StreamProgram::seeded_from(&s), &conn)
            .await
            .unwrap();

        assert!(delete(s.id, &conn).await.unwrap());
        assert!(by_id(s.id, &conn).await.unwrap().is_none());
        assert!(program(s.id, &conn).await.unwrap().is_none());
    }
}
