use restream_core::destination::Platform;
use serde::Deserialize;
use turso::Connection;
use uuid::Uuid;

use crate::kv;

const MODULE_NAME: &str = "platform";

#[derive(Debug, Deserialize)]
pub struct PlatformCreate {
    pub name: String,
    pub platform_type: String,
    pub stream_key: String,
    #[serde(default)]
    pub custom_url: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

pub async fn query_all(conn: &Connection) -> anyhow::Result<Vec<Platform>> {
    let mut platforms: Vec<Platform> = kv::values(MODULE_NAME, conn).await?;
    platforms.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(platforms)
}

pub async fn insert(create: &PlatformCreate, conn: &Connection) -> anyhow::Result<Platform> {
    let platform = Platform {
        id: Uuid::new_v4(),
        name: create.name.trim().to_string(),
        platform_type: create.platform_type.trim().to_ascii_lowercase(),
        stream_key: create.stream_key.trim().to_string(),
        custom_url: create.custom_url.trim().to_string(),
        enabled: create.enabled,
    };
    if platform.destination().is_none() {
        anyhow::bail!(
            "platform type '{}' needs a custom url",
            platform.platform_type
        );
    }
    kv::put(MODULE_NAME, &platform.id.to_string(), &platform, conn).await?;
    Ok(platform)
}

pub async fn delete(id: Uuid, conn: &Connection) -> anyhow::Result<bool> {
    kv::delete(MODULE_NAME, &id.to_string(), conn).await
}

/// Ingest URLs of every enabled platform.
pub async fn enabled_destinations(conn: &Connection) -> anyhow::Result<Vec<String>> {
    Ok(query_all(conn)
        .await?
        .iter()
        .filter(|p| p.enabled)
        .filter_map(Platform::destination)
        .collect())
}
