use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label stored on a stream record that has never been started.
pub const STATUS_IDLE: &str = "idle";

/// A continuously looping broadcast configuration.
///
/// The pipeline treats it as an immutable value for the duration of one call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamDefinition {
    pub id: Uuid,
    pub name: String,
    pub video_id: Option<Uuid>,
    pub destinations: Vec<String>,
    /// kbps
    pub bitrate: u32,
    pub resolution: String,
    pub fps: u32,
    #[serde(rename = "loop")]
    pub loop_input: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable live playlist bound to a stream. Changes here only reach the
/// running encoder when explicitly applied.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamProgram {
    pub id: Uuid,
    pub stream_id: Uuid,
    pub video_ids: Vec<Uuid>,
    pub destinations: Vec<String>,
    pub bitrate: u32,
    pub resolution: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreamProgram {
    /// Program mirroring the stream's own settings.
    pub fn seeded_from(stream: &StreamDefinition) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            stream_id: stream.id,
            video_ids: stream.video_id.into_iter().collect(),
            destinations: stream.destinations.clone(),
            bitrate: stream.bitrate,
            resolution: stream.resolution.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreateStream {
    pub name: String,
    pub video_id: Option<Uuid>,
    pub destinations: Vec<String>,
    pub bitrate: u32,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub fps: u32,
    #[serde(default, rename = "loop")]
    pub loop_input: bool,
}

pub type UpdateStream = CreateStream;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SaveProgram {
    #[serde(default)]
    pub name: String,
    pub video_ids: Vec<Uuid>,
    pub destinations: Vec<String>,
    #[serde(default)]
    pub bitrate: u32,
    #[serde(default)]
    pub resolution: String,
    #[serde(default)]
    pub apply_live_now: bool,
}

/// Uploaded media known to the media resolver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: Uuid,
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub duration: u32,
    pub created_at: DateTime<Utc>,
}
