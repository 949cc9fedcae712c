use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    encoder::Progress,
    error::{PipelineError, ServiceError},
    model::{
        CreateStream, STATUS_IDLE, SaveProgram, StreamDefinition, StreamProgram, UpdateStream,
    },
    pipeline::Pipeline,
    registry::Status,
};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Persistent store of stream definitions and their programs.
#[async_trait]
pub trait StreamRepository: Send + Sync {
    async fn create(&self, stream: &StreamDefinition) -> anyhow::Result<()>;
    async fn get(&self, id: Uuid) -> anyhow::Result<Option<StreamDefinition>>;
    async fn list(&self) -> anyhow::Result<Vec<StreamDefinition>>;
    async fn update(&self, stream: &StreamDefinition) -> anyhow::Result<()>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<()>;
    async fn get_program(&self, stream_id: Uuid) -> anyhow::Result<Option<StreamProgram>>;
    async fn upsert_program(&self, program: &StreamProgram) -> anyhow::Result<()>;
}

/// Maps a video id to the media file the encoder should read.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, video_id: Uuid) -> anyhow::Result<PathBuf>;
}

/// Live view of one stream's encoder.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamStats {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

/// Coordinates stored stream/program records with the pipeline.
pub struct StreamService {
    repo: Arc<dyn StreamRepository>,
    media: Arc<dyn MediaResolver>,
    pipeline: Arc<Pipeline>,
    cancel: CancellationToken,
}

impl StreamService {
    /// `cancel` aborts in-flight stop and reload waits, normally on shutdown.
    pub fn new(
        repo: Arc<dyn StreamRepository>,
        media: Arc<dyn MediaResolver>,
        pipeline: Arc<Pipeline>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            repo,
            media,
            pipeline,
            cancel,
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub async fn create_stream(&self, req: CreateStream) -> ServiceResult<StreamDefinition> {
        let now = Utc::now();
        let stream = StreamDefinition {
            id: Uuid::new_v4(),
            name: req.name.trim().to_string(),
            video_id: req.video_id,
            destinations: req.destinations,
            bitrate: req.bitrate,
            resolution: req.resolution,
            fps: req.fps,
            loop_input: req.loop_input,
            status: STATUS_IDLE.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.repo.create(&stream).await?;
        self.repo
            .upsert_program(&StreamProgram::seeded_from(&stream))
            .await?;
        log::info!("Service: created stream {} ({})", stream.id, stream.name);
        Ok(stream)
    }

    pub async fn get_stream(&self, id: Uuid) -> ServiceResult<StreamDefinition> {
        self.repo
            .get(id)
            .await?
            .ok_or(ServiceError::StreamNotFound)
    }

    pub async fn list_streams(&self) -> ServiceResult<Vec<StreamDefinition>> {
        Ok(self.repo.list().await?)
    }

    /// Persists new settings and restarts the encoder if it is live.
    pub async fn update_stream(
        &self,
        id: Uuid,
        req: UpdateStream,
    ) -> ServiceResult<StreamDefinition> {
        let mut stream = self.get_stream(id).await?;
        stream.name = req.name.trim().to_string();
        stream.video_id = req.video_id;
        stream.destinations = req.destinations;
        stream.bitrate = req.bitrate;
        stream.resolution = req.resolution;
        stream.fps = req.fps;
        stream.loop_input = req.loop_input;
        stream.updated_at = Utc::now();
        self.repo.update(&stream).await?;

        if self.is_live(id).await {
            let video_id = stream.video_id.ok_or(ServiceError::ProgramEmpty)?;
            let path = self.media.resolve(video_id).await?;
            self.pipeline.reload(&stream, &path, &self.cancel).await?;
        }
        Ok(stream)
    }

    /// Stops the encoder if one is running, then removes the record.
    pub async fn delete_stream(&self, id: Uuid) -> ServiceResult<()> {
        if let Err(e) = self.stop_stream(id).await {
            log::warn!("Service: stop before deleting {} failed: {}", id, e);
        }
        self.repo.delete(id).await?;
        log::info!("Service: deleted stream {}", id);
        Ok(())
    }

    /// Starts the stream from its program: the first queued video plays,
    /// and program destinations, bitrate and resolution win when set.
    pub async fn start_stream(&self, id: Uuid) -> ServiceResult<()> {
        let mut stream = self.get_stream(id).await?;
        let program = self.repo.get_program(id).await?;

        let mut video_id = stream.video_id;
        if let Some(program) = program {
            if let Some(first) = program.video_ids.first() {
                video_id = Some(*first);
            }
            if !program.destinations.is_empty() {
                stream.destinations = program.destinations;
            }
            if program.bitrate > 0 {
                stream.bitrate = program.bitrate;
            }
            if !program.resolution.trim().is_empty() {
                stream.resolution = program.resolution;
            }
        }
        let video_id = video_id.ok_or(ServiceError::ProgramEmpty)?;
        let path = self.media.resolve(video_id).await?;

        let result = self.pipeline.start(&stream, &path).await;
        match &result {
            Ok(()) => self.record_status(id, Status::Running).await,
            Err(PipelineError::Launch(_)) => self.record_status(id, Status::Error).await,
            Err(_) => {}
        }
        Ok(result?)
    }

    pub async fn stop_stream(&self, id: Uuid) -> ServiceResult<()> {
        self.get_stream(id).await?;
        self.pipeline.stop(id, &self.cancel).await?;
        self.record_status(id, Status::Stopped).await;
        Ok(())
    }

    /// The stored program, or one mirroring the stream when none was saved.
    pub async fn get_program(&self, id: Uuid) -> ServiceResult<StreamProgram> {
        let stream = self.get_stream(id).await?;
        Ok(self
            .repo
            .get_program(id)
            .await?
            .unwrap_or_else(|| StreamProgram::seeded_from(&stream)))
    }

    /// Replaces the stream's program and copies its settings onto the
    /// stream record. With `apply_live_now` a running encoder is reloaded.
    pub async fn save_program(&self, id: Uuid, req: SaveProgram) -> ServiceResult<StreamProgram> {
        let mut stream = self.get_stream(id).await?;
        let Some(&first_video) = req.video_ids.first() else {
            return Err(ServiceError::InvalidProgram(
                "program must contain at least one video",
            ));
        };
        if req.destinations.is_empty() {
            return Err(ServiceError::InvalidProgram(
                "program must contain at least one destination",
            ));
        }

        let bitrate = if req.bitrate > 0 {
            req.bitrate
        } else {
            stream.bitrate
        };
        let resolution = if req.resolution.trim().is_empty() {
            stream.resolution.clone()
        } else {
            req.resolution
        };

        let now = Utc::now();
        let created_at = match self.repo.get_program(id).await? {
            Some(existing) => existing.created_at,
            None => now,
        };
        let program = StreamProgram {
            id: Uuid::new_v4(),
            stream_id: id,
            video_ids: req.video_ids,
            destinations: req.destinations,
            bitrate,
            resolution,
            created_at,
            updated_at: now,
        };
        self.repo.upsert_program(&program).await?;

        stream.video_id = Some(first_video);
        let name = req.name.trim();
        if !name.is_empty() {
            stream.name = name.to_string();
        }
        stream.destinations = program.destinations.clone();
        stream.bitrate = program.bitrate;
        stream.resolution = program.resolution.clone();
        stream.updated_at = now;
        self.repo.update(&stream).await?;

        if req.apply_live_now && self.is_live(id).await {
            let path = self.media.resolve(first_video).await?;
            self.pipeline.reload(&stream, &path, &self.cancel).await?;
        }
        Ok(program)
    }

    /// Live status from the registry; `stopped` when nothing is running.
    pub async fn stream_stats(&self, id: Uuid) -> StreamStats {
        match self.pipeline.registry().get(id).await {
            Some(process) => {
                let snapshot = process.snapshot();
                StreamStats {
                    status: snapshot.status,
                    started_at: Some(snapshot.started_at),
                    progress: snapshot.progress,
                }
            }
            None => StreamStats {
                status: Status::Stopped,
                started_at: None,
                progress: None,
            },
        }
    }

    async fn is_live(&self, id: Uuid) -> bool {
        self.pipeline.registry().contains(id).await
    }

    /// Refreshes the stored status label. Failures only log; the lifecycle
    /// request itself already succeeded or failed on its own terms.
    async fn record_status(&self, id: Uuid, status: Status) {
        let stored = match self.repo.get(id).await {
            Ok(Some(mut stream)) => {
                stream.status = status.as_str().to_string();
                stream.updated_at = Utc::now();
                self.repo.update(&stream).await
            }
            Ok(None) => return,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            log::warn!("Service: failed to store status {} for {}: {}", status, id, e);
        }
    }
}

#[cfg(test)]
#[path = "service_test.rs"]
mod service_test;
