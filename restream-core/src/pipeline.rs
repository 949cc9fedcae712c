use std::{
    collections::VecDeque,
    path::Path,
    sync::Arc,
    time::Duration,
};

use chrono::SecondsFormat;
use futures::{StreamExt, future::BoxFuture};
use tokio_util::{codec::FramedRead, sync::CancellationToken};
use uuid::Uuid;

use crate::{
    activity::{ActivityEntry, ActivitySink, LogLevel},
    encoder::{
        CommandBuilder, DiagnosticLineCodec, EncoderLauncher, ExitReport, LaunchedEncoder,
        parse_progress,
    },
    error::PipelineError,
    hub::{EventHub, HubEvent, LogPayload},
    model::StreamDefinition,
    registry::{Process, ProcessRegistry, Status},
};

const LOG_SOURCE: &str = "encoder";
/// Non-progress lines kept for error context.
pub const DIAGNOSTIC_TAIL_LINES: usize = 10;

/// Timing knobs of the lifecycle state machine.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// How long `stop` waits for a voluntary exit before killing.
    pub grace_period: Duration,
    /// How long `reload` waits for the old entry to leave the registry.
    pub vacate_timeout: Duration,
    pub vacate_poll: Duration,
    pub preset: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(5),
            vacate_timeout: Duration::from_secs(5),
            vacate_poll: Duration::from_millis(100),
            preset: crate::encoder::command::DEFAULT_PRESET.to_string(),
        }
    }
}

/// Start/stop/reload state machine over encoder processes.
///
/// Only the monitor task spawned by `start` assigns terminal status and
/// removes the registry entry.
pub struct Pipeline {
    registry: Arc<ProcessRegistry>,
    hub: Arc<EventHub>,
    activity: Arc<dyn ActivitySink>,
    launcher: Arc<dyn EncoderLauncher>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        registry: Arc<ProcessRegistry>,
        hub: Arc<EventHub>,
        activity: Arc<dyn ActivitySink>,
        launcher: Arc<dyn EncoderLauncher>,
    ) -> Self {
        Self::with_options(registry, hub, activity, launcher, PipelineOptions::default())
    }

    pub fn with_options(
        registry: Arc<ProcessRegistry>,
        hub: Arc<EventHub>,
        activity: Arc<dyn ActivitySink>,
        launcher: Arc<dyn EncoderLauncher>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            registry,
            hub,
            activity,
            launcher,
            options,
        }
    }

    pub fn registry(&self) -> &Arc<ProcessRegistry> {
        &self.registry
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    /// Launches the encoder for `stream` and returns once it is running.
    /// The process is watched by a background task from then on.
    pub async fn start(
        &self,
        stream: &StreamDefinition,
        media_path: &Path,
    ) -> Result<(), PipelineError> {
        let id = stream.id;
        self.emit_log(id, LogLevel::Info, "pipeline_starting", "Preparing encoder pipeline");

        if self.registry.contains(id).await {
            return Err(PipelineError::AlreadyRunning(id));
        }

        if let Err(source) = tokio::fs::metadata(media_path).await {
            log::error!(
                "Pipeline: media {} not found: {}",
                media_path.display(),
                source
            );
            self.emit_log(id, LogLevel::Error, "video_missing", "Video source not found");
            return Err(PipelineError::MediaNotFound {
                path: media_path.to_path_buf(),
                source,
            });
        }

        let args = CommandBuilder::new()
            .input(media_path)
            .bitrate(stream.bitrate)
            .resolution(stream.resolution.as_str())
            .fps(stream.fps)
            .loop_input(stream.loop_input)
            .destinations(stream.destinations.iter().cloned())
            .preset(self.options.preset.as_str())
            .build()?;
        log::info!("Pipeline: executing encoder with {:?}", args);

        let Some(process) = self.registry.try_register(id).await else {
            return Err(PipelineError::AlreadyRunning(id));
        };

        let LaunchedEncoder {
            control,
            diagnostics,
            exit,
        } = match self.launcher.launch(&args) {
            Ok(launched) => launched,
            Err(e) => {
                self.registry.unregister(id).await;
                log::error!("Pipeline: failed to launch encoder for {}: {}", id, e);
                self.emit_log(
                    id,
                    LogLevel::Error,
                    "pipeline_start_failed",
                    "Failed to start encoder",
                );
                return Err(PipelineError::Launch(e));
            }
        };
        // Stop refuses until the control is attached, so `running` is
        // always published before any `stopping`.
        let hub = &self.hub;
        if process.transition_with(&[Status::Starting], Status::Running, |status| {
            hub.broadcast(&HubEvent::status(id, status));
        }) {
            self.emit_log(id, LogLevel::Info, "pipeline_running", "Pipeline is live");
        }
        process.attach(control);

        let monitor = Monitor {
            registry: Arc::clone(&self.registry),
            hub: Arc::clone(&self.hub),
            activity: Arc::clone(&self.activity),
            process,
        };
        tokio::spawn(monitor.run(diagnostics, exit));

        Ok(())
    }

    /// Asks the encoder of `stream_id` to exit, killing it after the grace
    /// period. Succeeds without doing anything if nothing is registered.
    ///
    /// Cancelling `cancel` returns early; teardown still completes in the
    /// monitor task.
    pub async fn stop(
        &self,
        stream_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let Some(process) = self.registry.get(stream_id).await else {
            return Ok(());
        };
        let Some(control) = process.control() else {
            log::warn!("Pipeline: stop requested before {} launched", stream_id);
            return Err(PipelineError::NotLaunched(stream_id));
        };

        let hub = &self.hub;
        let moved = process.transition_with(
            &[Status::Running],
            Status::Stopping,
            |status| {
                hub.broadcast(&HubEvent::status(stream_id, status));
            },
        );
        if !moved && process.status().is_terminal() {
            return Ok(());
        }
        self.emit_log(stream_id, LogLevel::Info, "pipeline_stopping", "Stopping pipeline");

        if let Err(e) = control.request_graceful_stop() {
            log::warn!(
                "Pipeline: interrupt for {} not delivered ({}), killing",
                stream_id,
                e
            );
            return control.force_kill().map_err(PipelineError::Kill);
        }

        tokio::select! {
            _ = process.exited().cancelled() => Ok(()),
            _ = tokio::time::sleep(self.options.grace_period) => {
                log::warn!(
                    "Pipeline: {} still running after {:?}, killing",
                    stream_id,
                    self.options.grace_period
                );
                self.emit_log(
                    stream_id,
                    LogLevel::Warning,
                    "pipeline_kill",
                    "Grace period elapsed, forcing encoder to exit",
                );
                control.force_kill().map_err(PipelineError::Kill)
            }
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        }
    }

    /// Stops the running encoder, waits for its entry to leave the registry
    /// and starts a new one with the current settings.
    ///
    /// Success means the new `start` call returned without error, not that
    /// the new process reached `running` health.
    pub async fn reload(
        &self,
        stream: &StreamDefinition,
        media_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let id = stream.id;
        self.emit_log(id, LogLevel::Info, "pipeline_reload", "Applying live changes");

        if let Err(e) = self.stop(id, cancel).await {
            self.emit_log(
                id,
                LogLevel::Error,
                "pipeline_reload_failed",
                "Failed to stop previous process",
            );
            return Err(PipelineError::ReloadStop(Box::new(e)));
        }

        if let Err(e) = self.wait_vacant(id, cancel).await {
            self.emit_log(
                id,
                LogLevel::Error,
                "pipeline_reload_failed",
                "Previous process did not exit in time",
            );
            return Err(e);
        }

        if let Err(e) = self.start(stream, media_path).await {
            self.emit_log(
                id,
                LogLevel::Error,
                "pipeline_reload_failed",
                "Failed to start reloaded process",
            );
            return Err(PipelineError::ReloadStart(Box::new(e)));
        }

        self.emit_log(id, LogLevel::Info, "pipeline_reloaded", "Live changes applied");
        Ok(())
    }

    /// Asks every registered process to stop, in parallel.
    pub async fn stop_all(&self, cancel: &CancellationToken) {
        let ids = self.registry.stream_ids().await;
        let stops = ids.into_iter().map(|id| async move {
            if let Err(e) = self.stop(id, cancel).await {
                log::warn!("Pipeline: stop {} during shutdown failed: {}", id, e);
            }
        });
        futures::future::join_all(stops).await;
    }

    async fn wait_vacant(
        &self,
        stream_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let deadline = tokio::time::Instant::now() + self.options.vacate_timeout;
        loop {
            if !self.registry.contains(stream_id).await {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                log::error!("Pipeline: {} did not vacate the registry", stream_id);
                return Err(PipelineError::VacateTimeout(stream_id));
            }
            tokio::select! {
                _ = tokio::time::sleep(self.options.vacate_poll) => {}
                _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            }
        }
    }

    fn emit_log(&self, stream_id: Uuid, level: LogLevel, event: &str, message: &str) {
        emit_log(&self.activity, &self.hub, stream_id, level, event, message);
    }
}

/// Records a lifecycle entry in the activity log and mirrors it to observers.
fn emit_log(
    activity: &Arc<dyn ActivitySink>,
    hub: &EventHub,
    stream_id: Uuid,
    level: LogLevel,
    event: &str,
    message: &str,
) {
    match level {
        LogLevel::Info => log::info!("Pipeline: [{}] {}: {}", stream_id, event, message),
        LogLevel::Warning => log::warn!("Pipeline: [{}] {}: {}", stream_id, event, message),
        LogLevel::Error => log::error!("Pipeline: [{}] {}: {}", stream_id, event, message),
    }
    let entry = ActivityEntry::new(LOG_SOURCE, level, event, message).with_stream(stream_id);
    let occurred_at = entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
    activity.record(entry);

    hub.broadcast(&HubEvent::StreamLog(LogPayload {
        stream_id,
        level,
        event: event.to_string(),
        message: message.to_string(),
        occurred_at,
    }));
}

/// Substring heuristic for diagnostic lines worth surfacing in the
/// activity log.
pub fn looks_like_failure(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_lowercase();
    lower.contains(" error")
        || lower.contains("error ")
        || lower.contains("failed")
        || lower.contains("invalid")
        || lower.contains("cannot")
}

/// Rolling window of the last non-progress diagnostic lines.
#[derive(Debug, Default)]
struct DiagnosticTail {
    lines: VecDeque<String>,
}

impl DiagnosticTail {
    fn push(&mut self, line: String) {
        if self.lines.len() == DIAGNOSTIC_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn render(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Watches one encoder until it exits, then owns its teardown.
struct Monitor {
    registry: Arc<ProcessRegistry>,
    hub: Arc<EventHub>,
    activity: Arc<dyn ActivitySink>,
    process: Arc<Process>,
}

impl Monitor {
    async fn run(
        self,
        diagnostics: crate::encoder::launcher::DiagnosticStream,
        exit: BoxFuture<'static, std::io::Result<ExitReport>>,
    ) {
        let id = self.process.stream_id();
        let mut lines = FramedRead::new(diagnostics, DiagnosticLineCodec::new());
        let mut tail = DiagnosticTail::default();

        while let Some(line) = lines.next().await {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("Pipeline: reading diagnostics of {} failed: {}", id, e);
                    break;
                }
            };

            if let Some(progress) = parse_progress(&line) {
                self.process.update_progress(progress.clone());
                self.hub.broadcast(&HubEvent::progress(id, progress));
                continue;
            }

            log::debug!("Pipeline: [{}] {}", id, line);
            if looks_like_failure(&line) {
                self.activity.record(
                    ActivityEntry::new(LOG_SOURCE, LogLevel::Error, "stderr", line.as_str())
                        .with_stream(id),
                );
            }
            tail.push(line);
        }
        // Dropping the reader closes our end of the pipe before waiting.
        drop(lines);

        let exit = exit.await;
        let hub = &self.hub;
        let status = self.process.settle(
            |stop_requested| match &exit {
                Ok(report) if report.success || stop_requested => Status::Stopped,
                _ => Status::Error,
            },
            |status| {
                hub.broadcast(&HubEvent::status(id, status));
            },
        );
        match (&exit, status) {
            (Ok(report), Status::Stopped) => {
                log::info!("Pipeline: encoder for {} exited ({:?})", id, report.code);
            }
            (Ok(report), _) => {
                log::error!(
                    "Pipeline: encoder for {} exited with code {:?}\nLast output lines:\n{}",
                    id,
                    report.code,
                    tail.render()
                );
            }
            (Err(e), _) => {
                log::error!(
                    "Pipeline: waiting on encoder for {} failed: {}\nLast output lines:\n{}",
                    id,
                    e,
                    tail.render()
                );
            }
        }

        self.registry.unregister(id).await;
        self.process.mark_exited();

        match status {
            Status::Error => emit_log(
                &self.activity,
                &self.hub,
                id,
                LogLevel::Error,
                "pipeline_error",
                "Encoder exited with error",
            ),
            _ => emit_log(
                &self.activity,
                &self.hub,
                id,
                LogLevel::Info,
                "pipeline_stopped",
                "Pipeline stopped",
            ),
        }
    }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod pipeline_test;
