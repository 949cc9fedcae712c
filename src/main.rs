use std::{sync::Arc, time::Duration};

use clap::Parser;
use restream_core::{
    Pipeline,
    activity::ActivityStore,
    encoder::{CommandLauncher, check_encoder},
    hub::EventHub,
    registry::ProcessRegistry,
    service::StreamService,
    stats::{HostStatsSource, StatsSampler},
};
use restream_db::{KvStore, RestreamDatabase, UploadDirResolver};
use tokio_util::sync::CancellationToken;

mod api;
mod config;
mod handler;

const SHUTDOWN_STOP_TIMEOUT: Duration = Duration::from_secs(10);

fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::AppConfig::parse();
    init_logging(config.log_filter());

    if let Some(parent) = config.db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let db = Arc::new(RestreamDatabase::open(&config.db_path).await?);

    if !check_encoder(&config.encoder_bin).await {
        log::warn!(
            "Main: encoder '{}' is not available, streams will fail to start",
            config.encoder_bin
        );
    }

    let cancel = CancellationToken::new();

    let hub = Arc::new(EventHub::new());
    let activity = Arc::new(ActivityStore::new());
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(ProcessRegistry::new()),
        Arc::clone(&hub),
        activity.clone(),
        Arc::new(CommandLauncher::new(&config.encoder_bin)),
    ));
    let service = Arc::new(StreamService::new(
        Arc::new(KvStore::new(Arc::clone(&db))),
        Arc::new(UploadDirResolver::new(
            Arc::clone(&db),
            config.upload_dir.clone(),
        )),
        Arc::clone(&pipeline),
        cancel.child_token(),
    ));

    let stats = StatsSampler::new(
        Arc::clone(&hub),
        Arc::new(HostStatsSource::new()),
        config.stats_interval(),
    )
    .spawn(cancel.clone());

    let state = api::AppState {
        service,
        hub,
        activity,
        db,
        upload_dir: config.upload_dir.clone(),
    };
    let server = api::start_api_server(state, config.listen_addr()?, cancel.clone());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("Main: shutdown requested");
                cancel.cancel();
            },
        }
    }

    // The service token is already cancelled, so stops here use their own.
    let stop_cancel = CancellationToken::new();
    if tokio::time::timeout(SHUTDOWN_STOP_TIMEOUT, pipeline.stop_all(&stop_cancel))
        .await
        .is_err()
    {
        log::warn!("Main: encoders did not stop within {:?}", SHUTDOWN_STOP_TIMEOUT);
    }

    let _ = server.await;
    let _ = stats.await;
    Ok(())
}
