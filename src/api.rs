use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::Router;
use restream_core::{activity::ActivityStore, hub::EventHub, service::StreamService};
use restream_db::RestreamDatabase;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub(crate) struct AppState {
    pub service: Arc<StreamService>,
    pub hub: Arc<EventHub>,
    pub activity: Arc<ActivityStore>,
    pub db: Arc<RestreamDatabase>,
    pub upload_dir: PathBuf,
}

pub(crate) fn app_router(state: AppState) -> Router {
    Router::new()
        .nest("/streams", crate::handler::stream::stream_router())
        .nest("/activity", crate::handler::activity::activity_router())
        .nest("/videos", crate::handler::library::video_router())
        .nest("/platforms", crate::handler::library::platform_router())
        .nest("/ws", crate::handler::events::events_router())
        .with_state(state)
}

/// Serves the control API until `cancel` fires. A bind failure cancels
/// the whole application.
pub(crate) fn start_api_server(
    state: AppState,
    addr: SocketAddr,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let app = app_router(state);

        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                log::error!("Api: failed to bind {}: {}", addr, e);
                cancel.cancel();
                return;
            }
        };
        log::info!("Api: server started on {}", addr);
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await
        {
            log::error!("Api: server error: {}", e);
        }
    })
}

async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
    log::info!("Api: shutting down");
}

#[cfg(test)]
#[path = "api_test.rs"]
mod api_test;
