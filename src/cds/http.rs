use std::{future::Future, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::{CdsError, ConfigDistributor, Subscription};
use crate::{common::ResourceKey, stunner_config::StunnerConfig};

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct AppState {
    distributor: ConfigDistributor,
    ping_interval: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct WatchParams {
    #[serde(default)]
    watch: bool,
}

/// HTTP and WebSocket front end of a [`ConfigDistributor`].
pub struct CdsServer {
    state: AppState,
}

impl CdsServer {
    pub fn new(distributor: ConfigDistributor, ping_interval: Duration) -> Self {
        Self { state: AppState { distributor, ping_interval } }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/v1/configs", get(list_configs))
            .route("/api/v1/configs/{namespace}", get(list_namespace_configs))
            .route("/api/v1/configs/{namespace}/{name}", get(get_config))
            .with_state(self.state.clone())
    }

    /// Serves until `shutdown` resolves. Open watches are ended as soon as the shutdown starts.
    pub async fn serve(self, listener: TcpListener, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<(), CdsError> {
        if let Ok(address) = listener.local_addr() {
            info!("config distribution service listening on {address}");
        }
        let distributor = self.state.distributor.clone();
        let router = self.router();
        let shutdown = async move {
            shutdown.await;
            distributor.shutdown();
        };
        axum::serve(listener, router).with_graceful_shutdown(shutdown).await.map_err(CdsError::Serve)?;
        self.state.distributor.shutdown();
        info!("config distribution service stopped");
        Ok(())
    }
}

fn unwrap_configs(configs: Vec<Arc<StunnerConfig>>) -> Vec<StunnerConfig> {
    configs.into_iter().map(Arc::unwrap_or_clone).collect()
}

async fn list_configs(State(state): State<AppState>) -> Json<Vec<StunnerConfig>> {
    Json(unwrap_configs(state.distributor.list(None)))
}

async fn list_namespace_configs(State(state): State<AppState>, Path(namespace): Path<String>) -> Json<Vec<StunnerConfig>> {
    Json(unwrap_configs(state.distributor.list(Some(&namespace))))
}

async fn get_config(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    Query(params): Query<WatchParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let key = ResourceKey::namespaced(&name, &namespace);
    if !params.watch {
        return match state.distributor.load(&key) {
            Some(config) => Json(Arc::unwrap_or_clone(config)).into_response(),
            None => (StatusCode::NOT_FOUND, format!("no config for {key}")).into_response(),
        };
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };
    match state.distributor.watch(&key) {
        Ok(subscription) => {
            let ping_interval = state.ping_interval;
            upgrade.on_upgrade(move |socket| stream_configs(socket, subscription, ping_interval))
        },
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

async fn stream_configs(mut socket: WebSocket, mut subscription: Subscription, ping_interval: Duration) {
    let key = subscription.key().clone();
    debug!("dataplane connected for {key}");
    let mut pings = tokio::time::interval(ping_interval);
    pings.tick().await;

    loop {
        tokio::select! {
            config = subscription.recv() => {
                let Some(config) = config else {
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                let json = match serde_json::to_string(config.as_ref()) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("cannot encode config for {key} {e}");
                        continue;
                    },
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            },
            _ = pings.tick() => {
                if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            },
            message = socket.recv() => match message {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {},
            },
        }
    }
    debug!("dataplane disconnected for {key}");
}
