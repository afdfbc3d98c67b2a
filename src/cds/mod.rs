//! Config Distribution Service.
//!
//! Keeps the latest rendered [`StunnerConfig`](crate::stunner_config::StunnerConfig) per Gateway and streams every
//! new one to the dataplanes watching it. Dataplanes identify themselves with the `<namespace>/<name>` key of their
//! Gateway.
//!
//! HTTP surface:
//! - `GET /api/v1/configs` all configs
//! - `GET /api/v1/configs/{namespace}` configs of one namespace
//! - `GET /api/v1/configs/{namespace}/{name}` one config, `404` if unknown
//! - `GET /api/v1/configs/{namespace}/{name}?watch=true` WebSocket stream of JSON configs, the current one first

mod client;
mod http;
mod server;
#[cfg(test)]
mod test;

pub use client::CdsClient;
pub use http::{CdsServer, DEFAULT_PING_INTERVAL};
pub use server::{ConfigDistributor, Subscription, DEFAULT_QUEUE_CAPACITY};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CdsError {
    #[error("config distribution service is shut down")]
    Closed,
    #[error("config distribution server error {0}")]
    Serve(#[source] std::io::Error),
    #[error("http request failed {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected response status {0}")]
    UnexpectedStatus(u16),
    #[error("websocket error {0}")]
    WebSocket(#[from] Box<tokio_tungstenite::tungstenite::Error>),
    #[error("cannot decode config {0}")]
    Decode(#[from] serde_json::Error),
}
