use std::time::Duration;

use futures::StreamExt;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use super::CdsError;
use crate::{common::ResourceKey, stunner_config::StunnerConfig};

const MIN_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Dataplane side of the Config Distribution Service.
#[derive(Clone, Debug)]
pub struct CdsClient {
    base_url: String,
    key: ResourceKey,
    http: reqwest::Client,
}

impl CdsClient {
    /// `base_url` is of the form `http://host:port`.
    pub fn new(base_url: &str, key: ResourceKey) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_owned(), key, http: reqwest::Client::new() }
    }

    fn config_url(&self) -> String {
        format!("{}/api/v1/configs/{}/{}", self.base_url, self.key.namespace, self.key.name)
    }

    fn watch_url(&self) -> String {
        let url = self.config_url();
        let url = if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            url
        };
        format!("{url}?watch=true")
    }

    /// Current config of the Gateway, `None` if the server has none.
    pub async fn load(&self) -> Result<Option<StunnerConfig>, CdsError> {
        let response = self.http.get(self.config_url()).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(CdsError::UnexpectedStatus(status.as_u16())),
        }
    }

    /// Every config the server holds.
    pub async fn list(&self) -> Result<Vec<StunnerConfig>, CdsError> {
        let response = self.http.get(format!("{}/api/v1/configs", self.base_url)).send().await?;
        if !response.status().is_success() {
            return Err(CdsError::UnexpectedStatus(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }

    /// Stream of configs that reconnects with exponential backoff and skips repeated configs.
    ///
    /// The background task stops once the returned stream is dropped.
    pub fn watch(&self) -> ReceiverStream<StunnerConfig> {
        let (sender, receiver) = mpsc::channel(1);
        let url = self.watch_url();
        let key = self.key.clone();
        tokio::spawn(async move {
            let mut last: Option<StunnerConfig> = None;
            let mut backoff = MIN_BACKOFF;
            while !sender.is_closed() {
                match watch_once(&url, &sender, &mut last, &mut backoff).await {
                    Ok(()) => debug!("config stream for {key} ended"),
                    Err(e) => warn!("config stream for {key} failed {e}"),
                }
                if sender.is_closed() {
                    break;
                }
                tokio::select! {
                    () = tokio::time::sleep(backoff) => {},
                    () = sender.closed() => break,
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
            debug!("stopped watching {key}");
        });
        ReceiverStream::new(receiver)
    }
}

async fn watch_once(url: &str, sender: &mpsc::Sender<StunnerConfig>, last: &mut Option<StunnerConfig>, backoff: &mut Duration) -> Result<(), CdsError> {
    let (mut socket, _) = connect_async(url).await.map_err(Box::new)?;
    *backoff = MIN_BACKOFF;
    loop {
        let message = tokio::select! {
            message = socket.next() => message,
            () = sender.closed() => return Ok(()),
        };
        let text = match message {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => return Ok(()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(Box::new(e).into()),
        };
        let config: StunnerConfig = serde_json::from_str(text.as_str())?;
        if last.as_ref() == Some(&config) {
            continue;
        }
        *last = Some(config.clone());
        if sender.send(config).await.is_err() {
            return Ok(());
        }
    }
}
