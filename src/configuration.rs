use std::{fmt::Display, net::SocketAddr, time::Duration};

use serde::Deserialize;
use thiserror::Error;
use typed_builder::TypedBuilder;

use crate::{
    cds::DEFAULT_QUEUE_CAPACITY,
    common::{DEFAULT_CLUSTER_DOMAIN, DEFAULT_CONTROLLER_NAME},
    renderer::RenderContext,
    Result,
};

#[derive(Clone, Debug, TypedBuilder, Deserialize)]
pub struct Address {
    pub hostname: String,
    pub port: u16,
}

impl Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(format!("{}:{}", self.hostname, self.port).as_str())
    }
}

impl Address {
    pub fn to_ips(&self) -> Vec<SocketAddr> {
        if let Ok(socket) = self.to_string().parse::<SocketAddr>() {
            vec![socket]
        } else {
            vec![SocketAddr::from(([0, 0, 0, 0], self.port)), SocketAddr::from(([0, 0, 0, 0, 0, 0, 0, 0], self.port))]
        }
    }
}

fn default_ping_interval_secs() -> u64 {
    5
}

fn default_subscriber_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

#[derive(Clone, Debug, TypedBuilder, Deserialize)]
pub struct CdsServerConfiguration {
    pub address: Address,
    #[builder(default = default_ping_interval_secs())]
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    #[builder(default = default_subscriber_queue_capacity())]
    #[serde(default = "default_subscriber_queue_capacity")]
    pub subscriber_queue_capacity: usize,
}

impl CdsServerConfiguration {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

fn default_controller_name() -> String {
    DEFAULT_CONTROLLER_NAME.to_owned()
}

fn default_true() -> bool {
    true
}

fn default_cluster_domain() -> String {
    DEFAULT_CLUSTER_DOMAIN.to_owned()
}

fn default_render_workers() -> usize {
    4
}

#[derive(Debug, TypedBuilder, Deserialize)]
pub struct Configuration {
    #[builder(default = default_controller_name(), setter(into))]
    #[serde(default = "default_controller_name")]
    pub controller_name: String,
    #[builder(default)]
    pub cds_server: Option<CdsServerConfiguration>,
    #[builder(default = true)]
    #[serde(default = "default_true")]
    pub enable_endpoint_discovery: bool,
    #[builder(default)]
    #[serde(default)]
    pub enable_relay_to_cluster_ip: bool,
    #[builder(default = default_cluster_domain(), setter(into))]
    #[serde(default = "default_cluster_domain")]
    pub cluster_domain: String,
    #[builder(default)]
    #[serde(default)]
    pub enable_legacy_config_map: bool,
    #[builder(default = default_render_workers())]
    #[serde(default = "default_render_workers")]
    pub render_workers: usize,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("controller name must be not empty")]
    ControllerName,
    #[error("either the config distribution server or the legacy config map must be enabled")]
    NoSink,
    #[error("subscriber queue capacity must be positive")]
    QueueCapacity,
    #[error("at least one render worker is required")]
    RenderWorkers,
}

impl Configuration {
    pub fn validate(&self) -> Result<()> {
        if self.controller_name.is_empty() {
            return Err(ConfigurationError::ControllerName.into());
        }
        if self.cds_server.is_none() && !self.enable_legacy_config_map {
            return Err(ConfigurationError::NoSink.into());
        }
        if self.cds_server.as_ref().is_some_and(|cds| cds.subscriber_queue_capacity == 0) {
            return Err(ConfigurationError::QueueCapacity.into());
        }
        if self.render_workers == 0 {
            return Err(ConfigurationError::RenderWorkers.into());
        }
        Ok(())
    }

    pub fn render_context(&self) -> RenderContext {
        RenderContext::builder()
            .controller_name(self.controller_name.clone())
            .enable_endpoint_discovery(self.enable_endpoint_discovery)
            .enable_relay_to_cluster_ip(self.enable_relay_to_cluster_ip)
            .cluster_domain(self.cluster_domain.clone())
            .build()
    }
}
