use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION: &str = "v1";
pub const DEFAULT_REALM: &str = "stunner.l7mp.io";
pub const DEFAULT_LOG_LEVEL: &str = "all:INFO";
pub const DEFAULT_HEALTH_CHECK_ENDPOINT: &str = "http://:8086";

/// Complete dataplane configuration rendered for one Gateway.
///
/// Rendered configs are never mutated after the fact, a new render produces a new value. Listeners and clusters are
/// always serialized, an empty list is meaningful to the dataplane.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StunnerConfig {
    pub version: String,
    pub admin: AdminConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
    #[serde(default)]
    pub clusters: Vec<ClusterConfig>,
}

impl StunnerConfig {
    /// Config of a Gateway that does not exist or cannot be rendered.
    pub fn empty(name: &str) -> Self {
        Self { version: CONFIG_VERSION.to_owned(), admin: AdminConfig { name: name.to_owned(), ..Default::default() }, ..Default::default() }
    }

    pub fn name(&self) -> &str {
        &self.admin.name
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub loglevel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_endpoint: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthType {
    #[default]
    #[serde(rename = "static")]
    Static,
    #[serde(rename = "ephemeral")]
    Ephemeral,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<AuthType>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub realm: String,
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub name: String,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_port: Option<i32>,
    pub address: String,
    pub port: i32,
    pub min_relay_port: i32,
    pub max_relay_port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub routes: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterType {
    #[default]
    #[serde(rename = "STATIC")]
    Static,
    #[serde(rename = "STRICT_DNS")]
    StrictDns,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    pub protocol: String,
    #[serde(default)]
    pub endpoints: Vec<String>,
}
