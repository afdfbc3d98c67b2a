//! Legacy delivery of rendered configs as ConfigMaps, for dataplanes that do not talk to the distribution service.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use thiserror::Error;

use crate::{
    common::{ResourceKey, OWNED_BY_LABEL, OWNED_BY_LABEL_VALUE, RELATED_GATEWAY_ANNOTATION},
    stunner_config::StunnerConfig,
};

pub const CONFIG_MAP_DATA_KEY: &str = "stunnerd.conf";

#[derive(Error, Debug)]
pub enum ConfigMapError {
    #[error("config map {0} has no {CONFIG_MAP_DATA_KEY} entry")]
    MissingPayload(String),
    #[error("config map {0} holds an invalid config {1}")]
    InvalidPayload(String, #[source] serde_json::Error),
}

/// ConfigMap named after the Gateway holding its rendered config.
pub fn pack(gateway: &ResourceKey, config: &StunnerConfig) -> Result<ConfigMap, ConfigMapError> {
    let payload = serde_json::to_string(config).map_err(|e| ConfigMapError::InvalidPayload(gateway.to_string(), e))?;
    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(gateway.name.clone()),
            namespace: Some(gateway.namespace.clone()),
            annotations: Some(BTreeMap::from([(RELATED_GATEWAY_ANNOTATION.to_owned(), gateway.to_string())])),
            labels: Some(BTreeMap::from([(OWNED_BY_LABEL.to_owned(), OWNED_BY_LABEL_VALUE.to_owned())])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(CONFIG_MAP_DATA_KEY.to_owned(), payload)])),
        ..Default::default()
    })
}

pub fn unpack(config_map: &ConfigMap) -> Result<StunnerConfig, ConfigMapError> {
    let name = ResourceKey::from_resource(config_map).to_string();
    let payload = config_map
        .data
        .as_ref()
        .and_then(|data| data.get(CONFIG_MAP_DATA_KEY))
        .ok_or_else(|| ConfigMapError::MissingPayload(name.clone()))?;
    serde_json::from_str(payload).map_err(|e| ConfigMapError::InvalidPayload(name, e))
}

/// Whether the ConfigMap was written by this operator.
pub fn is_managed(config_map: &ConfigMap) -> bool {
    config_map.metadata.labels.as_ref().and_then(|labels| labels.get(OWNED_BY_LABEL)).is_some_and(|value| value == OWNED_BY_LABEL_VALUE)
}
