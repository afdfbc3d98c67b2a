use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use thiserror::Error;
use tracing::debug;

use crate::{
    api::GatewayConfig,
    common::ResourceKey,
    store::StoreView,
    stunner_config::{AuthConfig, AuthType, DEFAULT_REALM},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuthError {
    #[error("unknown authentication type {0}")]
    UnknownType(String),
    #[error("auth secret {0} not found")]
    SecretNotFound(ResourceKey),
}

/// Canonical auth type for every accepted spelling.
pub fn normalize_auth_type(auth_type: &str) -> Result<AuthType, AuthError> {
    match auth_type.to_lowercase().as_str() {
        "static" | "plaintext" => Ok(AuthType::Static),
        "ephemeral" | "timewindowed" | "longterm" => Ok(AuthType::Ephemeral),
        _ => Err(AuthError::UnknownType(auth_type.to_owned())),
    }
}

pub fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|value| String::from_utf8_lossy(&value.0).into_owned())
        .or_else(|| secret.string_data.as_ref().and_then(|data| data.get(key)).cloned())
}

/// Auth block of the rendered config.
///
/// An `authRef` Secret wins over the inline fields of the GatewayConfig, which win over the static default. A
/// referenced Secret that is missing or unusable yields an empty block so the dataplane rejects every client.
pub fn resolve_auth(view: &StoreView, config: &GatewayConfig) -> AuthConfig {
    let spec = &config.spec;
    let namespace = config.metadata.namespace.clone().unwrap_or_default();
    let default_realm = spec.realm.clone().unwrap_or_else(|| DEFAULT_REALM.to_owned());

    if let Some(auth_ref) = &spec.auth_ref {
        let key = ResourceKey::referenced(&auth_ref.name, auth_ref.namespace.as_ref(), &namespace);
        return match auth_from_secret(view, &key, default_realm) {
            Ok(auth) => auth,
            Err(e) => {
                debug!("external auth unusable {e}");
                AuthConfig::default()
            },
        };
    }

    let auth_type = match spec.auth_type.as_deref().map(normalize_auth_type).transpose() {
        Ok(auth_type) => auth_type.unwrap_or_default(),
        Err(e) => {
            debug!("inline auth unusable {e}");
            return AuthConfig::default();
        },
    };
    let credentials = match auth_type {
        AuthType::Static => credentials([("username", spec.user_name.clone()), ("password", spec.password.clone())]),
        AuthType::Ephemeral => credentials([("secret", spec.shared_secret.clone())]),
    };
    AuthConfig { auth_type: Some(auth_type), realm: default_realm, credentials }
}

fn auth_from_secret(view: &StoreView, key: &ResourceKey, default_realm: String) -> Result<AuthConfig, AuthError> {
    let secret = view.get::<Secret>(key).ok_or_else(|| AuthError::SecretNotFound(key.clone()))?;
    let auth_type = secret_value(&secret, "type").as_deref().map(normalize_auth_type).transpose()?.unwrap_or_default();
    let credentials = match auth_type {
        AuthType::Static => credentials([("username", secret_value(&secret, "username")), ("password", secret_value(&secret, "password"))]),
        AuthType::Ephemeral => credentials([("secret", secret_value(&secret, "secret"))]),
    };
    Ok(AuthConfig { auth_type: Some(auth_type), realm: secret_value(&secret, "realm").unwrap_or(default_realm), credentials })
}

fn credentials<const N: usize>(values: [(&str, Option<String>); N]) -> BTreeMap<String, String> {
    values.into_iter().filter_map(|(key, value)| value.map(|value| (key.to_owned(), value))).collect()
}
