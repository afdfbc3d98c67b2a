use std::{fmt::Display, str::FromStr};

use kube::{Resource, ResourceExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_NAMESPACE_NAME: &str = "default";

/// Namespace and name of a watched object. Cluster scoped objects carry an empty namespace.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResourceKeyError {
    #[error("key {0} is not of the form <namespace>/<name>")]
    Malformed(String),
}

impl ResourceKey {
    pub fn new(name: &str) -> Self {
        Self { namespace: String::new(), name: name.to_owned() }
    }

    pub fn namespaced(name: &str, namespace: &str) -> Self {
        Self { namespace: namespace.to_owned(), name: name.to_owned() }
    }

    pub fn from_resource<R: Resource>(resource: &R) -> Self {
        Self { namespace: resource.namespace().unwrap_or_default(), name: resource.name_any() }
    }

    /// Key of an object referenced from `origin_namespace` with an optional explicit namespace.
    pub fn referenced(name: &str, namespace: Option<&String>, origin_namespace: &str) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).cloned().unwrap_or_else(|| origin_namespace.to_owned()),
            name: name.to_owned(),
        }
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

impl FromStr for ResourceKey {
    type Err = ResourceKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((namespace, name)) if !namespace.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::namespaced(name, namespace))
            },
            _ => Err(ResourceKeyError::Malformed(s.to_owned())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display_and_parse() {
        let key = ResourceKey::namespaced("gateway", "stunner");
        assert_eq!(key.to_string(), "stunner/gateway");
        assert_eq!("stunner/gateway".parse::<ResourceKey>(), Ok(key));
        assert_eq!(ResourceKey::new("udp-class").to_string(), "udp-class");
        assert!("gateway".parse::<ResourceKey>().is_err());
        assert!("a/b/c".parse::<ResourceKey>().is_err());
        assert!("/b".parse::<ResourceKey>().is_err());
    }

    #[test]
    fn test_referenced_defaults_to_origin_namespace() {
        assert_eq!(ResourceKey::referenced("svc", None, "ns1"), ResourceKey::namespaced("svc", "ns1"));
        assert_eq!(ResourceKey::referenced("svc", Some(&"ns2".to_owned()), "ns1"), ResourceKey::namespaced("svc", "ns2"));
        assert_eq!(ResourceKey::referenced("svc", Some(&String::new()), "ns1"), ResourceKey::namespaced("svc", "ns1"));
    }
}
