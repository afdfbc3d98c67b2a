#[cfg(test)]
pub mod fixtures;
mod resource_key;

use k8s_openapi::{
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
    chrono::Utc,
};
pub use resource_key::{ResourceKey, ResourceKeyError, DEFAULT_NAMESPACE_NAME};

pub const STUNNER_GROUP_NAME: &str = "stunner.l7mp.io";
pub const GATEWAY_API_GROUP_NAME: &str = "gateway.networking.k8s.io";

pub const RELATED_GATEWAY_ANNOTATION: &str = "stunner.l7mp.io/related-gateway-name";
pub const OWNED_BY_LABEL: &str = "stunner.l7mp.io/owned-by";
pub const OWNED_BY_LABEL_VALUE: &str = "stunner";
pub const SERVICE_TYPE_ANNOTATION: &str = "stunner.l7mp.io/service-type";
pub const MIN_RELAY_PORT_ANNOTATION: &str = "stunner.l7mp.io/min-relay-port";
pub const MAX_RELAY_PORT_ANNOTATION: &str = "stunner.l7mp.io/max-relay-port";
pub const SERVICE_NAME_LABEL: &str = "kubernetes.io/service-name";

pub const DEFAULT_DATAPLANE_NAME: &str = "default";
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";
pub const DEFAULT_CONTROLLER_NAME: &str = "stunner.l7mp.io/gateway-operator";

pub fn create_condition(type_: &str, status: bool, reason: &str, message: &str, observed_generation: Option<i64>) -> Condition {
    Condition {
        last_transition_time: Time(Utc::now()),
        message: message.to_owned(),
        observed_generation,
        reason: reason.to_owned(),
        status: if status { "True".to_owned() } else { "False".to_owned() },
        type_: type_.to_owned(),
    }
}
