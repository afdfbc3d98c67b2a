use std::sync::Arc;

use k8s_openapi::api::core::v1::{Node, Service, ServicePort};

use super::listener::{ListenerState, Protocol};
use crate::{
    api::Gateway,
    common::{ResourceKey, RELATED_GATEWAY_ANNOTATION, SERVICE_TYPE_ANNOTATION},
    store::StoreView,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicAddress {
    pub address: String,
    pub port: i32,
}

/// Whether listeners of this Gateway need a public address at all.
pub fn address_required(gateway: &Gateway) -> bool {
    gateway.metadata.annotations.as_ref().and_then(|annotations| annotations.get(SERVICE_TYPE_ANNOTATION)).map_or(true, |service_type| service_type != "ClusterIP")
}

fn related_service(view: &StoreView, gateway_key: &ResourceKey) -> Option<Arc<Service>> {
    let related = gateway_key.to_string();
    view.list_namespaced::<Service>(&gateway_key.namespace)
        .into_iter()
        .find(|service| service.metadata.annotations.as_ref().and_then(|annotations| annotations.get(RELATED_GATEWAY_ANNOTATION)) == Some(&related))
}

fn service_port<'a>(service: &'a Service, listener: &ListenerState, protocol: Protocol) -> Option<&'a ServicePort> {
    let transport = if protocol.is_udp_family() { "UDP" } else { "TCP" };
    service
        .spec
        .as_ref()?
        .ports
        .iter()
        .flatten()
        .find(|port| port.port == listener.spec.port && port.protocol.as_deref().unwrap_or("TCP").eq_ignore_ascii_case(transport))
}

/// External address of the lexicographically first Node that has one.
fn node_address(view: &StoreView) -> Option<String> {
    view.list::<Node>().iter().find_map(|node| {
        node.status
            .as_ref()
            .and_then(|status| status.addresses.as_ref())
            .and_then(|addresses| addresses.iter().find(|address| address.type_ == "ExternalIP"))
            .map(|address| address.address.clone())
    })
}

/// Public address of a listener.
///
/// An address on the Gateway spec wins, then the LoadBalancer ingress of the Service exposing the Gateway, then a
/// Node external address with the NodePort of the Service.
pub fn resolve_public_address(view: &StoreView, gateway: &Gateway, gateway_key: &ResourceKey, listener: &ListenerState) -> Option<PublicAddress> {
    let protocol = listener.protocol?;
    if let Some(address) = gateway.spec.addresses.iter().find(|address| !address.value.is_empty()) {
        return Some(PublicAddress { address: address.value.clone(), port: listener.spec.port });
    }

    let service = related_service(view, gateway_key)?;
    let port = service_port(&service, listener, protocol);
    let ingress = service
        .status
        .as_ref()
        .and_then(|status| status.load_balancer.as_ref())
        .and_then(|load_balancer| load_balancer.ingress.as_ref())
        .and_then(|ingress| ingress.iter().find_map(|ingress| ingress.ip.clone().or_else(|| ingress.hostname.clone())));
    if let Some(address) = ingress {
        return Some(PublicAddress { address, port: port.map_or(listener.spec.port, |port| port.port) });
    }

    let service_type = service.spec.as_ref().and_then(|spec| spec.type_.as_deref()).unwrap_or("ClusterIP");
    if matches!(service_type, "NodePort" | "LoadBalancer") {
        let node_port = port.and_then(|port| port.node_port)?;
        return node_address(view).map(|address| PublicAddress { address, port: node_port });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        common::fixtures,
        renderer::listener::{validate_listener, RelayRange},
    };

    fn udp_listener(view: &StoreView) -> ListenerState {
        validate_listener(view, "stunner", &fixtures::gateway().spec.listeners[0], RelayRange { min: 1, max: 2 })
    }

    #[test]
    pub fn test_spec_address_wins() {
        let store = fixtures::base_store();
        store.upsert(fixtures::load_balancer_service()).unwrap();
        let view = store.view().unwrap();
        let key = ResourceKey::namespaced("gateway-1", "stunner");
        let address = resolve_public_address(&view, &fixtures::gateway(), &key, &udp_listener(&view));
        assert_eq!(address, Some(PublicAddress { address: "1.2.3.4".to_owned(), port: 1 }));
    }

    #[test]
    pub fn test_load_balancer_then_node_port() {
        let store = fixtures::base_store();
        let mut gateway = fixtures::gateway();
        gateway.spec.addresses.clear();
        let key = ResourceKey::namespaced("gateway-1", "stunner");
        let view = store.view().unwrap();
        assert_eq!(resolve_public_address(&view, &gateway, &key, &udp_listener(&view)), None);
        drop(view);

        store.upsert(fixtures::load_balancer_service()).unwrap();
        let view = store.view().unwrap();
        assert_eq!(resolve_public_address(&view, &gateway, &key, &udp_listener(&view)), Some(PublicAddress { address: "5.6.7.8".to_owned(), port: 1 }));
        drop(view);

        let mut service = fixtures::load_balancer_service();
        service.status = None;
        store.upsert(service).unwrap();
        let view = store.view().unwrap();
        assert_eq!(resolve_public_address(&view, &gateway, &key, &udp_listener(&view)), None);
        drop(view);

        store.upsert(fixtures::node("node-b", "9.9.9.2")).unwrap();
        store.upsert(fixtures::node("node-a", "9.9.9.1")).unwrap();
        let view = store.view().unwrap();
        assert_eq!(resolve_public_address(&view, &gateway, &key, &udp_listener(&view)), Some(PublicAddress { address: "9.9.9.1".to_owned(), port: 30001 }));
    }

    #[test]
    pub fn test_cluster_ip_gateway_needs_no_address() {
        let mut gateway = fixtures::gateway();
        assert!(address_required(&gateway));
        gateway.metadata.annotations.get_or_insert_with(Default::default).insert(SERVICE_TYPE_ANNOTATION.to_owned(), "ClusterIP".to_owned());
        assert!(!address_required(&gateway));
    }
}
