use std::{collections::BTreeMap, sync::Arc};

use itertools::Itertools;
use k8s_openapi::{
    api::{
        core::v1::{Endpoints, Namespace, Service},
        discovery::v1::EndpointSlice,
    },
    apimachinery::pkg::apis::meta::v1::LabelSelector,
};

use super::{
    listener::ListenerState,
    validation::{ConditionOutcome, ConditionType, Reason, RouteResult},
    RenderContext,
};
use crate::{
    api::{BackendRef, FromNamespaces, ParentReference, StaticService, UDPRoute},
    common::{ResourceKey, GATEWAY_API_GROUP_NAME, SERVICE_NAME_LABEL, STUNNER_GROUP_NAME},
    store::StoreView,
    stunner_config::{ClusterConfig, ClusterType},
};

enum Backend {
    Service(Arc<Service>),
    StaticService(Arc<StaticService>),
}

fn targets_gateway(parent: &ParentReference, route_namespace: &str, gateway_key: &ResourceKey) -> bool {
    parent.group.as_deref().unwrap_or(GATEWAY_API_GROUP_NAME) == GATEWAY_API_GROUP_NAME
        && parent.kind.as_deref().unwrap_or("Gateway") == "Gateway"
        && ResourceKey::referenced(&parent.name, parent.namespace.as_ref(), route_namespace) == *gateway_key
}

fn selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_match = selector.match_labels.iter().flatten().all(|(key, value)| labels.get(key) == Some(value));
    let expressions_match = selector.match_expressions.iter().flatten().all(|expression| {
        let values = expression.values.clone().unwrap_or_default();
        match expression.operator.as_str() {
            "In" => labels.get(&expression.key).is_some_and(|value| values.contains(value)),
            "NotIn" => labels.get(&expression.key).map_or(true, |value| !values.contains(value)),
            "Exists" => labels.contains_key(&expression.key),
            "DoesNotExist" => !labels.contains_key(&expression.key),
            _ => false,
        }
    });
    labels_match && expressions_match
}

/// Namespace attachment policy of a listener.
pub fn namespace_admitted(view: &StoreView, listener: &ListenerState, gateway_namespace: &str, route_namespace: &str) -> bool {
    let namespaces = listener.spec.allowed_routes.as_ref().and_then(|allowed| allowed.namespaces.as_ref());
    match namespaces.map(|namespaces| (namespaces.from, namespaces.selector.as_ref())) {
        None | Some((FromNamespaces::Same, _)) => gateway_namespace == route_namespace,
        Some((FromNamespaces::All, _)) => true,
        Some((FromNamespaces::Selector, None)) => false,
        Some((FromNamespaces::Selector, Some(selector))) => {
            let labels = view.get::<Namespace>(&ResourceKey::new(route_namespace)).and_then(|namespace| namespace.metadata.labels.clone()).unwrap_or_default();
            selector_matches(selector, &labels)
        },
    }
}

fn resolve_backend(view: &StoreView, backend: &BackendRef, route_namespace: &str) -> Result<Backend, ConditionOutcome> {
    let key = ResourceKey::referenced(&backend.name, backend.namespace.as_ref(), route_namespace);
    let not_found = || ConditionOutcome::new(ConditionType::ResolvedRefs, false, Reason::BackendNotFound, format!("backend {key} not found"));
    match (backend.group.as_deref().unwrap_or_default(), backend.kind.as_deref().unwrap_or("Service")) {
        ("", "Service") => view.get::<Service>(&key).map(Backend::Service).ok_or_else(not_found),
        (STUNNER_GROUP_NAME, "StaticService") => view.get::<StaticService>(&key).map(Backend::StaticService).ok_or_else(not_found),
        (group, kind) => Err(ConditionOutcome::new(ConditionType::ResolvedRefs, false, Reason::InvalidKind, format!("unsupported backend kind {group}/{kind}"))),
    }
}

fn service_endpoints(view: &StoreView, context: &RenderContext, service: &Service) -> Vec<String> {
    let namespace = service.metadata.namespace.clone().unwrap_or_default();
    let name = service.metadata.name.clone().unwrap_or_default();
    let slices: Vec<Arc<EndpointSlice>> = view
        .list_namespaced::<EndpointSlice>(&namespace)
        .into_iter()
        .filter(|slice| slice.metadata.labels.as_ref().and_then(|labels| labels.get(SERVICE_NAME_LABEL)) == Some(&name))
        .collect();

    let mut addresses: Vec<String> = if slices.is_empty() {
        view.get::<Endpoints>(&ResourceKey::namespaced(&name, &namespace))
            .map(|endpoints| {
                endpoints
                    .subsets
                    .iter()
                    .flatten()
                    .flat_map(|subset| subset.addresses.iter().flatten())
                    .map(|address| address.ip.clone())
                    .collect()
            })
            .unwrap_or_default()
    } else {
        slices
            .iter()
            .flat_map(|slice| slice.endpoints.iter())
            .filter(|endpoint| endpoint.conditions.as_ref().and_then(|conditions| conditions.ready).unwrap_or(true))
            .flat_map(|endpoint| endpoint.addresses.iter().cloned())
            .collect()
    };

    if context.enable_relay_to_cluster_ip {
        let spec = service.spec.as_ref();
        let cluster_ips = spec.and_then(|spec| spec.cluster_ips.clone()).or_else(|| spec.and_then(|spec| spec.cluster_ip.clone()).map(|ip| vec![ip]));
        addresses.extend(cluster_ips.into_iter().flatten().filter(|ip| !ip.is_empty() && ip != "None"));
    }
    addresses
}

/// Attaches every route pointing at the Gateway and renders the clusters of the accepted ones.
///
/// A cluster is emitted only when its route attached to at least one valid listener.
pub fn render_routes(view: &StoreView, context: &RenderContext, gateway_key: &ResourceKey, listeners: &mut [ListenerState]) -> (Vec<ClusterConfig>, Vec<RouteResult>) {
    let mut clusters = vec![];
    let mut results = vec![];

    for route in view.list::<UDPRoute>() {
        let route_key = ResourceKey::from_resource(route.as_ref());
        let route_namespace = route_key.namespace.clone();
        let route_name = route_key.to_string();
        let parents: Vec<&ParentReference> = route.spec.parent_refs.iter().filter(|parent| targets_gateway(parent, &route_namespace, gateway_key)).unique().collect();
        if parents.is_empty() {
            continue;
        }

        let backends: Vec<Result<Backend, ConditionOutcome>> =
            route.spec.rules.iter().flat_map(|rule| rule.backend_refs.iter()).map(|backend| resolve_backend(view, backend, &route_namespace)).collect();
        let resolved_refs = backends.iter().find_map(|backend| backend.as_ref().err()).cloned().unwrap_or_else(|| {
            ConditionOutcome::new(ConditionType::ResolvedRefs, true, Reason::ResolvedRefs, "all backend references resolved")
        });

        let mut attached = false;
        for parent in parents {
            let candidates: Vec<usize> = listeners
                .iter()
                .enumerate()
                .filter(|(_, listener)| parent.section_name.as_ref().map_or(true, |section| *section == listener.spec.name))
                .filter(|(_, listener)| parent.port.map_or(true, |port| port == listener.spec.port))
                .map(|(index, _)| index)
                .collect();
            let admitted: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|index| listeners[*index].accepts_routes() && namespace_admitted(view, &listeners[*index], &gateway_key.namespace, &route_namespace))
                .collect();

            let accepted = if candidates.is_empty() {
                ConditionOutcome::new(ConditionType::Accepted, false, Reason::NoMatchingParent, "no listener matches the parent reference")
            } else if admitted.is_empty() {
                ConditionOutcome::new(ConditionType::Accepted, false, Reason::NotAllowedByListeners, "route not allowed by any matching listener")
            } else {
                ConditionOutcome::new(ConditionType::Accepted, true, Reason::Accepted, "route accepted")
            };

            for index in admitted {
                let routes = &mut listeners[index].routes;
                if !routes.contains(&route_name) {
                    routes.push(route_name.clone());
                    attached = true;
                }
            }

            results.push(RouteResult {
                key: route_key.clone(),
                generation: route.metadata.generation,
                parent_ref: parent.clone(),
                conditions: vec![accepted, resolved_refs.clone()],
            });
        }

        if attached {
            clusters.push(render_cluster(view, context, route_name, backends));
        }
    }

    clusters.sort_by(|this, other| this.name.cmp(&other.name));
    (clusters, results)
}

fn render_cluster(view: &StoreView, context: &RenderContext, name: String, backends: Vec<Result<Backend, ConditionOutcome>>) -> ClusterConfig {
    let mut cluster_type = ClusterType::Static;
    let mut endpoints = vec![];
    for backend in backends.into_iter().flatten() {
        match backend {
            Backend::Service(service) if context.enable_endpoint_discovery => endpoints.extend(service_endpoints(view, context, &service)),
            Backend::Service(service) => {
                cluster_type = ClusterType::StrictDns;
                let service_name = service.metadata.name.clone().unwrap_or_default();
                let namespace = service.metadata.namespace.clone().unwrap_or_default();
                endpoints.push(format!("{service_name}.{namespace}.svc.{}", context.cluster_domain));
            },
            Backend::StaticService(service) => endpoints.extend(service.spec.prefixes.iter().cloned()),
        }
    }
    endpoints.sort();
    endpoints.dedup();
    ClusterConfig { name, cluster_type, protocol: "udp".to_owned(), endpoints }
}
