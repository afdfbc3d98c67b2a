use pretty_assertions::assert_eq;

use super::{StatusReconciler, StatusUpdate};
use crate::{
    api::RouteStatus,
    common::{fixtures, ResourceKey},
    renderer::{RenderContext, RenderOutcome, Renderer},
    store::{Kind, Store},
};

fn gateway_key() -> ResourceKey {
    ResourceKey::namespaced("gateway-1", "stunner")
}

fn render(store: &Store, key: &ResourceKey) -> RenderOutcome {
    let renderer = Renderer::new(RenderContext::builder().controller_name(fixtures::CONTROLLER_NAME).enable_endpoint_discovery(false).build());
    renderer.render(&store.view().unwrap(), key)
}

fn kinds(updates: &[StatusUpdate]) -> Vec<Kind> {
    updates.iter().map(StatusUpdate::kind).collect()
}

#[test]
pub fn test_unchanged_results_write_nothing() {
    let store = fixtures::base_store();
    let reconciler = StatusReconciler::new(fixtures::CONTROLLER_NAME);
    let outcome = render(&store, &gateway_key());

    let updates = reconciler.reconcile(&gateway_key(), &outcome.results);
    assert_eq!(kinds(&updates), vec![Kind::GatewayClass, Kind::Gateway, Kind::UDPRoute]);
    assert!(reconciler.reconcile(&gateway_key(), &outcome.results).is_empty());

    let again = render(&store, &gateway_key());
    assert!(reconciler.reconcile(&gateway_key(), &again.results).is_empty());
}

#[test]
pub fn test_gateway_status_content() {
    let store = fixtures::base_store();
    let reconciler = StatusReconciler::new(fixtures::CONTROLLER_NAME);
    let updates = reconciler.reconcile(&gateway_key(), &render(&store, &gateway_key()).results);
    let Some(StatusUpdate::Gateway { status, .. }) = updates.iter().find(|update| update.kind() == Kind::Gateway) else {
        panic!("no gateway status");
    };
    let addresses = status.addresses.clone().unwrap();
    assert_eq!(addresses[0].type_.as_deref(), Some("IPAddress"));
    assert_eq!(addresses[0].value, "1.2.3.4");
    let conditions = status.conditions.clone().unwrap();
    assert_eq!(conditions.iter().map(|condition| condition.type_.as_str()).collect::<Vec<_>>(), vec!["Accepted", "Programmed"]);
    let listeners = status.listeners.clone().unwrap();
    assert_eq!(listeners[0].attached_routes, 1);
    assert_eq!(
        listeners[0].conditions.iter().map(|condition| condition.type_.as_str()).collect::<Vec<_>>(),
        vec!["Accepted", "ResolvedRefs", "Conflicted", "Ready"]
    );
    assert_eq!(listeners[0].conditions[2].status, "False");

    let Some(StatusUpdate::UDPRoute { status, .. }) = updates.iter().find(|update| update.kind() == Kind::UDPRoute) else {
        panic!("no route status");
    };
    assert_eq!(status.parents.len(), 1);
    assert_eq!(status.parents[0].controller_name, fixtures::CONTROLLER_NAME);
    assert_eq!(status.parents[0].parent_ref.section_name.as_deref(), Some("udp"));
}

#[test]
pub fn test_detached_route_parent_is_removed() {
    let store = fixtures::base_store();
    let reconciler = StatusReconciler::new(fixtures::CONTROLLER_NAME);
    reconciler.reconcile(&gateway_key(), &render(&store, &gateway_key()).results);

    let mut route = fixtures::udp_route();
    route.spec.parent_refs[0].name = "gateway-2".to_owned();
    store.upsert(route).unwrap();
    let updates = reconciler.reconcile(&gateway_key(), &render(&store, &gateway_key()).results);
    assert_eq!(
        updates.iter().find(|update| update.kind() == Kind::UDPRoute),
        Some(&StatusUpdate::UDPRoute { key: ResourceKey::namespaced("udproute-ok", "stunner"), status: crate::api::RouteStatus { parents: vec![] } })
    );
    assert!(reconciler.reconcile(&gateway_key(), &render(&store, &gateway_key()).results).is_empty());
}

#[test]
pub fn test_route_collects_parents_of_all_gateways() {
    let store = fixtures::base_store();
    let mut gateway_2 = fixtures::gateway();
    gateway_2.metadata.name = Some("gateway-2".to_owned());
    store.upsert(gateway_2).unwrap();
    let mut route = fixtures::udp_route();
    let mut second_parent = route.spec.parent_refs[0].clone();
    second_parent.name = "gateway-2".to_owned();
    route.spec.parent_refs.push(second_parent);
    store.upsert(route).unwrap();

    let reconciler = StatusReconciler::new(fixtures::CONTROLLER_NAME);
    reconciler.reconcile(&gateway_key(), &render(&store, &gateway_key()).results);
    let gateway_2_key = ResourceKey::namespaced("gateway-2", "stunner");
    let updates = reconciler.reconcile(&gateway_2_key, &render(&store, &gateway_2_key).results);
    let Some(StatusUpdate::UDPRoute { status, .. }) = updates.iter().find(|update| update.kind() == Kind::UDPRoute) else {
        panic!("no route status");
    };
    let parents: Vec<_> = status.parents.iter().map(|parent| parent.parent_ref.name.as_str()).collect();
    assert_eq!(parents, vec!["gateway-1", "gateway-2"]);

    store.delete(Kind::Gateway, &gateway_2_key).unwrap();
    let updates = reconciler.reconcile(&gateway_2_key, &render(&store, &gateway_2_key).results);
    let Some(StatusUpdate::UDPRoute { status, .. }) = updates.first() else {
        panic!("no route status");
    };
    assert_eq!(status.parents.len(), 1);
    assert_eq!(status.parents[0].parent_ref.name, "gateway-1");
}

#[test]
pub fn test_invalidate_rewrites_status() {
    let store = fixtures::base_store();
    let reconciler = StatusReconciler::new(fixtures::CONTROLLER_NAME);
    let outcome = render(&store, &gateway_key());
    reconciler.reconcile(&gateway_key(), &outcome.results);

    reconciler.invalidate(Kind::Gateway, &gateway_key());
    reconciler.invalidate(Kind::UDPRoute, &ResourceKey::namespaced("udproute-ok", "stunner"));
    assert_eq!(kinds(&reconciler.reconcile(&gateway_key(), &outcome.results)), vec![Kind::Gateway, Kind::UDPRoute]);

    reconciler.invalidate(Kind::GatewayClass, &ResourceKey::new("gatewayclass-ok"));
    assert_eq!(kinds(&reconciler.reconcile(&gateway_key(), &outcome.results)), vec![Kind::GatewayClass]);
}

#[test]
pub fn test_changed_outcome_is_written() {
    let store = fixtures::base_store();
    let reconciler = StatusReconciler::new(fixtures::CONTROLLER_NAME);
    reconciler.reconcile(&gateway_key(), &render(&store, &gateway_key()).results);

    store.delete(Kind::Service, &ResourceKey::namespaced("testservice-ok", "testnamespace")).unwrap();
    let updates = reconciler.reconcile(&gateway_key(), &render(&store, &gateway_key()).results);
    assert_eq!(kinds(&updates), vec![Kind::UDPRoute]);
    let StatusUpdate::UDPRoute { status, .. } = &updates[0] else {
        panic!("no route status");
    };
    let resolved = status.parents[0].conditions.iter().find(|condition| condition.type_ == "ResolvedRefs").unwrap();
    assert_eq!((resolved.status.as_str(), resolved.reason.as_str()), ("False", "BackendNotFound"));
}

#[test]
pub fn test_route_status_follows_latest_reconcile() {
    let store = fixtures::base_store();
    let mut gateway_2 = fixtures::gateway();
    gateway_2.metadata.name = Some("gateway-2".to_owned());
    store.upsert(gateway_2).unwrap();
    let mut route = fixtures::udp_route();
    let mut second_parent = route.spec.parent_refs[0].clone();
    second_parent.name = "gateway-2".to_owned();
    route.spec.parent_refs.push(second_parent);
    store.upsert(route).unwrap();

    let route_key = ResourceKey::namespaced("udproute-ok", "stunner");
    let gateway_2_key = ResourceKey::namespaced("gateway-2", "stunner");
    let reconciler = StatusReconciler::new(fixtures::CONTROLLER_NAME);
    let first = reconciler.reconcile(&gateway_key(), &render(&store, &gateway_key()).results);
    let second = reconciler.reconcile(&gateway_2_key, &render(&store, &gateway_2_key).results);
    let parent_names = |status: &RouteStatus| status.parents.iter().map(|parent| parent.parent_ref.name.clone()).collect::<Vec<_>>();

    let Some(StatusUpdate::UDPRoute { status: stale, .. }) = first.iter().find(|update| update.kind() == Kind::UDPRoute) else {
        panic!("no route status");
    };
    assert_eq!(parent_names(stale), vec!["gateway-1"]);
    assert!(second.iter().any(|update| update.kind() == Kind::UDPRoute));

    // whichever of the two updates is applied last, the latest status carries both parents
    assert_eq!(parent_names(&reconciler.route_status(&route_key)), vec!["gateway-1", "gateway-2"]);
    assert!(reconciler.reconcile(&gateway_key(), &render(&store, &gateway_key()).results).is_empty());

    store.delete(Kind::UDPRoute, &route_key).unwrap();
    reconciler.reconcile(&gateway_key(), &render(&store, &gateway_key()).results);
    reconciler.reconcile(&gateway_2_key, &render(&store, &gateway_2_key).results);
    assert!(reconciler.route_status(&route_key).parents.is_empty());
}
