mod conditions;
#[cfg(test)]
mod test;

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    net::IpAddr,
    sync::{Arc, Mutex, PoisonError},
};

use tracing::debug;

use self::conditions::{preserve_transition_times, same_conditions, to_conditions};
use crate::{
    api::{GatewayAddress, GatewayClassStatus, GatewayStatus, ListenerStatus, ParentReference, RouteParentStatus, RouteStatus},
    common::ResourceKey,
    renderer::{GatewayClassResult, GatewayResult, RouteResult, ValidationResult},
    store::Kind,
};

/// Status that differs from what was last written and must be patched.
#[derive(Clone, Debug, PartialEq)]
pub enum StatusUpdate {
    GatewayClass { key: ResourceKey, status: GatewayClassStatus },
    Gateway { key: ResourceKey, status: GatewayStatus },
    UDPRoute { key: ResourceKey, status: RouteStatus },
}

impl StatusUpdate {
    pub fn kind(&self) -> Kind {
        match self {
            StatusUpdate::GatewayClass { .. } => Kind::GatewayClass,
            StatusUpdate::Gateway { .. } => Kind::Gateway,
            StatusUpdate::UDPRoute { .. } => Kind::UDPRoute,
        }
    }

    pub fn key(&self) -> &ResourceKey {
        match self {
            StatusUpdate::GatewayClass { key, .. } | StatusUpdate::Gateway { key, .. } | StatusUpdate::UDPRoute { key, .. } => key,
        }
    }
}

#[derive(Debug, Default)]
struct RouteEntry {
    parents: BTreeMap<ParentReference, RouteParentStatus>,
    published: Option<RouteStatus>,
}

#[derive(Debug, Default)]
struct Cache {
    classes: HashMap<ResourceKey, GatewayClassStatus>,
    gateways: HashMap<ResourceKey, GatewayStatus>,
    routes: HashMap<ResourceKey, RouteEntry>,
    route_parents_by_gateway: HashMap<ResourceKey, BTreeSet<(ResourceKey, ParentReference)>>,
}

/// Derives Gateway API statuses from validation results and reports only the ones that changed.
///
/// Route statuses collect the parents reported by every Gateway render, a parent disappears when the Gateway that
/// reported it stops doing so.
#[derive(Clone, Debug)]
pub struct StatusReconciler {
    controller_name: String,
    cache: Arc<Mutex<Cache>>,
}

impl StatusReconciler {
    pub fn new(controller_name: &str) -> Self {
        Self { controller_name: controller_name.to_owned(), cache: Arc::new(Mutex::new(Cache::default())) }
    }

    /// Reconciles the results of one render, `source` is the rendered Gateway or the validated GatewayClass.
    pub fn reconcile(&self, source: &ResourceKey, results: &[ValidationResult]) -> Vec<StatusUpdate> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updates = vec![];
        let mut gateway_reported = false;
        let mut route_results = vec![];

        for result in results {
            match result {
                ValidationResult::GatewayClass(result) => updates.extend(Self::reconcile_class(&mut cache, result)),
                ValidationResult::Gateway(result) => {
                    gateway_reported |= result.key == *source;
                    updates.extend(Self::reconcile_gateway(&mut cache, result));
                },
                ValidationResult::Route(result) => route_results.push(result),
            }
        }

        if !gateway_reported {
            cache.gateways.remove(source);
        }
        updates.extend(self.reconcile_routes(&mut cache, source, &route_results));
        debug!("{source} status updates {}", updates.len());
        updates
    }

    fn reconcile_class(cache: &mut Cache, result: &GatewayClassResult) -> Option<StatusUpdate> {
        let mut conditions = to_conditions([&result.accepted], result.generation);
        let previous = cache.classes.get(&result.key).and_then(|status| status.conditions.clone()).unwrap_or_default();
        if cache.classes.contains_key(&result.key) && same_conditions(&conditions, &previous) {
            return None;
        }
        preserve_transition_times(&mut conditions, &previous);
        let status = GatewayClassStatus { conditions: Some(conditions) };
        cache.classes.insert(result.key.clone(), status.clone());
        Some(StatusUpdate::GatewayClass { key: result.key.clone(), status })
    }

    fn reconcile_gateway(cache: &mut Cache, result: &GatewayResult) -> Option<StatusUpdate> {
        let previous = cache.gateways.get(&result.key);
        let previous_conditions = previous.and_then(|status| status.conditions.clone()).unwrap_or_default();
        let previous_listeners = previous.and_then(|status| status.listeners.clone()).unwrap_or_default();

        let mut conditions = to_conditions(&result.conditions, result.generation);
        preserve_transition_times(&mut conditions, &previous_conditions);
        let listeners: Vec<ListenerStatus> = result
            .listeners
            .iter()
            .map(|listener| {
                let mut conditions = to_conditions(&listener.conditions, result.generation);
                if let Some(old) = previous_listeners.iter().find(|old| old.name == listener.name) {
                    preserve_transition_times(&mut conditions, &old.conditions);
                }
                ListenerStatus {
                    name: listener.name.clone(),
                    supported_kinds: listener.supported_kinds.clone(),
                    attached_routes: listener.attached_routes,
                    conditions,
                }
            })
            .collect();
        let addresses: Vec<GatewayAddress> = result
            .addresses
            .iter()
            .map(|address| GatewayAddress {
                type_: Some(if address.parse::<IpAddr>().is_ok() { "IPAddress" } else { "Hostname" }.to_owned()),
                value: address.clone(),
            })
            .collect();

        let status = GatewayStatus { addresses: Some(addresses), conditions: Some(conditions), listeners: Some(listeners) };
        if previous.is_some_and(|previous| same_gateway_status(previous, &status)) {
            return None;
        }
        cache.gateways.insert(result.key.clone(), status.clone());
        Some(StatusUpdate::Gateway { key: result.key.clone(), status })
    }

    fn reconcile_routes(&self, cache: &mut Cache, source: &ResourceKey, results: &[&RouteResult]) -> Vec<StatusUpdate> {
        let reported: BTreeSet<(ResourceKey, ParentReference)> = results.iter().map(|result| (result.key.clone(), result.parent_ref.clone())).collect();
        let previously = if reported.is_empty() {
            cache.route_parents_by_gateway.remove(source).unwrap_or_default()
        } else {
            cache.route_parents_by_gateway.insert(source.clone(), reported.clone()).unwrap_or_default()
        };

        let mut touched = BTreeSet::new();
        for (route, parent) in previously.difference(&reported) {
            if let Some(entry) = cache.routes.get_mut(route) {
                entry.parents.remove(parent);
            }
            touched.insert(route.clone());
        }
        for result in results {
            let entry = cache.routes.entry(result.key.clone()).or_default();
            let mut conditions = to_conditions(&result.conditions, result.generation);
            if let Some(old) = entry.parents.get(&result.parent_ref) {
                preserve_transition_times(&mut conditions, &old.conditions);
            }
            entry.parents.insert(
                result.parent_ref.clone(),
                RouteParentStatus { parent_ref: result.parent_ref.clone(), controller_name: self.controller_name.clone(), conditions },
            );
            touched.insert(result.key.clone());
        }

        let mut updates = vec![];
        for route in touched {
            let Some(entry) = cache.routes.get_mut(&route) else {
                continue;
            };
            let status = RouteStatus { parents: entry.parents.values().cloned().collect() };
            let unchanged = entry.published.as_ref().is_some_and(|published| same_route_status(published, &status));
            if !unchanged {
                entry.published = Some(status.clone());
                updates.push(StatusUpdate::UDPRoute { key: route.clone(), status });
            }
            if entry.parents.is_empty() {
                cache.routes.remove(&route);
            }
        }
        updates
    }

    pub fn gateway_class_status(&self, key: &ResourceKey) -> Option<GatewayClassStatus> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).classes.get(key).cloned()
    }

    pub fn gateway_status(&self, key: &ResourceKey) -> Option<GatewayStatus> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).gateways.get(key).cloned()
    }

    /// Parents reported for a route by every Gateway reconciled so far, empty once none reports it.
    pub fn route_status(&self, key: &ResourceKey) -> RouteStatus {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let parents = cache.routes.get(key).map(|entry| entry.parents.values().cloned().collect()).unwrap_or_default();
        RouteStatus { parents }
    }

    /// Forgets what was written for an object so that the next render writes it again.
    pub fn invalidate(&self, kind: Kind, key: &ResourceKey) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match kind {
            Kind::GatewayClass => {
                cache.classes.remove(key);
            },
            Kind::Gateway => {
                cache.gateways.remove(key);
            },
            Kind::UDPRoute => {
                if let Some(entry) = cache.routes.get_mut(key) {
                    entry.published = None;
                }
            },
            _ => {},
        }
    }

    /// Drops everything known about a deleted GatewayClass.
    pub fn forget_class(&self, key: &ResourceKey) {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).classes.remove(key);
    }
}

fn same_gateway_status(this: &GatewayStatus, other: &GatewayStatus) -> bool {
    let listeners_match = match (&this.listeners, &other.listeners) {
        (Some(this), Some(other)) => {
            this.len() == other.len()
                && this.iter().zip(other).all(|(this, other)| {
                    this.name == other.name
                        && this.supported_kinds == other.supported_kinds
                        && this.attached_routes == other.attached_routes
                        && same_conditions(&this.conditions, &other.conditions)
                })
        },
        (this, other) => this == other,
    };
    this.addresses == other.addresses
        && same_conditions(this.conditions.as_deref().unwrap_or_default(), other.conditions.as_deref().unwrap_or_default())
        && listeners_match
}

fn same_route_status(this: &RouteStatus, other: &RouteStatus) -> bool {
    this.parents.len() == other.parents.len()
        && this.parents.iter().zip(&other.parents).all(|(this, other)| {
            this.parent_ref == other.parent_ref && this.controller_name == other.controller_name && same_conditions(&this.conditions, &other.conditions)
        })
}
