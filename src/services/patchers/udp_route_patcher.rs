use kube::{Api, Client};
use tokio::sync::mpsc;
use typed_builder::TypedBuilder;

use super::patcher::{Operation, Patcher};
use crate::{
    api::{RouteStatus, UDPRoute},
    common::ResourceKey,
    status::StatusReconciler,
};

#[derive(TypedBuilder)]
pub struct UDPRoutePatcherService {
    client: Client,
    receiver: mpsc::Receiver<Operation<RouteStatus>>,
    reconciler: StatusReconciler,
}

impl Patcher<UDPRoute, RouteStatus> for UDPRoutePatcherService {
    fn receiver(&mut self) -> &mut mpsc::Receiver<Operation<RouteStatus>> {
        &mut self.receiver
    }

    fn api(&self, namespace: &str) -> Api<UDPRoute> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn reconciler(&self) -> &StatusReconciler {
        &self.reconciler
    }

    fn current_status(&self, key: &ResourceKey) -> Option<RouteStatus> {
        Some(self.reconciler.route_status(key))
    }
}
