use kube::{Api, Client};
use tokio::sync::mpsc;
use typed_builder::TypedBuilder;

use super::patcher::{Operation, Patcher};
use crate::{
    api::{Gateway, GatewayStatus},
    common::ResourceKey,
    status::StatusReconciler,
};

#[derive(TypedBuilder)]
pub struct GatewayPatcherService {
    client: Client,
    receiver: mpsc::Receiver<Operation<GatewayStatus>>,
    reconciler: StatusReconciler,
}

impl Patcher<Gateway, GatewayStatus> for GatewayPatcherService {
    fn receiver(&mut self) -> &mut mpsc::Receiver<Operation<GatewayStatus>> {
        &mut self.receiver
    }

    fn api(&self, namespace: &str) -> Api<Gateway> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn reconciler(&self) -> &StatusReconciler {
        &self.reconciler
    }

    fn current_status(&self, key: &ResourceKey) -> Option<GatewayStatus> {
        self.reconciler.gateway_status(key)
    }
}
