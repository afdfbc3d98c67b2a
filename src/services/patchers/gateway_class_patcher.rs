use kube::{Api, Client};
use tokio::sync::mpsc;
use typed_builder::TypedBuilder;

use super::patcher::{Operation, Patcher};
use crate::{
    api::{GatewayClass, GatewayClassStatus},
    common::ResourceKey,
    status::StatusReconciler,
};

#[derive(TypedBuilder)]
pub struct GatewayClassPatcherService {
    client: Client,
    receiver: mpsc::Receiver<Operation<GatewayClassStatus>>,
    reconciler: StatusReconciler,
}

impl Patcher<GatewayClass, GatewayClassStatus> for GatewayClassPatcherService {
    fn receiver(&mut self) -> &mut mpsc::Receiver<Operation<GatewayClassStatus>> {
        &mut self.receiver
    }

    fn api(&self, _namespace: &str) -> Api<GatewayClass> {
        Api::all(self.client.clone())
    }

    fn reconciler(&self) -> &StatusReconciler {
        &self.reconciler
    }

    fn current_status(&self, key: &ResourceKey) -> Option<GatewayClassStatus> {
        self.reconciler.gateway_class_status(key)
    }
}
