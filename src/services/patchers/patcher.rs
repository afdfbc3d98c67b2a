use async_trait::async_trait;
use kube::{
    api::{Patch, PatchParams},
    Api,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, span, warn, Instrument, Level, Span};

use crate::{common::ResourceKey, status::StatusReconciler, store::StoredKind};

pub enum Operation<S>
where
    S: Serialize,
{
    PatchStatus(PatchContext<S>),
}

pub struct PatchContext<S>
where
    S: Serialize,
{
    pub resource_key: ResourceKey,
    pub status: S,
    pub controller_name: String,
    pub span: Span,
}

/// Applies status patches for one kind with server-side apply, owning only the `status` field.
#[async_trait]
pub trait Patcher<R, S>
where
    R: StoredKind,
    S: Serialize + Send + 'static,
{
    fn receiver(&mut self) -> &mut mpsc::Receiver<Operation<S>>;
    fn api(&self, namespace: &str) -> Api<R>;
    fn reconciler(&self) -> &StatusReconciler;
    fn current_status(&self, key: &ResourceKey) -> Option<S>;

    /// Latest reconciled status of `key`, or the one carried by the operation if none is cached. Operations from
    /// different render workers may arrive out of order.
    fn status_to_apply(&self, key: &ResourceKey, status: S) -> S {
        self.current_status(key).unwrap_or(status)
    }

    async fn start(&mut self) -> crate::Result<()> {
        while let Some(event) = self.receiver().recv().await {
            match event {
                Operation::PatchStatus(PatchContext { resource_key, status, controller_name, span }) => {
                    let span = span!(parent: &span, Level::INFO, "PatcherService", resource = %R::KIND, operation = "PatchStatus", id = %resource_key);
                    let status = self.status_to_apply(&resource_key, status);
                    let patch = serde_json::json!({
                        "apiVersion": R::api_version(&()),
                        "kind": R::kind(&()),
                        "status": status,
                    });
                    let api = self.api(&resource_key.namespace);
                    let patch_params = PatchParams::apply(&controller_name).force();

                    let res = api.patch_status(&resource_key.name, &patch_params, &Patch::Apply(patch)).instrument(span.clone()).await;
                    match res {
                        Ok(_) => span.in_scope(|| {
                            info!("patch status result ok");
                        }),
                        Err(kube::Error::Api(response)) if response.code == 404 => span.in_scope(|| {
                            info!("object is gone, skipping status");
                        }),
                        Err(e) => {
                            span.in_scope(|| {
                                warn!("patch status failed {e:?}");
                            });
                            self.reconciler().invalidate(R::KIND, &resource_key);
                        },
                    }
                },
            }
        }
        crate::Result::<()>::Ok(())
    }
}
