use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    api::{Patch, PatchParams},
    Api, Client,
};
use tokio::sync::mpsc;
use tracing::{info, span, warn, Instrument, Level, Span};
use typed_builder::TypedBuilder;

use crate::{common::ResourceKey, configmap, stunner_config::StunnerConfig};

pub struct ConfigMapUpdate {
    pub gateway: ResourceKey,
    pub config: StunnerConfig,
    pub span: Span,
}

/// Writes rendered configs into ConfigMaps for dataplanes that read their config from a mounted volume.
#[derive(TypedBuilder)]
pub struct ConfigMapWriterService {
    client: Client,
    receiver: mpsc::Receiver<ConfigMapUpdate>,
    #[builder(setter(into))]
    controller_name: String,
}

impl ConfigMapWriterService {
    pub async fn start(mut self) -> crate::Result<()> {
        while let Some(ConfigMapUpdate { gateway, config, span }) = self.receiver.recv().await {
            let span = span!(parent: &span, Level::INFO, "ConfigMapWriterService", id = %gateway);
            let config_map = match configmap::pack(&gateway, &config) {
                Ok(config_map) => config_map,
                Err(e) => {
                    span.in_scope(|| warn!("cannot pack config {e}"));
                    continue;
                },
            };
            let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &gateway.namespace);
            let patch_params = PatchParams::apply(&self.controller_name).force();
            let res = api.patch(&gateway.name, &patch_params, &Patch::Apply(&config_map)).instrument(span.clone()).await;
            match res {
                Ok(_) => span.in_scope(|| info!("config map written")),
                Err(e) => span.in_scope(|| warn!("config map write failed {e:?}")),
            }
        }
        Ok(())
    }
}
