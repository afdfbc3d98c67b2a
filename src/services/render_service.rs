use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use futures::future::join_all;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, span, warn, Instrument, Level, Span};
use typed_builder::TypedBuilder;

use super::{
    config_map_writer::ConfigMapUpdate,
    patchers::{Operation, PatchContext},
    render_queue::RenderQueue,
};
use crate::{
    api::{GatewayClassStatus, GatewayStatus, RouteStatus, UDPRoute},
    cds::ConfigDistributor,
    common::ResourceKey,
    renderer::Renderer,
    status::{StatusReconciler, StatusUpdate},
    store::{RenderTarget, StorageError, Store},
    stunner_config::StunnerConfig,
};

/// Renders every Gateway affected by a store change and hands the results to the status patchers and config sinks.
#[derive(TypedBuilder)]
pub struct RenderService {
    store: Store,
    renderer: Renderer,
    reconciler: StatusReconciler,
    #[builder(default)]
    distributor: Option<ConfigDistributor>,
    #[builder(default)]
    config_map_sender: Option<mpsc::Sender<ConfigMapUpdate>>,
    gateway_class_patcher_sender: mpsc::Sender<Operation<GatewayClassStatus>>,
    gateway_patcher_sender: mpsc::Sender<Operation<GatewayStatus>>,
    udp_route_patcher_sender: mpsc::Sender<Operation<RouteStatus>>,
    #[builder(default = 4)]
    workers: usize,
    #[builder(default)]
    queue: RenderQueue<RenderTarget>,
    #[builder(default)]
    published: Mutex<HashSet<ResourceKey>>,
}

impl RenderService {
    pub async fn start(self) -> crate::Result<()> {
        let workers = self.workers.max(1);
        let service = Arc::new(self);
        info!("render service started with {workers} workers");

        let feeder = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.feed().await })
        };
        let workers = (0..workers).map(|id| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.work(id).await })
        });
        let (feeder, workers) = futures::future::join(feeder, join_all(workers)).await;
        feeder?;
        for worker in workers {
            worker?;
        }
        info!("render service stopped");
        Ok(())
    }

    async fn feed(&self) {
        let mut changes = self.store.subscribe();
        self.resync();
        loop {
            match changes.recv().await {
                Ok(targets) => self.queue.extend(targets),
                Err(RecvError::Lagged(missed)) => {
                    warn!("missed {missed} store notifications, rendering everything");
                    self.resync();
                },
                Err(RecvError::Closed) => break,
            }
        }
        self.queue.close();
    }

    fn resync(&self) {
        match self.store.render_targets() {
            Ok(targets) => self.queue.extend(targets),
            Err(e) => warn!("cannot list render targets {e}"),
        }
        let published: Vec<ResourceKey> = self.published.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect();
        self.queue.extend(published.into_iter().map(RenderTarget::Gateway));
    }

    async fn work(&self, id: usize) {
        while let Some(target) = self.queue.next().await {
            let span = span!(Level::INFO, "RenderService", worker = id, id = %target);
            if let Err(e) = self.process(&target).instrument(span.clone()).await {
                span.in_scope(|| warn!("render failed {e}"));
            }
            self.queue.done(&target);
        }
    }

    async fn process(&self, target: &RenderTarget) -> Result<(), StorageError> {
        match target {
            RenderTarget::GatewayClass(key) => self.process_gateway_class(key).await,
            RenderTarget::Gateway(key) => self.process_gateway(key).await,
        }
    }

    async fn process_gateway_class(&self, key: &ResourceKey) -> Result<(), StorageError> {
        let result = {
            let view = self.store.view()?;
            self.renderer.render_gateway_class(&view, key)
        };
        match result {
            Some(result) => {
                let updates = self.reconciler.reconcile(key, &[result]);
                self.send_status(updates).await;
            },
            None => self.reconciler.forget_class(key),
        }
        Ok(())
    }

    async fn process_gateway(&self, key: &ResourceKey) -> Result<(), StorageError> {
        let outcome = {
            let view = self.store.view()?;
            self.renderer.render(&view, key)
        };
        debug!("rendered {} listeners {} clusters", outcome.config.listeners.len(), outcome.config.clusters.len());

        let updates = self.reconciler.reconcile(key, &outcome.results);
        self.send_status(updates).await;

        let previously_published = {
            let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
            if outcome.managed {
                !published.insert(key.clone())
            } else {
                published.remove(key)
            }
        };
        if outcome.managed {
            self.publish(key, outcome.config).await;
        } else if previously_published {
            self.retire(key).await;
        }
        Ok(())
    }

    async fn write_config_map(&self, key: &ResourceKey, config: &StunnerConfig) {
        if let Some(sender) = &self.config_map_sender {
            let update = ConfigMapUpdate { gateway: key.clone(), config: config.clone(), span: Span::current() };
            if sender.send(update).await.is_err() {
                warn!("config map writer is gone");
            }
        }
    }

    async fn publish(&self, key: &ResourceKey, config: StunnerConfig) {
        self.write_config_map(key, &config).await;
        if let Some(distributor) = &self.distributor {
            if let Err(e) = distributor.publish(key, config) {
                warn!("cannot publish config {e}");
            }
        }
    }

    async fn retire(&self, key: &ResourceKey) {
        self.write_config_map(key, &StunnerConfig::empty(&key.to_string())).await;
        if let Some(distributor) = &self.distributor {
            if let Err(e) = distributor.retire(key) {
                warn!("cannot retire config {e}");
            }
        }
    }

    async fn send_status(&self, updates: Vec<StatusUpdate>) {
        let controller_name = self.renderer.context().controller_name.clone();
        for update in updates {
            let kind = update.kind();
            let resource_key = update.key().clone();
            let sent = match update {
                StatusUpdate::GatewayClass { key, status } => self
                    .gateway_class_patcher_sender
                    .send(Operation::PatchStatus(PatchContext { resource_key: key, status, controller_name: controller_name.clone(), span: Span::current() }))
                    .await
                    .is_ok(),
                StatusUpdate::Gateway { key, status } => self
                    .gateway_patcher_sender
                    .send(Operation::PatchStatus(PatchContext { resource_key: key, status, controller_name: controller_name.clone(), span: Span::current() }))
                    .await
                    .is_ok(),
                StatusUpdate::UDPRoute { key, status } => {
                    if self.store.get_resource::<UDPRoute>(&key).ok().flatten().is_none() {
                        debug!("route {key} is gone, skipping status");
                        continue;
                    }
                    self.udp_route_patcher_sender
                        .send(Operation::PatchStatus(PatchContext { resource_key: key, status, controller_name: controller_name.clone(), span: Span::current() }))
                        .await
                        .is_ok()
                },
            };
            if !sent {
                warn!("{kind} patcher is gone, dropping status of {resource_key}");
                self.reconciler.invalidate(kind, &resource_key);
            }
        }
    }

    #[cfg(test)]
    fn published_keys(&self) -> std::collections::BTreeSet<ResourceKey> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner).iter().cloned().collect()
    }
}
