pub mod api;
pub mod cds;
pub mod common;
pub mod configmap;
pub mod configuration;
mod controllers;
pub mod renderer;
mod services;
pub mod status;
pub mod store;
pub mod stunner_config;

use cds::{CdsServer, ConfigDistributor};
use configuration::Configuration;
use controllers::StoreWatchers;
use futures::{future::BoxFuture, FutureExt};
use kube::Client;
use renderer::Renderer;
use services::{ConfigMapWriterService, GatewayClassPatcherService, GatewayPatcherService, Patcher, RenderService, UDPRoutePatcherService};
use status::StatusReconciler;
use store::Store;
use tokio::{net::TcpListener, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

/// Runs `service` until it ends or `shutdown` is cancelled. A failing service cancels `shutdown` for the others.
async fn until_shutdown(shutdown: CancellationToken, service: BoxFuture<'static, Result<()>>) -> Result<()> {
    let result = tokio::select! {
        result = service => result,
        () = shutdown.cancelled() => Ok(()),
    };
    if let Err(e) = &result {
        warn!("service failed {e}, shutting down");
        shutdown.cancel();
    }
    result
}

pub async fn start(configuration: Configuration) -> Result<()> {
    info!("STUNner gateway operator started");
    let client = Client::try_default().await?;
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
            }
            shutdown.cancel();
        });
    }
    let store = Store::new();
    let reconciler = StatusReconciler::new(&configuration.controller_name);

    let (gateway_class_patcher_channel_sender, gateway_class_patcher_channel_receiver) = mpsc::channel(1024);
    let (gateway_patcher_channel_sender, gateway_patcher_channel_receiver) = mpsc::channel(1024);
    let (udp_route_patcher_channel_sender, udp_route_patcher_channel_receiver) = mpsc::channel(1024);

    let mut gateway_class_patcher_service = GatewayClassPatcherService::builder()
        .client(client.clone())
        .receiver(gateway_class_patcher_channel_receiver)
        .reconciler(reconciler.clone())
        .build();
    let mut gateway_patcher_service =
        GatewayPatcherService::builder().client(client.clone()).receiver(gateway_patcher_channel_receiver).reconciler(reconciler.clone()).build();
    let mut udp_route_patcher_service =
        UDPRoutePatcherService::builder().client(client.clone()).receiver(udp_route_patcher_channel_receiver).reconciler(reconciler.clone()).build();

    let distributor = configuration
        .cds_server
        .as_ref()
        .map(|cds_server| ConfigDistributor::new(cds_server.subscriber_queue_capacity));

    let mut services = vec![];
    let config_map_sender = if configuration.enable_legacy_config_map {
        let (config_map_channel_sender, config_map_channel_receiver) = mpsc::channel(1024);
        let config_map_writer_service = ConfigMapWriterService::builder()
            .client(client.clone())
            .receiver(config_map_channel_receiver)
            .controller_name(configuration.controller_name.clone())
            .build();
        services.push(until_shutdown(shutdown.clone(), config_map_writer_service.start().boxed()).boxed());
        Some(config_map_channel_sender)
    } else {
        None
    };

    if let (Some(cds_server), Some(distributor)) = (&configuration.cds_server, &distributor) {
        let listener = TcpListener::bind(&cds_server.address.to_ips()[..]).await?;
        let server = CdsServer::new(distributor.clone(), cds_server.ping_interval());
        let shutdown = shutdown.clone();
        services.push(
            async move {
                let result = server.serve(listener, shutdown.clone().cancelled_owned()).await;
                if result.is_err() {
                    shutdown.cancel();
                }
                result?;
                crate::Result::<()>::Ok(())
            }
            .boxed(),
        );
    }

    let render_service = RenderService::builder()
        .store(store.clone())
        .renderer(Renderer::new(configuration.render_context()))
        .reconciler(reconciler)
        .distributor(distributor)
        .config_map_sender(config_map_sender)
        .gateway_class_patcher_sender(gateway_class_patcher_channel_sender)
        .gateway_patcher_sender(gateway_patcher_channel_sender)
        .udp_route_patcher_sender(udp_route_patcher_channel_sender)
        .workers(configuration.render_workers)
        .build();
    let store_watchers = StoreWatchers::builder().client(client).store(store).build();

    let gateway_class_patcher_service = async move { gateway_class_patcher_service.start().await }.boxed();
    let gateway_patcher_service = async move { gateway_patcher_service.start().await }.boxed();
    let udp_route_patcher_service = async move { udp_route_patcher_service.start().await }.boxed();

    services.extend(
        [gateway_class_patcher_service, gateway_patcher_service, udp_route_patcher_service, render_service.start().boxed(), store_watchers.start().boxed()]
            .into_iter()
            .map(|service| until_shutdown(shutdown.clone(), service).boxed()),
    );

    let results = futures::future::join_all(services).await;
    for result in results {
        result?;
    }
    info!("STUNner gateway operator stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_cancelled_shutdown_stops_pending_services() {
        let shutdown = CancellationToken::new();
        let services: Vec<_> = (0..3).map(|_| until_shutdown(shutdown.clone(), futures::future::pending().boxed())).collect();
        let running = tokio::spawn(futures::future::join_all(services));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!running.is_finished());

        shutdown.cancel();
        let results = tokio::time::timeout(Duration::from_secs(1), running).await.unwrap().unwrap();
        assert!(results.iter().all(std::result::Result::is_ok));
    }

    #[tokio::test]
    async fn test_failing_service_stops_the_others() {
        let shutdown = CancellationToken::new();
        let failing = until_shutdown(shutdown.clone(), async { Err::<(), Error>("watcher failed".into()) }.boxed());
        let pending = until_shutdown(shutdown.clone(), futures::future::pending().boxed());
        let results = tokio::time::timeout(Duration::from_secs(1), futures::future::join_all([failing.boxed(), pending.boxed()])).await.unwrap();
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
        assert!(shutdown.is_cancelled());
    }
}
