use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use tokio::{net::TcpListener, sync::oneshot};

use super::{CdsClient, CdsError, CdsServer, ConfigDistributor};
use crate::{common::ResourceKey, stunner_config::StunnerConfig};

fn key() -> ResourceKey {
    ResourceKey::namespaced("gateway-1", "stunner")
}

fn config(loglevel: &str) -> StunnerConfig {
    let mut config = StunnerConfig::empty("stunner/gateway-1");
    config.admin.loglevel = loglevel.to_owned();
    config
}

#[tokio::test]
async fn test_watch_starts_with_latest_config() {
    let distributor = ConfigDistributor::new(4);
    distributor.publish(&key(), config("all:INFO")).unwrap();
    distributor.publish(&key(), config("all:DEBUG")).unwrap();

    let mut subscription = distributor.watch(&key()).unwrap();
    assert_eq!(*subscription.recv().await.unwrap(), config("all:DEBUG"));
    assert_eq!(distributor.subscriber_count(&key()), 1);
}

#[tokio::test]
async fn test_watch_before_publish_waits() {
    let distributor = ConfigDistributor::new(4);
    let mut subscription = distributor.watch(&key()).unwrap();
    assert!(tokio::time::timeout(Duration::from_millis(50), subscription.recv()).await.is_err());
    assert!(distributor.load(&key()).is_none());

    distributor.publish(&key(), config("all:INFO")).unwrap();
    assert_eq!(*subscription.recv().await.unwrap(), config("all:INFO"));
}

#[tokio::test]
async fn test_configs_arrive_in_publish_order() {
    let distributor = ConfigDistributor::new(8);
    let mut subscription = distributor.watch(&key()).unwrap();
    let levels = ["all:INFO", "all:DEBUG", "all:WARN", "all:ERROR"];
    for level in levels {
        assert_eq!(distributor.publish(&key(), config(level)).unwrap(), 1);
    }
    for level in levels {
        assert_eq!(subscription.recv().await.unwrap().admin.loglevel, level);
    }
}

#[tokio::test]
async fn test_identical_config_is_not_republished() {
    let distributor = ConfigDistributor::new(4);
    let mut subscription = distributor.watch(&key()).unwrap();
    assert_eq!(distributor.publish(&key(), config("all:INFO")).unwrap(), 1);
    assert_eq!(distributor.publish(&key(), config("all:INFO")).unwrap(), 0);
    subscription.recv().await.unwrap();
    assert!(tokio::time::timeout(Duration::from_millis(50), subscription.recv()).await.is_err());
}

#[tokio::test]
async fn test_slow_subscriber_is_dropped() {
    let distributor = ConfigDistributor::new(2);
    let mut slow = distributor.watch(&key()).unwrap();
    let mut fast = distributor.watch(&key()).unwrap();

    let levels = ["all:INFO", "all:DEBUG", "all:WARN", "all:ERROR"];
    for level in levels {
        distributor.publish(&key(), config(level)).unwrap();
        assert_eq!(fast.recv().await.unwrap().admin.loglevel, level);
    }
    assert_eq!(distributor.subscriber_count(&key()), 1);

    assert_eq!(slow.recv().await.unwrap().admin.loglevel, "all:INFO");
    assert_eq!(slow.recv().await.unwrap().admin.loglevel, "all:DEBUG");
    assert!(slow.recv().await.is_none());

    let mut again = distributor.watch(&key()).unwrap();
    assert_eq!(again.recv().await.unwrap().admin.loglevel, "all:ERROR");
}

#[tokio::test]
async fn test_dropped_subscription_unwatches() {
    let distributor = ConfigDistributor::new(4);
    let other = ResourceKey::namespaced("gateway-2", "stunner");
    let subscription = distributor.watch(&other).unwrap();
    assert_eq!(distributor.subscriber_count(&other), 1);
    assert_eq!(distributor.keys(), vec![other.clone()]);

    drop(subscription);
    assert_eq!(distributor.subscriber_count(&other), 0);
    assert!(distributor.keys().is_empty());
}

#[tokio::test]
async fn test_retired_topic_is_dropped_with_its_last_watcher() {
    let distributor = ConfigDistributor::new(4);
    distributor.publish(&key(), config("all:INFO")).unwrap();
    let mut subscription = distributor.watch(&key()).unwrap();
    assert_eq!(distributor.retire(&key()).unwrap(), 1);

    assert_eq!(*subscription.recv().await.unwrap(), config("all:INFO"));
    assert_eq!(*subscription.recv().await.unwrap(), StunnerConfig::empty("stunner/gateway-1"));
    assert_eq!(distributor.keys(), vec![key()]);

    drop(subscription);
    assert!(distributor.keys().is_empty());
    assert!(distributor.load(&key()).is_none());

    let other = ResourceKey::namespaced("gateway-2", "stunner");
    distributor.publish(&other, StunnerConfig::empty("stunner/gateway-2")).unwrap();
    distributor.retire(&other).unwrap();
    assert!(distributor.keys().is_empty());

    distributor.publish(&key(), config("all:DEBUG")).unwrap();
    let subscription = distributor.watch(&key()).unwrap();
    drop(subscription);
    assert_eq!(distributor.load(&key()).unwrap().admin.loglevel, "all:DEBUG");
}

#[tokio::test]
async fn test_keys_are_independent() {
    let distributor = ConfigDistributor::new(4);
    let other = ResourceKey::namespaced("gateway-2", "other");
    let mut subscription = distributor.watch(&other).unwrap();
    distributor.publish(&key(), config("all:INFO")).unwrap();
    assert!(tokio::time::timeout(Duration::from_millis(50), subscription.recv()).await.is_err());

    distributor.publish(&other, StunnerConfig::empty("other/gateway-2")).unwrap();
    assert_eq!(subscription.recv().await.unwrap().name(), "other/gateway-2");
    assert_eq!(distributor.list(Some("other")).len(), 1);
    assert_eq!(distributor.list(None).iter().map(|config| config.name().to_owned()).collect::<Vec<_>>(), vec!["other/gateway-2", "stunner/gateway-1"]);
}

#[tokio::test]
async fn test_shutdown_ends_subscriptions() {
    let distributor = ConfigDistributor::new(4);
    distributor.publish(&key(), config("all:INFO")).unwrap();
    let mut subscription = distributor.watch(&key()).unwrap();
    distributor.shutdown();
    distributor.shutdown();

    assert!(subscription.recv().await.is_some());
    assert!(subscription.recv().await.is_none());
    assert!(matches!(distributor.publish(&key(), config("all:DEBUG")), Err(CdsError::Closed)));
    assert!(matches!(distributor.watch(&key()), Err(CdsError::Closed)));
}

#[tokio::test]
async fn test_http_load_list_and_watch() {
    let distributor = ConfigDistributor::new(4);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(CdsServer::new(distributor.clone(), Duration::from_millis(100)).serve(listener, async move {
        let _ = stopped.await;
    }));

    let client = CdsClient::new(&format!("http://{address}"), key());
    assert_eq!(client.load().await.unwrap(), None);

    distributor.publish(&key(), config("all:INFO")).unwrap();
    assert_eq!(client.load().await.unwrap(), Some(config("all:INFO")));
    assert_eq!(client.list().await.unwrap(), vec![config("all:INFO")]);

    let mut configs = client.watch();
    let first = tokio::time::timeout(Duration::from_secs(5), configs.next()).await.unwrap().unwrap();
    assert_eq!(first, config("all:INFO"));

    distributor.publish(&key(), config("all:DEBUG")).unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), configs.next()).await.unwrap().unwrap();
    assert_eq!(second, config("all:DEBUG"));

    drop(configs);
    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap().unwrap();
    assert!(distributor.is_closed());
}

#[tokio::test]
async fn test_client_watch_resumes_after_server_restart() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let first = ConfigDistributor::new(4);
    first.publish(&key(), config("all:INFO")).unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(CdsServer::new(first.clone(), Duration::from_millis(100)).serve(listener, async move {
        let _ = stopped.await;
    }));

    let client = CdsClient::new(&format!("http://{address}"), key());
    let mut configs = client.watch();
    assert_eq!(tokio::time::timeout(Duration::from_secs(5), configs.next()).await.unwrap().unwrap(), config("all:INFO"));

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap().unwrap();

    let second = ConfigDistributor::new(4);
    second.publish(&key(), config("all:INFO")).unwrap();
    let listener = TcpListener::bind(address).await.unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(CdsServer::new(second.clone(), Duration::from_millis(100)).serve(listener, async move {
        let _ = stopped.await;
    }));

    tokio::time::timeout(Duration::from_secs(15), async {
        while second.subscriber_count(&key()) == 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();

    // the unchanged config replayed on reconnect is skipped, the next one comes through
    second.publish(&key(), config("all:DEBUG")).unwrap();
    assert_eq!(tokio::time::timeout(Duration::from_secs(5), configs.next()).await.unwrap().unwrap(), config("all:DEBUG"));

    drop(configs);
    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap().unwrap();
}
