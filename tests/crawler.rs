use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;

use peer_atlas::{
    crawl::{Crawler, GeoProvider, LivenessProbe, NodeRpc, Peer, RpcClientFactory},
    error::AppError,
    models::{GeoResponse, Location, Node, NodeInfo, NodeInfoOther, PeerInfo},
    storage::{MemoryStorage, NodeFilter, Storage},
    utils::parse_hostname,
    CrawlerConfig,
};

const NETWORK: &str = "cosmoshub-4";

/// Reachable when the dialed P2P address is in the set
struct FakeProber(HashSet<String>);

#[async_trait]
impl LivenessProbe for FakeProber {
    async fn is_reachable(&self, address: &str, _timeout: Duration) -> bool {
        self.0.contains(address)
    }
}

/// Scripted RPC answers of one node. `None` makes the call fail.
#[derive(Clone, Default)]
struct Script {
    status: Option<NodeInfo>,
    net_info: Option<Vec<PeerInfo>>,
}

#[derive(Default)]
struct FakeRpcFactory(HashMap<String, Script>);

struct FakeRpc(Script);

impl RpcClientFactory for FakeRpcFactory {
    fn connect(&self, rpc_addr: &str, _timeout: Duration) -> Result<Box<dyn NodeRpc>, AppError> {
        let host = parse_hostname(rpc_addr)
            .ok_or_else(|| AppError::InvalidAddress(rpc_addr.to_string()))?;
        let script = self.0.get(&host).cloned().unwrap_or_default();
        Ok(Box::new(FakeRpc(script)))
    }
}

#[async_trait]
impl NodeRpc for FakeRpc {
    async fn status(&self) -> Result<NodeInfo, AppError> {
        self.0
            .status
            .clone()
            .ok_or_else(|| AppError::RpcError("status unavailable".to_string()))
    }

    async fn net_info(&self) -> Result<Vec<PeerInfo>, AppError> {
        self.0
            .net_info
            .clone()
            .ok_or_else(|| AppError::RpcError("net_info unavailable".to_string()))
    }
}

struct FakeGeo;

#[async_trait]
impl GeoProvider for FakeGeo {
    async fn check(&self, _address: &str) -> Result<GeoResponse, AppError> {
        Ok(GeoResponse {
            country: "Germany".to_string(),
            region: "Hesse".to_string(),
            city: "Frankfurt am Main".to_string(),
            latitude: 50.1109,
            longitude: 8.6821,
        })
    }
}

fn rpc(ip: &str) -> String {
    format!("http://{}:26657", ip)
}

fn p2p(ip: &str) -> String {
    format!("{}:26656", ip)
}

fn status(moniker: &str, network: &str) -> NodeInfo {
    NodeInfo {
        id: Some(format!("{}-id", moniker)),
        network: Some(network.to_string()),
        version: Some("0.37.4".to_string()),
        moniker: Some(moniker.to_string()),
        other: Some(NodeInfoOther {
            tx_index: Some("on".to_string()),
            rpc_address: Some("tcp://0.0.0.0:26657".to_string()),
        }),
        ..Default::default()
    }
}

fn peer_info(ip: &str) -> PeerInfo {
    PeerInfo {
        ip: ip.to_string(),
        node_id: None,
        moniker: None,
        rpc_address: Some("tcp://0.0.0.0:26657".to_string()),
    }
}

fn stored_node(ip: &str) -> Node {
    let mut node = Node::new(ip, "26657", "26656", NETWORK);
    node.location = Location {
        country: "France".to_string(),
        region: "Ile-de-France".to_string(),
        city: "Paris".to_string(),
        latitude: "48.856600".to_string(),
        longitude: "2.352200".to_string(),
    };
    node
}

fn crawler(
    config: CrawlerConfig,
    storage: Arc<MemoryStorage>,
    reachable: &[&str],
    scripts: Vec<(&str, Script)>,
) -> Crawler {
    let prober = FakeProber(reachable.iter().map(|ip| p2p(ip)).collect());
    let factory = FakeRpcFactory(
        scripts
            .into_iter()
            .map(|(ip, script)| (ip.to_string(), script))
            .collect(),
    );

    Crawler::new(config, storage, Arc::new(factory), Arc::new(FakeGeo))
        .unwrap()
        .with_prober(Arc::new(prober))
}

async fn stored(storage: &MemoryStorage, ip: &str) -> Option<Node> {
    storage
        .query_node(&NodeFilter::by_address(ip).with_network(NETWORK))
        .await
        .unwrap()
}

#[tokio::test]
async fn unreachable_node_is_deleted() {
    let storage = Arc::new(MemoryStorage::new());
    storage.upsert_node(&stored_node("34.0.0.1")).await.unwrap();

    let crawler = crawler(CrawlerConfig::default(), storage.clone(), &[], vec![]);
    crawler.crawl_node(&Peer::new(rpc("34.0.0.1"), NETWORK)).await;

    assert!(stored(&storage, "34.0.0.1").await.is_none());
    assert_eq!(crawler.pool().size(), 0);
}

#[tokio::test]
async fn unknown_peers_are_added_to_pool() {
    let storage = Arc::new(MemoryStorage::new());
    let crawler = crawler(
        CrawlerConfig::default(),
        storage.clone(),
        &["34.0.0.1"],
        vec![(
            "34.0.0.1",
            Script {
                status: Some(status("alpha", NETWORK)),
                net_info: Some(vec![peer_info("34.0.0.2"), peer_info("34.0.0.3")]),
            },
        )],
    );

    crawler.crawl_node(&Peer::new(rpc("34.0.0.1"), NETWORK)).await;

    assert_eq!(crawler.pool().size(), 2);
    assert!(crawler.pool().has_node(&Peer::new(rpc("34.0.0.2"), NETWORK)));
    assert!(crawler.pool().has_node(&Peer::new(rpc("34.0.0.3"), NETWORK)));

    let node = stored(&storage, "34.0.0.1").await.unwrap();
    assert_eq!(node.moniker, "alpha");
    assert_eq!(node.node_id, "alpha-id");
    assert_eq!(node.version, "0.37.4");
    assert_eq!(node.tx_index, "on");
    assert_eq!(node.rpc_port, "26657");
    assert_eq!(node.p2p_port, "26656");
    assert_eq!(node.location.city, "Frankfurt am Main");
    assert_eq!(node.location.latitude, "50.110900");
}

#[tokio::test]
async fn known_and_private_peers_are_skipped() {
    let storage = Arc::new(MemoryStorage::new());
    storage.upsert_node(&stored_node("34.0.0.20")).await.unwrap();

    let crawler = crawler(
        CrawlerConfig::default(),
        storage.clone(),
        &["34.0.0.1"],
        vec![(
            "34.0.0.1",
            Script {
                status: Some(status("alpha", NETWORK)),
                net_info: Some(vec![
                    peer_info("34.0.0.20"),
                    peer_info("34.0.0.21"),
                    peer_info("34.0.0.21"),
                    peer_info("10.0.0.7"),
                ]),
            },
        )],
    );

    crawler.crawl_node(&Peer::new(rpc("34.0.0.1"), NETWORK)).await;

    assert_eq!(crawler.pool().size(), 1);
    assert!(crawler.pool().has_node(&Peer::new(rpc("34.0.0.21"), NETWORK)));
}

#[tokio::test]
async fn network_is_learned_from_status() {
    let storage = Arc::new(MemoryStorage::new());
    let crawler = crawler(
        CrawlerConfig::default(),
        storage.clone(),
        &["34.0.0.1"],
        vec![(
            "34.0.0.1",
            Script {
                status: Some(status("alpha", NETWORK)),
                net_info: Some(vec![peer_info("34.0.0.2")]),
            },
        )],
    );

    crawler.crawl_node(&Peer::new(rpc("34.0.0.1"), "")).await;

    assert!(stored(&storage, "34.0.0.1").await.is_some());
    assert!(crawler.pool().has_node(&Peer::new(rpc("34.0.0.2"), NETWORK)));
}

#[tokio::test]
async fn status_failure_persists_partial_record() {
    let storage = Arc::new(MemoryStorage::new());
    let crawler = crawler(
        CrawlerConfig::default(),
        storage.clone(),
        &["34.0.0.1"],
        vec![("34.0.0.1", Script::default())],
    );

    crawler.crawl_node(&Peer::new(rpc("34.0.0.1"), NETWORK)).await;

    let node = stored(&storage, "34.0.0.1").await.unwrap();
    assert_eq!(node.moniker, "");
    assert_eq!(node.network, NETWORK);
    assert_eq!(node.location.country, "Germany");
    assert_eq!(crawler.pool().size(), 0);
}

#[tokio::test]
async fn status_failure_without_network_deletes_node() {
    let storage = Arc::new(MemoryStorage::new());
    storage.upsert_node(&stored_node("34.0.0.1")).await.unwrap();

    let crawler = crawler(
        CrawlerConfig::default(),
        storage.clone(),
        &["34.0.0.1"],
        vec![("34.0.0.1", Script::default())],
    );

    crawler.crawl_node(&Peer::new(rpc("34.0.0.1"), "")).await;

    assert!(storage.is_empty());
}

#[tokio::test]
async fn net_info_failure_skips_persist_by_default() {
    let script = Script {
        status: Some(status("alpha", NETWORK)),
        net_info: None,
    };

    let storage = Arc::new(MemoryStorage::new());
    let default_crawler = crawler(
        CrawlerConfig::default(),
        storage.clone(),
        &["34.0.0.1"],
        vec![("34.0.0.1", script.clone())],
    );
    default_crawler
        .crawl_node(&Peer::new(rpc("34.0.0.1"), NETWORK))
        .await;
    assert!(storage.is_empty());

    let config = CrawlerConfig {
        persist_on_net_info_failure: true,
        ..Default::default()
    };
    let storage = Arc::new(MemoryStorage::new());
    let persisting = crawler(config, storage.clone(), &["34.0.0.1"], vec![("34.0.0.1", script)]);
    persisting.crawl_node(&Peer::new(rpc("34.0.0.1"), NETWORK)).await;

    let node = stored(&storage, "34.0.0.1").await.unwrap();
    assert_eq!(node.moniker, "alpha");
}

#[tokio::test]
async fn crawl_round_drains_pool_and_queues_discoveries() {
    let storage = Arc::new(MemoryStorage::new());
    storage.upsert_node(&stored_node("34.0.0.1")).await.unwrap();

    let crawler = crawler(
        CrawlerConfig::default(),
        storage.clone(),
        &["34.0.0.2", "34.0.0.3"],
        vec![
            (
                "34.0.0.2",
                Script {
                    status: Some(status("bravo", NETWORK)),
                    net_info: Some(vec![peer_info("34.0.0.4"), peer_info("34.0.0.5")]),
                },
            ),
            (
                "34.0.0.3",
                Script {
                    status: Some(status("charlie", NETWORK)),
                    net_info: Some(Vec::new()),
                },
            ),
        ],
    );

    crawler.pool().seed(
        ["34.0.0.1", "34.0.0.2", "34.0.0.3"]
            .iter()
            .map(|ip| Peer::new(rpc(ip), NETWORK)),
    );

    assert_eq!(crawler.crawl_round().await, 3);

    assert_eq!(crawler.pool().size(), 2);
    assert!(crawler.pool().has_node(&Peer::new(rpc("34.0.0.4"), NETWORK)));
    assert!(crawler.pool().has_node(&Peer::new(rpc("34.0.0.5"), NETWORK)));

    assert!(stored(&storage, "34.0.0.1").await.is_none());
    assert_eq!(stored(&storage, "34.0.0.2").await.unwrap().moniker, "bravo");
    assert_eq!(stored(&storage, "34.0.0.3").await.unwrap().moniker, "charlie");

    // reseeding brings back everything ever added
    crawler.pool().reseed();
    assert_eq!(crawler.pool().size(), 5);
}

#[tokio::test]
async fn concurrent_round_crawls_every_node() {
    let ips = ["34.0.1.1", "34.0.1.2", "34.0.1.3", "34.0.1.4", "34.0.1.5"];
    let config = CrawlerConfig {
        crawl_concurrency: 3,
        ..Default::default()
    };

    let storage = Arc::new(MemoryStorage::new());
    let crawler = crawler(
        config,
        storage.clone(),
        &ips,
        ips.iter()
            .map(|ip| {
                (
                    *ip,
                    Script {
                        status: Some(status(ip, NETWORK)),
                        net_info: Some(Vec::new()),
                    },
                )
            })
            .collect(),
    );

    crawler
        .pool()
        .seed(ips.iter().map(|ip| Peer::new(rpc(ip), NETWORK)));

    assert_eq!(crawler.crawl_round().await, ips.len());
    assert_eq!(crawler.pool().size(), 0);
    assert_eq!(storage.len(), ips.len());
}

#[tokio::test]
async fn recheck_queues_stale_nodes() {
    let storage = Arc::new(MemoryStorage::new());
    storage.upsert_node(&stored_node("34.0.0.9")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let crawler = crawler(CrawlerConfig::default(), storage.clone(), &[], vec![]);

    assert_eq!(crawler.recheck_stale_nodes().await, 1);
    assert!(crawler.pool().has_node(&Peer::new(rpc("34.0.0.9"), NETWORK)));

    // already queued
    assert_eq!(crawler.recheck_stale_nodes().await, 0);
    assert_eq!(crawler.pool().size(), 1);
}

#[tokio::test]
async fn recheck_restores_tls_seed_address() {
    let seed = Peer::new("https://rpc.example.org", NETWORK);
    let storage = Arc::new(MemoryStorage::new());
    let crawler = crawler(
        CrawlerConfig::default(),
        storage.clone(),
        &["rpc.example.org"],
        vec![(
            "rpc.example.org",
            Script {
                status: Some(status("delta", NETWORK)),
                net_info: Some(Vec::new()),
            },
        )],
    );

    crawler.crawl_node(&seed).await;
    let node = stored(&storage, "rpc.example.org").await.unwrap();
    assert_eq!(node.rpc_port, "443");

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(crawler.recheck_stale_nodes().await, 1);
    assert!(crawler.pool().has_node(&seed));
}

#[tokio::test]
async fn geolocation_is_served_through_crawler() {
    let storage = Arc::new(MemoryStorage::new());
    let crawler = crawler(CrawlerConfig::default(), storage, &[], vec![]);

    let location = crawler.get_geolocation("34.0.0.1").await.unwrap();
    assert_eq!(location.region, "Hesse");
    assert_eq!(location.longitude, "8.682100");
}

#[tokio::test]
async fn start_crawls_seeds_until_stopped() {
    let config = CrawlerConfig {
        seeds: vec![Peer::new(rpc("34.0.0.1"), NETWORK)],
        crawl_interval: Duration::from_millis(20),
        recheck_interval: Duration::from_millis(20),
        ..Default::default()
    };

    let storage = Arc::new(MemoryStorage::new());
    let crawler = Arc::new(crawler(
        config,
        storage.clone(),
        &["34.0.0.1"],
        vec![(
            "34.0.0.1",
            Script {
                status: Some(status("alpha", NETWORK)),
                net_info: Some(Vec::new()),
            },
        )],
    ));

    let handle = tokio::spawn(crawler.clone().start());

    let saved = tokio::time::timeout(Duration::from_secs(5), async {
        while storage.is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(saved.is_ok());

    crawler.stop();
    crawler.stop();
    assert!(crawler.is_stopped());

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn start_returns_when_crawling_disabled() {
    let config = CrawlerConfig {
        seeds: vec![Peer::new(rpc("34.0.0.1"), NETWORK)],
        crawl_interval: Duration::ZERO,
        recheck_interval: Duration::ZERO,
        ..Default::default()
    };

    let storage = Arc::new(MemoryStorage::new());
    let crawler = Arc::new(crawler(config, storage.clone(), &["34.0.0.1"], vec![]));

    tokio::time::timeout(Duration::from_secs(5), tokio::spawn(crawler.clone().start()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(crawler.pool().size(), 0);
    assert!(storage.is_empty());
}

#[test]
fn construction_rejects_invalid_config() {
    let config = CrawlerConfig {
        location_cache_size: 0,
        ..Default::default()
    };

    let result = Crawler::new(
        config,
        Arc::new(MemoryStorage::new()),
        Arc::new(FakeRpcFactory::default()),
        Arc::new(FakeGeo),
    );
    assert!(matches!(result, Err(AppError::ConfigError(_))));
}
