use std::{collections::HashSet, sync::Arc, time::Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio::{
    sync::Mutex,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use super::{
    cache::GeolocationCache,
    geo::GeoProvider,
    pool::{NodePool, Peer},
    rpc::{LivenessProbe, NodeRpc, RpcClientFactory, TcpProbe},
};
use crate::{
    config::CrawlerConfig,
    error::AppError,
    models::{Location, Node, PeerInfo},
    storage::{NodeFilter, Storage},
    utils::{
        is_valid_public_ip, join_host_port, node_rpc_address, parse_hostname, parse_port,
        peer_rpc_address,
    },
};

/// Tendermint P2P network crawler.
///
/// Starting from the configured seeds, every node in the pool is probed on
/// its P2P port, geolocated and asked for its status and peers. Reachable
/// nodes are persisted, unreachable ones deleted, and peers that storage has
/// not seen yet are queued for the next round.
pub struct Crawler {
    config: CrawlerConfig,
    pool: Arc<NodePool>,
    geo_cache: GeolocationCache,
    storage: Arc<dyn Storage>,
    rpc_factory: Arc<dyn RpcClientFactory>,
    prober: Arc<dyn LivenessProbe>,
    // serializes storage writes when nodes are crawled concurrently
    write_lock: Mutex<()>,
    shutdown: CancellationToken,
}

impl Crawler {
    pub fn new(
        config: CrawlerConfig,
        storage: Arc<dyn Storage>,
        rpc_factory: Arc<dyn RpcClientFactory>,
        geo_provider: Arc<dyn GeoProvider>,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let geo_cache =
            GeolocationCache::new(config.location_cache_size, storage.clone(), geo_provider)?;

        Ok(Crawler {
            pool: Arc::new(NodePool::new(config.reseed_size)),
            geo_cache,
            storage,
            rpc_factory,
            prober: Arc::new(TcpProbe),
            write_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
            config,
        })
    }

    /// Replace the TCP liveness probe
    pub fn with_prober(mut self, prober: Arc<dyn LivenessProbe>) -> Self {
        self.prober = prober;
        self
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    /// Signal both loops to exit. Calling it again has no effect.
    pub fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!("Stopping node crawler");
        }
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Seed the pool, spawn the recheck loop and run the crawl loop until
    /// `stop` is called. Every `crawl_interval` the pool is drained and then
    /// refilled from its reseed list. Returns at once when the crawl interval
    /// is zero.
    pub async fn start(self: Arc<Self>) {
        if !self.config.crawling_enabled() {
            tracing::info!("node crawling disabled");
            return;
        }

        self.pool.seed(self.config.seeds.iter().cloned());
        tracing::info!(
            "Starting node crawler with {} seeds, crawl interval {:?}, recheck interval {:?}",
            self.pool.size(),
            self.config.crawl_interval,
            self.config.recheck_interval
        );

        let recheck = tokio::spawn({
            let crawler = self.clone();
            async move { crawler.recheck_nodes().await }
        });

        let mut ticker = time::interval(self.config.crawl_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; crawling starts one interval in
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.crawl_round().await;
                    self.pool.reseed();
                }
            }
        }

        if let Err(e) = recheck.await {
            tracing::warn!("Recheck loop ended with error: {}", e);
        }

        tracing::info!("Node crawler stopped");
    }

    /// Every `recheck_interval`, queue stale nodes for another crawl
    async fn recheck_nodes(&self) {
        let mut ticker = time::interval(self.config.recheck_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.recheck_stale_nodes().await;
                }
            }
        }
    }

    /// Add every node not updated since now back into the pool. Returns the
    /// number of nodes queued.
    pub async fn recheck_stale_nodes(&self) -> usize {
        tracing::info!("rechecking nodes...");

        let nodes = match self.storage.get_stale_nodes(Utc::now()).await {
            Ok(nodes) => nodes,
            Err(e) => {
                tracing::info!("failed to get all stale nodes: {}", e);
                return 0;
            }
        };

        let mut queued = 0;
        for node in nodes {
            let peer = Peer::new(
                node_rpc_address(&node.address, &node.rpc_port),
                node.network.as_str(),
            );

            if !self.pool.has_node(&peer) {
                tracing::debug!(
                    "adding stale node to node pool: {} (last sync {})",
                    peer,
                    node.updated_at
                );
                self.pool.add_node(peer);
                queued += 1;
            }
        }

        queued
    }

    /// Crawl until the pool is empty. Peers discovered along the way join the
    /// pool only after the drain, so a round attempts each node present at
    /// its start at most once. Returns the number of nodes crawled.
    pub async fn crawl_round(&self) -> usize {
        tracing::info!("starting to crawl nodes");

        let start = Instant::now();
        let batch_size = self.config.crawl_concurrency.max(1);
        let mut crawled = 0;
        let mut discovered = Vec::new();

        while !self.shutdown.is_cancelled() {
            let mut batch = Vec::with_capacity(batch_size);
            while batch.len() < batch_size {
                match self.pool.random_node() {
                    Some(peer) => {
                        self.pool.delete_node(&peer);
                        batch.push(peer);
                    }
                    None => break,
                }
            }

            if batch.is_empty() {
                break;
            }

            for _ in &batch {
                if crawled % 50 == 0 {
                    tracing::info!("node pool size: {}", self.pool.size());
                }
                crawled += 1;
            }

            let results = join_all(batch.iter().map(|peer| self.crawl_peer(peer))).await;
            discovered.extend(results.into_iter().flatten());
        }

        for peer in discovered {
            tracing::debug!("adding peer to node pool: {}", peer);
            self.pool.add_node(peer);
        }

        tracing::info!(
            "node crawl complete; crawled {} nodes in {:.2}s",
            crawled,
            start.elapsed().as_secs_f64()
        );

        crawled
    }

    /// Crawl a single node and queue the new peers it reports
    pub async fn crawl_node(&self, peer: &Peer) {
        for discovered in self.crawl_peer(peer).await {
            tracing::debug!("adding peer to node pool: {}", discovered);
            self.pool.add_node(discovered);
        }
    }

    /// Resolve the location of a node address
    pub async fn get_geolocation(&self, address: &str) -> Result<Location, AppError> {
        self.geo_cache.get(address).await
    }

    /// Crawl one node. The node's P2P address is its RPC host with the default
    /// P2P port. Failing that dial deletes any stored record for the address.
    /// Otherwise the node is geolocated and queried over RPC, then stored.
    /// Returns the reported peers that storage does not know yet.
    async fn crawl_peer(&self, peer: &Peer) -> Vec<Peer> {
        let host = match parse_hostname(&peer.rpc_addr) {
            Some(host) => host,
            None => {
                tracing::warn!("skipping peer with invalid RPC address: {}", peer.rpc_addr);
                return Vec::new();
            }
        };

        let p2p_port = self.config.p2p_port.to_string();
        let rpc_port = parse_port(&peer.rpc_addr)
            .map(|p| p.to_string())
            .unwrap_or_default();
        let p2p_addr = join_host_port(&host, &p2p_port);

        let mut node = Node::new(&host, &rpc_port, &p2p_port, &peer.network);

        tracing::debug!("pinging node {} (rpc {})...", p2p_addr, peer.rpc_addr);

        if !self
            .prober
            .is_reachable(&p2p_addr, self.config.dial_timeout)
            .await
        {
            tracing::info!(
                "failed to ping node {} (rpc {}); deleting...",
                p2p_addr,
                peer.rpc_addr
            );
            self.delete_node(&node).await;
            return Vec::new();
        }

        node.location = match self.geo_cache.get(&node.address).await {
            Ok(location) => location,
            Err(e) => {
                tracing::error!(
                    "failed to get node geolocation for {} (rpc {}): {}",
                    p2p_addr,
                    peer.rpc_addr,
                    e
                );
                return Vec::new();
            }
        };

        let client = match self
            .rpc_factory
            .connect(&peer.rpc_addr, self.config.rpc_timeout)
        {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("failed to create RPC client for {}: {}", peer.rpc_addr, e);
                return Vec::new();
            }
        };

        let mut discovered = Vec::new();

        match client.status().await {
            Err(e) => {
                tracing::error!("failed to get node status from {}: {}", peer.rpc_addr, e);

                // without a network there is nothing to key the record on
                if node.network.is_empty() {
                    self.delete_node(&node).await;
                    return Vec::new();
                }
            }
            Ok(status) => {
                node.moniker = status.moniker.clone().unwrap_or_default();
                node.node_id = status.id.clone().unwrap_or_default();
                node.version = status.version.clone().unwrap_or_default();
                node.tx_index = status.tx_index().unwrap_or_default().to_string();
                if node.network.is_empty() {
                    node.network = status.network.clone().unwrap_or_default();
                }

                match self.peers_of(client.as_ref(), &node).await {
                    Ok(peers) => discovered = peers,
                    Err(e) => {
                        tracing::error!(
                            "failed to get node net info from {}: {}",
                            peer.rpc_addr,
                            e
                        );
                        if !self.config.persist_on_net_info_failure {
                            return Vec::new();
                        }
                    }
                }
            }
        }

        self.upsert_node(&node).await;
        discovered
    }

    /// Reported peers of a node that are not stored yet for its network
    async fn peers_of(&self, client: &dyn NodeRpc, node: &Node) -> Result<Vec<Peer>, AppError> {
        let reported = client.net_info().await?;
        tracing::debug!("{} reported {} peers", node.address, reported.len());

        let mut seen = HashSet::new();
        let mut unknown = Vec::new();

        for PeerInfo {
            ip, rpc_address, ..
        } in reported
        {
            if self.config.public_peers_only && !is_valid_public_ip(&ip) {
                continue;
            }
            if !seen.insert(ip.clone()) {
                continue;
            }

            // only queue peers we haven't (re)discovered
            let filter = NodeFilter::by_address(&ip).with_network(&node.network);
            match self.storage.query_node(&filter).await {
                Ok(None) => {
                    let rpc_addr = peer_rpc_address(&ip, rpc_address.as_deref());
                    unknown.push(Peer::new(rpc_addr, node.network.as_str()));
                }
                Ok(Some(_)) => {}
                Err(e) => {
                    tracing::debug!("failed to look up peer {}: {}", ip, e);
                }
            }
        }

        Ok(unknown)
    }

    async fn delete_node(&self, node: &Node) {
        let _guard = self.write_lock.lock().await;

        if let Err(e) = self.storage.delete_node(node).await {
            tracing::error!("failed to delete node {}: {}", node.address, e);
        }
    }

    async fn upsert_node(&self, node: &Node) {
        let _guard = self.write_lock.lock().await;

        match self.storage.upsert_node(node).await {
            Ok(_) => tracing::info!(
                "successfully crawled and saved node {} ({})",
                node.address,
                node.network
            ),
            Err(e) => tracing::error!("failed to save node {}: {}", node.address, e),
        }
    }
}
