use clap::{ArgAction, Parser};
use std::time::Duration;

/// Command-line interface for the node crawler
#[derive(Parser, Debug, Clone)]
#[clap(
    name = "peer-atlas",
    about = "Crawls a Tendermint P2P network, geolocating and recording every reachable node",
    version
)]
pub struct Cli {
    /// Database URL for storing node information (memory-only when unset)
    #[clap(long, env("DATABASE_URL"))]
    pub database_url: Option<String>,

    /// Comma separated seed nodes, each `rpc_address` or `rpc_address;network`
    #[clap(long, env("NODE_SEEDS"), default_value = "")]
    pub seeds: String,

    /// Crawl interval in seconds (0 disables crawling)
    #[clap(long, env("NODE_CRAWL_INTERVAL"), default_value = "900")]
    pub crawl_interval: u64,

    /// Interval in seconds between rechecks of stale nodes
    #[clap(long, env("NODE_RECHECK_INTERVAL"), default_value = "3600")]
    pub recheck_interval: u64,

    /// Number of previously seen nodes kept to reseed the pool
    #[clap(long, env("NODE_RESEED_SIZE"), default_value = "100")]
    pub reseed_size: usize,

    /// ipstack API access key (ip-api.com is used when unset)
    #[clap(long, env("IPSTACK_KEY"))]
    pub ipstack_key: Option<String>,

    /// Query ipstack over HTTPS (paid plans only)
    #[clap(long, env("IPSTACK_HTTPS"))]
    pub ipstack_https: bool,

    /// Timeout for geolocation requests in seconds
    #[clap(long, default_value = "5")]
    pub geo_timeout: u64,

    /// Timeout for the P2P liveness dial in seconds
    #[clap(long, default_value = "5")]
    pub dial_timeout: u64,

    /// Timeout for node RPC requests in seconds
    #[clap(long, default_value = "15")]
    pub rpc_timeout: u64,

    /// Number of node locations kept in memory
    #[clap(long, default_value = "1000")]
    pub location_cache_size: usize,

    /// P2P port dialed to check liveness
    #[clap(long, default_value = "26656")]
    pub p2p_port: u16,

    /// Maximum number of nodes crawled concurrently
    #[clap(long, default_value = "1")]
    pub crawl_concurrency: usize,

    /// Persist a node's status even when its peer list cannot be fetched
    #[clap(long)]
    pub persist_on_net_info_failure: bool,

    /// Only follow peers with public IP addresses
    #[clap(long, default_value_t = true, action = ArgAction::Set)]
    pub public_peers_only: bool,
}

impl Cli {
    pub fn crawl_interval(&self) -> Duration {
        Duration::from_secs(self.crawl_interval)
    }

    pub fn recheck_interval(&self) -> Duration {
        Duration::from_secs(self.recheck_interval)
    }

    pub fn geo_timeout(&self) -> Duration {
        Duration::from_secs(self.geo_timeout)
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout)
    }
}
