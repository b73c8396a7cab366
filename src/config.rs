use std::time::Duration;

use crate::{cli::Cli, crawl::Peer, error::AppError};

const DEFAULT_CRAWL_INTERVAL: Duration = Duration::from_secs(900);
const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_secs(3600);
const DEFAULT_RESEED_SIZE: usize = 100;
const DEFAULT_LOCATION_CACHE_SIZE: usize = 1000;
const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_GEO_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_P2P_PORT: u16 = 26656;

/// Geolocation provider settings
#[derive(Debug, Clone)]
pub struct GeoConfig {
    pub ipstack_key: Option<String>,
    pub ipstack_https: bool,
    pub timeout: Duration,
}

impl Default for GeoConfig {
    fn default() -> Self {
        GeoConfig {
            ipstack_key: None,
            ipstack_https: false,
            timeout: DEFAULT_GEO_TIMEOUT,
        }
    }
}

/// Crawler configuration, fixed at construction
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub seeds: Vec<Peer>,
    /// Zero disables crawling
    pub crawl_interval: Duration,
    pub recheck_interval: Duration,
    pub reseed_size: usize,
    pub location_cache_size: usize,
    pub dial_timeout: Duration,
    pub rpc_timeout: Duration,
    pub p2p_port: u16,
    pub crawl_concurrency: usize,
    /// Upsert the status-derived record when `/net_info` fails
    pub persist_on_net_info_failure: bool,
    pub public_peers_only: bool,
    pub geo: GeoConfig,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            seeds: Vec::new(),
            crawl_interval: DEFAULT_CRAWL_INTERVAL,
            recheck_interval: DEFAULT_RECHECK_INTERVAL,
            reseed_size: DEFAULT_RESEED_SIZE,
            location_cache_size: DEFAULT_LOCATION_CACHE_SIZE,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            p2p_port: DEFAULT_P2P_PORT,
            crawl_concurrency: 1,
            persist_on_net_info_failure: false,
            public_peers_only: true,
            geo: GeoConfig::default(),
        }
    }
}

impl CrawlerConfig {
    /// Build the configuration from parsed command-line arguments
    pub fn from_cli(cli: &Cli) -> Result<Self, AppError> {
        let config = CrawlerConfig {
            seeds: parse_seeds(&cli.seeds)?,
            crawl_interval: cli.crawl_interval(),
            recheck_interval: cli.recheck_interval(),
            reseed_size: cli.reseed_size,
            location_cache_size: cli.location_cache_size,
            dial_timeout: cli.dial_timeout(),
            rpc_timeout: cli.rpc_timeout(),
            p2p_port: cli.p2p_port,
            crawl_concurrency: cli.crawl_concurrency,
            persist_on_net_info_failure: cli.persist_on_net_info_failure,
            public_peers_only: cli.public_peers_only,
            geo: GeoConfig {
                ipstack_key: cli.ipstack_key.clone().filter(|k| !k.trim().is_empty()),
                ipstack_https: cli.ipstack_https,
                timeout: cli.geo_timeout(),
            },
        };

        config.validate()?;

        if config.seeds.is_empty() {
            tracing::warn!("No seed nodes configured");
        } else {
            tracing::info!("Loaded {} seed nodes", config.seeds.len());
        }

        Ok(config)
    }

    pub fn crawling_enabled(&self) -> bool {
        !self.crawl_interval.is_zero()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.crawling_enabled() && self.recheck_interval.is_zero() {
            return Err(AppError::ConfigError(
                "recheck interval must be greater than zero".to_string(),
            ));
        }

        if self.location_cache_size == 0 {
            return Err(AppError::ConfigError(
                "location cache size must be greater than zero".to_string(),
            ));
        }

        if self.crawl_concurrency == 0 {
            return Err(AppError::ConfigError(
                "crawl concurrency must be greater than zero".to_string(),
            ));
        }

        for (name, timeout) in [
            ("dial", self.dial_timeout),
            ("rpc", self.rpc_timeout),
            ("geolocation", self.geo.timeout),
        ] {
            if timeout.is_zero() {
                return Err(AppError::ConfigError(format!(
                    "{} timeout must be greater than zero",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Parse a comma separated seed list, skipping empty entries
pub fn parse_seeds(seeds: &str) -> Result<Vec<Peer>, AppError> {
    seeds
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<Peer>()
                .map_err(|e| AppError::ConfigError(format!("invalid seed {:?}: {}", s, e)))
        })
        .collect()
}
