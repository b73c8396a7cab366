// Modules
mod adaptive;
mod cache;
mod crawler;
mod geo;
mod pool;
mod rpc;

// Public exports
pub use adaptive::AdaptiveCache;
pub use cache::GeolocationCache;
pub use crawler::Crawler;
pub use geo::{
    location_from_response, provider_from_config, GeoProvider, IpApiProvider, IpStackProvider,
};
pub use pool::{NodePool, Peer};
pub use rpc::{
    parse_net_info, parse_status, HttpRpcClient, HttpRpcFactory, LivenessProbe, NodeRpc,
    RpcClientFactory, TcpProbe,
};
