use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geographical location of a crawled node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: String,
    pub longitude: String,
}

impl Location {
    /// Locations are deduplicated by coordinates, so both must be present
    pub fn has_coordinates(&self) -> bool {
        !self.latitude.is_empty() && !self.longitude.is_empty()
    }
}

/// A crawled Tendermint node, unique by (address, network)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub address: String,
    #[serde(rename = "rpcPort")]
    pub rpc_port: String,
    #[serde(rename = "p2pPort")]
    pub p2p_port: String,
    pub moniker: String,
    #[serde(rename = "nodeId")]
    pub node_id: String,
    pub network: String,
    pub version: String,
    #[serde(rename = "txIndex")]
    pub tx_index: String,
    pub location: Location,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// A node record with only its addressing fields populated
    pub fn new(address: &str, rpc_port: &str, p2p_port: &str, network: &str) -> Self {
        let now = Utc::now();
        Node {
            address: address.to_string(),
            rpc_port: rpc_port.to_string(),
            p2p_port: p2p_port.to_string(),
            moniker: String::new(),
            node_id: String::new(),
            network: network.to_string(),
            version: String::new(),
            tx_index: String::new(),
            location: Location::default(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub code: Option<i64>,
    pub message: Option<String>,
    pub data: Option<String>,
}

/// Result of the `/status` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    pub node_info: NodeInfo,
}

/// Result of the `/net_info` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetInfoResult {
    pub n_peers: Option<String>,
    pub peers: Option<Vec<PeerData>>,
}

/// Represents a peer as returned from Tendermint RPC
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerData {
    pub remote_ip: Option<String>,
    pub node_info: Option<NodeInfo>,
    pub is_outbound: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: Option<String>,
    pub listen_addr: Option<String>,
    pub network: Option<String>,
    pub version: Option<String>,
    pub moniker: Option<String>,
    pub other: Option<NodeInfoOther>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeInfoOther {
    pub tx_index: Option<String>,
    pub rpc_address: Option<String>,
}

impl NodeInfo {
    pub fn tx_index(&self) -> Option<&str> {
        self.other.as_ref()?.tx_index.as_deref()
    }

    pub fn rpc_address(&self) -> Option<&str> {
        self.other.as_ref()?.rpc_address.as_deref()
    }
}

/// A peer reported by a node's `/net_info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub ip: String,
    #[serde(rename = "nodeId")]
    pub node_id: Option<String>,
    pub moniker: Option<String>,
    #[serde(rename = "rpcAddress")]
    pub rpc_address: Option<String>,
}

/// Normalized geolocation lookup result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoResponse {
    pub country: String,
    pub region: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Response from the ipstack API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpStackResponse {
    pub success: Option<bool>,
    pub error: Option<IpStackError>,
    pub country_name: Option<String>,
    pub region_name: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpStackError {
    pub code: Option<i64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub info: Option<String>,
}

/// Response from the ip-api.com API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoApiResponse {
    pub status: String,
    pub message: Option<String>,
    pub country: Option<String>,
    #[serde(rename = "regionName")]
    pub region_name: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub isp: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}
