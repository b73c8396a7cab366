// Address helpers shared by the crawler and the storage layer
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Client;
use url::{Host, Url};

use crate::error::AppError;

/// Default Tendermint RPC port, used when a peer does not advertise one
pub const DEFAULT_RPC_PORT: u16 = 26657;

/// Create an HTTP client for node RPC and geolocation requests
pub fn create_http_client(timeout: Duration) -> Result<Client, AppError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("peer-atlas/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(timeout)
        .pool_idle_timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(2)
        .redirect(reqwest::redirect::Policy::limited(5))
        // Plenty of public RPC endpoints run on self-signed certificates
        .danger_accept_invalid_certs(true)
        .build()
        .map_err(|e| AppError::RequestError(format!("Failed to create HTTP client: {}", e)))?;

    Ok(client)
}

/// Parse a node RPC address, assuming `http://` when no scheme is given
pub fn parse_rpc_url(rpc_addr: &str) -> Result<Url, AppError> {
    let trimmed = rpc_addr.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidAddress("empty RPC address".to_string()));
    }

    let url = if trimmed.contains("://") {
        Url::parse(trimmed)?
    } else {
        Url::parse(&format!("http://{}", trimmed))?
    };

    if url.host().is_none() {
        return Err(AppError::InvalidAddress(format!(
            "RPC address has no host: {}",
            rpc_addr
        )));
    }

    Ok(url)
}

/// Extract the bare hostname (IPv6 without brackets) from an RPC address
pub fn parse_hostname(rpc_addr: &str) -> Option<String> {
    let url = parse_rpc_url(rpc_addr).ok()?;
    match url.host()? {
        Host::Ipv6(addr) => Some(addr.to_string()),
        Host::Ipv4(addr) => Some(addr.to_string()),
        Host::Domain(domain) => Some(domain.to_string()),
    }
}

/// Extract the port of an RPC address, falling back to the scheme default
pub fn parse_port(rpc_addr: &str) -> Option<u16> {
    parse_rpc_url(rpc_addr).ok()?.port_or_known_default()
}

/// Join host and port, bracketing IPv6 literals
pub fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Build the RPC URL of a peer reported by `/net_info`. Peers usually
/// advertise a listen address such as `tcp://0.0.0.0:26657`, so only the port
/// is taken from it and the host is replaced by the peer's remote IP.
pub fn peer_rpc_address(remote_ip: &str, advertised: Option<&str>) -> String {
    let port = advertised
        .and_then(extract_port_from_address)
        .unwrap_or(DEFAULT_RPC_PORT);

    format!("http://{}", join_host_port(remote_ip, &port.to_string()))
}

/// Rebuild the RPC URL of a stored node. Port 443 maps back to an `https`
/// URL without an explicit port, so a node first seeded as
/// `https://host` is requeued under the same address.
pub fn node_rpc_address(host: &str, rpc_port: &str) -> String {
    match rpc_port {
        "443" if host.contains(':') => format!("https://[{}]", host),
        "443" => format!("https://{}", host),
        _ => format!("http://{}", join_host_port(host, rpc_port)),
    }
}

/// Extract port from various RPC address formats
fn extract_port_from_address(address: &str) -> Option<u16> {
    let tail = address.rsplit(':').next()?;
    tail.split('/').next()?.parse::<u16>().ok()
}

/// Validates if a string represents a valid public IP address
pub fn is_valid_public_ip(ip: &str) -> bool {
    let parsed_ip = match IpAddr::from_str(ip) {
        Ok(addr) => addr,
        Err(_) => return false,
    };

    match parsed_ip {
        IpAddr::V4(addr) => {
            let octets = addr.octets();

            if addr.is_private()
                || addr.is_loopback()
                || addr.is_link_local()
                || addr.is_broadcast()
                || addr.is_documentation()
                || addr.is_unspecified()
                || addr.is_multicast()
            {
                return false;
            }

            // "This network", IETF protocol assignments and reserved space
            !(octets[0] == 0
                || (octets[0] == 192 && octets[1] == 0 && octets[2] == 0)
                || octets[0] >= 240)
        }
        IpAddr::V6(addr) => {
            let segments = addr.segments();
            !addr.is_loopback()
                && !addr.is_unspecified()
                && !addr.is_multicast()
                // fe80::/10 link-local and fc00::/7 unique local
                && (segments[0] & 0xffc0) != 0xfe80
                && (segments[0] & 0xfe00) != 0xfc00
        }
    }
}
