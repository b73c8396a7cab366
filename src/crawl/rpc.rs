use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use url::Url;

use crate::{
    error::AppError,
    models::{NetInfoResult, NodeInfo, PeerData, PeerInfo, RpcErrorBody, StatusResult},
    utils::{is_valid_public_ip, parse_rpc_url},
};

/// What the crawler needs from a node's RPC endpoint
#[async_trait]
pub trait NodeRpc: Send + Sync {
    /// Node metadata from `/status`
    async fn status(&self) -> Result<NodeInfo, AppError>;

    /// Currently connected peers from `/net_info`
    async fn net_info(&self) -> Result<Vec<PeerInfo>, AppError>;
}

/// Creates an RPC client bound to a single node
pub trait RpcClientFactory: Send + Sync {
    fn connect(&self, rpc_addr: &str, timeout: Duration) -> Result<Box<dyn NodeRpc>, AppError>;
}

/// Raw reachability check of a P2P address
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_reachable(&self, address: &str, timeout: Duration) -> bool;
}

/// Liveness through a plain TCP connect
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl LivenessProbe for TcpProbe {
    async fn is_reachable(&self, address: &str, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            // the stream is dropped right away, closing the connection
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                tracing::trace!("Dial to {} failed: {}", address, e);
                false
            }
            Err(_) => {
                tracing::trace!("Dial to {} timed out after {:?}", address, timeout);
                false
            }
        }
    }
}

/// Factory of Tendermint JSON-RPC clients sharing one HTTP connection pool
#[derive(Clone)]
pub struct HttpRpcFactory {
    client: Client,
}

impl HttpRpcFactory {
    pub fn new(client: Client) -> Self {
        HttpRpcFactory { client }
    }
}

impl RpcClientFactory for HttpRpcFactory {
    fn connect(&self, rpc_addr: &str, timeout: Duration) -> Result<Box<dyn NodeRpc>, AppError> {
        let base = parse_rpc_url(rpc_addr)?;
        Ok(Box::new(HttpRpcClient {
            client: self.client.clone(),
            base,
            timeout,
        }))
    }
}

/// Tendermint RPC over HTTP GET
pub struct HttpRpcClient {
    client: Client,
    base: Url,
    timeout: Duration,
}

impl HttpRpcClient {
    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}", self.base.as_str().trim_end_matches('/'), method)
    }

    async fn call(&self, method: &str) -> Result<String, AppError> {
        let url = self.endpoint(method);
        tracing::debug!("Fetching from URL: {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| AppError::RpcError(format!("{} request failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AppError::RpcError(format!(
                "{} returned error status: {}",
                url,
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| AppError::RpcError(format!("failed to read body from {}: {}", url, e)))
    }
}

#[async_trait]
impl NodeRpc for HttpRpcClient {
    async fn status(&self) -> Result<NodeInfo, AppError> {
        let body = self.call("status").await?;
        parse_status(&body)
    }

    async fn net_info(&self) -> Result<Vec<PeerInfo>, AppError> {
        let body = self.call("net_info").await?;
        parse_net_info(&body)
    }
}

/// Decode the payload of a JSON-RPC body, with or without the envelope
fn decode_result<T: DeserializeOwned>(body: &str) -> Result<T, AppError> {
    let mut value: Value = serde_json::from_str(body)?;

    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        let error: RpcErrorBody = serde_json::from_value(error.clone())?;
        return Err(AppError::RpcError(format!(
            "code {}: {} {}",
            error.code.unwrap_or_default(),
            error.message.unwrap_or_default(),
            error.data.unwrap_or_default()
        )));
    }

    let payload = if value.get("result").is_some() {
        value["result"].take()
    } else {
        value
    };

    if payload.is_null() {
        return Err(AppError::RpcError("response has no result".to_string()));
    }

    Ok(serde_json::from_value(payload)?)
}

pub fn parse_status(body: &str) -> Result<NodeInfo, AppError> {
    let status: StatusResult = decode_result(body)?;
    Ok(status.node_info)
}

pub fn parse_net_info(body: &str) -> Result<Vec<PeerInfo>, AppError> {
    let net_info: NetInfoResult = decode_result(body)?;
    Ok(net_info
        .peers
        .unwrap_or_default()
        .into_iter()
        .filter_map(peer_info_from_data)
        .collect())
}

/// Convert a raw `/net_info` peer. The remote IP is preferred; nodes behind
/// NAT leave it empty, in which case a concrete IP in the listen address is
/// used instead.
fn peer_info_from_data(peer: PeerData) -> Option<PeerInfo> {
    let node_info = peer.node_info.unwrap_or_default();

    let ip = peer
        .remote_ip
        .filter(|ip| !ip.is_empty())
        .or_else(|| {
            let listen = node_info.listen_addr.as_deref()?;
            let host = listen.rsplit_once("://").map_or(listen, |(_, h)| h);
            let host = host.rsplit_once(':').map_or(host, |(h, _)| h);
            is_valid_public_ip(host).then(|| host.to_string())
        })?;

    Some(PeerInfo {
        ip,
        rpc_address: node_info.rpc_address().map(String::from),
        node_id: node_info.id,
        moniker: node_info.moniker,
    })
}
