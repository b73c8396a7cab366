use std::{collections::HashSet, fmt, str::FromStr};

use parking_lot::RwLock;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::error::AppError;

/// A crawl candidate. Every peer has an RPC address; the network is empty
/// until it is learned from the seed or from the node's status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Peer {
    pub rpc_addr: String,
    pub network: String,
}

impl Peer {
    pub fn new(rpc_addr: impl Into<String>, network: impl Into<String>) -> Self {
        Peer {
            rpc_addr: rpc_addr.into(),
            network: network.into(),
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.rpc_addr.is_empty() && !self.network.is_empty() {
            write!(f, "{};{}", self.rpc_addr, self.network)
        } else {
            write!(f, "{}", self.rpc_addr)
        }
    }
}

/// Parses `rpc_addr` or `rpc_addr;network`
impl FromStr for Peer {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.trim().split(';').map(str::trim).collect();
        match tokens.as_slice() {
            [rpc_addr] if !rpc_addr.is_empty() => Ok(Peer::new(*rpc_addr, "")),
            [rpc_addr, network] if !rpc_addr.is_empty() => Ok(Peer::new(*rpc_addr, *network)),
            _ => Err(AppError::ValidationError(format!("invalid peer: {:?}", s))),
        }
    }
}

struct PoolInner {
    nodes: HashSet<Peer>,
    reseed_nodes: Vec<Peer>,
    reseed_cap: usize,
    rng: SmallRng,
}

/// Working set of peers to crawl, plus a bounded list of previously seen
/// peers used to refill the set once it has been drained. When the reseed
/// list is full, adding a new peer overwrites a random slot.
pub struct NodePool {
    inner: RwLock<PoolInner>,
}

impl NodePool {
    pub fn new(reseed_cap: usize) -> Self {
        NodePool {
            inner: RwLock::new(PoolInner {
                nodes: HashSet::new(),
                reseed_nodes: Vec::with_capacity(reseed_cap),
                reseed_cap,
                rng: SmallRng::from_entropy(),
            }),
        }
    }

    /// Number of peers waiting to be crawled
    pub fn size(&self) -> usize {
        self.inner.read().nodes.len()
    }

    pub fn reseed_len(&self) -> usize {
        self.inner.read().reseed_nodes.len()
    }

    /// Add every peer of the given set
    pub fn seed<I>(&self, peers: I)
    where
        I: IntoIterator<Item = Peer>,
    {
        for peer in peers {
            self.add_node(peer);
        }
    }

    /// Returns some peer of the pool. Selection follows hash order and is not
    /// uniform; draining callers delete the returned peer before asking again.
    pub fn random_node(&self) -> Option<Peer> {
        self.inner.read().nodes.iter().next().cloned()
    }

    /// Add a peer to the live set and record it in the reseed list
    pub fn add_node(&self, peer: Peer) {
        let mut inner = self.inner.write();
        let inner = &mut *inner;

        if inner.reseed_cap > 0 && !inner.reseed_nodes.contains(&peer) {
            if inner.reseed_nodes.len() < inner.reseed_cap {
                inner.reseed_nodes.push(peer.clone());
            } else {
                // replace a random slot with the new peer
                let i = inner.rng.gen_range(0..inner.reseed_nodes.len());
                inner.reseed_nodes[i] = peer.clone();
            }
        }

        inner.nodes.insert(peer);
    }

    pub fn has_node(&self, peer: &Peer) -> bool {
        self.inner.read().nodes.contains(peer)
    }

    /// Remove a peer from the live set. The reseed list is left untouched.
    pub fn delete_node(&self, peer: &Peer) {
        self.inner.write().nodes.remove(peer);
    }

    /// Refill the live set from the reseed list
    pub fn reseed(&self) {
        let mut inner = self.inner.write();
        let inner = &mut *inner;
        for peer in &inner.reseed_nodes {
            inner.nodes.insert(peer.clone());
        }
    }
}
