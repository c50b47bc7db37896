//! Load balancing strategies for distributing calls across a channel's servers

use rand::Rng;
use service_core::Endpoint;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Load balancing strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadBalancingStrategy {
    /// Round-robin: distribute requests evenly across servers
    RoundRobin,
    /// Random: pick a server uniformly at random
    Random,
    /// Least active: route to the server with the fewest in-flight calls
    LeastActive,
    /// Consistent hash: hash the request path to pick a stable server
    ConsistentHash,
}

impl Default for LoadBalancingStrategy {
    fn default() -> Self {
        LoadBalancingStrategy::RoundRobin
    }
}

impl LoadBalancingStrategy {
    /// Map a load balancer name from the configuration document
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rr" => Some(LoadBalancingStrategy::RoundRobin),
            "random" => Some(LoadBalancingStrategy::Random),
            "la" => Some(LoadBalancingStrategy::LeastActive),
            "c_murmurhash" | "c_md5" => Some(LoadBalancingStrategy::ConsistentHash),
            _ => None,
        }
    }
}

/// Load balancer for selecting servers based on a strategy
#[derive(Debug)]
pub struct LoadBalancer {
    strategy: LoadBalancingStrategy,
    round_robin_counter: AtomicUsize,
    /// In-flight calls per server index
    active: Vec<AtomicUsize>,
}

/// Marks a call in flight on a server until dropped
pub struct ActiveCall<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for ActiveCall<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl LoadBalancer {
    /// Create a new load balancer for `server_count` servers
    pub fn new(strategy: LoadBalancingStrategy, server_count: usize) -> Self {
        Self {
            strategy,
            round_robin_counter: AtomicUsize::new(0),
            active: (0..server_count).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    pub fn strategy(&self) -> LoadBalancingStrategy {
        self.strategy
    }

    /// Select a server index. Servers listed in `excluded` are skipped unless
    /// every server is excluded.
    pub fn select(&self, endpoints: &[Endpoint], hash_key: &str, excluded: &[usize]) -> Option<usize> {
        if endpoints.is_empty() {
            return None;
        }

        let mut candidates: Vec<usize> = (0..endpoints.len())
            .filter(|i| !excluded.contains(i))
            .collect();
        if candidates.is_empty() {
            candidates = (0..endpoints.len()).collect();
        }

        let picked = match self.strategy {
            LoadBalancingStrategy::RoundRobin => self.select_round_robin(&candidates),
            LoadBalancingStrategy::Random => {
                candidates[rand::thread_rng().gen_range(0..candidates.len())]
            }
            LoadBalancingStrategy::LeastActive => self.select_least_active(&candidates),
            LoadBalancingStrategy::ConsistentHash => {
                candidates[(Self::compute_hash(hash_key) % candidates.len() as u64) as usize]
            }
        };
        Some(picked)
    }

    /// Track a call in flight on server `index`
    pub fn begin(&self, index: usize) -> Option<ActiveCall<'_>> {
        self.active.get(index).map(|counter| {
            counter.fetch_add(1, Ordering::SeqCst);
            ActiveCall { counter }
        })
    }

    /// Number of calls in flight on server `index`
    pub fn active_calls(&self, index: usize) -> usize {
        self.active
            .get(index)
            .map(|counter| counter.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    fn select_round_robin(&self, candidates: &[usize]) -> usize {
        let current = self.round_robin_counter.fetch_add(1, Ordering::SeqCst);
        candidates[current % candidates.len()]
    }

    /// Fewest in-flight calls wins; ties rotate round-robin
    fn select_least_active(&self, candidates: &[usize]) -> usize {
        let offset = self.round_robin_counter.fetch_add(1, Ordering::SeqCst);
        (0..candidates.len())
            .map(|i| candidates[(offset + i) % candidates.len()])
            .min_by_key(|&index| self.active_calls(index))
            .unwrap_or(candidates[0])
    }

    /// Compute hash for a string
    fn compute_hash(s: &str) -> u64 {
        // FNV-1a
        const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
        const FNV_PRIME: u64 = 1099511628211;

        let mut hash = FNV_OFFSET_BASIS;
        for byte in s.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }
}
