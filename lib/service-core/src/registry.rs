//! Channel registry publishing immutable snapshots of the remote services
//!
//! Readers take an `Arc` to the current snapshot without locking and keep it
//! for the duration of one call. A reload builds a brand-new snapshot and swaps
//! it in; the old one is dropped, together with its backend handles, once the
//! last reader releases it.

use crate::Result;
use arc_swap::ArcSwap;
use service_api::ServiceChannelSpec;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// A service spec together with the backend handle built for it
#[derive(Debug)]
pub struct ServiceChannel<B> {
    pub spec: ServiceChannelSpec,
    pub backend: B,
}

impl<B> ServiceChannel<B> {
    pub fn new(spec: ServiceChannelSpec, backend: B) -> Self {
        Self { spec, backend }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// Immutable mapping from service name to channel
#[derive(Debug)]
pub struct ChannelSnapshot<B> {
    generation: u64,
    channels: HashMap<String, ServiceChannel<B>>,
    /// Service names in the order they were loaded
    order: Vec<String>,
}

impl<B> ChannelSnapshot<B> {
    pub fn new(generation: u64, channels: Vec<ServiceChannel<B>>) -> Self {
        let mut order = Vec::with_capacity(channels.len());
        let mut map = HashMap::with_capacity(channels.len());
        for channel in channels {
            let name = channel.name().to_string();
            if map.insert(name.clone(), channel).is_none() {
                order.push(name);
            }
        }

        Self {
            generation,
            channels: map,
            order,
        }
    }

    /// Number of successful publishes that led to this snapshot, starting at 1
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, service_name: &str) -> Option<&ServiceChannel<B>> {
        self.channels.get(service_name)
    }

    pub fn contains(&self, service_name: &str) -> bool {
        self.channels.contains_key(service_name)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Channels in load order
    pub fn channels(&self) -> impl Iterator<Item = &ServiceChannel<B>> {
        self.order.iter().filter_map(|name| self.channels.get(name))
    }

    pub fn specs(&self) -> impl Iterator<Item = &ServiceChannelSpec> {
        self.channels().map(|channel| &channel.spec)
    }
}

/// Registry holding the currently visible snapshot.
///
/// Always holds a valid snapshot: it can only be created from a successfully
/// built first one.
pub struct ChannelRegistry<B> {
    current: ArcSwap<ChannelSnapshot<B>>,
    publish_lock: Mutex<()>,
}

impl<B> ChannelRegistry<B> {
    /// Create a registry whose first snapshot is built from `channels`
    pub fn new(channels: Vec<ServiceChannel<B>>) -> Self {
        let snapshot = ChannelSnapshot::new(1, channels);
        info!("Published channel snapshot 1 with {} services", snapshot.len());
        Self {
            current: ArcSwap::from_pointee(snapshot),
            publish_lock: Mutex::new(()),
        }
    }

    /// Get the current snapshot. Never blocks on a concurrent publish.
    pub fn current(&self) -> Arc<ChannelSnapshot<B>> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.current.load().generation()
    }

    /// Build and publish a new snapshot.
    ///
    /// Publishers are serialized; readers are never blocked. If `build` fails
    /// the current snapshot stays in place and the error is returned.
    pub fn rebuild<F>(&self, build: F) -> Result<Arc<ChannelSnapshot<B>>>
    where
        F: FnOnce() -> Result<Vec<ServiceChannel<B>>>,
    {
        let _guard = self.publish_lock.lock().unwrap_or_else(|e| e.into_inner());

        let channels = build()?;
        let generation = self.current.load().generation() + 1;
        let snapshot = Arc::new(ChannelSnapshot::new(generation, channels));

        let previous = self.current.swap(snapshot.clone());
        debug!(
            "Replaced channel snapshot {} ({} outstanding references)",
            previous.generation(),
            Arc::strong_count(&previous) - 1
        );
        info!(
            "Published channel snapshot {} with {} services",
            generation,
            snapshot.len()
        );

        Ok(snapshot)
    }
}
