use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    adaptive::AdaptiveCache,
    geo::{location_from_response, GeoProvider},
};
use crate::{
    error::AppError,
    models::Location,
    storage::{NodeFilter, Storage},
};

/// Resolves node addresses to locations: cache first, then any stored node
/// at that address, then the external provider. Only successful lookups are
/// cached.
pub struct GeolocationCache {
    cache: Mutex<AdaptiveCache<String, Location>>,
    storage: Arc<dyn Storage>,
    provider: Arc<dyn GeoProvider>,
}

impl GeolocationCache {
    pub fn new(
        capacity: usize,
        storage: Arc<dyn Storage>,
        provider: Arc<dyn GeoProvider>,
    ) -> Result<Self, AppError> {
        Ok(GeolocationCache {
            cache: Mutex::new(AdaptiveCache::new(capacity)?),
            storage,
            provider,
        })
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn get(&self, address: &str) -> Result<Location, AppError> {
        let key = address.to_string();

        // the lock is released before any await below
        let cached = self.cache.lock().get(&key);
        if let Some(location) = cached {
            return Ok(location);
        }

        let location = match self.storage.query_node(&NodeFilter::by_address(address)).await? {
            Some(node) if node.location.has_coordinates() => node.location,
            _ => {
                let resp = self.provider.check(address).await?;
                location_from_response(&resp)
            }
        };

        self.cache.lock().put(key, location.clone());
        Ok(location)
    }
}
