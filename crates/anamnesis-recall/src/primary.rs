use std::sync::Mutex;
use std::time::{Duration, Instant};

use anamnesis_core::ids::EntityUuid;
use anamnesis_texture::TextureStore;
use tracing::instrument;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// The one long-lived mutable singleton in this codebase: a cached lookup
/// of the primary entity's graph node, so identity-centric retrieval
/// doesn't re-query L3 on every recall. Must be invalidated whenever a
/// dedup merge could have changed the primary entity's uuid, and expires
/// on its own even absent invalidation.
pub struct PrimaryEntityCache {
    entry: Mutex<Option<(EntityUuid, Instant)>>,
    ttl: Duration,
}

impl PrimaryEntityCache {
    pub fn new() -> Self {
        Self {
            entry: Mutex::new(None),
            ttl: DEFAULT_TTL,
        }
    }

    #[instrument(skip(self, store))]
    pub async fn resolve(&self, store: &TextureStore, primary_entity_name: &str) -> anamnesis_texture::Result<Option<EntityUuid>> {
        if let Some(uuid) = self.cached() {
            return Ok(Some(uuid));
        }
        let node = store.find_entity_by_name(primary_entity_name, &[]).await?;
        let uuid = node.map(|n| n.uuid);
        if let Some(uuid) = &uuid {
            let mut entry = self.entry.lock().unwrap();
            *entry = Some((uuid.clone(), Instant::now()));
        }
        Ok(uuid)
    }

    fn cached(&self) -> Option<EntityUuid> {
        let entry = self.entry.lock().unwrap();
        match &*entry {
            Some((uuid, fetched_at)) if fetched_at.elapsed() < self.ttl => Some(uuid.clone()),
            _ => None,
        }
    }

    /// Called by the dedup pass whenever a merge might have touched the
    /// primary entity.
    pub fn invalidate(&self) {
        let mut entry = self.entry.lock().unwrap();
        *entry = None;
    }
}

impl Default for PrimaryEntityCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalidate_clears_cached_entry() {
        let cache = PrimaryEntityCache::new();
        *cache.entry.lock().unwrap() = Some((EntityUuid("x".into()), Instant::now()));
        assert!(cache.cached().is_some());
        cache.invalidate();
        assert!(cache.cached().is_none());
    }
}
