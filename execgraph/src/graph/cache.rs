//! Memoised graph construction.

use super::{build_graph_with_config, Graph};
use crate::config::GraphConfig;
use crate::core::{ExecutionRecord, Status};
use crate::errors::GraphConstructionError;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::trace;

/// Fingerprint of a record set.
///
/// Two sets with the same `(id, updated_at, status)` triples, in any order,
/// share a version.
#[must_use]
pub fn record_set_version(records: &[ExecutionRecord]) -> String {
    let mut triples: Vec<(&str, i64, Status)> = records
        .iter()
        .map(|r| (r.id.as_str(), r.updated_at.timestamp_millis(), r.status))
        .collect();
    triples.sort_by(|a, b| a.0.cmp(b.0).then(a.1.cmp(&b.1)));

    let mut hasher = Sha256::new();
    for (id, updated_at, status) in triples {
        hasher.update(id.as_bytes());
        hasher.update(b":");
        hasher.update(updated_at.to_be_bytes());
        hasher.update(b":");
        hasher.update(status.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    root_id: String,
    partial: bool,
    version: String,
}

#[derive(Debug, Default)]
struct CacheState {
    graphs: HashMap<CacheKey, Arc<Graph>>,
    order: VecDeque<CacheKey>,
}

/// Bounded cache of built graphs, keyed by root, mode and record-set version.
///
/// Oldest entries are evicted first once `cache_capacity` is reached.
#[derive(Debug)]
pub struct GraphCache {
    config: GraphConfig,
    state: Mutex<CacheState>,
}

impl GraphCache {
    /// Creates a cache.
    #[must_use]
    pub fn new(config: GraphConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Returns the cached graph for these records, building it on a miss.
    ///
    /// Build errors are returned and never cached.
    pub fn get_or_build(
        &self,
        root_id: &str,
        records: &[ExecutionRecord],
        partial: bool,
    ) -> Result<Arc<Graph>, GraphConstructionError> {
        let key = CacheKey {
            root_id: root_id.to_string(),
            partial,
            version: record_set_version(records),
        };

        if let Some(graph) = self.state.lock().graphs.get(&key) {
            trace!(root_id, version = %key.version, "Graph cache hit");
            return Ok(Arc::clone(graph));
        }

        let graph = Arc::new(build_graph_with_config(
            root_id,
            records,
            partial,
            &self.config,
        )?);

        if self.config.cache_capacity == 0 {
            return Ok(graph);
        }

        let mut state = self.state.lock();
        if !state.graphs.contains_key(&key) {
            while state.order.len() >= self.config.cache_capacity {
                match state.order.pop_front() {
                    Some(evicted) => {
                        state.graphs.remove(&evicted);
                    }
                    None => break,
                }
            }
            state.order.push_back(key.clone());
        }
        state.graphs.insert(key, Arc::clone(&graph));
        Ok(graph)
    }

    /// Number of cached graphs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().graphs.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached graph.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.graphs.clear();
        state.order.clear();
    }
}

impl Default for GraphCache {
    fn default() -> Self {
        Self::new(GraphConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecutionMode;
    use crate::utils::from_epoch_millis;

    fn records() -> Vec<ExecutionRecord> {
        vec![
            ExecutionRecord::new("root", "root-node", ExecutionMode::Child)
                .created_at(from_epoch_millis(1).unwrap()),
            ExecutionRecord::new("step", "step-node", ExecutionMode::Sync)
                .with_parent("root")
                .created_at(from_epoch_millis(2).unwrap()),
        ]
    }

    #[test]
    fn test_version_ignores_order() {
        let forward = records();
        let mut backward = records();
        backward.reverse();
        assert_eq!(record_set_version(&forward), record_set_version(&backward));
        assert_eq!(record_set_version(&forward).len(), 64);
    }

    #[test]
    fn test_version_tracks_status_and_update() {
        let base = records();
        let mut changed = records();
        changed[1].status = Status::Succeeded;
        assert_ne!(record_set_version(&base), record_set_version(&changed));

        let mut touched = records();
        touched[1].updated_at = from_epoch_millis(50).unwrap();
        assert_ne!(record_set_version(&base), record_set_version(&touched));
    }

    #[test]
    fn test_hit_returns_same_graph() {
        let cache = GraphCache::default();
        let first = cache.get_or_build("root", &records(), false).unwrap();
        let second = cache.get_or_build("root", &records(), false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        let partial = cache.get_or_build("root", &records(), true).unwrap();
        assert!(!Arc::ptr_eq(&first, &partial));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = GraphCache::new(GraphConfig::default().with_cache_capacity(1));
        cache.get_or_build("root", &records(), false).unwrap();
        cache.get_or_build("step", &records(), true).unwrap();
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_errors_are_not_cached() {
        let cache = GraphCache::default();
        assert!(cache.get_or_build("missing", &records(), false).is_err());
        assert!(cache.is_empty());
    }
}
