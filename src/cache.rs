use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;
use uuid::Uuid;

pub const DASHBOARD_PATH: &str = "/dashboard";

/// Discards previously rendered output for the given paths.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, paths: &[String]);
}

pub fn patient_path(patient_id: Uuid) -> String {
    format!("{DASHBOARD_PATH}/patients/{patient_id}")
}

pub fn patient_readings_path(patient_id: Uuid) -> String {
    format!("{DASHBOARD_PATH}/patients/{patient_id}/readings")
}

/// Views that show a patient's readings, directly or as an aggregate.
pub fn patient_view_paths(patient_id: Uuid) -> Vec<String> {
    vec![
        patient_path(patient_id),
        patient_readings_path(patient_id),
        DASHBOARD_PATH.to_string(),
    ]
}

/// Rendered dashboard views, keyed by path and then by viewer.
///
/// Each path carries a generation that every invalidation bumps. A page
/// rendered under an older generation is not stored, so a render racing a
/// reading mutation cannot put stale output back after it was dropped.
#[derive(Debug, Default)]
pub struct PageCache {
    inner: RwLock<Pages>,
}

#[derive(Debug, Default)]
struct Pages {
    views: HashMap<String, HashMap<String, Value>>,
    generations: HashMap<String, u64>,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str, viewer: &str) -> Option<Value> {
        let pages = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        pages.views.get(path).and_then(|by_viewer| by_viewer.get(viewer)).cloned()
    }

    /// Read before rendering and hand back to [`PageCache::put`].
    pub fn generation(&self, path: &str) -> u64 {
        let pages = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        pages.generations.get(path).copied().unwrap_or(0)
    }

    /// Stores `page` unless `path` was invalidated since `generation` was read.
    pub fn put(&self, path: &str, viewer: &str, generation: u64, page: Value) -> bool {
        let mut pages = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if pages.generations.get(path).copied().unwrap_or(0) != generation {
            tracing::debug!(path, "Discarded view rendered before invalidation");
            return false;
        }
        pages
            .views
            .entry(path.to_string())
            .or_default()
            .insert(viewer.to_string(), page);
        true
    }

    pub fn contains(&self, path: &str) -> bool {
        let pages = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        pages.views.get(path).is_some_and(|by_viewer| !by_viewer.is_empty())
    }
}

impl CacheInvalidator for PageCache {
    fn invalidate(&self, paths: &[String]) {
        let mut pages = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for path in paths {
            *pages.generations.entry(path.clone()).or_default() += 1;
            if let Some(dropped) = pages.views.remove(path) {
                tracing::debug!(path = %path, entries = dropped.len(), "Invalidated cached view");
            }
        }
    }
}
