use dashmap::DashMap;
use std::sync::Arc;

use crate::models::{PatientId, ProfileReport};

/// Finished reports keyed by normalized patient name.
///
/// Entries live until the owning engine is dropped. There is no TTL and no
/// eviction, so a record changed in a backend after its first build is not
/// seen again in this process.
#[derive(Default)]
pub struct ProfileCache {
    entries: DashMap<PatientId, Arc<ProfileReport>>,
}

impl ProfileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PatientId) -> Option<Arc<ProfileReport>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Last write wins.
    pub fn put(&self, key: PatientId, report: Arc<ProfileReport>) {
        self.entries.insert(key, report);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
