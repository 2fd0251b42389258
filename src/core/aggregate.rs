//! Aggregation engine
//!
//! Builds a [`ProfileReport`] by asking the document store for the patient,
//! then fanning out to appointments, measurements and treating doctors.
//! Any backend may be down; the report carries a status per section instead
//! of failing the build.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::cache::ProfileCache;
use super::section::settle;
use crate::config::Config;
use crate::db::Backends;
use crate::error::{BackendError, ValidationError};
use crate::models::{PatientId, ProfileReport};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Per-query limit, applied to each backend call separately.
    pub query_timeout: Duration,
    /// Trailing window for measurements.
    pub window: Duration,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            query_timeout: config.engine.query_timeout(),
            window: config.timeseries.window(),
        }
    }
}

pub struct ProfileEngine {
    backends: Backends,
    settings: EngineSettings,
    cache: ProfileCache,
    inflight: DashMap<PatientId, Arc<Mutex<()>>>,
}

impl ProfileEngine {
    pub fn new(backends: Backends, settings: EngineSettings) -> Self {
        Self {
            backends,
            settings,
            cache: ProfileCache::new(),
            inflight: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }

    /// Build, or fetch from cache, the unified profile for `raw_name`.
    ///
    /// Only a malformed name is an error. Concurrent calls for the same
    /// patient share one build.
    #[instrument(skip(self, raw_name), fields(patient = %raw_name.trim()))]
    pub async fn build_profile(
        &self,
        raw_name: &str,
    ) -> Result<Arc<ProfileReport>, ValidationError> {
        let id = PatientId::parse(raw_name)?;

        if let Some(hit) = self.cache.get(&id) {
            debug!("Cache hit");
            return Ok(hit);
        }

        let lock = Arc::clone(&self.inflight.entry(id.clone()).or_default());
        let guard = lock.lock().await;

        // Another caller may have finished the build while we waited.
        let report = match self.cache.get(&id) {
            Some(hit) => {
                debug!("Cache filled by concurrent build");
                hit
            }
            None => {
                let report = Arc::new(self.assemble(&id).await);
                if report.is_cacheable() {
                    self.cache.put(id.clone(), Arc::clone(&report));
                }
                report
            }
        };

        drop(guard);
        drop(lock);
        self.inflight.remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);

        Ok(report)
    }

    async fn assemble(&self, id: &PatientId) -> ProfileReport {
        let timeout = self.settings.query_timeout;
        let window = self.settings.window;

        let record = settle("document", &self.backends.document, timeout, |store| async move {
            store.find_patient(id).await
        })
        .await;

        if record.status.is_ok() && record.data.is_none() {
            info!("Patient not found");
            return ProfileReport::not_found(id.clone());
        }

        let (appointments, measurements, doctors) = tokio::join!(
            settle("document", &self.backends.document, timeout, |store| async move {
                store.find_appointments(id).await
            }),
            settle("timeseries", &self.backends.timeseries, timeout, |store| async move {
                let mut samples = store.find_measurements(id, window).await?;
                samples.sort_by_key(|s| s.timestamp);
                Ok::<_, BackendError>(samples)
            }),
            settle("graph", &self.backends.graph, timeout, |store| async move {
                store.find_treating_doctors(id).await
            }),
        );

        let report = ProfileReport {
            patient: id.clone(),
            record,
            appointments,
            measurements,
            doctors,
        };

        if report.is_complete() {
            info!("Profile built");
        } else {
            warn!(
                degraded = report.degraded_sections().len(),
                "Profile built with degraded sections"
            );
        }
        report
    }
}
