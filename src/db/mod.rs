//! Backend adapters and connection supervision.
//!
//! Each store sits behind a narrow async trait so the aggregation engine only
//! sees the queries it needs. Connections are owned here for the process
//! lifetime and shared read-only.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::error::BackendError;
use crate::models::{Appointment, Measurement, PatientId, PatientRecord};

pub mod documents;
pub mod graph;
pub mod supervisor;
pub mod timeseries;

pub use documents::SqliteDocuments;
pub use graph::Neo4jGraph;
pub use supervisor::{ConnectionSupervisor, RetryPolicy};
pub use timeseries::InfluxTimeSeries;

/// Patient records and appointments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Lightweight liveness probe.
    async fn ping(&self) -> Result<(), BackendError>;

    /// Create-if-absent for the collections and the unique index on patient name.
    async fn ensure_indexes(&self) -> Result<(), BackendError>;

    async fn find_patient(&self, id: &PatientId) -> Result<Option<PatientRecord>, BackendError>;

    /// Appointments in store order.
    async fn find_appointments(&self, id: &PatientId) -> Result<Vec<Appointment>, BackendError>;
}

/// Vital-sign samples. Results are not ordered.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn find_measurements(
        &self,
        id: &PatientId,
        window: Duration,
    ) -> Result<Vec<Measurement>, BackendError>;
}

/// Doctor/patient treatment relationships.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Names of doctors with a `TREATS` edge to the patient, de-duplicated.
    async fn find_treating_doctors(&self, id: &PatientId) -> Result<BTreeSet<String>, BackendError>;
}

/// A backend handle, or the reason it could not be reached at startup.
pub enum Backend<T: ?Sized> {
    Live(Arc<T>),
    Unavailable(String),
}

impl<T: ?Sized> Backend<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Backend::Live(_))
    }
}

impl<T: ?Sized> Clone for Backend<T> {
    fn clone(&self) -> Self {
        match self {
            Backend::Live(store) => Backend::Live(Arc::clone(store)),
            Backend::Unavailable(reason) => Backend::Unavailable(reason.clone()),
        }
    }
}

/// The three backends as produced by the [`ConnectionSupervisor`].
#[derive(Clone)]
pub struct Backends {
    pub document: Backend<dyn DocumentStore>,
    pub timeseries: Backend<dyn TimeSeriesStore>,
    pub graph: Backend<dyn GraphStore>,
}
