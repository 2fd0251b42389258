use std::collections::BTreeSet;

use super::patient::{Appointment, Measurement, PatientId, PatientRecord};

/// Outcome of the backend query behind one report section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionStatus {
    Ok,
    /// The backend never connected at startup; no query was attempted.
    Unavailable(String),
    /// The query failed or timed out.
    Error(String),
}

impl SectionStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, SectionStatus::Ok)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SectionStatus::Error(_))
    }
}

/// Data contributed by one backend, paired with how the query went.
#[derive(Debug, Clone, PartialEq)]
pub struct Section<T> {
    pub data: T,
    pub status: SectionStatus,
}

impl<T: Default> Section<T> {
    pub fn ok(data: T) -> Self {
        Self {
            data,
            status: SectionStatus::Ok,
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            data: T::default(),
            status: SectionStatus::Unavailable(reason.into()),
        }
    }

    pub fn failed(cause: impl Into<String>) -> Self {
        Self {
            data: T::default(),
            status: SectionStatus::Error(cause.into()),
        }
    }
}

/// The merged patient view.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileReport {
    pub patient: PatientId,
    pub record: Section<Option<PatientRecord>>,
    pub appointments: Section<Vec<Appointment>>,
    /// Ascending by timestamp.
    pub measurements: Section<Vec<Measurement>>,
    pub doctors: Section<BTreeSet<String>>,
}

impl ProfileReport {
    /// Terminal report for a patient the document store does not know.
    pub fn not_found(patient: PatientId) -> Self {
        Self {
            patient,
            record: Section::ok(None),
            appointments: Section::ok(Vec::new()),
            measurements: Section::ok(Vec::new()),
            doctors: Section::ok(BTreeSet::new()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.record.status.is_ok() && self.record.data.is_none()
    }

    /// Sections whose backend did not answer, in report order.
    pub fn degraded_sections(&self) -> Vec<(&'static str, &SectionStatus)> {
        [
            ("Patient record", &self.record.status),
            ("Appointments", &self.appointments.status),
            ("Measurements", &self.measurements.status),
            ("Treating doctors", &self.doctors.status),
        ]
        .into_iter()
        .filter(|(_, status)| !status.is_ok())
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.degraded_sections().is_empty()
    }

    /// Worth keeping for later calls: the record was found and no query
    /// failed. `Unavailable` sections stay unavailable for the whole run.
    pub fn is_cacheable(&self) -> bool {
        self.record.data.is_some()
            && !self.degraded_sections().iter().any(|(_, status)| status.is_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn found() -> ProfileReport {
        let patient = PatientId::parse("Ahmed Mohamed").unwrap();
        let mut report = ProfileReport::not_found(patient);
        report.record = Section::ok(Some(PatientRecord {
            name: "Ahmed Mohamed".to_string(),
            age: 35,
            medical_history: Vec::new(),
            region: "North".to_string(),
        }));
        report
    }

    #[test]
    fn complete_report_is_cacheable() {
        assert!(found().is_cacheable());
    }

    #[test]
    fn not_found_is_not_cacheable() {
        let report = ProfileReport::not_found(PatientId::parse("Unknown Person").unwrap());
        assert!(!report.is_cacheable());
    }

    #[test]
    fn failed_query_is_not_cacheable() {
        let mut report = found();
        report.doctors = Section::failed("connection reset");
        assert!(!report.is_cacheable());
        assert_eq!(report.degraded_sections().len(), 1);
    }

    #[test]
    fn unavailable_backend_stays_cacheable() {
        let mut report = found();
        report.measurements = Section::unavailable("connection refused");
        assert!(report.is_cacheable());
        assert!(!report.is_complete());
    }
}
