pub mod patient;
pub mod profile;

pub use patient::{Appointment, Measurement, PatientId, PatientRecord};
pub use profile::{ProfileReport, Section, SectionStatus};
