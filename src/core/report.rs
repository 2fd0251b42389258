//! Plain-text rendering and persistence of profile reports.

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::{PatientId, ProfileReport, SectionStatus};

const RULE_WIDTH: usize = 50;

/// Render a report as text: record, appointments, measurements, doctors, remarks.
pub fn render(report: &ProfileReport) -> String {
    report.to_string()
}

/// Write rendered text to `<dir>/<patient>.txt`, replacing any previous file.
pub async fn persist(dir: &Path, id: &PatientId, text: &str) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(artifact_name(id));
    tokio::fs::write(&path, text).await?;
    info!(path = %path.display(), "Report written");
    Ok(path)
}

/// File name for a patient's report.
///
/// Bytes outside `[A-Za-z0-9-]` are written as `_XX` (uppercase hex), so distinct
/// identifiers never share a file.
pub fn artifact_name(id: &PatientId) -> String {
    let mut stem = String::with_capacity(id.as_str().len());
    for byte in id.as_str().bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{:02X}", byte));
        }
    }
    format!("{}.txt", stem)
}

/// Placeholder line for a section whose backend did not answer.
fn placeholder(f: &mut Formatter<'_>, backend: &str, status: &SectionStatus) -> fmt::Result {
    match status {
        SectionStatus::Ok => Ok(()),
        SectionStatus::Unavailable(reason) => {
            writeln!(f, " - [unavailable] {} store is not connected ({})", backend, reason)
        }
        SectionStatus::Error(cause) => {
            writeln!(f, " - [error] {} query failed: {}", backend, cause)
        }
    }
}

impl Display for ProfileReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "Full Report for: {}", self.patient)?;
        writeln!(f, "{}", "=".repeat(RULE_WIDTH))?;

        if self.is_not_found() {
            return writeln!(f, "Patient not found in document store.");
        }

        writeln!(f, "Patient Record:")?;
        match &self.record.data {
            Some(record) if self.record.status.is_ok() => {
                let history = if record.medical_history.is_empty() {
                    "none".to_string()
                } else {
                    record.medical_history.join(", ")
                };
                writeln!(f, " - Name: {}", record.name)?;
                writeln!(f, " - Age: {}", record.age)?;
                writeln!(f, " - Region: {}", record.region)?;
                writeln!(f, " - Medical History: {}", history)?;
            }
            _ => placeholder(f, "document", &self.record.status)?,
        }

        writeln!(f)?;
        writeln!(f, "Appointments:")?;
        if self.appointments.status.is_ok() {
            if self.appointments.data.is_empty() {
                writeln!(f, " - No appointments found.")?;
            }
            for appt in &self.appointments.data {
                writeln!(f, " - {} | {}", appt.date, appt.department)?;
            }
        } else {
            placeholder(f, "document", &self.appointments.status)?;
        }

        writeln!(f)?;
        writeln!(f, "Measurements:")?;
        if self.measurements.status.is_ok() {
            if self.measurements.data.is_empty() {
                writeln!(f, " - No measurements in window.")?;
            }
            for m in &self.measurements.data {
                writeln!(
                    f,
                    " - {}: {} at {}",
                    m.field,
                    m.value,
                    m.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                )?;
            }
        } else {
            placeholder(f, "time-series", &self.measurements.status)?;
        }

        writeln!(f)?;
        writeln!(f, "Treated by Doctors:")?;
        if self.doctors.status.is_ok() {
            if self.doctors.data.is_empty() {
                writeln!(f, " - No doctors found.")?;
            }
            for doctor in &self.doctors.data {
                writeln!(f, " - {}", doctor)?;
            }
        } else {
            placeholder(f, "graph", &self.doctors.status)?;
        }

        writeln!(f)?;
        writeln!(f, "Remarks:")?;
        let degraded = self.degraded_sections();
        if degraded.is_empty() {
            writeln!(f, " - All backends responded.")?;
        }
        for (section, status) in degraded {
            let kind = match status {
                SectionStatus::Unavailable(_) => "backend unavailable",
                _ => "query failed",
            };
            writeln!(f, " - {} incomplete: {}", section, kind)?;
        }
        Ok(())
    }
}
