use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

/// Shortest accepted patient name, counted in characters after trimming.
pub const MIN_IDENTIFIER_LEN: usize = 2;

/// Normalized patient key: trimmed, case preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatientId(String);

impl PatientId {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        let len = trimmed.chars().count();
        if len < MIN_IDENTIFIER_LEN {
            return Err(ValidationError::TooShort {
                len,
                min: MIN_IDENTIFIER_LEN,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub name: String,
    pub age: u32,
    pub medical_history: Vec<String>,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub patient_name: String,
    pub date: String,
    pub department: String,
}

/// One vital-sign sample, e.g. `heart_rate = 72`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub patient: String,
    pub field: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}
