//! Document store adapter backed by SQLite.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info, instrument};

use super::DocumentStore;
use crate::error::BackendError;
use crate::models::{Appointment, PatientId, PatientRecord};

#[derive(FromRow)]
struct PatientRow {
    name: String,
    age: i64,
    medical_history: String,
    region: String,
}

impl TryFrom<PatientRow> for PatientRecord {
    type Error = BackendError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        let age = u32::try_from(row.age)
            .map_err(|_| {
                BackendError::Malformed(format!("invalid age {} for {}", row.age, row.name))
            })?;
        let medical_history = serde_json::from_str(&row.medical_history)
            .map_err(|e| {
                BackendError::Malformed(format!("medical history for {}: {}", row.name, e))
            })?;

        Ok(PatientRecord {
            name: row.name,
            age,
            medical_history,
            region: row.region,
        })
    }
}

/// `patients` and `appointments` collections in a SQLite database.
#[derive(Clone)]
pub struct SqliteDocuments {
    pool: SqlitePool,
}

impl SqliteDocuments {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, BackendError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Insert a patient. Fails on a duplicate name because of the unique index.
    pub async fn insert_patient(&self, patient: &PatientRecord) -> Result<(), BackendError> {
        let history = serde_json::to_string(&patient.medical_history)
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        sqlx::query("INSERT INTO patients (name, age, medical_history, region) VALUES (?, ?, ?, ?)")
            .bind(&patient.name)
            .bind(i64::from(patient.age))
            .bind(history)
            .bind(&patient.region)
            .execute(&self.pool)
            .await?;

        info!("Patient stored: {}", patient.name);
        Ok(())
    }

    pub async fn insert_appointment(&self, appointment: &Appointment) -> Result<(), BackendError> {
        sqlx::query("INSERT INTO appointments (patient_name, date, department) VALUES (?, ?, ?)")
            .bind(&appointment.patient_name)
            .bind(&appointment.date)
            .bind(&appointment.department)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteDocuments {
    async fn ping(&self) -> Result<(), BackendError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn ensure_indexes(&self) -> Result<(), BackendError> {
        // Patients table
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS patients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                age INTEGER NOT NULL,
                medical_history TEXT NOT NULL DEFAULT '[]',
                region TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS patients_name_idx ON patients (name)")
            .execute(&self.pool)
            .await?;

        // Appointments table
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS appointments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                patient_name TEXT NOT NULL,
                date TEXT NOT NULL,
                department TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS appointments_patient_idx ON appointments (patient_name)",
        )
        .execute(&self.pool)
        .await?;

        debug!("Document indexes ensured");
        Ok(())
    }

    #[instrument(skip(self, id), fields(patient = %id))]
    async fn find_patient(&self, id: &PatientId) -> Result<Option<PatientRecord>, BackendError> {
        let row = sqlx::query_as::<_, PatientRow>(
            "SELECT name, age, medical_history, region FROM patients WHERE name = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PatientRecord::try_from).transpose()
    }

    #[instrument(skip(self, id), fields(patient = %id))]
    async fn find_appointments(&self, id: &PatientId) -> Result<Vec<Appointment>, BackendError> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT patient_name, date, department FROM appointments
             WHERE patient_name = ?
             ORDER BY id",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(patient_name, date, department)| Appointment {
                patient_name,
                date,
                department,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteDocuments {
        let store = SqliteDocuments::connect("sqlite::memory:", 1).await.unwrap();
        store.ensure_indexes().await.unwrap();
        store
    }

    fn ahmed() -> PatientRecord {
        PatientRecord {
            name: "Ahmed Mohamed".to_string(),
            age: 35,
            medical_history: vec!["Diabetes".to_string(), "High Blood Pressure".to_string()],
            region: "North".to_string(),
        }
    }

    fn appointment(date: &str, department: &str) -> Appointment {
        Appointment {
            patient_name: "Ahmed Mohamed".to_string(),
            date: date.to_string(),
            department: department.to_string(),
        }
    }

    #[tokio::test]
    async fn finds_stored_patient() {
        let store = store().await;
        store.insert_patient(&ahmed()).await.unwrap();

        let id = PatientId::parse("Ahmed Mohamed").unwrap();
        assert_eq!(store.find_patient(&id).await.unwrap(), Some(ahmed()));
    }

    #[tokio::test]
    async fn missing_patient_is_none() {
        let store = store().await;
        let id = PatientId::parse("Unknown Person").unwrap();
        assert_eq!(store.find_patient(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn name_index_rejects_duplicates() {
        let store = store().await;
        store.insert_patient(&ahmed()).await.unwrap();
        assert!(matches!(
            store.insert_patient(&ahmed()).await,
            Err(BackendError::Database(_))
        ));
    }

    #[tokio::test]
    async fn ensure_indexes_is_idempotent() {
        let store = store().await;
        store.ensure_indexes().await.unwrap();
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn appointments_keep_insertion_order() {
        let store = store().await;
        store.insert_appointment(&appointment("2025-06-01", "Endocrinology")).await.unwrap();
        store.insert_appointment(&appointment("2025-05-20", "Cardiology")).await.unwrap();

        let id = PatientId::parse("Ahmed Mohamed").unwrap();
        let found = store.find_appointments(&id).await.unwrap();
        let departments: Vec<_> = found.iter().map(|a| a.department.as_str()).collect();
        assert_eq!(departments, ["Endocrinology", "Cardiology"]);
    }

    #[tokio::test]
    async fn corrupt_history_is_malformed() {
        let store = store().await;
        sqlx::query(
            "INSERT INTO patients (name, age, medical_history, region)
             VALUES ('Lina Hamed', 29, 'not json', 'South')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let id = PatientId::parse("Lina Hamed").unwrap();
        assert!(matches!(
            store.find_patient(&id).await,
            Err(BackendError::Malformed(_))
        ));
    }
}
