//! Graph adapter over the Neo4j HTTP transactional endpoint.
//!
//! Relationships point from doctor to patient: `(:Doctor)-[:TREATS]->(:Patient)`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tracing::{debug, info, instrument};
use url::Url;

use super::GraphStore;
use crate::config::GraphConfig;
use crate::error::BackendError;
use crate::models::PatientId;

const TREATING_DOCTORS: &str =
    "MATCH (d:Doctor)-[:TREATS]->(p:Patient {name: $name}) RETURN d.name AS doctor";

const DOCTOR_NAME_INDEX: &str =
    "CREATE INDEX doctor_name_index IF NOT EXISTS FOR (d:Doctor) ON (d.name)";

const LINK_DOCTOR: &str = "MERGE (d:Doctor {name: $doctor})
MERGE (p:Patient {name: $patient})
MERGE (d)-[:TREATS]->(p)";

#[derive(Serialize)]
struct Statement<'a> {
    statement: &'a str,
    parameters: Value,
}

#[derive(Serialize)]
struct CommitRequest<'a> {
    statements: Vec<Statement<'a>>,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<ResultSet>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Deserialize)]
struct ResultSet {
    #[serde(default)]
    data: Vec<Row>,
}

#[derive(Deserialize)]
struct Row {
    row: Vec<Value>,
}

#[derive(Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

/// Doctor/patient graph in one Neo4j database.
pub struct Neo4jGraph {
    client: Client,
    commit_url: Url,
    user: String,
    password: String,
}

impl Neo4jGraph {
    /// Build the client handle. No request is made.
    pub fn new(config: &GraphConfig) -> Result<Self, BackendError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| BackendError::Config("graph.url is not set".into()))?;
        let commit_url = Url::parse(url)
            .and_then(|base| base.join(&format!("db/{}/tx/commit", config.database)))
            .map_err(|e| BackendError::Config(format!("graph.url {:?}: {}", url, e)))?;
        let user = config
            .user
            .clone()
            .ok_or_else(|| BackendError::Config("graph.user is not set".into()))?;
        let password = config
            .password
            .clone()
            .ok_or_else(|| BackendError::Config("graph.password is not set".into()))?;

        Ok(Self {
            client: Client::builder().build()?,
            commit_url,
            user,
            password,
        })
    }

    /// Run statements in one auto-committed transaction.
    async fn commit(&self, statements: Vec<Statement<'_>>) -> Result<Vec<ResultSet>, BackendError> {
        let response = self
            .client
            .post(self.commit_url.clone())
            .basic_auth(&self.user, Some(&self.password))
            .json(&CommitRequest { statements })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Query(format!("commit failed with {}: {}", status, body)));
        }

        let parsed: CommitResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        if let Some(err) = parsed.errors.first() {
            return Err(BackendError::Query(format!("{}: {}", err.code, err.message)));
        }
        Ok(parsed.results)
    }

    /// Create the doctor name index if absent.
    pub async fn ensure_schema(&self) -> Result<(), BackendError> {
        self.commit(vec![Statement {
            statement: DOCTOR_NAME_INDEX,
            parameters: json!({}),
        }])
        .await?;
        debug!("Graph schema ensured");
        Ok(())
    }

    /// Idempotently record that `doctor` treats `patient`.
    pub async fn link_doctor(&self, doctor: &str, patient: &PatientId) -> Result<(), BackendError> {
        self.commit(vec![Statement {
            statement: LINK_DOCTOR,
            parameters: json!({ "doctor": doctor, "patient": patient.as_str() }),
        }])
        .await?;
        info!("Linked {} -> {}", doctor, patient);
        Ok(())
    }
}

#[async_trait]
impl GraphStore for Neo4jGraph {
    #[instrument(skip(self, id), fields(patient = %id))]
    async fn find_treating_doctors(
        &self,
        id: &PatientId,
    ) -> Result<BTreeSet<String>, BackendError> {
        let results = self
            .commit(vec![Statement {
                statement: TREATING_DOCTORS,
                parameters: json!({ "name": id.as_str() }),
            }])
            .await?;

        let rows = results.into_iter().next().map(|r| r.data).unwrap_or_default();
        rows.into_iter()
            .map(|row| match row.row.first() {
                Some(Value::String(name)) => Ok(name.clone()),
                other => Err(BackendError::Malformed(format!(
                    "unexpected doctor cell: {:?}",
                    other
                ))),
            })
            .collect()
    }
}
