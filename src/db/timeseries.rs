//! Time-series adapter speaking the InfluxDB v2 HTTP API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::TimeSeriesStore;
use crate::config::TimeSeriesConfig;
use crate::error::BackendError;
use crate::models::{Measurement, PatientId};

const PATIENT_TAG: &str = "patient";

/// Measurements tagged by patient in one bucket.
pub struct InfluxTimeSeries {
    client: Client,
    base_url: Url,
    org: String,
    bucket: String,
    token: String,
    measurement: String,
}

impl InfluxTimeSeries {
    /// Build the client handle. No request is made.
    pub fn new(config: &TimeSeriesConfig) -> Result<Self, BackendError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| BackendError::Config("timeseries.url is not set".into()))?;
        let base_url = Url::parse(url)
            .map_err(|e| BackendError::Config(format!("timeseries.url {:?}: {}", url, e)))?;
        let org = config
            .org
            .clone()
            .ok_or_else(|| BackendError::Config("timeseries.org is not set".into()))?;
        let token = config
            .token
            .clone()
            .ok_or_else(|| BackendError::Config("timeseries.token is not set".into()))?;

        Ok(Self {
            client: Client::builder().build()?,
            base_url,
            org,
            bucket: config.bucket.clone(),
            token,
            measurement: config.measurement.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Config(format!("invalid endpoint {}: {}", path, e)))
    }

    fn flux_query(&self, id: &PatientId, window: Duration) -> String {
        format!(
            r#"from(bucket: "{bucket}")
  |> range(start: -{secs}s)
  |> filter(fn: (r) => r["_measurement"] == "{measurement}" and r["{tag}"] == "{patient}")"#,
            bucket = flux_escape(&self.bucket),
            secs = window.as_secs(),
            measurement = flux_escape(&self.measurement),
            tag = PATIENT_TAG,
            patient = flux_escape(id.as_str()),
        )
    }

    /// Write samples as line protocol with nanosecond precision.
    pub async fn write_measurements(&self, samples: &[Measurement]) -> Result<(), BackendError> {
        let body = samples
            .iter()
            .map(|s| self.line_protocol(s))
            .collect::<Result<Vec<_>, _>>()?
            .join("\n");

        let response = self
            .client
            .post(self.endpoint("api/v2/write")?)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Query(format!("write failed with {}: {}", status, body)));
        }
        Ok(())
    }

    fn line_protocol(&self, sample: &Measurement) -> Result<String, BackendError> {
        let nanos = sample
            .timestamp
            .timestamp_nanos_opt()
            .ok_or_else(|| {
                BackendError::Malformed(format!("timestamp out of range: {}", sample.timestamp))
            })?;
        Ok(format!(
            "{},{}={} {}={} {}",
            line_escape(&self.measurement),
            PATIENT_TAG,
            line_escape(&sample.patient),
            line_escape(&sample.field),
            sample.value,
            nanos
        ))
    }
}

#[async_trait]
impl TimeSeriesStore for InfluxTimeSeries {
    #[instrument(skip(self, id), fields(patient = %id))]
    async fn find_measurements(
        &self,
        id: &PatientId,
        window: Duration,
    ) -> Result<Vec<Measurement>, BackendError> {
        let body = json!({
            "query": self.flux_query(id, window),
            "type": "flux",
            "dialect": { "header": true, "annotations": [], "delimiter": "," },
        });

        let response = self
            .client
            .post(self.endpoint("api/v2/query")?)
            .query(&[("org", self.org.as_str())])
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(ACCEPT, "application/csv")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Query(format!("query failed with {}: {}", status, body)));
        }

        let text = response.text().await?;
        let samples = parse_csv(&text)?;
        debug!("{} samples returned", samples.len());
        Ok(samples)
    }
}

/// Column positions of one CSV table header.
struct Columns {
    time: usize,
    value: usize,
    field: usize,
    patient: usize,
}

impl Columns {
    fn from_header(cells: &[String]) -> Option<Self> {
        let find = |name: &str| cells.iter().position(|c| c == name);
        Some(Self {
            time: find("_time")?,
            value: find("_value")?,
            field: find("_field")?,
            patient: find(PATIENT_TAG)?,
        })
    }
}

/// Parse an un-annotated Flux CSV response. Each table may repeat its header.
fn parse_csv(text: &str) -> Result<Vec<Measurement>, BackendError> {
    let mut columns: Option<Columns> = None;
    let mut samples = Vec::new();

    for line in text.lines().map(|l| l.trim_end_matches('\r')) {
        if line.is_empty() {
            continue;
        }
        let cells = split_row(line)?;
        if let Some(header) = Columns::from_header(&cells) {
            columns = Some(header);
            continue;
        }
        let cols = columns
            .as_ref()
            .ok_or_else(|| BackendError::Malformed("data row before CSV header".into()))?;
        let cell = |i: usize| {
            cells
                .get(i)
                .map(String::as_str)
                .ok_or_else(|| BackendError::Malformed(format!("short CSV row: {}", line)))
        };

        let timestamp = DateTime::parse_from_rfc3339(cell(cols.time)?)
            .map_err(|e| BackendError::Malformed(format!("bad _time: {}", e)))?
            .with_timezone(&Utc);
        let value = cell(cols.value)?
            .parse::<f64>()
            .map_err(|e| BackendError::Malformed(format!("bad _value: {}", e)))?;

        samples.push(Measurement {
            patient: cell(cols.patient)?.to_string(),
            field: cell(cols.field)?.to_string(),
            value,
            timestamp,
        });
    }

    Ok(samples)
}

/// Split one RFC 4180 row. Quoted cells may hold commas and `""` escapes.
fn split_row(line: &str) -> Result<Vec<String>, BackendError> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (quoted, c) {
            (true, '"') if chars.peek() == Some(&'"') => {
                chars.next();
                cell.push('"');
            }
            (true, '"') => quoted = false,
            (true, c) => cell.push(c),
            (false, '"') if cell.is_empty() => quoted = true,
            (false, ',') => cells.push(std::mem::take(&mut cell)),
            (false, c) => cell.push(c),
        }
    }
    if quoted {
        return Err(BackendError::Malformed(format!("unterminated quote in CSV row: {}", line)));
    }
    cells.push(cell);
    Ok(cells)
}

/// Escape a value for a Flux string literal, including `${` interpolation.
fn flux_escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace("${", "\\${")
}

fn line_escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
