//! Upstream fetcher: refresh canonical sources that declare an `upstream_url`.

use reqwest::Client;
use serde::Serialize;
use tracing::{info, instrument, warn};

use nbpublish_shared::{FetchConfig, PublishError, Result};

use crate::files::write_atomic;
use crate::manifest::{ManifestEntry, ManifestStore};

/// Per-entry result of a pull.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PullStatus {
    Updated { bytes: usize },
    Unchanged,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct PullOutcome {
    pub id: String,
    #[serde(flatten)]
    pub status: PullStatus,
}

/// Outcomes for every entry that was fetched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PullReport {
    pub outcomes: Vec<PullOutcome>,
}

impl PullReport {
    pub fn is_success(&self) -> bool {
        !self
            .outcomes
            .iter()
            .any(|o| matches!(o.status, PullStatus::Failed { .. }))
    }

    pub fn failed_ids(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, PullStatus::Failed { .. }))
            .map(|o| o.id.as_str())
            .collect()
    }
}

/// Download every selected entry's upstream source over its `source_path`.
///
/// `only` restricts the pull to the named ids; naming an unknown id or one
/// without an `upstream_url` is a manifest error. One failed download does
/// not stop the others.
#[instrument(skip_all, fields(only = only.len()))]
pub async fn pull(store: &ManifestStore, only: &[String], config: &FetchConfig) -> Result<PullReport> {
    let selected = select(store, only)?;
    let client = build_client(config)?;
    let mut report = PullReport::default();

    for entry in selected {
        let Some(url) = &entry.upstream_url else {
            continue;
        };

        let status = match fetch(&client, url.as_str()).await {
            Ok(body) => match store_source(entry, &body) {
                Ok(true) => PullStatus::Updated { bytes: body.len() },
                Ok(false) => PullStatus::Unchanged,
                Err(e) => PullStatus::Failed { error: e.to_string() },
            },
            Err(e) => PullStatus::Failed { error: e.to_string() },
        };

        match &status {
            PullStatus::Failed { error } => warn!(id = %entry.id, %url, %error, "pull failed"),
            other => info!(id = %entry.id, %url, ?other, "pulled source"),
        }
        report.outcomes.push(PullOutcome {
            id: entry.id.clone(),
            status,
        });
    }

    Ok(report)
}

fn select<'a>(store: &'a ManifestStore, only: &[String]) -> Result<Vec<&'a ManifestEntry>> {
    if only.is_empty() {
        return Ok(store
            .entries()
            .iter()
            .filter(|e| e.upstream_url.is_some())
            .collect());
    }

    only.iter()
        .map(|id| match store.entry(id) {
            Some(entry) if entry.upstream_url.is_some() => Ok(entry),
            Some(_) => Err(PublishError::manifest(format!("entry '{id}' has no upstream_url"))),
            None => Err(PublishError::manifest(format!("no manifest entry with id '{id}'"))),
        })
        .collect()
}

/// Build a reqwest client with appropriate settings.
fn build_client(config: &FetchConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| PublishError::Network(format!("failed to build HTTP client: {e}")))
}

async fn fetch(client: &Client, url: &str) -> Result<Vec<u8>> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| PublishError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(PublishError::Network(format!("{url}: HTTP {status}")));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| PublishError::Network(format!("{url}: failed to read body: {e}")))?;
    Ok(body.to_vec())
}

/// Write the body unless the file already holds exactly these bytes.
fn store_source(entry: &ManifestEntry, body: &[u8]) -> Result<bool> {
    if std::fs::read(&entry.source_path).is_ok_and(|existing| existing == body) {
        return Ok(false);
    }
    write_atomic(&entry.source_path, body)?;
    Ok(true)
}
