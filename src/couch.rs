//! Thin CouchDB client for the credential key store.
//!
//! Covers what the installer and the analyzer need: a reachability check,
//! database create/delete, design-document installation, and bulk document
//! retrieval via `_all_docs`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::design::DesignDocument;
use crate::document::CredsDocument;

/// Anything that can produce the document collection to run a view over.
/// Lets the CLI and tests swap the HTTP store for a local source.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch_documents(&self, database: &str) -> Result<Vec<CredsDocument>>;
}

#[derive(Deserialize)]
struct AllDocsRow {
    id: String,
    doc: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

pub struct CouchClient {
    base_url: String,
    http: reqwest::Client,
}

impl CouchClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Returns `true` if a CouchDB server answers on the base URL.
    pub async fn is_accessible(&self) -> bool {
        match self.http.get(&self.base_url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn create_database(&self, database: &str) -> Result<()> {
        let url = format!("{}/{}", self.base_url, database);
        let resp = self
            .http
            .put(&url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send create request: {}", e))?;

        if resp.status() != reqwest::StatusCode::CREATED {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Failed to create database '{}', status {}: {}",
                database,
                status,
                body
            ));
        }
        Ok(())
    }

    pub async fn delete_database(&self, database: &str) -> Result<()> {
        let url = format!("{}/{}", self.base_url, database);
        let resp = self
            .http
            .delete(&url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send delete request: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Failed to delete database '{}', status {}: {}",
                database,
                status,
                body
            ));
        }
        Ok(())
    }

    /// PUTs `design_doc` as `_design/{name}`, as the installer does.
    pub async fn install_design_doc(
        &self,
        database: &str,
        name: &str,
        design_doc: &DesignDocument,
    ) -> Result<()> {
        let url = format!("{}/{}/_design/{}", self.base_url, database, name);
        let resp = self
            .http
            .put(&url)
            .header("Content-Type", "application/json; charset=utf8")
            .json(design_doc)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send design doc: {}", e))?;

        if resp.status() != reqwest::StatusCode::CREATED {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Failed to create design doc '{}', status {}: {}",
                url,
                status,
                body
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentSource for CouchClient {
    /// Fetches every document in `database` via `_all_docs?include_docs=true`.
    /// Design documents are skipped; everything else must deserialize.
    async fn fetch_documents(&self, database: &str) -> Result<Vec<CredsDocument>> {
        let url = format!("{}/{}/_all_docs?include_docs=true", self.base_url, database);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send request: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "_all_docs returned status {}: {}",
                status,
                body
            ));
        }

        let all_docs: AllDocsResponse = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse _all_docs response: {}", e))?;

        let mut docs = Vec::new();
        for row in all_docs.rows {
            if row.id.starts_with("_design/") {
                continue;
            }
            let Some(doc) = row.doc else { continue };
            docs.push(serde_json::from_value(doc)?);
        }
        Ok(docs)
    }
}
