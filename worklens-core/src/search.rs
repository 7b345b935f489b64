// src/search.rs
//
// Write-through search index collaborator. Employee writes upsert documents
// fire-and-forget; an index outage must never fail the write itself.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmployeeDocument {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub position: Option<String>,
    pub department: Option<String>,
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("index request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("index rejected the request with status {status}")]
    Rejected { status: u16 },
    #[error("invalid index endpoint: {0}")]
    BadEndpoint(#[from] url::ParseError),
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn upsert_employee_document(&self, doc: &EmployeeDocument) -> Result<(), SearchError>;
    async fn remove_document(&self, id: Uuid) -> Result<(), SearchError>;
    async fn query(&self, q: &str, limit: usize) -> Result<Vec<EmployeeDocument>, SearchError>;
}

/// Local index: lowercased substring match over the document fields.
pub struct MemoryIndex {
    docs: Mutex<HashMap<Uuid, EmployeeDocument>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    async fn upsert_employee_document(&self, doc: &EmployeeDocument) -> Result<(), SearchError> {
        self.docs.lock().unwrap().insert(doc.id, doc.clone());
        Ok(())
    }

    async fn remove_document(&self, id: Uuid) -> Result<(), SearchError> {
        self.docs.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn query(&self, q: &str, limit: usize) -> Result<Vec<EmployeeDocument>, SearchError> {
        let needle = q.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self.docs.lock().unwrap();
        let mut hits: Vec<EmployeeDocument> = docs
            .values()
            .filter(|d| {
                d.name.to_lowercase().contains(&needle)
                    || d.email.contains(&needle)
                    || d.position
                        .as_deref()
                        .map_or(false, |p| p.to_lowercase().contains(&needle))
                    || d.department
                        .as_deref()
                        .map_or(false, |p| p.to_lowercase().contains(&needle))
            })
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.email.cmp(&b.email)));
        hits.truncate(limit);
        Ok(hits)
    }
}

/// Remote index spoken to over HTTP: `PUT /documents/{id}`,
/// `DELETE /documents/{id}`, `GET /search?q=&limit=`.
pub struct HttpIndex {
    client: Client,
    base: Url,
}

impl HttpIndex {
    pub fn new(base: Url) -> Self {
        Self {
            client: Client::new(),
            base,
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, SearchError> {
        Ok(self.base.join(path)?)
    }
}

#[async_trait]
impl SearchIndex for HttpIndex {
    async fn upsert_employee_document(&self, doc: &EmployeeDocument) -> Result<(), SearchError> {
        let url = self.endpoint(&format!("documents/{}", doc.id))?;
        let response = self.client.put(url).json(doc).send().await?;
        if !response.status().is_success() {
            return Err(SearchError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn remove_document(&self, id: Uuid) -> Result<(), SearchError> {
        let url = self.endpoint(&format!("documents/{id}"))?;
        let response = self.client.delete(url).send().await?;
        if !response.status().is_success() {
            return Err(SearchError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }

    async fn query(&self, q: &str, limit: usize) -> Result<Vec<EmployeeDocument>, SearchError> {
        let url = self.endpoint("search")?;
        let limit = limit.to_string();
        let response = self
            .client
            .get(url)
            .query(&[("q", q), ("limit", limit.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SearchError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}
