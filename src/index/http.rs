//! Elasticsearch/OpenSearch REST adapter.
//!
//! Uses the single-document APIs:
//! - `GET /{index}/_doc/{id}`
//! - `PUT /{index}/_create/{id}`
//! - `POST /{index}/_update/{id}` (with `if_seq_no`/`if_primary_term`)
//! - `DELETE /{index}/_doc/{id}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{DocVersion, Document, IndexClient, IndexError, MergeOptions, Result};
use crate::config::IndexConfig;

/// Body of a `GET /{index}/_doc/{id}` response.
#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source", default)]
    source: Option<Map<String, Value>>,
    #[serde(rename = "_seq_no")]
    seq_no: Option<i64>,
    #[serde(rename = "_primary_term")]
    primary_term: Option<i64>,
}

/// REST client for a single Elasticsearch/OpenSearch cluster.
pub struct HttpIndex {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
    refresh: Option<String>,
}

impl HttpIndex {
    /// Create a client from index configuration.
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let base_url = Url::parse(&config.url)
            .map_err(|e| IndexError::Transport(format!("Invalid index url {}: {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(IndexError::Transport(format!(
                "Index url {} cannot be used as a base",
                config.url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
            refresh: config.refresh.clone(),
        })
    }

    /// Build a URL from path segments, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_ref()),
            None => builder,
        }
    }

    fn with_refresh(&self, mut url: Url) -> Url {
        if let Some(ref refresh) = self.refresh {
            url.query_pairs_mut().append_pair("refresh", refresh);
        }
        url
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        debug!(status = %response.status(), url = %response.url(), "Index response");
        Ok(response)
    }
}

/// Turn a non-success response into an error.
async fn backend_error(response: Response) -> IndexError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    IndexError::Backend { status, body }
}

#[async_trait]
impl IndexClient for HttpIndex {
    async fn get_by_id(&self, index: &str, id: &str) -> Result<Document> {
        let url = self.url(&[index, "_doc", id]);
        let response = self.send(self.request(Method::GET, url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(IndexError::not_found(index, id)),
            s if s.is_success() => {
                let body: GetResponse = response
                    .json()
                    .await
                    .map_err(|e| IndexError::Malformed(e.to_string()))?;
                if !body.found {
                    return Err(IndexError::not_found(index, id));
                }
                let version = match (body.seq_no, body.primary_term) {
                    (Some(seq_no), Some(primary_term)) => Some(DocVersion {
                        seq_no,
                        primary_term,
                    }),
                    _ => None,
                };
                Ok(Document {
                    id: body.id,
                    source: body.source.unwrap_or_default(),
                    version,
                })
            }
            _ => Err(backend_error(response).await),
        }
    }

    async fn create_by_id(&self, index: &str, id: &str, body: &Map<String, Value>) -> Result<()> {
        let url = self.with_refresh(self.url(&[index, "_create", id]));
        let response = self.send(self.request(Method::PUT, url).json(body)).await?;

        match response.status() {
            StatusCode::CONFLICT => Err(IndexError::conflict(index, id)),
            s if s.is_success() => Ok(()),
            _ => Err(backend_error(response).await),
        }
    }

    async fn upsert_merge(
        &self,
        index: &str,
        id: &str,
        partial: &Map<String, Value>,
        options: MergeOptions,
    ) -> Result<()> {
        let mut url = self.with_refresh(self.url(&[index, "_update", id]));
        if let Some(version) = options.if_version {
            url.query_pairs_mut()
                .append_pair("if_seq_no", &version.seq_no.to_string())
                .append_pair("if_primary_term", &version.primary_term.to_string());
        }
        let body = json!({
            "doc": partial,
            "doc_as_upsert": options.create_if_missing,
        });
        let response = self.send(self.request(Method::POST, url).json(&body)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(IndexError::not_found(index, id)),
            StatusCode::CONFLICT => Err(IndexError::version_conflict(index, id)),
            s if s.is_success() => Ok(()),
            _ => Err(backend_error(response).await),
        }
    }

    async fn delete_by_id(&self, index: &str, id: &str) -> Result<()> {
        let url = self.with_refresh(self.url(&[index, "_doc", id]));
        let response = self.send(self.request(Method::DELETE, url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(IndexError::not_found(index, id)),
            s if s.is_success() => Ok(()),
            _ => Err(backend_error(response).await),
        }
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let url = self.url(&[index]);
        let response = self.send(self.request(Method::HEAD, url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(backend_error(response).await),
        }
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        let url = self.url(&[index]);
        let response = self.send(self.request(Method::PUT, url)).await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(backend_error(response).await)
        }
    }

    async fn delete_index(&self, index: &str) -> Result<()> {
        let url = self.url(&[index]);
        let response = self.send(self.request(Method::DELETE, url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(IndexError::not_found(index, "_index")),
            s if s.is_success() => Ok(()),
            _ => Err(backend_error(response).await),
        }
    }
}
