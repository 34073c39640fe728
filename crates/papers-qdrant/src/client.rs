use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{QdrantError, Result};
use crate::types::{
    ApiResponse, CollectionInfo, CountRequest, CountResult, CreateCollection, DeletePoints,
    ErrorEnvelope, PointId, PointStruct, ScoredPoint, SearchRequest, UpsertPoints, VectorParams,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:6333";

/// Client for the Qdrant REST API.
#[derive(Debug, Clone)]
pub struct QdrantClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl Default for QdrantClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QdrantClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("api-key", key),
            None => req,
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/collections/{}", self.base_url, collection)
    }

    // ── Collections ──────────────────────────────────────────────────

    /// `GET /collections/{name}`. Returns `None` when the collection does not exist.
    pub async fn collection_info(&self, collection: &str) -> Result<Option<CollectionInfo>> {
        let req = self.http.get(self.collection_url(collection));
        let resp = self.authorize(req).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let info: CollectionInfo = decode(resp).await?;
        Ok(Some(info))
    }

    /// `PUT /collections/{name}` with a single unnamed vector.
    pub async fn create_collection(&self, collection: &str, vectors: &VectorParams) -> Result<()> {
        tracing::debug!(collection, size = vectors.size, "creating collection");
        let req = self
            .http
            .put(self.collection_url(collection))
            .json(&CreateCollection { vectors });
        let resp = self.authorize(req).send().await?;
        let _: Value = decode(resp).await?;
        Ok(())
    }

    /// `DELETE /collections/{name}`. Deleting a missing collection is not an error.
    pub async fn delete_collection(&self, collection: &str) -> Result<()> {
        tracing::debug!(collection, "deleting collection");
        let req = self.http.delete(self.collection_url(collection));
        let resp = self.authorize(req).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let _: Value = decode(resp).await?;
        Ok(())
    }

    // ── Points ───────────────────────────────────────────────────────

    /// `PUT /collections/{name}/points?wait=true`: insert or overwrite by id.
    pub async fn upsert_points(&self, collection: &str, points: &[PointStruct]) -> Result<()> {
        let url = format!("{}/points", self.collection_url(collection));
        let req = self
            .http
            .put(url)
            .query(&[("wait", "true")])
            .json(&UpsertPoints { points });
        let resp = self.authorize(req).send().await?;
        let _: Value = decode(resp).await?;
        Ok(())
    }

    /// `POST /collections/{name}/points/delete?wait=true`. Missing ids are ignored by Qdrant.
    pub async fn delete_points(&self, collection: &str, ids: &[PointId]) -> Result<()> {
        let url = format!("{}/points/delete", self.collection_url(collection));
        let req = self
            .http
            .post(url)
            .query(&[("wait", "true")])
            .json(&DeletePoints { points: ids });
        let resp = self.authorize(req).send().await?;
        let _: Value = decode(resp).await?;
        Ok(())
    }

    /// `POST /collections/{name}/points/search`.
    pub async fn search_points(
        &self,
        collection: &str,
        request: &SearchRequest,
    ) -> Result<Vec<ScoredPoint>> {
        let url = format!("{}/points/search", self.collection_url(collection));
        let req = self.http.post(url).json(request);
        let resp = self.authorize(req).send().await?;
        decode(resp).await
    }

    /// `POST /collections/{name}/points/count` with exact counting.
    pub async fn count_points(&self, collection: &str) -> Result<u64> {
        let url = format!("{}/points/count", self.collection_url(collection));
        let req = self.http.post(url).json(&CountRequest { exact: true });
        let resp = self.authorize(req).send().await?;
        let result: CountResult = decode(resp).await?;
        Ok(result.count)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    if !status.is_success() {
        let message = serde_json::from_slice::<ErrorEnvelope>(&bytes)
            .map(|e| e.status.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string());
        return Err(QdrantError::Api {
            status: status.as_u16(),
            message,
        });
    }
    let envelope: ApiResponse<T> = serde_json::from_slice(&bytes)?;
    Ok(envelope.result)
}
