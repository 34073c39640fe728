use async_trait::async_trait;
use md5::{Digest, Md5};
use papers_qdrant::{
    CollectionInfo, Distance, PointId, PointStruct, QdrantClient, ScoredPoint, SearchRequest,
    VectorParams,
};
use serde_json::Value;

use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::types::{PaperMetadata, SearchHit};

/// Similarity-search storage for paper vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite the record stored under `id`.
    async fn upsert(&self, id: &str, vector: &[f32], metadata: &PaperMetadata) -> Result<()>;

    /// Nearest neighbours of `vector`, best first. No score floor is applied.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>>;

    /// Remove the record stored under `id`. A missing id is not an error.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// A [`VectorIndex`] backed by one Qdrant collection with cosine distance.
#[derive(Debug, Clone)]
pub struct QdrantIndex {
    client: QdrantClient,
    collection: String,
    dim: usize,
}

impl QdrantIndex {
    pub fn new(client: QdrantClient, collection: impl Into<String>, dim: usize) -> Self {
        Self {
            client,
            collection: collection.into(),
            dim,
        }
    }

    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.qdrant_client(), &config.collection, config.embed_dim)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn vector_params(&self) -> VectorParams {
        VectorParams {
            size: self.dim,
            distance: Distance::Cosine,
        }
    }

    /// Create the collection if it is missing. Returns `true` when it was created.
    /// An existing collection with a different vector size is an error.
    pub async fn ensure_collection(&self) -> Result<bool> {
        match self.client.collection_info(&self.collection).await? {
            None => {
                self.create().await?;
                Ok(true)
            }
            Some(info) => {
                self.check_vectors(&info)?;
                Ok(false)
            }
        }
    }

    /// Create the collection. Fails if it already exists.
    pub async fn create(&self) -> Result<()> {
        self.client
            .create_collection(&self.collection, &self.vector_params())
            .await?;
        tracing::info!(collection = %self.collection, dim = self.dim, "created collection");
        Ok(())
    }

    /// Drop and recreate the collection, discarding every stored vector.
    pub async fn recreate(&self) -> Result<()> {
        self.client.delete_collection(&self.collection).await?;
        self.client
            .create_collection(&self.collection, &self.vector_params())
            .await?;
        tracing::info!(collection = %self.collection, "recreated collection");
        Ok(())
    }

    /// The collection must hold a single unnamed vector of the configured size.
    pub fn check_vectors(&self, info: &CollectionInfo) -> Result<()> {
        let params = info.config.params.vectors.single().ok_or_else(|| {
            RagError::Config(format!(
                "collection {} uses named vectors; expected a single unnamed vector",
                self.collection
            ))
        })?;
        if params.size != self.dim {
            return Err(RagError::DimensionMismatch {
                expected: self.dim,
                got: params.size,
            });
        }
        Ok(())
    }

    pub async fn info(&self) -> Result<Option<CollectionInfo>> {
        Ok(self.client.collection_info(&self.collection).await?)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(self.client.count_points(&self.collection).await?)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, id: &str, vector: &[f32], metadata: &PaperMetadata) -> Result<()> {
        let payload = match serde_json::to_value(metadata)? {
            Value::Object(map) => map,
            _ => unreachable!("PaperMetadata serializes to an object"),
        };
        let point = PointStruct {
            id: point_id(id),
            vector: vector.to_vec(),
            payload,
        };
        self.client
            .upsert_points(&self.collection, std::slice::from_ref(&point))
            .await?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let request = SearchRequest::new(vector.to_vec(), limit);
        let points = self.client.search_points(&self.collection, &request).await?;
        let mut hits: Vec<SearchHit> = points.into_iter().filter_map(hit_from_point).collect();
        sort_by_score(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.client
            .delete_points(&self.collection, &[point_id(id)])
            .await?;
        Ok(())
    }
}

fn hit_from_point(point: ScoredPoint) -> Option<SearchHit> {
    let payload = match point.payload {
        Some(p) => p,
        None => {
            tracing::warn!(point = %point.id, "search hit has no payload; skipping");
            return None;
        }
    };
    match serde_json::from_value::<PaperMetadata>(Value::Object(payload)) {
        Ok(metadata) => Some(SearchHit {
            id: metadata.paper_id.clone(),
            score: point.score,
            metadata,
        }),
        Err(e) => {
            tracing::warn!(point = %point.id, error = %e, "search hit payload is not a paper; skipping");
            None
        }
    }
}

/// Best score first; ties keep the store's order.
pub(crate) fn sort_by_score(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Qdrant point ids must be integers or UUIDs, so the paper id is hashed into
/// UUID layout. The paper id itself travels in the payload.
pub fn point_id(paper_id: &str) -> PointId {
    let hex = format!("{:x}", Md5::digest(paper_id.as_bytes()));
    PointId::Uuid(format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    ))
}
