//! Async client for the subset of the Qdrant REST API that papers needs:
//! collection lifecycle, point upsert, similarity search and counting.

pub mod client;
pub mod error;
pub mod types;

pub use client::{DEFAULT_BASE_URL, QdrantClient};
pub use error::{QdrantError, Result};
pub use types::{
    CollectionInfo, Distance, PointId, PointStruct, ScoredPoint, SearchRequest, VectorParams,
    VectorsConfig,
};
