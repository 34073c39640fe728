use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Envelope wrapping every Qdrant REST response.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub result: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub status: ErrorStatus,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorStatus {
    pub error: String,
}

// ── Collections ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    Cosine,
    Euclid,
    Dot,
    Manhattan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorParams {
    pub size: usize,
    pub distance: Distance,
}

/// Either a single unnamed vector or a map of named vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VectorsConfig {
    Single(VectorParams),
    Named(HashMap<String, VectorParams>),
}

impl VectorsConfig {
    /// Params of the unnamed vector, if the collection uses one.
    pub fn single(&self) -> Option<&VectorParams> {
        match self {
            VectorsConfig::Single(p) => Some(p),
            VectorsConfig::Named(_) => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateCollection<'a> {
    pub vectors: &'a VectorParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionInfo {
    pub status: String,
    #[serde(default)]
    pub points_count: Option<u64>,
    pub config: CollectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    pub params: CollectionParams,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionParams {
    pub vectors: VectorsConfig,
}

// ── Points ───────────────────────────────────────────────────────────

/// Qdrant accepts unsigned integers or UUID strings as point ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointId {
    Num(u64),
    Uuid(String),
}

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointId::Num(n) => write!(f, "{n}"),
            PointId::Uuid(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PointStruct {
    pub id: PointId,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpsertPoints<'a> {
    pub points: &'a [PointStruct],
}

#[derive(Debug, Serialize)]
pub(crate) struct DeletePoints<'a> {
    pub points: &'a [PointId],
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub with_payload: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,
}

impl SearchRequest {
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        Self {
            vector,
            limit,
            with_payload: true,
            score_threshold: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScoredPoint {
    pub id: PointId,
    #[serde(default)]
    pub version: u64,
    pub score: f32,
    #[serde(default)]
    pub payload: Option<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CountRequest {
    pub exact: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CountResult {
    pub count: u64,
}
