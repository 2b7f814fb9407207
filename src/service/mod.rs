use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::nav::Level;

pub mod client;
pub mod wire;

pub use client::HttpServiceClient;

pub type Metadata = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned HTTP {status}: {message}")]
    Request { status: StatusCode, message: String },

    #[error("index out of range: {message}")]
    Range { status: StatusCode, message: String },

    #[error("response format error: {0}")]
    ResponseFormat(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ServiceError {
    /// Classifies a non-success response; range rejections keep their own variant.
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let is_client_error = matches!(
            status,
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY
        );
        if is_client_error && message.to_ascii_lowercase().contains("out of range") {
            Self::Range { status, message }
        } else {
            Self::Request { status, message }
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Request { status, .. } | Self::Range { status, .. } => Some(*status),
            Self::Transport(error) => error.status(),
            Self::Timeout { .. } | Self::ResponseFormat(_) | Self::Configuration(_) => None,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Self::Range { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub index: usize,
    pub is_root: bool,
    pub can_drill_down: bool,
    pub level: Level,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrillDownResult {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl DrillDownResult {
    /// Non-root nodes, in display order.
    pub fn items(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| !node.is_root)
    }

    pub fn item_count(&self) -> usize {
        self.items().count()
    }

    pub fn item_at(&self, index: usize) -> Option<&Node> {
        self.items().find(|node| node.index == index)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrillDownRequest {
    pub document_id: String,
    pub level: Level,
    pub parent_text: String,
    pub parent_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

/// The `(document, level, parentIndex, lineIndex)` address every mutation carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationTarget {
    pub document_id: String,
    pub level: Level,
    pub parent_index: Option<usize>,
    pub line_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertRequest {
    #[serde(flatten)]
    pub target: MutationTarget,
    pub position: usize,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    #[serde(flatten)]
    pub target: MutationTarget,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderRequest {
    #[serde(flatten)]
    pub target: MutationTarget,
    pub from_index: usize,
    pub to_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationAck {
    #[serde(default)]
    pub status: String,
    pub document_id: String,
    pub paragraph: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: String,
    pub line_count: usize,
    #[serde(default)]
    pub preview: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub id: String,
    pub paragraph: String,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub id: String,
    pub paragraph: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordOccurrence {
    pub doc_id: String,
    pub line_index: usize,
    pub line_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedWord {
    pub word: String,
    pub documents: Vec<String>,
    #[serde(default)]
    pub occurrences: Vec<WordOccurrence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordQuery {
    pub word: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    #[serde(default)]
    pub status: String,
    pub neo4j: bool,
    #[serde(default)]
    pub documents: usize,
}

/// The remote decomposition service as seen by the navigator.
///
/// Every call may fail or be slow; implementations never retry.
#[async_trait]
pub trait DrillService: Send + Sync {
    async fn health(&self) -> Result<Health, ServiceError>;

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>, ServiceError>;

    async fn get_document(&self, document_id: &str) -> Result<Document, ServiceError>;

    async fn create_document(&self, document: &NewDocument) -> Result<Document, ServiceError>;

    async fn delete_document(&self, document_id: &str) -> Result<(), ServiceError>;

    async fn get_metadata(&self, document_id: &str) -> Result<Metadata, ServiceError>;

    async fn update_metadata(
        &self,
        document_id: &str,
        metadata: &Metadata,
    ) -> Result<Metadata, ServiceError>;

    async fn drill_down(&self, request: &DrillDownRequest)
    -> Result<DrillDownResult, ServiceError>;

    async fn insert(&self, request: &InsertRequest) -> Result<MutationAck, ServiceError>;

    async fn delete(&self, request: &DeleteRequest) -> Result<MutationAck, ServiceError>;

    async fn reorder(&self, request: &ReorderRequest) -> Result<MutationAck, ServiceError>;

    async fn shared_words(&self) -> Result<Vec<SharedWord>, ServiceError>;

    async fn traverse_word(&self, query: &WordQuery) -> Result<Vec<WordOccurrence>, ServiceError>;
}
