//! Remote backend abstraction.
//!
//! The [`RemoteGateway`] trait is the only path by which the cache talks to
//! the backend that owns libraries, documents, and conversations. Two
//! implementations ship with the crate:
//!
//! - [`HttpGateway`](http::HttpGateway): JSON over HTTP via `reqwest`.
//! - [`InMemoryGateway`](memory::InMemoryGateway): an in-process backend
//!   with failure injection, used by tests.
//!
//! The record types below mirror the server's wire shapes (snake-case keys,
//! string timestamps, comma-joined tags). They are converted into
//! [`crate::models`] by [`crate::reconcile`] and never leak past ingestion.

pub mod http;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{Message, ResponseLength};

/// A library as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub documents: Vec<DocumentRecord>,
}

/// A document as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub name: String,
    pub upload_date: String,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub chunks: Vec<ChunkRecord>,
    #[serde(default)]
    pub embeddings: Option<Vec<Vec<f32>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub page_number: i64,
    #[serde(default)]
    pub chunk_index: i64,
}

/// A conversation as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub library_id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
    pub created_at: String,
    pub updated_at: String,
}

/// Message citations arrive either as a list or as one comma-joined string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourcesField {
    List(Vec<String>),
    Joined(String),
}

impl Default for SourcesField {
    fn default() -> Self {
        SourcesField::List(Vec::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub content: String,
    pub role: String,
    pub timestamp: String,
    #[serde(default)]
    pub sources: Option<SourcesField>,
}

impl From<&Message> for MessageRecord {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.clone(),
            content: m.content.clone(),
            role: m.role.as_str().to_string(),
            timestamp: m.timestamp.to_rfc3339(),
            sources: Some(SourcesField::List(m.sources.clone())),
        }
    }
}

/// Body of a library create call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLibrary {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
}

/// Partial document update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub response_length: ResponseLength,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<String>,
    pub conversation_id: String,
}

/// Request/response operations against the backend.
///
/// Every call either succeeds or fails with a human-readable message; the
/// cache does not rely on any finer error taxonomy. Implementations must be
/// `Send + Sync` so a store can be shared across tasks.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`list_libraries`](RemoteGateway::list_libraries) | All libraries |
/// | [`list_documents`](RemoteGateway::list_documents) | Documents of one library |
/// | [`create_library`](RemoteGateway::create_library) / [`delete_library`](RemoteGateway::delete_library) | Library lifecycle |
/// | [`list_conversations`](RemoteGateway::list_conversations) | Conversations of one library |
/// | [`create_conversation`](RemoteGateway::create_conversation) / [`delete_conversation`](RemoteGateway::delete_conversation) | Conversation lifecycle |
/// | [`get_conversation`](RemoteGateway::get_conversation) | One conversation with messages |
/// | [`update_conversation_title`](RemoteGateway::update_conversation_title) | Rename |
/// | [`append_message`](RemoteGateway::append_message) | Append to a thread |
/// | [`chat`](RemoteGateway::chat) | Ask the RAG backend a question |
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn list_libraries(&self) -> Result<Vec<LibraryRecord>>;

    async fn get_library(&self, id: &str) -> Result<LibraryRecord>;

    async fn create_library(&self, library: &NewLibrary) -> Result<LibraryRecord>;

    /// Idempotent on the backend; deleting an absent library may fail or
    /// succeed and callers treat both the same.
    async fn delete_library(&self, id: &str) -> Result<()>;

    async fn list_documents(&self, library_id: &str) -> Result<Vec<DocumentRecord>>;

    /// Uploads a PDF for server-side extraction and indexing.
    async fn upload_document(
        &self,
        library_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentRecord>;

    async fn update_document(
        &self,
        library_id: &str,
        document_id: &str,
        update: &DocumentUpdate,
    ) -> Result<()>;

    async fn delete_document(&self, library_id: &str, document_id: &str) -> Result<()>;

    async fn list_conversations(&self, library_id: &str) -> Result<Vec<ConversationRecord>>;

    async fn create_conversation(&self, library_id: &str, title: &str)
        -> Result<ConversationRecord>;

    async fn get_conversation(&self, id: &str) -> Result<ConversationRecord>;

    async fn update_conversation_title(&self, id: &str, title: &str) -> Result<()>;

    async fn delete_conversation(&self, id: &str) -> Result<()>;

    async fn append_message(&self, conversation_id: &str, message: &MessageRecord) -> Result<()>;

    async fn chat(&self, library_id: &str, request: &ChatRequest) -> Result<ChatResponse>;

    /// Backend liveness and index statistics, passed through as JSON.
    async fn health(&self) -> Result<serde_json::Value>;
}
