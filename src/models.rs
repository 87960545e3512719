//! Core data models held by the synchronization cache.
//!
//! These are the normalized, internal shapes. Raw server shapes live in
//! [`crate::gateway`] and are converted exactly once by
//! [`crate::reconcile`]; nothing downstream of ingestion re-parses them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named collection of documents. Conversations reference it by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Library {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub documents: Vec<Document>,
    pub created_at: DateTime<Utc>,
    /// Ordered, deduplicated tag set.
    pub tags: Vec<String>,
}

impl Library {
    pub fn document(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }
}

/// Metadata and derived chunks of an uploaded PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
    /// Comma-joined tag string, kept in the form the backend stores it.
    pub tags: Option<String>,
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub embeddings: Option<Vec<Vec<f32>>>,
}

/// A unit of extracted document text. Produced server-side, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub page_number: i64,
    pub chunk_index: i64,
}

/// A titled thread of messages tied to one library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub library_id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One entry in a conversation. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl Message {
    /// Builds a fresh message with a random v4 id and the current time.
    pub fn new(role: Role, content: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            role,
            timestamp: Utc::now(),
            sources,
        }
    }
}

/// Requested answer verbosity for a chat call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl ResponseLength {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseLength::Short => "short",
            ResponseLength::Medium => "medium",
            ResponseLength::Long => "long",
        }
    }

    pub fn parse(s: &str) -> Option<ResponseLength> {
        match s {
            "short" => Some(ResponseLength::Short),
            "medium" => Some(ResponseLength::Medium),
            "long" => Some(ResponseLength::Long),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("user"), Some(Role::User));
        assert_eq!(Role::parse(" Assistant "), Some(Role::Assistant));
        assert_eq!(Role::parse("system"), None);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn test_new_message_has_uuid_id() {
        let m = Message::new(Role::User, "hi", vec![]);
        assert!(uuid::Uuid::parse_str(&m.id).is_ok());
        assert_eq!(m.content, "hi");
    }

    #[test]
    fn test_response_length_roundtrip_names() {
        for len in [ResponseLength::Short, ResponseLength::Medium, ResponseLength::Long] {
            assert_eq!(ResponseLength::parse(len.as_str()), Some(len));
        }
        assert_eq!(ResponseLength::parse("huge"), None);
    }
}
