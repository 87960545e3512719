//! In-process [`RemoteGateway`] for tests and offline demos.
//!
//! Behaves like the real backend: server-assigned v4 ids, naive ISO-8601
//! timestamps, comma-joined tags, cascading library deletion, and a
//! "not found" failure for unknown ids. Any operation can be made to fail,
//! either globally or for one entity id, to exercise partial-failure paths.
//! Every call is recorded so tests can assert that local-only operations
//! never reach the remote.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{
    ChatRequest, ChatResponse, ChunkRecord, ConversationRecord, DocumentRecord, DocumentUpdate,
    LibraryRecord, MessageRecord, NewLibrary, RemoteGateway,
};

/// Gateway operations, used for failure injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    ListLibraries,
    GetLibrary,
    CreateLibrary,
    DeleteLibrary,
    ListDocuments,
    UploadDocument,
    UpdateDocument,
    DeleteDocument,
    ListConversations,
    CreateConversation,
    GetConversation,
    UpdateConversationTitle,
    DeleteConversation,
    AppendMessage,
    Chat,
    Health,
}

/// In-memory backend.
pub struct InMemoryGateway {
    libraries: RwLock<Vec<LibraryRecord>>,
    conversations: RwLock<Vec<ConversationRecord>>,
    failures: RwLock<HashSet<(Op, Option<String>)>>,
    calls: RwLock<Vec<Op>>,
    latency: RwLock<HashMap<Op, VecDeque<Duration>>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            libraries: RwLock::new(Vec::new()),
            conversations: RwLock::new(Vec::new()),
            failures: RwLock::new(HashSet::new()),
            calls: RwLock::new(Vec::new()),
            latency: RwLock::new(HashMap::new()),
        }
    }

    /// Make every call of `op` fail.
    pub fn fail(&self, op: Op) {
        self.failures.write().insert((op, None));
    }

    /// Make calls of `op` fail when they target `id`.
    pub fn fail_for(&self, op: Op, id: &str) {
        self.failures.write().insert((op, Some(id.to_string())));
    }

    /// Clear all injected failures.
    pub fn heal(&self) {
        self.failures.write().clear();
    }

    /// Hold back the response of the next `op` call by `delay`. The response
    /// content is captured before the wait, so a delayed listing reports the
    /// state as of its request.
    pub fn delay_next(&self, op: Op, delay: Duration) {
        self.latency.write().entry(op).or_default().push_back(delay);
    }

    /// All operations issued so far, in order.
    pub fn calls(&self) -> Vec<Op> {
        self.calls.read().clone()
    }

    pub fn call_count(&self, op: Op) -> usize {
        self.calls.read().iter().filter(|c| **c == op).count()
    }

    /// Seed a library directly, bypassing the call log. Returns its id.
    pub fn insert_library(&self, name: &str, description: Option<&str>, tags: Option<&str>) -> String {
        let record = LibraryRecord {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
            tags: tags.map(str::to_string),
            created_at: now_naive(),
            documents: Vec::new(),
        };
        let id = record.id.clone();
        self.libraries.write().push(record);
        id
    }

    /// Seed a document with one chunk per page of `pages`. Returns its id.
    pub fn insert_document(&self, library_id: &str, name: &str, pages: &[&str]) -> Option<String> {
        let mut libraries = self.libraries.write();
        let library = libraries.iter_mut().find(|l| l.id == library_id)?;
        let doc = new_document(name, pages);
        let id = doc.id.clone();
        library.documents.push(doc);
        Some(id)
    }

    /// Seed a conversation directly. Returns its id.
    pub fn insert_conversation(&self, library_id: &str, title: &str) -> String {
        let record = new_conversation(library_id, title);
        let id = record.id.clone();
        self.conversations.write().push(record);
        id
    }

    pub fn library_count(&self) -> usize {
        self.libraries.read().len()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.read().len()
    }

    fn enter(&self, op: Op, id: Option<&str>) -> Result<()> {
        self.calls.write().push(op);
        let failures = self.failures.read();
        if failures.contains(&(op, None))
            || id.is_some_and(|id| failures.contains(&(op, Some(id.to_string()))))
        {
            bail!("injected failure: {:?}", op);
        }
        Ok(())
    }

    async fn settle(&self, op: Op) {
        let delay = self.latency.write().get_mut(&op).and_then(VecDeque::pop_front);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

fn now_naive() -> String {
    Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn new_document(name: &str, pages: &[&str]) -> DocumentRecord {
    DocumentRecord {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        upload_date: now_naive(),
        tags: Some(String::new()),
        chunks: pages
            .iter()
            .enumerate()
            .map(|(i, text)| ChunkRecord {
                id: Uuid::new_v4().to_string(),
                content: text.to_string(),
                page_number: i as i64 + 1,
                chunk_index: i as i64,
            })
            .collect(),
        embeddings: None,
    }
}

fn new_conversation(library_id: &str, title: &str) -> ConversationRecord {
    let now = now_naive();
    ConversationRecord {
        id: Uuid::new_v4().to_string(),
        library_id: library_id.to_string(),
        title: title.to_string(),
        messages: Vec::new(),
        created_at: now.clone(),
        updated_at: now,
    }
}

#[async_trait]
impl RemoteGateway for InMemoryGateway {
    async fn list_libraries(&self) -> Result<Vec<LibraryRecord>> {
        self.enter(Op::ListLibraries, None)?;
        let libraries = self.libraries.read().clone();
        self.settle(Op::ListLibraries).await;
        Ok(libraries)
    }

    async fn get_library(&self, id: &str) -> Result<LibraryRecord> {
        self.enter(Op::GetLibrary, Some(id))?;
        self.libraries
            .read()
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| anyhow!("Library not found"))
    }

    async fn create_library(&self, library: &NewLibrary) -> Result<LibraryRecord> {
        self.enter(Op::CreateLibrary, None)?;
        let record = LibraryRecord {
            id: Uuid::new_v4().to_string(),
            name: library.name.clone(),
            description: library.description.clone(),
            tags: library.tags.clone(),
            created_at: now_naive(),
            documents: Vec::new(),
        };
        self.libraries.write().push(record.clone());
        Ok(record)
    }

    async fn delete_library(&self, id: &str) -> Result<()> {
        self.enter(Op::DeleteLibrary, Some(id))?;
        let mut libraries = self.libraries.write();
        let before = libraries.len();
        libraries.retain(|l| l.id != id);
        if libraries.len() == before {
            bail!("Library not found");
        }
        self.conversations.write().retain(|c| c.library_id != id);
        Ok(())
    }

    async fn list_documents(&self, library_id: &str) -> Result<Vec<DocumentRecord>> {
        self.enter(Op::ListDocuments, Some(library_id))?;
        let documents = self
            .libraries
            .read()
            .iter()
            .find(|l| l.id == library_id)
            .map(|l| l.documents.clone())
            .unwrap_or_default();
        self.settle(Op::ListDocuments).await;
        Ok(documents)
    }

    async fn upload_document(
        &self,
        library_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<DocumentRecord> {
        self.enter(Op::UploadDocument, Some(library_id))?;
        let text = String::from_utf8_lossy(&bytes).to_string();
        if text.trim().is_empty() {
            bail!("No text could be extracted from the PDF.");
        }
        let pages: Vec<&str> = text.split('\u{c}').filter(|p| !p.trim().is_empty()).collect();
        let doc = new_document(file_name, &pages);
        let mut libraries = self.libraries.write();
        let library = libraries
            .iter_mut()
            .find(|l| l.id == library_id)
            .ok_or_else(|| anyhow!("Library not found"))?;
        library.documents.push(doc.clone());
        Ok(doc)
    }

    async fn update_document(
        &self,
        library_id: &str,
        document_id: &str,
        update: &DocumentUpdate,
    ) -> Result<()> {
        self.enter(Op::UpdateDocument, Some(document_id))?;
        let mut libraries = self.libraries.write();
        let doc = libraries
            .iter_mut()
            .filter(|l| l.id == library_id)
            .flat_map(|l| l.documents.iter_mut())
            .find(|d| d.id == document_id)
            .ok_or_else(|| anyhow!("Document not found"))?;
        if let Some(ref name) = update.name {
            doc.name = name.clone();
        }
        if let Some(ref tags) = update.tags {
            doc.tags = Some(tags.clone());
        }
        Ok(())
    }

    async fn delete_document(&self, library_id: &str, document_id: &str) -> Result<()> {
        self.enter(Op::DeleteDocument, Some(document_id))?;
        let mut libraries = self.libraries.write();
        let library = libraries
            .iter_mut()
            .find(|l| l.id == library_id)
            .ok_or_else(|| anyhow!("Document not found"))?;
        let before = library.documents.len();
        library.documents.retain(|d| d.id != document_id);
        if library.documents.len() == before {
            bail!("Document not found");
        }
        Ok(())
    }

    async fn list_conversations(&self, library_id: &str) -> Result<Vec<ConversationRecord>> {
        self.enter(Op::ListConversations, Some(library_id))?;
        let conversations = self
            .conversations
            .read()
            .iter()
            .filter(|c| c.library_id == library_id)
            .cloned()
            .collect();
        self.settle(Op::ListConversations).await;
        Ok(conversations)
    }

    async fn create_conversation(
        &self,
        library_id: &str,
        title: &str,
    ) -> Result<ConversationRecord> {
        self.enter(Op::CreateConversation, Some(library_id))?;
        if !self.libraries.read().iter().any(|l| l.id == library_id) {
            bail!("Library not found");
        }
        let record = new_conversation(library_id, title);
        self.conversations.write().push(record.clone());
        Ok(record)
    }

    async fn get_conversation(&self, id: &str) -> Result<ConversationRecord> {
        self.enter(Op::GetConversation, Some(id))?;
        self.conversations
            .read()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| anyhow!("Conversation not found"))
    }

    async fn update_conversation_title(&self, id: &str, title: &str) -> Result<()> {
        self.enter(Op::UpdateConversationTitle, Some(id))?;
        let mut conversations = self.conversations.write();
        let conv = conversations
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow!("Conversation not found"))?;
        conv.title = title.to_string();
        conv.updated_at = now_naive();
        Ok(())
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.enter(Op::DeleteConversation, Some(id))?;
        let mut conversations = self.conversations.write();
        let before = conversations.len();
        conversations.retain(|c| c.id != id);
        if conversations.len() == before {
            bail!("Conversation not found");
        }
        Ok(())
    }

    async fn append_message(&self, conversation_id: &str, message: &MessageRecord) -> Result<()> {
        self.enter(Op::AppendMessage, Some(conversation_id))?;
        let mut conversations = self.conversations.write();
        let conv = conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| anyhow!("Conversation not found"))?;
        conv.messages.push(message.clone());
        conv.updated_at = now_naive();
        Ok(())
    }

    async fn chat(&self, library_id: &str, request: &ChatRequest) -> Result<ChatResponse> {
        self.enter(Op::Chat, Some(library_id))?;
        let libraries = self.libraries.read();
        let library = libraries
            .iter()
            .find(|l| l.id == library_id)
            .ok_or_else(|| anyhow!("Library not found"))?;
        let question = request.question.to_lowercase();
        let mut seen = HashSet::new();
        let sources: Vec<String> = library
            .documents
            .iter()
            .flat_map(|d| d.chunks.iter().map(move |c| (d, c)))
            .filter(|(_, c)| {
                question
                    .split_whitespace()
                    .map(|w| w.trim_matches(|ch: char| !ch.is_alphanumeric()))
                    .any(|w| w.len() > 3 && c.content.to_lowercase().contains(w))
            })
            .map(|(d, c)| format!("{} (Page {})", d.name, c.page_number))
            .filter(|source| seen.insert(source.clone()))
            .collect();
        let answer = if sources.is_empty() {
            "Sorry, this question is outside the scope of the selected library.".to_string()
        } else {
            format!("Answer to \"{}\" from {} passage(s).", request.question, sources.len())
        };
        Ok(ChatResponse {
            answer,
            sources,
            conversation_id: request
                .conversation_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        })
    }

    async fn health(&self) -> Result<serde_json::Value> {
        self.enter(Op::Health, None)?;
        let total_chunks: usize = self
            .libraries
            .read()
            .iter()
            .flat_map(|l| l.documents.iter())
            .map(|d| d.chunks.len())
            .sum();
        Ok(serde_json::json!({
            "status": "healthy",
            "vector_store": { "total_embeddings": total_chunks },
        }))
    }
}
