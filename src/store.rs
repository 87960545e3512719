//! The synchronization cache.
//!
//! [`SyncedStore`] owns the local working copy of libraries, documents, and
//! conversations plus the current selections, and is the only thing that
//! mutates them. Every operation follows the same shape:
//!
//! ```text
//! caller ──▶ RemoteGateway call(s) ──▶ reconcile (pure) ──▶ commit ──▶ persist
//! ```
//!
//! # Write strategies
//!
//! | Entity | Strategy |
//! |--------|----------|
//! | Library | confirm-then-refetch: remote write, then [`fetch_libraries`](SyncedStore::fetch_libraries) |
//! | Conversation | confirm-then-refetch, except delete which removes locally first and reconciles after |
//! | Document | local optimistic helpers ([`add_document`](SyncedStore::add_document), [`remove_document`](SyncedStore::remove_document)); every remote document write ends in a confirming library refresh |
//!
//! # Concurrency
//!
//! All operations take `&self`. The model sits behind a lock that is only
//! held for synchronous sections and never across an `.await`, so
//! operations that span several remote calls can interleave at those
//! calls. Two concurrent full refreshes resolve last-response-wins. There
//! is no retry, no backoff, and no cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::gateway::{
    ChatRequest, DocumentRecord, DocumentUpdate, LibraryRecord, MessageRecord, NewLibrary,
    RemoteGateway,
};
use crate::models::{Conversation, Document, Library, Message, ResponseLength, Role};
use crate::persist::{self, Snapshot, SnapshotStore};
use crate::reconcile;

#[derive(Debug, Default)]
struct State {
    libraries: Vec<Library>,
    current_library: Option<Library>,
    conversations: Vec<Conversation>,
    current_conversation: Option<Conversation>,
}

impl State {
    /// Swap the selected library for its current copy in `libraries`.
    fn refresh_current_library(&mut self) {
        if let Some(ref cur) = self.current_library {
            if let Some(fresh) = self.libraries.iter().find(|l| l.id == cur.id) {
                self.current_library = Some(fresh.clone());
            }
        }
    }

    fn select_owning_library(&mut self, conversation: &Conversation) {
        if let Some(lib) = self
            .libraries
            .iter()
            .find(|l| l.id == conversation.library_id)
        {
            self.current_library = Some(lib.clone());
        }
    }
}

/// Normalize a library with its listed documents, falling back to the
/// embedded ones when the listing does not normalize.
fn normalize_with_fallback(
    record: LibraryRecord,
    documents: Option<Vec<DocumentRecord>>,
) -> SyncResult<Library> {
    if documents.is_none() {
        return reconcile::normalize_library(record, None);
    }
    match reconcile::normalize_library(record.clone(), documents) {
        Ok(library) => Ok(library),
        Err(e) => {
            warn!(library_id = %record.id, error = %e, "malformed document listing; keeping embedded documents");
            reconcile::normalize_library(record, None)
        }
    }
}

struct Persistence {
    store: Arc<dyn SnapshotStore>,
    key: String,
}

/// Local cache of the remote library/conversation model.
pub struct SyncedStore<G: RemoteGateway> {
    gateway: G,
    persistence: Option<Persistence>,
    state: RwLock<State>,
    initialized: AtomicBool,
}

impl<G: RemoteGateway> SyncedStore<G> {
    /// Create an empty, non-persistent store.
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            persistence: None,
            state: RwLock::new(State::default()),
            initialized: AtomicBool::new(false),
        }
    }

    /// Create a store backed by `snapshots`, restoring the snapshot under
    /// `key` (migrated) before any remote call is made.
    ///
    /// Selections are not persisted and start empty.
    pub async fn open(
        gateway: G,
        snapshots: Arc<dyn SnapshotStore>,
        key: impl Into<String>,
    ) -> SyncResult<Self> {
        let key = key.into();
        let snapshot = persist::load_snapshot(snapshots.as_ref(), &key).await?;
        info!(
            libraries = snapshot.libraries.len(),
            conversations = snapshot.conversations.len(),
            "restored snapshot"
        );
        Ok(Self {
            gateway,
            persistence: Some(Persistence {
                store: snapshots,
                key,
            }),
            state: RwLock::new(State {
                libraries: snapshot.libraries,
                conversations: snapshot.conversations,
                ..State::default()
            }),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// True once [`initialize`](Self::initialize) has completed at least once.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    // ============ Reads ============

    pub fn libraries(&self) -> Vec<Library> {
        self.state.read().libraries.clone()
    }

    pub fn library(&self, id: &str) -> Option<Library> {
        self.state.read().libraries.iter().find(|l| l.id == id).cloned()
    }

    pub fn current_library(&self) -> Option<Library> {
        self.state.read().current_library.clone()
    }

    pub fn conversations(&self) -> Vec<Conversation> {
        self.state.read().conversations.clone()
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.state
            .read()
            .conversations
            .iter()
            .find(|c| c.id == id)
            .cloned()
    }

    pub fn conversations_for(&self, library_id: &str) -> Vec<Conversation> {
        self.state
            .read()
            .conversations
            .iter()
            .filter(|c| c.library_id == library_id)
            .cloned()
            .collect()
    }

    pub fn current_conversation(&self) -> Option<Conversation> {
        self.state.read().current_conversation.clone()
    }

    /// The persisted projection of the current model.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        Snapshot {
            libraries: state.libraries.clone(),
            conversations: state.conversations.clone(),
        }
    }

    // ============ Persistence ============

    /// Write the snapshot now, surfacing storage errors.
    pub async fn save(&self) -> SyncResult<()> {
        let Some(ref p) = self.persistence else {
            return Ok(());
        };
        let snapshot = self.snapshot();
        persist::save_snapshot(p.store.as_ref(), &p.key, &snapshot).await
    }

    /// Write the snapshot after a commit. Failures are logged; the in-memory
    /// model stays authoritative for this process.
    async fn persist(&self) {
        if let Err(e) = self.save().await {
            warn!(error = %e, "failed to persist snapshot");
        }
    }

    // ============ Lifecycle ============

    /// Establish the baseline: a full library refresh, which always ends
    /// with a full conversation refresh. Safe to call repeatedly.
    pub async fn initialize(&self) -> SyncResult<()> {
        self.fetch_libraries().await?;
        self.initialized.store(true, Ordering::SeqCst);
        info!("store initialized");
        Ok(())
    }

    // ============ Libraries ============

    /// Replace the library list with the backend's, then refresh
    /// conversations.
    ///
    /// A failed or malformed per-library document listing falls back to the
    /// documents embedded in the library record; a malformed library record
    /// is skipped. The current selection survives by
    /// id, else falls back to the first library or `None`.
    pub async fn fetch_libraries(&self) -> SyncResult<Vec<Library>> {
        let records = self
            .gateway
            .list_libraries()
            .await
            .map_err(SyncError::network)?;
        debug!(count = records.len(), "fetched libraries");

        let mut libraries = Vec::with_capacity(records.len());
        for record in records {
            let documents = match self.gateway.list_documents(&record.id).await {
                Ok(docs) => Some(docs),
                Err(e) => {
                    warn!(library_id = %record.id, error = %e, "document listing failed; keeping embedded documents");
                    None
                }
            };
            let library_id = record.id.clone();
            match normalize_with_fallback(record, documents) {
                Ok(library) => libraries.push(library),
                Err(e) => warn!(library_id = %library_id, error = %e, "skipping malformed library"),
            }
        }

        {
            let mut guard = self.state.write();
            let state = &mut *guard;
            state.current_library =
                reconcile::repair_library_selection(state.current_library.as_ref(), &libraries);
            state.libraries = libraries.clone();
        }
        self.persist().await;

        self.fetch_all_conversations().await;
        Ok(libraries)
    }

    /// Create a library remotely; it enters the model only via the refetch.
    pub async fn create_library(
        &self,
        name: &str,
        description: Option<&str>,
        tags: Option<&str>,
    ) -> SyncResult<Library> {
        let request = NewLibrary {
            name: name.to_string(),
            description: description.map(str::to_string),
            tags: tags.map(str::to_string),
        };
        let created = self
            .gateway
            .create_library(&request)
            .await
            .map_err(|e| SyncError::Creation(e.to_string()))?;
        debug!(library_id = %created.id, "library created");

        self.fetch_libraries().await?;
        match self.library(&created.id) {
            Some(lib) => Ok(lib),
            None => reconcile::normalize_library(created, None),
        }
    }

    /// Delete remotely, then refetch. A failed delete is treated like an
    /// already-absent library.
    pub async fn delete_library(&self, id: &str) -> SyncResult<()> {
        if let Err(e) = self.gateway.delete_library(id).await {
            warn!(library_id = %id, error = %e, "library delete failed; reconciling anyway");
        }
        self.fetch_libraries().await?;
        Ok(())
    }

    /// Re-read one library and patch it into the list by id.
    pub async fn refresh_library(&self, id: &str) -> SyncResult<Library> {
        let record = self
            .gateway
            .get_library(id)
            .await
            .map_err(|e| SyncError::NotFound(format!("library {}: {}", id, e)))?;
        let documents = match self.gateway.list_documents(id).await {
            Ok(docs) => Some(docs),
            Err(e) => {
                warn!(library_id = %id, error = %e, "document listing failed; keeping embedded documents");
                None
            }
        };
        let library = normalize_with_fallback(record, documents)?;
        {
            let mut state = self.state.write();
            reconcile::merge_by_id(&mut state.libraries, library.clone());
            state.refresh_current_library();
        }
        self.persist().await;
        Ok(library)
    }

    pub fn set_current_library(&self, library: Option<Library>) {
        self.state.write().current_library = library;
    }

    // ============ Documents ============

    /// Optimistically add (or replace by id) a document in a library's list.
    /// Never contacts the remote. Returns `false` if the library is unknown.
    pub fn add_document(&self, library_id: &str, document: Document) -> bool {
        let mut state = self.state.write();
        let Some(library) = state.libraries.iter_mut().find(|l| l.id == library_id) else {
            return false;
        };
        reconcile::merge_by_id(&mut library.documents, document);
        state.refresh_current_library();
        true
    }

    /// Optimistically remove a document. Never contacts the remote.
    /// Returns `true` if something was removed.
    pub fn remove_document(&self, library_id: &str, document_id: &str) -> bool {
        let mut state = self.state.write();
        let removed = match state.libraries.iter_mut().find(|l| l.id == library_id) {
            Some(library) => reconcile::remove_by_id(&mut library.documents, document_id),
            None => false,
        };
        if removed {
            state.refresh_current_library();
        }
        removed
    }

    /// Upload a PDF, show it immediately, then confirm with a full refresh.
    pub async fn upload_document(
        &self,
        library_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> SyncResult<Document> {
        let record = self
            .gateway
            .upload_document(library_id, file_name, bytes)
            .await
            .map_err(|e| SyncError::Creation(e.to_string()))?;
        let document = reconcile::normalize_document(record)?;
        debug!(library_id = %library_id, document_id = %document.id, chunks = document.chunks.len(), "document uploaded");

        self.add_document(library_id, document.clone());
        if let Err(e) = self.fetch_libraries().await {
            warn!(error = %e, "refresh after upload failed; keeping optimistic document");
            self.persist().await;
        }
        Ok(document)
    }

    /// Rename and/or retag a document remotely, then refetch.
    pub async fn update_document(
        &self,
        library_id: &str,
        document_id: &str,
        name: Option<&str>,
        tags: Option<&str>,
    ) -> SyncResult<()> {
        let update = DocumentUpdate {
            name: name.map(str::to_string),
            tags: tags.map(str::to_string),
        };
        self.gateway
            .update_document(library_id, document_id, &update)
            .await
            .map_err(|e| SyncError::Update(e.to_string()))?;
        self.fetch_libraries().await?;
        Ok(())
    }

    /// Remove locally, delete remotely, then refetch.
    pub async fn delete_document(&self, library_id: &str, document_id: &str) -> SyncResult<()> {
        self.remove_document(library_id, document_id);
        if let Err(e) = self.gateway.delete_document(library_id, document_id).await {
            warn!(document_id = %document_id, error = %e, "document delete failed; reconciling anyway");
        }
        self.fetch_libraries().await?;
        Ok(())
    }

    // ============ Conversations ============

    /// Replace the conversation list from per-library listings.
    ///
    /// A library whose listing fails (or returns malformed records)
    /// contributes nothing; the others still land. Never fails.
    pub async fn fetch_all_conversations(&self) -> Vec<Conversation> {
        let library_ids: Vec<String> = self
            .state
            .read()
            .libraries
            .iter()
            .map(|l| l.id.clone())
            .collect();

        let mut conversations = Vec::new();
        for library_id in &library_ids {
            match self.gateway.list_conversations(library_id).await {
                Ok(records) => {
                    for record in records {
                        match reconcile::normalize_conversation(record) {
                            Ok(c) => conversations.push(c),
                            Err(e) => {
                                warn!(library_id = %library_id, error = %e, "skipping malformed conversation")
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(library_id = %library_id, error = %e, "conversation listing failed; library contributes none");
                }
            }
        }
        debug!(count = conversations.len(), libraries = library_ids.len(), "fetched conversations");

        {
            let mut guard = self.state.write();
            let state = &mut *guard;
            state.current_conversation = reconcile::repair_conversation_selection(
                state.current_conversation.as_ref(),
                &conversations,
            );
            state.conversations = conversations.clone();
        }
        self.persist().await;
        conversations
    }

    /// Create a conversation remotely, refresh, and return it.
    ///
    /// Looked up by the server-assigned id; falls back to the first
    /// `(library_id, title)` match, then to the create response itself.
    pub async fn create_conversation(&self, library_id: &str, title: &str) -> SyncResult<Conversation> {
        let created = self
            .gateway
            .create_conversation(library_id, title)
            .await
            .map_err(|e| SyncError::Creation(e.to_string()))?;
        debug!(conversation_id = %created.id, library_id = %library_id, "conversation created");

        let conversations = self.fetch_all_conversations().await;
        let found = conversations
            .iter()
            .find(|c| c.id == created.id)
            .or_else(|| reconcile::find_by_title(&conversations, library_id, title))
            .cloned();
        match found {
            Some(c) => Ok(c),
            None => reconcile::normalize_conversation(created),
        }
    }

    /// Fetch one conversation, merge it by id, and make it current.
    pub async fn fetch_conversation(&self, id: &str) -> SyncResult<Conversation> {
        let record = self
            .gateway
            .get_conversation(id)
            .await
            .map_err(|e| SyncError::NotFound(format!("conversation {}: {}", id, e)))?;
        let conversation = reconcile::normalize_conversation(record)?;
        {
            let mut state = self.state.write();
            reconcile::merge_by_id(&mut state.conversations, conversation.clone());
            state.select_owning_library(&conversation);
            state.current_conversation = Some(conversation.clone());
        }
        self.persist().await;
        Ok(conversation)
    }

    /// Append a message remotely, then pull the conversation back.
    pub async fn add_message(&self, conversation_id: &str, message: Message) -> SyncResult<Conversation> {
        self.gateway
            .append_message(conversation_id, &MessageRecord::from(&message))
            .await
            .map_err(|e| SyncError::Persistence(e.to_string()))?;
        debug!(conversation_id = %conversation_id, message_id = %message.id, "message appended");
        self.fetch_conversation(conversation_id).await
    }

    /// Select a conversation; also selects its library when known locally.
    pub fn set_current_conversation(&self, conversation: Option<Conversation>) {
        let mut state = self.state.write();
        if let Some(ref c) = conversation {
            state.select_owning_library(c);
        }
        state.current_conversation = conversation;
    }

    /// Remove locally, delete remotely, then reconcile with a full refresh.
    pub async fn delete_conversation(&self, id: &str) -> SyncResult<()> {
        {
            let mut state = self.state.write();
            reconcile::remove_by_id(&mut state.conversations, id);
            if state.current_conversation.as_ref().is_some_and(|c| c.id == id) {
                state.current_conversation = None;
            }
        }
        self.persist().await;

        if let Err(e) = self.gateway.delete_conversation(id).await {
            warn!(conversation_id = %id, error = %e, "conversation delete failed; reconciling anyway");
        }
        self.fetch_all_conversations().await;
        Ok(())
    }

    /// Rename remotely; the new title arrives through the refresh.
    pub async fn update_conversation_title(&self, id: &str, title: &str) -> SyncResult<()> {
        self.gateway
            .update_conversation_title(id, title)
            .await
            .map_err(|e| SyncError::Update(e.to_string()))?;
        self.fetch_all_conversations().await;
        Ok(())
    }

    // ============ Chat ============

    /// Ask a question in a conversation.
    ///
    /// Records the question, asks the backend, records the answer with its
    /// citations, and returns the updated conversation.
    pub async fn ask(
        &self,
        conversation_id: &str,
        question: &str,
        length: ResponseLength,
    ) -> SyncResult<Conversation> {
        let library_id = match self.conversation(conversation_id) {
            Some(c) => c.library_id,
            None => self.fetch_conversation(conversation_id).await?.library_id,
        };

        self.add_message(conversation_id, Message::new(Role::User, question, Vec::new()))
            .await?;

        let request = ChatRequest {
            question: question.to_string(),
            conversation_id: Some(conversation_id.to_string()),
            response_length: length,
        };
        let response = self
            .gateway
            .chat(&library_id, &request)
            .await
            .map_err(SyncError::network)?;
        debug!(conversation_id = %conversation_id, sources = response.sources.len(), "answer received");

        self.add_message(
            conversation_id,
            Message::new(Role::Assistant, response.answer, response.sources),
        )
        .await
    }

    /// Backend liveness, passed through.
    pub async fn health(&self) -> SyncResult<serde_json::Value> {
        self.gateway.health().await.map_err(SyncError::network)
    }
}
