//! Reconciliation rules: how remote responses become the local model.
//!
//! Everything here is pure. The store calls these functions between remote
//! calls and commits their output; nothing in this module touches the
//! network, the lock, or storage.
//!
//! Three rules live here:
//!
//! 1. **Normalization**: server records (snake-case keys, string
//!    timestamps, comma-joined tags) are converted once, at ingestion, into
//!    [`crate::models`] shapes.
//! 2. **Selection repair**: after a full replacement, a selection whose id
//!    is gone falls back to the first library / `None`; a selection that
//!    survived is swapped for its fresh copy.
//! 3. **Merge by id**: targeted patches replace in place, keep list order,
//!    and never duplicate.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{SyncError, SyncResult};
use crate::gateway::{
    ChunkRecord, ConversationRecord, DocumentRecord, LibraryRecord, MessageRecord, SourcesField,
};
use crate::models::{Chunk, Conversation, Document, Library, Message, Role};

/// Entities addressable by a string id.
pub trait Identified {
    fn id(&self) -> &str;
}

impl Identified for Library {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Document {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Identified for Conversation {
    fn id(&self) -> &str {
        &self.id
    }
}

// ============ Normalization ============

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a server timestamp. RFC 3339 is taken as-is; naive ISO-8601
/// (the backend's default) is read as UTC.
pub fn parse_timestamp(raw: &str) -> SyncResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(SyncError::Network(format!("malformed timestamp: '{}'", raw)))
}

/// Split a comma-joined string into trimmed, non-empty, deduplicated
/// entries, keeping first-seen order.
pub fn split_joined(raw: Option<&str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for part in raw.unwrap_or_default().split(',') {
        let part = part.trim();
        if !part.is_empty() && !out.iter().any(|t| t == part) {
            out.push(part.to_string());
        }
    }
    out
}

fn normalize_sources(raw: Option<SourcesField>) -> Vec<String> {
    match raw {
        None => Vec::new(),
        Some(SourcesField::Joined(s)) => split_joined(Some(&s)),
        Some(SourcesField::List(list)) => list
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

fn normalize_chunk(raw: ChunkRecord) -> Chunk {
    Chunk {
        id: raw.id,
        content: raw.content,
        page_number: raw.page_number,
        chunk_index: raw.chunk_index,
    }
}

pub fn normalize_document(raw: DocumentRecord) -> SyncResult<Document> {
    Ok(Document {
        uploaded_at: parse_timestamp(&raw.upload_date)?,
        id: raw.id,
        name: raw.name,
        tags: raw.tags,
        chunks: raw.chunks.into_iter().map(normalize_chunk).collect(),
        embeddings: raw.embeddings,
    })
}

/// Normalize a library. When `documents` is given (from a dedicated
/// document listing) it takes precedence over the documents embedded in
/// the library record.
pub fn normalize_library(
    raw: LibraryRecord,
    documents: Option<Vec<DocumentRecord>>,
) -> SyncResult<Library> {
    let docs = documents.unwrap_or(raw.documents);
    Ok(Library {
        created_at: parse_timestamp(&raw.created_at)?,
        tags: split_joined(raw.tags.as_deref()),
        id: raw.id,
        name: raw.name,
        description: raw.description,
        documents: docs
            .into_iter()
            .map(normalize_document)
            .collect::<SyncResult<Vec<_>>>()?,
    })
}

pub fn normalize_message(raw: MessageRecord) -> SyncResult<Message> {
    let role = Role::parse(&raw.role)
        .ok_or_else(|| SyncError::Network(format!("unknown message role: '{}'", raw.role)))?;
    Ok(Message {
        timestamp: parse_timestamp(&raw.timestamp)?,
        id: raw.id,
        content: raw.content,
        role,
        sources: normalize_sources(raw.sources),
    })
}

pub fn normalize_conversation(raw: ConversationRecord) -> SyncResult<Conversation> {
    Ok(Conversation {
        created_at: parse_timestamp(&raw.created_at)?,
        updated_at: parse_timestamp(&raw.updated_at)?,
        id: raw.id,
        library_id: raw.library_id,
        title: raw.title,
        messages: raw
            .messages
            .into_iter()
            .map(normalize_message)
            .collect::<SyncResult<Vec<_>>>()?,
    })
}

// ============ Selection repair ============

/// Repair the current-library selection against a freshly replaced list.
///
/// Kept (as the fresh copy) when its id survived, otherwise the first
/// library, otherwise `None`.
pub fn repair_library_selection(current: Option<&Library>, libraries: &[Library]) -> Option<Library> {
    current
        .and_then(|cur| libraries.iter().find(|l| l.id == cur.id))
        .or_else(|| libraries.first())
        .cloned()
}

/// Repair the current-conversation selection against a freshly replaced
/// list. Never falls back to another conversation.
pub fn repair_conversation_selection(
    current: Option<&Conversation>,
    conversations: &[Conversation],
) -> Option<Conversation> {
    let cur = current?;
    conversations.iter().find(|c| c.id == cur.id).cloned()
}

// ============ Merge by id ============

/// Replace the entry sharing `item`'s id in place, or append it.
/// Returns `true` when an existing entry was replaced.
pub fn merge_by_id<T: Identified>(list: &mut Vec<T>, item: T) -> bool {
    match list.iter_mut().find(|existing| existing.id() == item.id()) {
        Some(slot) => {
            *slot = item;
            true
        }
        None => {
            list.push(item);
            false
        }
    }
}

/// Remove the entry with `id`. Returns `true` when something was removed.
pub fn remove_by_id<T: Identified>(list: &mut Vec<T>, id: &str) -> bool {
    let before = list.len();
    list.retain(|item| item.id() != id);
    list.len() != before
}

/// First conversation in iteration order matching library and title.
pub fn find_by_title<'a>(
    conversations: &'a [Conversation],
    library_id: &str,
    title: &str,
) -> Option<&'a Conversation> {
    conversations
        .iter()
        .find(|c| c.library_id == library_id && c.title == title)
}
