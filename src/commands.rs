//! CLI command implementations.
//!
//! Each `run_*` function opens the store from its persisted snapshot,
//! performs one cache operation against the configured backend, and prints
//! the result to stdout. The snapshot is written as part of every commit.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::gateway::http::HttpGateway;
use crate::models::{Conversation, Library, ResponseLength};
use crate::persist::SqliteSnapshotStore;
use crate::store::SyncedStore;

/// Build the HTTP-backed store and restore its snapshot.
pub async fn open_store(config: &Config) -> Result<SyncedStore<HttpGateway>> {
    let gateway = HttpGateway::new(&config.remote)?;
    let snapshots = SqliteSnapshotStore::open(&config.storage).await?;
    let store = SyncedStore::open(gateway, Arc::new(snapshots), config.storage.namespace.clone())
        .await
        .context("Failed to restore local snapshot")?;
    Ok(store)
}

fn format_library(lib: &Library, current: bool) -> String {
    let marker = if current { "*" } else { " " };
    let tags = if lib.tags.is_empty() {
        String::new()
    } else {
        format!("  [{}]", lib.tags.join(", "))
    };
    format!(
        "{} {}  {}  ({} documents){}",
        marker,
        lib.id,
        lib.name,
        lib.documents.len(),
        tags
    )
}

fn format_conversation(conv: &Conversation) -> String {
    format!(
        "  {}  {}  ({} messages, updated {})",
        conv.id,
        conv.title,
        conv.messages.len(),
        conv.updated_at.format("%Y-%m-%d %H:%M")
    )
}

pub async fn run_status(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let health = store.health().await?;
    println!("backend: {}", config.remote.base_url);
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}

pub async fn run_sync(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    store.initialize().await?;
    let libraries = store.libraries();
    let documents: usize = libraries.iter().map(|l| l.documents.len()).sum();
    println!("sync ok");
    println!("  libraries:     {}", libraries.len());
    println!("  documents:     {}", documents);
    println!("  conversations: {}", store.conversations().len());
    Ok(())
}

pub async fn run_libraries(config: &Config, cached: bool) -> Result<()> {
    let store = open_store(config).await?;
    if !cached {
        store.fetch_libraries().await?;
    }
    let libraries = store.libraries();
    if libraries.is_empty() {
        println!("No libraries.");
        return Ok(());
    }
    let current = store.current_library().map(|l| l.id);
    for lib in &libraries {
        println!("{}", format_library(lib, current.as_deref() == Some(lib.id.as_str())));
    }
    Ok(())
}

pub async fn run_library_create(
    config: &Config,
    name: &str,
    description: Option<&str>,
    tags: Option<&str>,
) -> Result<()> {
    if name.trim().is_empty() {
        bail!("library name must not be empty");
    }
    let store = open_store(config).await?;
    let library = store.create_library(name.trim(), description, tags).await?;
    println!("created library {} ({})", library.name, library.id);
    Ok(())
}

pub async fn run_library_delete(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    store.delete_library(id).await?;
    println!("deleted library {}", id);
    println!("{} libraries remain", store.libraries().len());
    Ok(())
}

pub async fn run_documents(config: &Config, library_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let library = store.refresh_library(library_id).await?;
    println!("--- {} ({} documents) ---", library.name, library.documents.len());
    for doc in &library.documents {
        println!(
            "  {}  {}  uploaded {}  chunks={}  tags={}",
            doc.id,
            doc.name,
            doc.uploaded_at.format("%Y-%m-%d %H:%M"),
            doc.chunks.len(),
            doc.tags.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub async fn run_upload(config: &Config, library_id: &str, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document.pdf".to_string());
    let store = open_store(config).await?;
    let doc = store.upload_document(library_id, &file_name, bytes).await?;
    println!("uploaded {} ({}) with {} chunks", doc.name, doc.id, doc.chunks.len());
    Ok(())
}

pub async fn run_document_update(
    config: &Config,
    library_id: &str,
    document_id: &str,
    name: Option<&str>,
    tags: Option<&str>,
) -> Result<()> {
    let store = open_store(config).await?;
    store
        .update_document(library_id, document_id, name, tags)
        .await?;
    println!("updated document {}", document_id);
    Ok(())
}

pub async fn run_document_delete(config: &Config, library_id: &str, document_id: &str) -> Result<()> {
    let store = open_store(config).await?;
    store.delete_document(library_id, document_id).await?;
    println!("deleted document {}", document_id);
    Ok(())
}

pub async fn run_conversations(config: &Config, library: Option<&str>, cached: bool) -> Result<()> {
    let store = open_store(config).await?;
    if !cached {
        store.fetch_libraries().await?;
    }
    for lib in store.libraries() {
        if library.is_some_and(|id| id != lib.id) {
            continue;
        }
        let conversations = store.conversations_for(&lib.id);
        println!("{} ({})", lib.name, lib.id);
        if conversations.is_empty() {
            println!("  (no conversations)");
        }
        for conv in &conversations {
            println!("{}", format_conversation(conv));
        }
    }
    Ok(())
}

pub async fn run_conversation_create(config: &Config, library_id: &str, title: &str) -> Result<()> {
    let store = open_store(config).await?;
    store.fetch_libraries().await?;
    let conv = store.create_conversation(library_id, title).await?;
    println!("created conversation {} ({})", conv.title, conv.id);
    Ok(())
}

pub async fn run_conversation_show(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    let conv = store.fetch_conversation(id).await?;
    println!("--- {} ---", conv.title);
    println!("id:         {}", conv.id);
    println!("library_id: {}", conv.library_id);
    println!("created_at: {}", conv.created_at.to_rfc3339());
    println!("updated_at: {}", conv.updated_at.to_rfc3339());
    println!();
    for msg in &conv.messages {
        println!("[{}] {}", msg.role.as_str(), msg.content);
        for source in &msg.sources {
            println!("    - {}", source);
        }
    }
    Ok(())
}

pub async fn run_conversation_rename(config: &Config, id: &str, title: &str) -> Result<()> {
    let store = open_store(config).await?;
    store.fetch_libraries().await?;
    store.update_conversation_title(id, title).await?;
    println!("renamed conversation {}", id);
    Ok(())
}

pub async fn run_conversation_delete(config: &Config, id: &str) -> Result<()> {
    let store = open_store(config).await?;
    store.fetch_libraries().await?;
    store.delete_conversation(id).await?;
    println!("deleted conversation {}", id);
    Ok(())
}

pub async fn run_ask(
    config: &Config,
    conversation_id: &str,
    question: &str,
    length: Option<&str>,
) -> Result<()> {
    let length = match length {
        Some(s) => ResponseLength::parse(s)
            .with_context(|| format!("Unknown response length '{}'. Use short, medium, or long.", s))?,
        None => config.chat.length(),
    };
    let store = open_store(config).await?;
    let conv = store.ask(conversation_id, question, length).await?;
    if let Some(answer) = conv.messages.last() {
        println!("{}", answer.content);
        if !answer.sources.is_empty() {
            println!();
            println!("Sources:");
            for source in &answer.sources {
                println!("  - {}", source);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_format_library_marks_current_and_tags() {
        let lib = Library {
            id: "l1".into(),
            name: "Physics".into(),
            description: None,
            documents: vec![],
            created_at: Utc::now(),
            tags: vec!["science".into(), "intro".into()],
        };
        let line = format_library(&lib, true);
        assert!(line.starts_with('*'));
        assert!(line.contains("[science, intro]"));
        assert!(format_library(&lib, false).starts_with(' '));
    }
}
