//! # docshelf
//!
//! Client-side synchronization cache for a PDF library assistant.
//!
//! Users group PDFs into libraries, upload them to a backend for indexing,
//! and hold threaded conversations answered by retrieval-augmented
//! generation on that backend. This crate keeps the local working copy of
//! libraries, documents, and conversations consistent with the backend,
//! persists a subset of it across restarts, and keeps the current
//! selections valid while remote calls succeed, fail, or interleave.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────┐
//! │   CLI    │──▶│ SyncedStore  │──▶│ RemoteGateway │──▶ backend
//! │ (shelf)  │   │   (store)    │   │  HTTP / mem   │
//! └──────────┘   └──────┬───────┘   └───────────────┘
//!                       │
//!            ┌──────────┴──────────┐
//!            ▼                     ▼
//!      ┌───────────┐        ┌─────────────┐
//!      │ reconcile │        │   persist   │──▶ SQLite kv_store
//!      │  (pure)   │        │ + migration │
//!      └───────────┘        └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! shelf sync                                   # pull libraries and conversations
//! shelf library create Physics --tags "science, intro"
//! shelf upload <library-id> ./mechanics.pdf
//! shelf conversation create <library-id> "Chat A"
//! shelf ask <conversation-id> "What are Newton's laws?"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Internal data model |
//! | [`gateway`] | Remote backend trait, HTTP and in-memory implementations |
//! | [`reconcile`] | Normalization, selection repair, merge-by-id |
//! | [`persist`] | Snapshot storage and versioned migration |
//! | [`store`] | The synchronization cache |
//! | [`commands`] | CLI command implementations |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`logging`] | Tracing subscriber setup |

pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod persist;
pub mod reconcile;
pub mod store;

pub use error::{SyncError, SyncResult};
pub use store::SyncedStore;
