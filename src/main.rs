//! # docshelf CLI (`shelf`)
//!
//! Command-line front end for the synchronization cache. Every command
//! restores the local snapshot, talks to the configured backend, and
//! persists the result.
//!
//! ## Usage
//!
//! ```bash
//! shelf --config ./config/docshelf.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `shelf status` | Backend health |
//! | `shelf sync` | Pull all libraries and conversations |
//! | `shelf libraries` | List libraries |
//! | `shelf library create/delete` | Library lifecycle |
//! | `shelf documents <library>` | List a library's documents |
//! | `shelf upload <library> <file>` | Upload a PDF |
//! | `shelf document rename/tag/delete` | Document metadata |
//! | `shelf conversations` | List conversations |
//! | `shelf conversation create/show/rename/delete` | Conversation lifecycle |
//! | `shelf ask <conversation> "<question>"` | Ask the library a question |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use docshelf::{commands, config, logging};

/// docshelf — local cache and CLI for a PDF library assistant.
#[derive(Parser)]
#[command(
    name = "shelf",
    about = "docshelf — local cache and CLI for a PDF library assistant",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docshelf.toml")]
    config: PathBuf,

    /// Log at debug level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show backend health.
    Status,

    /// Pull all libraries, documents, and conversations.
    Sync,

    /// List libraries.
    Libraries {
        /// Show the locally cached copy without contacting the backend.
        #[arg(long)]
        cached: bool,
    },

    /// Create or delete a library.
    Library {
        #[command(subcommand)]
        action: LibraryAction,
    },

    /// List the documents of a library.
    Documents {
        /// Library id.
        library_id: String,
    },

    /// Upload a PDF to a library.
    Upload {
        /// Library id.
        library_id: String,
        /// Path to the PDF.
        path: PathBuf,
    },

    /// Rename, retag, or delete a document.
    Document {
        #[command(subcommand)]
        action: DocumentAction,
    },

    /// List conversations, grouped by library.
    Conversations {
        /// Only show this library.
        #[arg(long)]
        library: Option<String>,

        /// Show the locally cached copy without contacting the backend.
        #[arg(long)]
        cached: bool,
    },

    /// Create, show, rename, or delete a conversation.
    Conversation {
        #[command(subcommand)]
        action: ConversationAction,
    },

    /// Ask a question within a conversation.
    Ask {
        /// Conversation id.
        conversation_id: String,
        /// The question.
        question: String,
        /// Answer length: short, medium, or long. Defaults to `[chat].response_length`.
        #[arg(long)]
        length: Option<String>,
    },
}

#[derive(Subcommand)]
enum LibraryAction {
    /// Create a library.
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Comma-separated tags, e.g. "science, intro".
        #[arg(long)]
        tags: Option<String>,
    },
    /// Delete a library and, on the backend, its documents and conversations.
    Delete { id: String },
}

#[derive(Subcommand)]
enum DocumentAction {
    /// Rename a document.
    Rename {
        library_id: String,
        document_id: String,
        name: String,
    },
    /// Replace a document's comma-separated tags.
    Tag {
        library_id: String,
        document_id: String,
        tags: String,
    },
    /// Delete a document.
    Delete {
        library_id: String,
        document_id: String,
    },
}

#[derive(Subcommand)]
enum ConversationAction {
    /// Start a conversation in a library.
    Create { library_id: String, title: String },
    /// Print a conversation with its messages.
    Show { id: String },
    /// Rename a conversation.
    Rename { id: String, title: String },
    /// Delete a conversation.
    Delete { id: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Status => commands::run_status(&cfg).await?,
        Commands::Sync => commands::run_sync(&cfg).await?,
        Commands::Libraries { cached } => commands::run_libraries(&cfg, cached).await?,
        Commands::Library { action } => match action {
            LibraryAction::Create {
                name,
                description,
                tags,
            } => {
                commands::run_library_create(&cfg, &name, description.as_deref(), tags.as_deref())
                    .await?
            }
            LibraryAction::Delete { id } => commands::run_library_delete(&cfg, &id).await?,
        },
        Commands::Documents { library_id } => commands::run_documents(&cfg, &library_id).await?,
        Commands::Upload { library_id, path } => {
            commands::run_upload(&cfg, &library_id, &path).await?
        }
        Commands::Document { action } => match action {
            DocumentAction::Rename {
                library_id,
                document_id,
                name,
            } => {
                commands::run_document_update(&cfg, &library_id, &document_id, Some(&name), None)
                    .await?
            }
            DocumentAction::Tag {
                library_id,
                document_id,
                tags,
            } => {
                commands::run_document_update(&cfg, &library_id, &document_id, None, Some(&tags))
                    .await?
            }
            DocumentAction::Delete {
                library_id,
                document_id,
            } => commands::run_document_delete(&cfg, &library_id, &document_id).await?,
        },
        Commands::Conversations { library, cached } => {
            commands::run_conversations(&cfg, library.as_deref(), cached).await?
        }
        Commands::Conversation { action } => match action {
            ConversationAction::Create { library_id, title } => {
                commands::run_conversation_create(&cfg, &library_id, &title).await?
            }
            ConversationAction::Show { id } => commands::run_conversation_show(&cfg, &id).await?,
            ConversationAction::Rename { id, title } => {
                commands::run_conversation_rename(&cfg, &id, &title).await?
            }
            ConversationAction::Delete { id } => {
                commands::run_conversation_delete(&cfg, &id).await?
            }
        },
        Commands::Ask {
            conversation_id,
            question,
            length,
        } => commands::run_ask(&cfg, &conversation_id, &question, length.as_deref()).await?,
    }

    Ok(())
}
