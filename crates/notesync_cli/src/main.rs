//! NoteSync CLI
//!
//! Command-line tools for a NoteSync store.
//!
//! # Commands
//!
//! - `session` / `note` / `image` - Create and list local entities
//! - `pending` - Dump the pending change queue
//! - `status` - Show sync metadata and entity counts
//! - `sync` - Run a sync cycle against a directory remote
//! - `compact` - Rewrite the store journal

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// NoteSync command-line tools.
#[derive(Parser)]
#[command(name = "notesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    data: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and list sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Create and list notes
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },

    /// Attach images to sessions
    Image {
        #[command(subcommand)]
        action: ImageAction,
    },

    /// Dump the pending change queue
    Pending {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show sync metadata and entity counts
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run one sync cycle (with retry) against a directory remote
    Sync {
        /// Remote directory
        #[arg(short, long)]
        remote: PathBuf,

        /// Principal whose remote document is synced
        #[arg(short, long, default_value = "default")]
        principal: String,
    },

    /// Rewrite the journal from the current state
    Compact,

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Create a session
    Add {
        /// Session title
        title: String,
    },
    /// List sessions
    List,
}

#[derive(Subcommand)]
enum NoteAction {
    /// Add a note to a session
    Add {
        /// Owning session id
        session_id: String,
        /// Note text
        content: String,
    },
    /// List the notes of a session
    List {
        /// Owning session id
        session_id: String,
    },
}

#[derive(Subcommand)]
enum ImageAction {
    /// Attach an image file to a session
    Add {
        /// Owning session id
        session_id: String,
        /// Image file
        path: PathBuf,
        /// MIME type (guessed from the extension if omitted)
        #[arg(short, long)]
        content_type: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Commands::Version = cli.command {
        println!("NoteSync CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("NoteSync Core v{}", notesync_core::VERSION);
        return Ok(());
    }

    let path = cli.data.ok_or("Store directory required (--data <dir>)")?;

    match cli.command {
        Commands::Session { action } => match action {
            SessionAction::Add { title } => commands::entities::add_session(&path, &title)?,
            SessionAction::List => commands::entities::list_sessions(&path)?,
        },
        Commands::Note { action } => match action {
            NoteAction::Add {
                session_id,
                content,
            } => commands::entities::add_note(&path, &session_id, &content)?,
            NoteAction::List { session_id } => commands::entities::list_notes(&path, &session_id)?,
        },
        Commands::Image { action } => match action {
            ImageAction::Add {
                session_id,
                path: file,
                content_type,
            } => commands::image::add(&path, &session_id, &file, content_type.as_deref())?,
        },
        Commands::Pending { format } => commands::pending::run(&path, &format)?,
        Commands::Status { format } => commands::status::run(&path, &format)?,
        Commands::Sync { remote, principal } => commands::sync::run(&path, &remote, &principal)?,
        Commands::Compact => commands::compact::run(&path)?,
        Commands::Version => {}
    }

    Ok(())
}
