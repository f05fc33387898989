#[allow(unused_imports)]
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "memoria-vault")]
#[command(about = "Local media journal: a single-file vault for memories", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Path to the vault database.
    #[arg(long, global = true, default_value = "memoria-vault.db")]
    pub(crate) db: PathBuf,

    /// Path to the legacy flat-file store (migrated on first open).
    #[arg(long, global = true, default_value = "memoria-vault-data.json")]
    pub(crate) legacy: PathBuf,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Show vault statistics: record counts, categories, storage footprint.
    Stats,

    /// List memories, filtered and sorted.
    List {
        /// Case-insensitive search over title, description and tags.
        #[arg(short, long)]
        search: Option<String>,
        /// Restrict to one category (Photos, Videos, Audio, Documents, Notes).
        #[arg(short, long)]
        category: Option<String>,
        /// Favorites only.
        #[arg(short, long)]
        favorites: bool,
        #[arg(long, value_enum, default_value = "date-added")]
        sort: SortArg,
        /// Output JSON instead of the table.
        #[arg(long)]
        json: bool,
    },

    /// Add a file to the vault as a new memory.
    Add {
        /// File to ingest (read fully, stored as a data URI).
        file: PathBuf,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Category override; derived from the file type when omitted.
        #[arg(short, long)]
        category: Option<String>,
        /// Tags (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Content date (RFC 3339). Defaults to now.
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },

    /// Show one memory in full, with its albums, links and comments.
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },

    /// Delete a memory and everything referencing it.
    Delete { id: String },

    /// Toggle a memory's favorite flag.
    Favorite { id: String },

    /// Manage albums.
    Album {
        #[command(subcommand)]
        command: AlbumCommand,
    },

    /// Manage smart albums (rule-based, resolved on read).
    Smart {
        #[command(subcommand)]
        command: SmartCommand,
    },

    /// Manage links between memories.
    Link {
        #[command(subcommand)]
        command: LinkCommand,
    },

    /// Manage comments on memories.
    Comment {
        #[command(subcommand)]
        command: CommentCommand,
    },

    /// Export every memory as a JSON snapshot.
    Export {
        /// Output file; stdout when omitted.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Import a JSON snapshot.
    Import {
        file: PathBuf,
        #[arg(long, value_enum, default_value = "merge")]
        mode: ModeArg,
        /// What to do when an incoming id already exists (merge mode).
        #[arg(long, value_enum, default_value = "skip")]
        strategy: StrategyArg,
        /// Required for replace mode: confirms wiping the store first.
        #[arg(long)]
        yes: bool,
    },

    /// Run the legacy flat-file migration explicitly.
    Migrate {
        /// Clear the completion flag and stored backup first, forcing a
        /// fresh run.
        #[arg(long)]
        reset: bool,
    },

    /// Delete every memory from the vault.
    Clear {
        /// Required: confirms the wipe.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub(crate) enum AlbumCommand {
    /// Create an album.
    Create {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Parent album id, for nesting.
        #[arg(long)]
        parent: Option<String>,
    },
    /// List albums as a tree.
    List,
    /// Show one album and its resolved memories.
    Show { id: String },
    /// Rename an album.
    Rename { id: String, name: String },
    /// Move an album under a new parent, or to the root.
    Nest {
        id: String,
        /// New parent album id; omit to move to the root.
        #[arg(long)]
        under: Option<String>,
    },
    /// Add a memory to an album.
    Add { album_id: String, memory_id: String },
    /// Remove a memory from an album.
    Remove { album_id: String, memory_id: String },
    /// Delete an album (its memories are untouched).
    Delete { id: String },
}

#[derive(Subcommand)]
pub(crate) enum SmartCommand {
    /// Create the starter set (favorites, last 30 days, current year).
    Init,
    /// List smart albums.
    List,
    /// Resolve a smart album against the current memories.
    Show { id: String },
    /// Rename a smart album.
    Rename { id: String, name: String },
    /// Delete a smart album.
    Delete { id: String },
}

#[derive(Subcommand)]
pub(crate) enum LinkCommand {
    /// Link two memories.
    Add {
        from: String,
        to: String,
        #[arg(long = "type", value_enum, default_value = "related")]
        link_type: LinkTypeArg,
    },
    /// Remove a link by id.
    Remove { link_id: String },
    /// Suggest likely links for a memory.
    Suggest { id: String },
    /// Show sequence-linked runs of memories.
    Sequences,
}

#[derive(Subcommand)]
pub(crate) enum CommentCommand {
    /// Comment on a memory.
    Add {
        memory_id: String,
        text: String,
        #[arg(long, default_value = "You")]
        author: String,
    },
    /// List a memory's comments.
    List { memory_id: String },
    /// Edit a comment.
    Edit { comment_id: String, text: String },
    /// Delete a comment.
    Delete { comment_id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum SortArg {
    DateAdded,
    DateCreated,
    Title,
    Category,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum ModeArg {
    Merge,
    Replace,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum StrategyArg {
    Skip,
    Overwrite,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub(crate) enum LinkTypeArg {
    Related,
    Sequence,
    BeforeAfter,
    SameEvent,
    SamePeople,
    SamePlace,
    Custom,
}
