// Module declarations
mod albums;
mod cli;
mod db;
mod error;
mod links;
mod migrate;
mod reconcile;
mod types;
mod util;
mod vault;

// Re-export all module items at crate root so cross-module references work.
#[allow(unused_imports)]
pub(crate) use albums::*;
#[allow(unused_imports)]
pub(crate) use cli::*;
#[allow(unused_imports)]
pub(crate) use db::*;
#[allow(unused_imports)]
pub(crate) use error::*;
#[allow(unused_imports)]
pub(crate) use links::*;
#[allow(unused_imports)]
pub(crate) use migrate::*;
#[allow(unused_imports)]
pub(crate) use reconcile::*;
#[allow(unused_imports)]
pub(crate) use types::*;
#[allow(unused_imports)]
pub(crate) use util::*;
#[allow(unused_imports)]
pub(crate) use vault::*;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;

use chrono::{DateTime, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let (vault, migration) = Vault::open(&cli.db, &cli.legacy)?;
    if migration.total > 0 {
        eprintln!(
            "Migrated {} of {} legacy memories ({} already present)",
            migration.migrated, migration.total, migration.skipped
        );
    }

    match cli.command {
        Command::Stats => cmd_stats(&vault),
        Command::List {
            search,
            category,
            favorites,
            sort,
            json,
        } => cmd_list(&vault, search, category, favorites, sort, json),
        Command::Add {
            file,
            title,
            description,
            category,
            tags,
            date,
            location,
        } => cmd_add(&vault, file, title, description, category, tags, date, location),
        Command::Show { id, json } => cmd_show(&vault, &id, json),
        Command::Delete { id } => {
            vault.delete_memory(&id)?;
            println!("Deleted {id}");
            Ok(())
        }
        Command::Favorite { id } => {
            let updated = vault.toggle_favorite(&id)?;
            if updated.is_favorite {
                println!("{} is now a favorite", updated.id);
            } else {
                println!("{} is no longer a favorite", updated.id);
            }
            Ok(())
        }
        Command::Album { command } => cmd_album(&vault, command),
        Command::Smart { command } => cmd_smart(&vault, command),
        Command::Link { command } => cmd_link(&vault, command),
        Command::Comment { command } => cmd_comment(&vault, command),
        Command::Export { out } => cmd_export(&vault, out),
        Command::Import {
            file,
            mode,
            strategy,
            yes,
        } => cmd_import(&vault, file, mode, strategy, yes),
        Command::Migrate { reset } => {
            if reset {
                vault.db().kv_delete(MIGRATED_FLAG_KEY)?;
                vault.db().kv_delete(LEGACY_BACKUP_KEY)?;
            }
            let report = migrate_from_legacy(vault.db(), &cli.legacy)?;
            println!(
                "Migrated {} of {} ({} skipped)",
                report.migrated, report.total, report.skipped
            );
            Ok(())
        }
        Command::Clear { yes } => {
            if !yes {
                eprintln!("This deletes every memory. Re-run with --yes to confirm.");
                std::process::exit(2);
            }
            let count = vault.db().memory_count();
            vault.db().clear_memories()?;
            println!("Deleted {count} memories");
            Ok(())
        }
    }
}

type CmdResult = Result<(), Box<dyn std::error::Error>>;

fn cmd_stats(vault: &Vault) -> CmdResult {
    let memories = vault.db().get_all_memories();
    let mut by_category: BTreeMap<&str, usize> = BTreeMap::new();
    let mut content_bytes = 0u64;
    for m in &memories {
        *by_category.entry(m.category.as_str()).or_insert(0) += 1;
        content_bytes += m.file_size;
    }
    println!("Memories:     {}", memories.len());
    println!(
        "Favorites:    {}",
        memories.iter().filter(|m| m.is_favorite).count()
    );
    println!("Albums:       {}", vault.db().all_albums().len());
    println!("Smart albums: {}", vault.db().all_smart_albums().len());
    println!("Tags:         {}", all_tags(&memories).len());
    println!("Content:      {}", format_file_size(content_bytes));
    println!(
        "Database:     {} ({})",
        vault.db_path().display(),
        format_file_size(VaultDb::file_size(vault.db_path()))
    );
    let years = available_years(&memories);
    if !years.is_empty() {
        let years: Vec<String> = years.iter().map(|y| y.to_string()).collect();
        println!("Years:        {}", years.join(", "));
    }
    if !by_category.is_empty() {
        println!("Categories:");
        for (category, count) in &by_category {
            println!("  {category}: {count}");
        }
    }
    Ok(())
}

fn cmd_list(
    vault: &Vault,
    search: Option<String>,
    category: Option<String>,
    favorites: bool,
    sort: SortArg,
    json: bool,
) -> CmdResult {
    let filter = MemoryFilter {
        search,
        category,
        favorites_only: favorites,
        sort_by: match sort {
            SortArg::DateAdded => SortBy::DateAdded,
            SortArg::DateCreated => SortBy::DateCreated,
            SortArg::Title => SortBy::Title,
            SortArg::Category => SortBy::Category,
        },
    };
    let memories = vault.filtered_memories(&filter);
    if memories.is_empty() {
        if let Some(wanted) = &filter.category {
            let known = available_categories(&vault.db().get_all_memories());
            if !known.contains(wanted) && !known.is_empty() {
                eprintln!("No such category {wanted}; known: {}", known.join(", "));
            }
        }
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&memories)?);
    } else {
        for m in &memories {
            let star = if m.is_favorite { "*" } else { " " };
            println!(
                "{star} {}  {}  [{}]  {}",
                m.id,
                m.date_added.format("%Y-%m-%d"),
                m.category,
                m.title
            );
        }
        println!("{} memories", memories.len());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_add(
    vault: &Vault,
    file: std::path::PathBuf,
    title: Option<String>,
    description: String,
    category: Option<String>,
    tags: Vec<String>,
    date: Option<String>,
    location: Option<String>,
) -> CmdResult {
    let bytes = fs::read(&file)?;
    let ext = file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let mime = mime_for_extension(ext);
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    let title = title.unwrap_or_else(|| {
        file.file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled")
            .to_string()
    });
    let date_created = match date {
        Some(s) => Some(parse_date(&s)?),
        None => None,
    };

    let memory = vault.add_memory(
        NewMemory {
            title,
            description,
            category: category.unwrap_or_else(|| category_for_mime(mime).to_string()),
            tags,
            date_created,
            file_name,
            file_type: mime.to_string(),
            file_size: bytes.len() as u64,
            file_data: data_uri_from_bytes(mime, &bytes),
            thumbnail: None,
            location,
            metadata: None,
        },
        Utc::now(),
    )?;
    println!("Added {} ({})", memory.id, format_file_size(memory.file_size));
    Ok(())
}

fn cmd_show(vault: &Vault, id: &str, json: bool) -> CmdResult {
    let Some(memory) = vault.db().memory_by_id(id)? else {
        eprintln!("No memory with id {id}");
        std::process::exit(2);
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&memory)?);
        return Ok(());
    }
    println!("{}  {}", memory.id, memory.title);
    if !memory.description.is_empty() {
        println!("  {}", memory.description);
    }
    println!("  category: {}", memory.category);
    if !memory.tags.is_empty() {
        println!("  tags:     {}", memory.tags.join(", "));
    }
    println!("  created:  {}", memory.date_created.to_rfc3339());
    println!("  added:    {}", memory.date_added.to_rfc3339());
    println!(
        "  file:     {} ({}, {})",
        memory.file_name,
        memory.file_type,
        format_file_size(memory.file_size)
    );
    if let (Some(mime), Some(len)) = (
        data_uri_mime(&memory.file_data),
        data_uri_byte_len(&memory.file_data),
    ) {
        println!("  payload:  {mime}, {} decoded", format_file_size(len));
    }
    if let Some(location) = &memory.location {
        println!("  location: {location}");
    }
    if memory.is_favorite {
        println!("  favorite");
    }

    for album in vault.db().memory_albums(id) {
        println!("  album:    {} ({})", album.name, album.id);
    }
    let all = vault.db().get_all_memories();
    for linked in vault.db().linked_memories(id, &all) {
        println!(
            "  link ({}): {} [{}]",
            linked.link.link_type.as_str(),
            linked.memory.title,
            linked.link.id
        );
    }
    for comment in vault.db().comments_for(id) {
        let edited = if comment.edited { " (edited)" } else { "" };
        println!("  comment [{}]{edited}: {}", comment.author, comment.text);
    }
    Ok(())
}

fn cmd_album(vault: &Vault, command: AlbumCommand) -> CmdResult {
    match command {
        AlbumCommand::Create {
            name,
            description,
            parent,
        } => {
            let album = vault.db().create_album(
                NewAlbum {
                    name,
                    description,
                    parent_album_id: parent,
                    ..Default::default()
                },
                Utc::now(),
            )?;
            println!("Created album {} ({})", album.name, album.id);
        }
        AlbumCommand::List => {
            for root in vault.db().root_albums() {
                print_album_tree(vault, &root, 0);
            }
        }
        AlbumCommand::Show { id } => {
            let Some(album) = vault.db().album_by_id(&id)? else {
                eprintln!("No album with id {id}");
                std::process::exit(2);
            };
            println!("{}  {}", album.id, album.name);
            if !album.description.is_empty() {
                println!("  {}", album.description);
            }
            let all = vault.db().get_all_memories();
            for memory in vault.db().album_memories(&id, &all) {
                println!("  {}  {}", memory.id, memory.title);
            }
        }
        AlbumCommand::Rename { id, name } => {
            let album = vault.db().update_album(
                &id,
                &AlbumPatch {
                    name: Some(name),
                    ..Default::default()
                },
            )?;
            println!("Renamed {} to {}", album.id, album.name);
        }
        AlbumCommand::Nest { id, under } => {
            vault.db().update_album(
                &id,
                &AlbumPatch {
                    parent_album_id: Some(under.clone()),
                    ..Default::default()
                },
            )?;
            match under {
                Some(parent) => println!("Moved {id} under {parent}"),
                None => println!("Moved {id} to the root"),
            }
        }
        AlbumCommand::Add { album_id, memory_id } => {
            vault.db().add_memory_to_album(&album_id, &memory_id)?;
            println!("Added {memory_id} to {album_id}");
        }
        AlbumCommand::Remove { album_id, memory_id } => {
            vault.db().remove_memory_from_album(&album_id, &memory_id)?;
            println!("Removed {memory_id} from {album_id}");
        }
        AlbumCommand::Delete { id } => {
            vault.db().delete_album(&id)?;
            println!("Deleted album {id}");
        }
    }
    Ok(())
}

fn print_album_tree(vault: &Vault, album: &Album, depth: usize) {
    let indent = "  ".repeat(depth);
    println!(
        "{indent}{}  {} ({} memories)",
        album.id,
        album.name,
        album.memory_ids.len()
    );
    for child in vault.db().child_albums(&album.id) {
        print_album_tree(vault, &child, depth + 1);
    }
}

fn cmd_smart(vault: &Vault, command: SmartCommand) -> CmdResult {
    match command {
        SmartCommand::Init => {
            let now = Utc::now();
            for data in default_smart_albums(now) {
                let album = vault.db().create_smart_album(data, now)?;
                println!("Created smart album {} ({})", album.name, album.id);
            }
        }
        SmartCommand::List => {
            for album in vault.db().all_smart_albums() {
                println!("{}  {}", album.id, album.name);
            }
        }
        SmartCommand::Show { id } => {
            let Some(album) = vault
                .db()
                .all_smart_albums()
                .into_iter()
                .find(|a| a.id == id)
            else {
                eprintln!("No smart album with id {id}");
                std::process::exit(2);
            };
            println!("{}  {}", album.id, album.name);
            let all = vault.db().get_all_memories();
            for memory in resolve_smart_album(&album.rule, &all, Utc::now()) {
                println!("  {}  {}", memory.id, memory.title);
            }
        }
        SmartCommand::Rename { id, name } => {
            let album = vault.db().update_smart_album(
                &id,
                &SmartAlbumPatch {
                    name: Some(name),
                    ..Default::default()
                },
            )?;
            println!("Renamed {} to {}", album.id, album.name);
        }
        SmartCommand::Delete { id } => {
            vault.db().delete_smart_album(&id)?;
            println!("Deleted smart album {id}");
        }
    }
    Ok(())
}

fn cmd_link(vault: &Vault, command: LinkCommand) -> CmdResult {
    match command {
        LinkCommand::Add {
            from,
            to,
            link_type,
        } => {
            let link_type = match link_type {
                LinkTypeArg::Related => LinkType::Related,
                LinkTypeArg::Sequence => LinkType::Sequence,
                LinkTypeArg::BeforeAfter => LinkType::BeforeAfter,
                LinkTypeArg::SameEvent => LinkType::SameEvent,
                LinkTypeArg::SamePeople => LinkType::SamePeople,
                LinkTypeArg::SamePlace => LinkType::SamePlace,
                LinkTypeArg::Custom => LinkType::Custom,
            };
            match vault.db().add_link(&from, &to, link_type, None, Utc::now())? {
                Some(link) => println!("Linked {from} and {to} ({})", link.id),
                None => println!("{from} and {to} are already linked"),
            }
        }
        LinkCommand::Remove { link_id } => {
            vault.db().remove_link(&link_id)?;
            println!("Removed link {link_id}");
        }
        LinkCommand::Suggest { id } => {
            let Some(memory) = vault.db().memory_by_id(&id)? else {
                eprintln!("No memory with id {id}");
                std::process::exit(2);
            };
            let all = vault.db().get_all_memories();
            for s in suggest_links(&memory, &all) {
                println!(
                    "{}  {} (score {}, {})",
                    s.memory.id,
                    s.memory.title,
                    s.score,
                    s.suggested_link_type.as_str()
                );
            }
        }
        LinkCommand::Sequences => {
            let all = vault.db().get_all_memories();
            for (i, run) in vault.db().memory_sequences(&all).iter().enumerate() {
                let titles: Vec<&str> = run.iter().map(|m| m.title.as_str()).collect();
                println!("{}: {}", i + 1, titles.join(" -> "));
            }
        }
    }
    Ok(())
}

fn cmd_comment(vault: &Vault, command: CommentCommand) -> CmdResult {
    match command {
        CommentCommand::Add {
            memory_id,
            text,
            author,
        } => {
            let comment = vault
                .db()
                .add_comment(&memory_id, &text, &author, Utc::now())?;
            println!("Added comment {}", comment.id);
        }
        CommentCommand::List { memory_id } => {
            for comment in vault.db().comments_for(&memory_id) {
                let edited = if comment.edited { " (edited)" } else { "" };
                println!(
                    "{}  [{}]{edited} {}",
                    comment.id, comment.author, comment.text
                );
            }
            println!("{} comments", vault.db().comment_count(&memory_id));
        }
        CommentCommand::Edit { comment_id, text } => {
            vault.db().edit_comment(&comment_id, &text, Utc::now())?;
            println!("Edited {comment_id}");
        }
        CommentCommand::Delete { comment_id } => {
            vault.db().delete_comment(&comment_id)?;
            println!("Deleted {comment_id}");
        }
    }
    Ok(())
}

fn cmd_export(vault: &Vault, out: Option<std::path::PathBuf>) -> CmdResult {
    let snapshot = export_snapshot(vault.db(), Utc::now());
    let json = serde_json::to_string_pretty(&snapshot)?;
    match out {
        Some(path) => {
            fs::write(&path, json)?;
            println!(
                "Exported {} memories to {}",
                snapshot.memories.len(),
                path.display()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn cmd_import(
    vault: &Vault,
    file: std::path::PathBuf,
    mode: ModeArg,
    strategy: StrategyArg,
    yes: bool,
) -> CmdResult {
    let raw = fs::read_to_string(&file)?;
    let mut session = ImportSession::new();
    let stats = session.select(&raw)?;
    eprintln!(
        "Snapshot: {} memories, {} (version {})",
        stats.total,
        format_file_size(stats.total_bytes),
        stats.version
    );
    for (category, count) in &stats.categories {
        eprintln!("  {category}: {count}");
    }

    let mode = match mode {
        ModeArg::Merge => ImportMode::Merge,
        ModeArg::Replace => ImportMode::Replace,
    };
    if mode == ImportMode::Replace {
        if !yes {
            eprintln!("Replace mode wipes the store first. Re-run with --yes to confirm.");
            std::process::exit(2);
        }
        vault.db().clear_memories()?;
    }
    let strategy = match strategy {
        StrategyArg::Skip => ConflictStrategy::Skip,
        StrategyArg::Overwrite => ConflictStrategy::Overwrite,
    };

    let report = session.run(vault.db(), mode, strategy, |current, total| {
        eprint!("\rimporting {current}/{total}");
        let _ = std::io::stderr().flush();
    })?;
    eprintln!();
    println!(
        "Imported {}, skipped {}, errors {} (of {})",
        report.imported, report.skipped, report.errors, report.total
    );
    Ok(())
}

fn parse_date(s: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
