//! # Scriptorium
//!
//! Command line companion to the Scriptorium post editor. It works on the
//! local draft mirror the editor writes while offline, and on exported post
//! bodies.
//!
//! ## Usage
//!
//! ```bash
//! # Slug the editor would derive for a title
//! scriptorium slug "Hello, World!"
//!
//! # Word count and reading time of an exported post body
//! scriptorium stats post.html
//!
//! # Second page of local drafts mentioning "vespers"
//! scriptorium drafts --query vespers --page 2
//!
//! # Remove a local draft
//! scriptorium delete temp-1718000000000
//! ```

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Arg, ArgAction, ArgMatches, Command};
use scriptorium_core::{text, Config, Draft, DraftLibrary, LocalDraftStore, Paginator};
use scriptorium_editor::WritingStats;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Command line arguments for Scriptorium
#[derive(Debug, Clone, PartialEq)]
pub struct AppArgs {
    /// Configuration file layered under the environment
    pub config_path: Option<PathBuf>,
    /// Local draft store overriding the configured one
    pub store_path: Option<PathBuf>,
    /// Enable debug logging
    pub debug: bool,
    /// What to do
    pub command: AppCommand,
}

/// Subcommands.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Slug { title: String },
    Stats { file: PathBuf, json: bool },
    Drafts { query: Option<String>, page: usize },
    Delete { id: String },
}

fn build_cli() -> Command {
    Command::new("Scriptorium")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Scriptorium Team")
        .about("Drafts, slugs and statistics for Scriptorium posts")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file to load")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("FILE")
                .help("Local draft store to use instead of the configured one")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Enable debug logging")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("slug")
                .about("Print the slug derived from a title")
                .arg(Arg::new("title").value_name("TITLE").required(true)),
        )
        .subcommand(
            Command::new("stats")
                .about("Word count and reading time of an HTML post body")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the statistics as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("drafts")
                .about("List local drafts")
                .arg(
                    Arg::new("query")
                        .short('q')
                        .long("query")
                        .value_name("TEXT")
                        .help("Only drafts whose title or body contains TEXT"),
                )
                .arg(
                    Arg::new("page")
                        .short('p')
                        .long("page")
                        .value_name("N")
                        .help("Page to show, starting at 1")
                        .default_value("1")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete a local draft")
                .arg(Arg::new("id").value_name("ID").required(true)),
        )
}

fn args_from_matches(matches: &ArgMatches) -> AppArgs {
    let command = match matches.subcommand() {
        Some(("slug", sub)) => AppCommand::Slug {
            title: sub.get_one::<String>("title").cloned().unwrap_or_default(),
        },
        Some(("stats", sub)) => AppCommand::Stats {
            file: sub.get_one::<PathBuf>("file").cloned().unwrap_or_default(),
            json: sub.get_flag("json"),
        },
        Some(("drafts", sub)) => AppCommand::Drafts {
            query: sub.get_one::<String>("query").cloned(),
            page: sub.get_one::<usize>("page").copied().unwrap_or(1),
        },
        Some(("delete", sub)) => AppCommand::Delete {
            id: sub.get_one::<String>("id").cloned().unwrap_or_default(),
        },
        // subcommand_required rejects everything else before we get here
        _ => AppCommand::Drafts {
            query: None,
            page: 1,
        },
    };

    AppArgs {
        config_path: matches.get_one::<PathBuf>("config").cloned(),
        store_path: matches.get_one::<PathBuf>("store").cloned(),
        debug: matches.get_flag("debug"),
        command,
    }
}

/// Parse arguments from an explicit iterator.
fn try_parse_args<I, T>(args: I) -> Result<AppArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    build_cli()
        .try_get_matches_from(args)
        .map(|matches| args_from_matches(&matches))
}

/// Parse command line arguments
fn parse_args() -> AppArgs {
    args_from_matches(&build_cli().get_matches())
}

/// Initialize logging based on arguments
fn init_logging(debug: bool, config: &Config) {
    let level = if debug {
        "debug"
    } else {
        config.advanced.log_level.as_str()
    };
    scriptorium_core::init_tracing_with_level(level);
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_layered(Some(path))
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => {
            let default_path = Config::default_config_path().ok();
            Ok(Config::load_layered(default_path.as_deref())?)
        }
    }
}

fn render_stats(stats: &WritingStats) -> String {
    format!(
        "Words: {}\nCharacters: {} ({} without spaces)\nParagraphs: {}\nSentences: {}\nReading time: {} min",
        stats.word_count(),
        stats.char_count(),
        stats.char_count_no_spaces(),
        stats.paragraph_count(),
        stats.sentence_count(),
        stats.reading_time_minutes(),
    )
}

fn stats_json(stats: &WritingStats) -> serde_json::Value {
    serde_json::json!({
        "words": stats.word_count(),
        "characters": stats.char_count(),
        "characters_no_spaces": stats.char_count_no_spaces(),
        "paragraphs": stats.paragraph_count(),
        "sentences": stats.sentence_count(),
        "reading_time_minutes": stats.reading_time_minutes(),
    })
}

/// One page of drafts, with a footer naming the page.
fn render_drafts(drafts: &[Draft], page: usize, page_size: usize, now: DateTime<Utc>) -> String {
    if drafts.is_empty() {
        return "No drafts found".to_string();
    }

    let mut pages = Paginator::new(drafts.len(), page_size);
    pages.go_to(page);

    let mut lines: Vec<String> = drafts[pages.range()]
        .iter()
        .map(|draft| {
            let mut line = format!(
                "{}  {} [{}] {}",
                draft.id,
                draft.display_title(),
                draft.status,
                draft.time_ago(now)
            );
            let preview = draft.preview();
            if !preview.is_empty() {
                line.push_str("\n    ");
                line.push_str(&preview);
            }
            line
        })
        .collect();

    lines.push(format!(
        "Page {} of {} ({} drafts)",
        pages.current_page(),
        pages.total_pages(),
        drafts.len()
    ));
    lines.join("\n")
}

async fn run(args: AppArgs, config: Config) -> anyhow::Result<()> {
    match args.command {
        AppCommand::Slug { title } => {
            println!("{}", text::derive_slug(&title));
        }
        AppCommand::Stats { file, json } => {
            let html = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let mut stats = WritingStats::with_words_per_minute(config.editor.words_per_minute);
            stats.update(&html);
            if json {
                println!("{}", serde_json::to_string_pretty(&stats_json(&stats))?);
            } else {
                println!("{}", render_stats(&stats));
            }
        }
        AppCommand::Drafts { query, page } => {
            let library = open_library(args.store_path.as_deref(), &config)?;
            let drafts = match query.as_deref() {
                Some(query) => library.search(query).await?.drafts,
                None => library.list_drafts(None).await?,
            };
            println!(
                "{}",
                render_drafts(&drafts, page, config.drafts.page_size, Utc::now())
            );
        }
        AppCommand::Delete { id } => {
            let library = open_library(args.store_path.as_deref(), &config)?;
            library.delete_draft(&id).await?;
            println!("Deleted {}", id);
        }
    }
    Ok(())
}

fn open_library(store_path: Option<&Path>, config: &Config) -> anyhow::Result<DraftLibrary> {
    let path = store_path.unwrap_or(&config.drafts.store_path);
    let store = LocalDraftStore::open(path)
        .with_context(|| format!("Failed to open draft store {}", path.display()))?;
    Ok(DraftLibrary::new(None, Arc::new(store)).with_search_limit(config.drafts.search_limit))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_args();
    let config = load_config(args.config_path.as_deref())?;
    init_logging(args.debug, &config);

    tracing::info!("Starting Scriptorium v{}", env!("CARGO_PKG_VERSION"));

    run(args, config).await
}
