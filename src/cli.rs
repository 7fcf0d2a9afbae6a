use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use feedsearch::{NewsState, SortKey, search::parse_date};

#[derive(Debug, Parser)]
#[command(
    name = "feedsearch",
    about = "Live, self-reconciling search over your feed reader's news"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Import news items from a JSON array ("-" reads stdin)
    Import(ImportArgs),
    /// Search news items
    Search(SearchArgs),
    /// Show one news item
    Get(GetArgs),
    /// Change the state of news items
    Mark(MarkArgs),
    /// Delete news items
    Delete(DeleteArgs),
    /// Show store and index statistics
    Status(StatusArgs),
    /// Inspect or change session settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

// -- Import --

#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// JSON file holding an array of items
    pub file: PathBuf,
}

// -- Search --

#[derive(Debug, Parser)]
pub struct SearchArgs {
    /// Words that must all appear in some text field
    pub query: Option<String>,

    /// Words in the title
    #[arg(long)]
    pub title: Option<String>,

    /// Words in the content
    #[arg(long)]
    pub content: Option<String>,

    /// Words in the author name
    #[arg(long)]
    pub author: Option<String>,

    /// Exact feed link
    #[arg(long)]
    pub feed: Option<String>,

    /// Exact category
    #[arg(long)]
    pub category: Option<String>,

    /// Exact label
    #[arg(long)]
    pub label: Option<String>,

    /// Restrict to these states (repeatable)
    #[arg(long = "state")]
    pub states: Vec<NewsState>,

    /// Only flagged items
    #[arg(long)]
    pub flagged: bool,

    /// Published after this date (YYYY-MM-DD or epoch seconds)
    #[arg(long, value_parser = parse_date)]
    pub after: Option<u64>,

    /// Published before this date (YYYY-MM-DD or epoch seconds)
    #[arg(long, value_parser = parse_date)]
    pub before: Option<u64>,

    /// Match any condition instead of all
    #[arg(long)]
    pub any: bool,

    /// Sort by score, title, author, feed, date or state
    #[arg(long)]
    pub sort: Option<SortKey>,

    /// Sort ascending
    #[arg(long)]
    pub asc: bool,

    /// Number of results to return
    #[arg(short = 'n', long, default_value = "20")]
    pub count: usize,

    /// Return every result
    #[arg(long, conflicts_with = "count")]
    pub all: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    pub fn to_params(&self) -> feedsearch::search::SearchParams {
        feedsearch::search::SearchParams {
            text: self.query.clone(),
            title: self.title.clone(),
            content: self.content.clone(),
            author: self.author.clone(),
            feed: self.feed.clone(),
            category: self.category.clone(),
            label: self.label.clone(),
            states: self.states.clone(),
            flagged: self.flagged.then_some(true),
            after: self.after,
            before: self.before,
            any: self.any,
            sort: self.sort,
            ascending: self.asc,
            limit: (!self.all).then_some(self.count),
        }
    }
}

// -- Get --

#[derive(Debug, Parser)]
pub struct GetArgs {
    /// Item reference (#a1b2c3 or a longer hex prefix)
    pub reference: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Mark --

#[derive(Debug, Parser)]
pub struct MarkArgs {
    /// New state: new, unread, updated, read, hidden or deleted
    pub state: NewsState,

    /// Item references
    #[arg(required = true)]
    pub references: Vec<String>,
}

// -- Delete --

#[derive(Debug, Parser)]
pub struct DeleteArgs {
    /// Item references
    #[arg(required = true)]
    pub references: Vec<String>,
}

// -- Status --

#[derive(Debug, Parser)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

// -- Config --

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show every setting with its effective value
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a setting
    Set {
        /// Setting name
        key: String,
        /// New value
        value: String,
    },
}

// -- Completions --

#[derive(Debug, Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    /// Generate shell completions and print to stdout.
    pub fn generate(&self) {
        let mut cmd = Cli::command();
        clap_complete::generate(
            self.shell,
            &mut cmd,
            "feedsearch",
            &mut std::io::stdout(),
        );
    }
}
