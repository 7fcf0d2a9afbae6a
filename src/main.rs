use std::{io::Read, sync::Arc};

use clap::Parser;
use feedsearch::{
    Corpus,
    DataDir,
    ItemRef,
    NewsItem,
    QueryExecutor,
    ReferenceResolver,
    Result,
    SearchService,
    SessionConfig,
    config,
    news::ImportRecord,
    search,
};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("FEEDSEARCH_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let corpus = Corpus::open(&data_dir)?;

    match cli.command {
        Command::Import(args) => cmd_import(&corpus, &args)?,
        Command::Search(args) => cmd_search(&corpus, &args)?,
        Command::Get(args) => cmd_get(&corpus, &args)?,
        Command::Mark(args) => {
            let refs = resolve_refs(&corpus, &args.references)?;
            let changed = corpus.set_state(&refs, args.state)?;
            println!("Marked {changed} item(s) {}", args.state);
        }
        Command::Delete(args) => {
            let refs = resolve_refs(&corpus, &args.references)?;
            let deleted = corpus.delete(&refs)?;
            println!("Deleted {deleted} item(s)");
        }
        Command::Status(args) => cmd_status(&corpus, &data_dir, args.json)?,
        Command::Config { action } => match action {
            ConfigAction::Show { json } => config_show(&corpus, json)?,
            ConfigAction::Set { key, value } => {
                SessionConfig::store_value(corpus.store(), &key, &value)?;
                println!("{key} = {}", value.trim());
            }
        },
        Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_import(corpus: &Corpus, args: &cli::ImportArgs) -> Result<()> {
    let raw = if args.file.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&args.file)?
    };

    let records: Vec<ImportRecord> = serde_json::from_str(&raw)?;
    let items: Vec<NewsItem> =
        records.into_iter().map(NewsItem::from).collect();
    let count = corpus.add_items(items)?;
    info!(file = %args.file.display(), count, "import finished");
    println!("Imported {count} item(s)");
    Ok(())
}

fn cmd_search(corpus: &Corpus, args: &cli::SearchArgs) -> Result<()> {
    let config = SessionConfig::from_store(corpus.store())?;
    let service = SearchService::new(
        QueryExecutor::new(corpus.index().clone()),
        Arc::new(corpus.bus().clone()),
        corpus.store().clone(),
        config,
    );
    let params = args.to_params();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(search::execute_search(&service, &params))?;

    if args.json {
        println!("{}", search::format_json(&output)?);
    } else {
        print!("{}", search::format_human(&output));
    }
    Ok(())
}

fn cmd_get(corpus: &Corpus, args: &cli::GetArgs) -> Result<()> {
    let item_ref = corpus.find_ref(&args.reference)?;
    let item = corpus.store().resolve(item_ref)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    println!("{} {}", item.item_ref, item.title);
    println!("feed: {}", item.feed);
    if !item.link.is_empty() {
        println!("link: {}", item.link);
    }
    if !item.author.is_empty() {
        println!("author: {}", item.author);
    }
    let flagged = if item.flagged { ", flagged" } else { "" };
    println!("state: {}{flagged}", item.state);
    if !item.categories.is_empty() {
        println!("categories: {}", item.categories.join(", "));
    }
    if !item.labels.is_empty() {
        println!("labels: {}", item.labels.join(", "));
    }
    if !item.content.is_empty() {
        println!("\n{}", item.content);
    }
    Ok(())
}

fn resolve_refs(
    corpus: &Corpus,
    references: &[String],
) -> Result<Vec<ItemRef>> {
    references.iter().map(|r| corpus.find_ref(r)).collect()
}

#[derive(Serialize)]
struct Status {
    data_dir: String,
    items: u64,
    indexed: u64,
}

fn cmd_status(corpus: &Corpus, data_dir: &DataDir, json: bool) -> Result<()> {
    let status = Status {
        data_dir: data_dir.root().display().to_string(),
        items: corpus.store().count_items()?,
        indexed: corpus.index().num_docs()?,
    };

    if json {
        println!("{}", serde_json::to_string(&status)?);
    } else {
        println!("Data directory: {}", status.data_dir);
        println!("Items: {}", status.items);
        println!("Indexed: {}", status.indexed);
    }
    Ok(())
}

fn config_show(corpus: &Corpus, json: bool) -> Result<()> {
    let settings = SessionConfig::from_store(corpus.store())?;
    if json {
        println!("{}", serde_json::to_string(&settings)?);
        return Ok(());
    }

    let stored: Vec<String> = corpus
        .store()
        .list_settings()?
        .into_iter()
        .map(|(key, _)| key)
        .filter(|key| config::KEYS.contains(&key.as_str()))
        .collect();
    for (key, value) in settings.entries() {
        let origin = if stored.iter().any(|k| k == key) {
            ""
        } else {
            " (default)"
        };
        println!("{key} = {value}{origin}");
    }
    Ok(())
}
