use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;

use memorystore::cli::{Cli, Command};
use memorystore::config::Config;
use memorystore::{Filter, MemoryStore, NewRecord, QueryOptions};

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .init();
    Ok(())
}

fn parse_meta(entries: &[String]) -> Result<Vec<(String, serde_json::Value)>> {
    entries
        .iter()
        .map(|entry| {
            let filter = Filter::parse(entry)?;
            filter
                .clauses()
                .first()
                .cloned()
                .ok_or_else(|| eyre!("Invalid metadata entry '{}'", entry))
        })
        .collect()
}

fn main() -> Result<()> {
    setup_logging().context("Failed to setup logging")?;

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(store) = cli.store {
        config.store_path = store;
    }

    info!("memorystore starting");
    let store = MemoryStore::open(&config.store_path)?;

    match cli.command {
        Command::Upsert {
            id,
            text,
            collection,
            meta,
        } => {
            let collection = collection.unwrap_or_else(|| config.default_collection.clone());
            let mut record = NewRecord::new(id.clone(), text);
            for (key, value) in parse_meta(&meta)? {
                record = record.with_meta(key, value);
            }
            store.upsert(&collection, record)?;
            println!("{} Upserted {} into {}", "✓".green(), id.cyan(), collection);
        }
        Command::Query {
            text,
            collection,
            top_k,
            filter,
        } => {
            let collection = collection.unwrap_or_else(|| config.default_collection.clone());
            let filter = filter.as_deref().map(Filter::parse).transpose()?.unwrap_or_default();
            let options = QueryOptions::text(text, top_k.unwrap_or(config.default_top_k)).filter(filter);
            let hits = store.query(&collection, &options)?;
            if hits.is_empty() {
                println!("No matches");
            }
            for hit in hits {
                println!("{} {} {}", format!("{:.3}", hit.score).dimmed(), hit.id.yellow(), hit.text);
            }
        }
        Command::Delete { ids, collection } => {
            let collection = collection.unwrap_or_else(|| config.default_collection.clone());
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            let removed = store.delete(&collection, &ids)?;
            println!("{} Deleted {} record(s) from {}", "✓".green(), removed, collection);
        }
        Command::DeleteWhere { filter, collection } => {
            let collection = collection.unwrap_or_else(|| config.default_collection.clone());
            let removed = store.delete_where(&collection, &Filter::parse(&filter)?)?;
            println!("{} Deleted {} record(s) from {}", "✓".green(), removed, collection);
        }
        Command::Seed { file, collection } => {
            let collection = collection.unwrap_or_else(|| memorystore::TRAVEL_DOCS_COLLECTION.to_string());
            let seed = memorystore::load_seed_file(&file)?;
            let written = store.upsert_many(&collection, memorystore::seed_records(&seed))?;
            println!("{} Seeded {} doc(s) into {}", "✓".green(), written, collection.cyan());
        }
        Command::Clear { collection } => {
            let removed = store.clear(&collection)?;
            println!("{} Cleared {} record(s) from {}", "✓".green(), removed, collection);
        }
        Command::Stats { collection } => {
            let stats = store.stats(&collection)?;
            println!("Collection: {}", collection.cyan());
            println!("  Records: {}", stats.record_count);
            println!("  Total bytes: {}", stats.total_bytes);
            println!("  Embedded: {}", stats.embedded_count);
        }
        Command::List => {
            let collections = store.list_collections()?;
            if collections.is_empty() {
                println!("No collections found");
            } else {
                for name in collections {
                    println!("{}", name);
                }
            }
        }
    }

    Ok(())
}
