use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use memodoc::{
    DocumentStore, DurabilityMode, FieldPath, Filter, MemoryStore, Projection, Query, StoreConfig,
    UpdateOp,
};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "memodoc-tool")]
#[command(about = "Inspect and edit a persisted memodoc store")]
struct Cli {
    /// Directory holding the store snapshot
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Database name
    #[arg(long, default_value = "memodoc")]
    database: String,
    /// JSON settings file with a `mongo` section (overrides --database)
    #[arg(long)]
    settings: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List collections
    Collections,
    /// Print one document
    Get {
        collection: String,
        id: i64,
        /// Comma-separated projection
        #[arg(long)]
        fields: Option<String>,
    },
    /// Print documents matching `field=json` equality conditions
    Find {
        collection: String,
        #[arg(long = "eq")]
        conditions: Vec<String>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Set one field path (e.g. `multi.2.taiga`) to a JSON value
    Set {
        collection: String,
        id: i64,
        path: String,
        value: String,
    },
    /// Unset one field path
    Unset {
        collection: String,
        id: i64,
        path: String,
    },
    /// Delete a document
    Rm { collection: String, id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = match &cli.settings {
        Some(path) => StoreConfig::from_json_file(path)
            .with_context(|| format!("Failed to load settings '{}'", path.display()))?,
        None => StoreConfig::new(&cli.database),
    };
    if let Some(dir) = &cli.data_dir {
        config = config.data_dir(dir);
    }
    let config = config.durability(DurabilityMode::Sync);
    let store = MemoryStore::open(&config).await?;

    match cli.command {
        Command::Collections => {
            for name in store.collections().await {
                let count = store.count(&name, &Filter::new()).await?;
                println!("{}\t{}", name, count);
            }
        }
        Command::Get {
            collection,
            id,
            fields,
        } => {
            let projection = fields.map(|list| Projection::of(split_fields(&list)));
            let doc = store.fetch_one(&collection, id, projection.as_ref()).await?;
            println!("{}", serde_json::to_string_pretty(&Value::Object(doc))?);
        }
        Command::Find {
            collection,
            conditions,
            offset,
            limit,
        } => {
            let mut query = Query::new(parse_filter(&conditions)?).offset(offset);
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            for doc in store.find(&collection, &query, None).await? {
                println!("{}", Value::Object(doc));
            }
        }
        Command::Set {
            collection,
            id,
            path,
            value,
        } => {
            let value: Value = serde_json::from_str(&value)
                .with_context(|| format!("Invalid JSON value '{}'", value))?;
            let op = UpdateOp::set(parse_path(&path)?, value);
            store.update(&collection, id, &[op]).await?;
            println!("Updated {}/{}", collection, id);
        }
        Command::Unset {
            collection,
            id,
            path,
        } => {
            store
                .update(&collection, id, &[UpdateOp::unset(parse_path(&path)?)])
                .await?;
            println!("Updated {}/{}", collection, id);
        }
        Command::Rm { collection, id } => {
            store.delete(&collection, id).await?;
            println!("Deleted {}/{}", collection, id);
        }
    }

    Ok(())
}

fn split_fields(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_filter(conditions: &[String]) -> Result<Filter> {
    let mut filter = Filter::new();
    for condition in conditions {
        let (field, raw) = condition
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid condition '{}'. Expected format: field=json", condition))?;
        // Bare words are taken as strings.
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        filter = filter.eq(field.trim(), value);
    }
    Ok(filter)
}

fn parse_path(path: &str) -> Result<FieldPath> {
    let mut segments = path.split('.');
    let root = segments
        .next()
        .filter(|root| !root.is_empty())
        .ok_or_else(|| anyhow!("Empty field path"))?;
    let mut parsed = FieldPath::field(root);
    for segment in segments {
        parsed = match segment.parse::<usize>() {
            Ok(index) => parsed.index(index),
            Err(_) => parsed.key(segment),
        };
    }
    Ok(parsed)
}
