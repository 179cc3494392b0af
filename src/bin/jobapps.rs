//! jobapps command-line client.
//!
//! Talks to a running `jobapps-service` and prints responses as JSON.
//!
//! ```sh
//! jobapps upload application.json resume.pdf cover.txt
//! jobapps query --where '{"filters":[{"field":"company","operator":"CONTAINS","value":"Acme"}]}' --limit 10
//! jobapps update <id> application.json
//! jobapps link <id> <file-name>
//! ```

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobapps::ipc::{IpcClient, Response, WireFile};
use jobapps::record::ApplicationFields;
use jobapps::search::{FilterQuery, PredicateGroup, SortOrder};

const DEFAULT_ADDR: &str = "127.0.0.1:7878";

#[derive(Parser)]
#[command(name = "jobapps", version, about = "Client for the jobapps service")]
struct Cli {
    /// Service address [default: $JOBAPPS_LISTEN or 127.0.0.1:7878]
    #[arg(long)]
    addr: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store an application and its files
    Upload {
        /// JSON file with the application fields
        application: PathBuf,
        /// Files to attach
        files: Vec<PathBuf>,
    },
    /// Query applications
    Query {
        /// Filter group as JSON
        #[arg(long = "where")]
        filter: Option<String>,
        #[arg(long)]
        sort_by: Option<String>,
        #[arg(long)]
        desc: bool,
        #[arg(long, default_value_t = 0)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        page: i64,
    },
    /// Replace an application's fields
    Update {
        id: String,
        /// JSON file with the application fields
        application: PathBuf,
    },
    /// Get a read link for a stored file
    Link { id: String, file_name: String },
}

fn read_fields(path: &Path) -> anyhow::Result<ApplicationFields> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid application in {:?}", path))
}

fn read_file(path: &Path) -> anyhow::Result<WireFile> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid file name {:?}", path))?;
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    Ok(WireFile::encode(name, &bytes))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "jobapps=warn".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let addr = cli
        .addr
        .or_else(|| std::env::var("JOBAPPS_LISTEN").ok().filter(|a| !a.is_empty()))
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let client = IpcClient::new(&addr);

    let response = match cli.command {
        Command::Upload { application, files } => {
            let fields = read_fields(&application)?;
            let files = files
                .iter()
                .map(|p| read_file(p))
                .collect::<anyhow::Result<Vec<_>>>()?;
            client.upload(fields, files).await?
        }
        Command::Query {
            filter,
            sort_by,
            desc,
            limit,
            page,
        } => {
            let filter = filter
                .map(|json| serde_json::from_str::<PredicateGroup>(&json))
                .transpose()
                .context("Invalid --where filter")?;
            let query = FilterQuery {
                filter,
                sort_order: sort_by
                    .as_ref()
                    .map(|_| if desc { SortOrder::Desc } else { SortOrder::Asc }),
                sort_by,
                limit,
                page,
            };
            client.query(query).await?
        }
        Command::Update { id, application } => {
            client.update(&id, read_fields(&application)?).await?
        }
        Command::Link { id, file_name } => client.file_link(&id, &file_name).await?,
    };

    println!("{}", serde_json::to_string_pretty(&response)?);

    if let Response::Error { status, code, .. } = response {
        bail!("request failed with status {} ({:?})", status, code);
    }
    Ok(())
}
