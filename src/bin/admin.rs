//! crud-admin binary
//!
//! Drives the admin store from the command line against the built-in
//! in-memory service (seeded with demo robots and monsters).
//!
//! ## Configuration (TOML file / env via `config` crate)
//!
//! | Key                          | Default        | Description                        |
//! |------------------------------|----------------|------------------------------------|
//! | `ADMIN_CONFIG`               | –              | Path to a TOML config file         |
//! | `ADMIN_DEBOUNCE_MS`          | `500`          | Validation debounce window         |
//! | `ADMIN_ALERT_TTL_MS`         | `5000`         | Notification lifetime              |
//! | `ADMIN_ORDERING`             | `last_settled` | `last_settled` or `last_issued`    |
//! | `ADMIN_ROBOTS__LIMIT`        | `12`           | Robots page size                   |
//! | `ADMIN_MONSTERS__LIMIT`      | `12`           | Monsters page size                 |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crud_admin::{
    AdminClient, AdminConfig, FormKind, ItemLookup, MemoryTransport, Monster, Predicate, Resource,
    ResponseOrdering, Robot, Sort, Store,
};
use serde_json::Value;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "crud-admin", about = "Robots & monsters admin", version)]
struct Args {
    /// TOML config file
    #[arg(long, env = "ADMIN_CONFIG")]
    config: Option<PathBuf>,

    /// Override the response ordering policy
    #[arg(long, value_enum)]
    ordering: Option<OrderingArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Robots,
    Monsters,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OrderingArg {
    LastSettled,
    LastIssued,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show one page of an index
    List {
        kind: Kind,
        #[arg(long)]
        offset: Option<usize>,
        #[arg(long)]
        limit: Option<usize>,
        /// Sort fields, e.g. `-name` (repeatable)
        #[arg(long = "sort")]
        sorts: Vec<String>,
        /// `field=text` substring filters (repeatable)
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// Show one record
    Show { kind: Kind, id: String },
    /// Edit a record: `--set field=value` (repeatable)
    Edit {
        kind: Kind,
        id: String,
        #[arg(long = "set")]
        sets: Vec<String>,
    },
    /// Create a record: `--set field=value` (repeatable)
    Add {
        kind: Kind,
        #[arg(long = "set")]
        sets: Vec<String>,
    },
    /// Delete a record
    Remove { kind: Kind, id: String },
}

fn load_config(args: &Args) -> Result<AdminConfig> {
    let mut cfg = AdminConfig::load(args.config.as_deref(), AdminConfig::environment())
        .context("invalid configuration")?;

    if let Some(ordering) = args.ordering {
        cfg.ordering = match ordering {
            OrderingArg::LastSettled => ResponseOrdering::LastSettled,
            OrderingArg::LastIssued => ResponseOrdering::LastIssued,
        };
    }
    Ok(cfg)
}

fn split_pair(pair: &str) -> Result<(&str, &str)> {
    pair.split_once('=')
        .ok_or_else(|| anyhow!("expected field=value, got '{}'", pair))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn run<R: Resource>(client: &AdminClient, command: Command) -> Result<()> {
    let slice = client.store().resource::<R>();
    match command {
        Command::List {
            offset,
            limit,
            sorts,
            filters,
            ..
        } => {
            if !sorts.is_empty() {
                let sorts = sorts
                    .iter()
                    .map(|s| Sort::parse(s))
                    .collect::<Result<Vec<_>, _>>()?;
                slice.set_sorts(sorts);
            }
            if !filters.is_empty() {
                let mut parsed = crud_admin::Filters::new();
                for pair in &filters {
                    let (field, text) = split_pair(pair)?;
                    parsed.insert(field.to_string(), Predicate::contains(text));
                }
                slice.set_filters(parsed);
            }
            if let Some(offset) = offset {
                slice.set_offset(offset);
            }
            if let Some(limit) = limit {
                slice.set_limit(limit);
            }

            let items = client.load_index_page::<R>().await?;
            let query = slice.query();
            println!(
                "{} {}..{} of {}",
                R::API.plural,
                query.offset,
                query.offset + items.len(),
                slice.total()
            );
            for item in &items {
                println!("{}", serde_json::to_string(item)?);
            }
        }
        Command::Show { id, .. } => match client.load_item::<R>(&id).await? {
            ItemLookup::Found(item) => println!("{}", serde_json::to_string_pretty(&item)?),
            _ => bail!("{} {} not found", R::API.singular, id),
        },
        Command::Edit { id, sets, .. } => {
            if !matches!(client.load_item::<R>(&id).await?, ItemLookup::Found(_)) {
                bail!("{} {} not found", R::API.singular, id);
            }
            for pair in &sets {
                let (field, value) = split_pair(pair)?;
                slice.update_edit_form(field, Value::String(value.to_string()));
                slice.validate_edit_form(field)?;
            }
            let item = client.submit_edit::<R>().await?;
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
        Command::Add { sets, .. } => {
            slice.reset_add_form();
            for pair in &sets {
                let (field, value) = split_pair(pair)?;
                slice.update_form(FormKind::Add, field, Value::String(value.to_string()));
            }
            let item = client.submit_add::<R>().await?;
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
        Command::Remove { id, .. } => client.remove_item::<R>(&id).await?,
    }
    Ok(())
}

fn kind_of(command: &Command) -> Kind {
    match command {
        Command::List { kind, .. }
        | Command::Show { kind, .. }
        | Command::Edit { kind, .. }
        | Command::Add { kind, .. }
        | Command::Remove { kind, .. } => *kind,
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("crud_admin=debug".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    tracing::info!(
        "Starting crud-admin (ordering={:?}, debounce={}ms, robots.limit={}, monsters.limit={})",
        config.ordering,
        config.debounce_ms,
        config.robots.limit,
        config.monsters.limit,
    );

    let store = Arc::new(Store::new(config));
    let client = AdminClient::new(store.clone(), Arc::new(MemoryTransport::demo()));

    let result = match kind_of(&args.command) {
        Kind::Robots => run::<Robot>(&client, args.command).await,
        Kind::Monsters => run::<Monster>(&client, args.command).await,
    };

    // Alerts outliving their TTL are dropped on read.
    for alert in store.alerts().items() {
        eprintln!("[{}] {}", alert.category, alert.message);
    }
    result
}
