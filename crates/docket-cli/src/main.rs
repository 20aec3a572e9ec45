//! `docket` - レビュー割り当てを手元で動かすための CLI
//!
//! JSON のシードファイル（アイテムの配列）をインメモリストアに読み込み、
//! 1 コマンド実行したあと、ストアの内容を同じファイルに書き戻す。
//! ロジックは持たず、docket-core の操作を呼ぶだけ。

use std::error::Error;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use docket_core::domain::{FieldChanges, Item, ItemId, ItemStatus, NewItem, ReviewerId};
use docket_core::impls::InMemoryItemStore;
use docket_core::ports::ItemStore;
use docket_core::{AllocationMode, DocketBuilder, DocketConfig, SubmissionTarget, UpdateOutcome};

#[derive(Parser, Debug)]
#[command(name = "docket", about = "Lease-based review assignment")]
struct Args {
    /// TOML config file.
    #[arg(long, env = "DOCKET_CONFIG", default_value = "docket.toml")]
    config: PathBuf,

    /// JSON array of items; rewritten after every command.
    #[arg(long, env = "DOCKET_DATA", default_value = "items.json")]
    data: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Hand out a batch to a reviewer.
    Allocate {
        reviewer: String,

        /// Release the current batch and take the next one.
        #[arg(long)]
        advance: bool,

        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Apply a JSON object of field changes (`null` leaves a field as is).
    Update {
        item: ItemId,
        reviewer: String,
        changes: String,
    },

    /// Store user data for `new` or an existing item id.
    Submit {
        target: SubmissionTarget,
        user_data: String,

        #[arg(long, default_value = "user-submitted")]
        status: String,
    },

    Show {
        item: ItemId,
    },

    /// Find items matching a JSON pattern.
    Query {
        pattern: String,
    },

    UserData {
        item: ItemId,

        #[arg(long)]
        privileged: bool,
    },

    /// Items with at least one filled-in user entry.
    UserEntries,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let ansi = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = DocketConfig::load(&args.config)?;
    let store = Arc::new(load_items(&args.data).await?);
    let mut desk = DocketBuilder::new(config).store(store.clone()).build()?;
    desk.initialize().await?;

    let output = match args.cmd {
        Command::Allocate {
            reviewer,
            advance,
            batch_size,
        } => {
            let mode = if advance {
                AllocationMode::Advance
            } else {
                AllocationMode::Continue
            };
            let batch_size = batch_size.unwrap_or(desk.batch_size());
            let batch = desk
                .allocate_batch(&ReviewerId::new(reviewer), batch_size, mode)
                .await?;
            serde_json::to_value(batch)?
        }
        Command::Update {
            item,
            reviewer,
            changes,
        } => {
            let Value::Object(changes) = serde_json::from_str(&changes)? else {
                return Err("changes must be a JSON object".into());
            };
            let outcome = desk
                .apply_update(item, &ReviewerId::new(reviewer), FieldChanges::from(changes))
                .await?;
            match outcome {
                UpdateOutcome::Applied(item) => serde_json::to_value(item)?,
                UpdateOutcome::NoOp => Value::Null,
            }
        }
        Command::Submit {
            target,
            user_data,
            status,
        } => {
            let user_data: Value = serde_json::from_str(&user_data)?;
            let id = desk
                .submit(target, user_data, ItemStatus::from(status))
                .await?;
            Value::String(id.to_string())
        }
        Command::Show { item } => serde_json::to_value(desk.item(item).await?)?,
        Command::Query { pattern } => {
            let pattern: Value = serde_json::from_str(&pattern)?;
            serde_json::to_value(desk.query(&pattern).await?)?
        }
        Command::UserData { item, privileged } => desk.user_data(item, privileged).await?,
        Command::UserEntries => serde_json::to_value(desk.items_with_user_entries().await?)?,
    };

    save_items(&args.data, &store.snapshot().await).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Documents carrying `_id` are restored as-is; the rest get fresh ids.
async fn load_items(path: &Path) -> Result<InMemoryItemStore, Box<dyn Error>> {
    let store = InMemoryItemStore::with_system_ids();
    if !tokio::fs::try_exists(path).await? {
        return Ok(store);
    }

    let docs: Vec<Value> = serde_json::from_str(&tokio::fs::read_to_string(path).await?)?;
    let (mut restored, mut inserted) = (0, 0);
    for doc in docs {
        if doc.get("_id").is_some() {
            store.restore(serde_json::from_value::<Item>(doc)?).await?;
            restored += 1;
        } else {
            store.insert_one(serde_json::from_value::<NewItem>(doc)?).await?;
            inserted += 1;
        }
    }
    info!(path = %path.display(), restored, inserted, "loaded items");
    Ok(store)
}

async fn save_items(path: &Path, items: &[Item]) -> Result<(), Box<dyn Error>> {
    tokio::fs::write(path, serde_json::to_string_pretty(items)?).await?;
    Ok(())
}
