//! Administrative CLI for delete transactions.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use reclaim_core::config::{AppConfig, MetadataConfig};
use reclaim_core::TransactionId;
use reclaim_metadata::models::{DeleteTransactionRow, TransactionFilter, TypeCount};
use reclaim_metadata::{OutstandingItem, SoftDeletes};
use serde::Serialize;
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "reclaimctl")]
#[command(about = "Inspect, restore and purge delete transactions")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct GlobalArgs {
    /// Path to configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "RECLAIM_CONFIG",
        default_value = "config/reclaim.toml"
    )]
    config: String,

    /// Actor id recorded on restores (overrides soft_deletes.actor_id)
    #[arg(long, global = true)]
    actor: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the delete log tables if they do not exist
    Migrate,
    /// Delete transaction commands
    Transactions {
        #[command(subcommand)]
        command: TransactionCommands,
    },
    /// Remove every transaction record and log entry
    Purge {
        /// Purge even if entries are still outstanding
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum TransactionCommands {
    /// List delete transactions, newest first
    List {
        /// Only transactions with outstanding entries
        #[arg(long, conflicts_with = "restored")]
        open: bool,
        /// Only fully restored transactions
        #[arg(long)]
        restored: bool,
        /// Maximum number of transactions to list
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Show a transaction and its outstanding entries as JSON
    Show {
        /// Transaction id
        id: TransactionId,
        /// Include the current row of each outstanding entity
        #[arg(long, default_value_t = false)]
        hydrate: bool,
    },
    /// Restore every outstanding entity of a transaction
    Restore {
        /// Transaction id
        id: TransactionId,
    },
}

#[derive(Serialize)]
struct TransactionDetail {
    transaction: DeleteTransactionRow,
    outstanding: u64,
    outstanding_by_type: Vec<TypeCount>,
    items: Vec<OutstandingItem>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { global, command } = Cli::parse();

    // Logs go to stderr so JSON output stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config(&global)?;

    match command {
        Commands::Migrate => handle_migrate_command(&config).await,
        Commands::Transactions { command } => handle_transaction_command(command, &config).await,
        Commands::Purge { force } => handle_purge_command(force, &config).await,
    }
}

fn load_config(global: &GlobalArgs) -> Result<AppConfig> {
    let config_path = Path::new(&global.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::debug!(config_path = %global.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&global.config));
    }

    let has_env_config =
        std::env::vars().any(|(key, _)| key.starts_with("RECLAIM_") && key != "RECLAIM_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: reclaimctl --config /path/to/reclaim.toml\n  \
             2. Environment variables: RECLAIM_METADATA__TYPE=sqlite \
             RECLAIM_METADATA__PATH=./data/reclaim.db reclaimctl\n\n\
             Set RECLAIM_CONFIG env var to specify a default config file path."
        );
    }

    let mut config: AppConfig = figment
        .merge(Env::prefixed("RECLAIM_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    if let Some(actor) = global.actor {
        config.soft_deletes.actor_id = Some(actor);
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    Ok(config)
}

async fn build_service(config: &AppConfig) -> Result<SoftDeletes> {
    reclaim_metadata::from_config(config)
        .await
        .context("failed to build soft delete service")
}

async fn handle_migrate_command(config: &AppConfig) -> Result<()> {
    // Opening the store creates the tables
    reclaim_metadata::open_store(&config.metadata, &config.soft_deletes)
        .await
        .context("failed to open delete log store")?;

    let MetadataConfig::Sqlite { path, .. } = &config.metadata;
    println!("Delete log tables ready in {}", path.display());
    Ok(())
}

async fn handle_transaction_command(command: TransactionCommands, config: &AppConfig) -> Result<()> {
    let service = build_service(config).await?;
    let mut coordinator = service.coordinator();

    match command {
        TransactionCommands::List {
            open,
            restored,
            limit,
        } => {
            let filter = if open {
                TransactionFilter::Open
            } else if restored {
                TransactionFilter::Restored
            } else {
                TransactionFilter::All
            };
            let transactions = coordinator
                .list_transactions(filter, limit)
                .await
                .context("failed to list transactions")?;

            if transactions.is_empty() {
                println!("No delete transactions found.");
                return Ok(());
            }

            println!(
                "{:<10} {:<10} {:<32} {:<32} {:<10}",
                "ID", "DELETED BY", "DELETED AT", "RESTORED AT", "RESTORED BY"
            );
            println!("{}", "-".repeat(98));
            for transaction in transactions {
                println!(
                    "{:<10} {:<10} {:<32} {:<32} {:<10}",
                    transaction.id,
                    transaction.deleted_by_id,
                    format_time(transaction.deleted_at),
                    transaction
                        .restored_at
                        .map(format_time)
                        .unwrap_or_else(|| "-".to_string()),
                    transaction
                        .restored_by_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
        }
        TransactionCommands::Show { id, hydrate } => {
            let transaction = coordinator
                .get_transaction(id)
                .await
                .context("failed to load transaction")?
                .with_context(|| format!("delete transaction {id} not found"))?;
            let detail = TransactionDetail {
                transaction,
                outstanding: coordinator.outstanding_count(id).await?,
                outstanding_by_type: coordinator.outstanding_grouped_by_type(id).await?,
                items: coordinator.outstanding_items(id, hydrate).await?,
            };
            println!("{}", serde_json::to_string_pretty(&detail)?);
        }
        TransactionCommands::Restore { id } => {
            let report = coordinator
                .restore_transaction(id)
                .await
                .with_context(|| format!("failed to restore delete transaction {id}"))?;

            println!(
                "Restored {} entities from delete transaction {}",
                report.restored, report.transaction_id
            );
            for (entity_type, count) in &report.restored_by_type {
                println!("  {entity_type}: {count}");
            }
        }
    }
    Ok(())
}

async fn handle_purge_command(force: bool, config: &AppConfig) -> Result<()> {
    let service = build_service(config).await?;
    let stats = service
        .coordinator()
        .purge(force)
        .await
        .context("failed to purge delete log")?;

    println!(
        "Purged {} transactions and {} log entries",
        stats.transactions, stats.log_entries
    );
    Ok(())
}

fn format_time(time: OffsetDateTime) -> String {
    time.format(&Rfc3339).unwrap_or_else(|_| time.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_list_flags_conflict() {
        let result = Cli::try_parse_from([
            "reclaimctl",
            "transactions",
            "list",
            "--open",
            "--restored",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_show_parses_transaction_id() {
        let cli = Cli::try_parse_from(["reclaimctl", "transactions", "show", "12", "--hydrate"])
            .unwrap();
        match cli.command {
            Commands::Transactions {
                command: TransactionCommands::Show { id, hydrate },
            } => {
                assert_eq!(id, TransactionId::new(12));
                assert!(hydrate);
            }
            _ => panic!("expected transactions show"),
        }
    }
}
