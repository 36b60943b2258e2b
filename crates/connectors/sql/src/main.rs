use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use igloo_common::Value;
use igloo_connector_sql::config::Settings;
use igloo_connector_sql::logging::init_logging;
use igloo_connector_sql::{Connector, EmbeddedClient, PartitionReader, SqlConnector};
use std::io;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Plan and read partitioned SQL queries", long_about = None)]
struct Args {
    /// Settings file; defaults to IGLOO_SQL_CONFIG_PATH.
    #[arg(short, long)]
    config: Option<String>,

    /// Overrides the configured input query.
    #[arg(short, long)]
    query: Option<String>,

    /// Registers a CSV file as a table, as NAME=PATH. Repeatable.
    #[arg(long = "table", value_parser = parse_table)]
    tables: Vec<(String, String)>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the partitions the query splits into.
    Plan {
        #[arg(long)]
        splits: Option<usize>,
    },
    /// Reads partitions and writes their rows to stdout as CSV.
    Scan {
        #[arg(long)]
        splits: Option<usize>,
        /// Reads only this partition.
        #[arg(long)]
        partition: Option<usize>,
    },
}

fn parse_table(s: &str) -> Result<(String, String)> {
    let (name, path) = s.split_once('=').ok_or_else(|| anyhow!("expected NAME=PATH, got {}", s))?;
    if name.is_empty() || path.is_empty() {
        bail!("expected NAME=PATH, got {}", s);
    }
    Ok((name.to_string(), path.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::from_file(path).with_context(|| format!("Failed to load settings from {}", path))?,
        None => Settings::new().context("Failed to load settings")?,
    };
    if let Some(query) = args.query {
        settings.source.query = Some(query);
    }
    init_logging(&settings.log_level)?;
    debug!(connection = ?settings.connection, "loaded settings");

    match settings.connection.driver.as_deref() {
        None | Some("datafusion") => {}
        Some(other) => bail!("Unsupported driver: {}", other),
    }

    let client = EmbeddedClient::new();
    for (name, path) in &args.tables {
        client.register_csv(name, path).await?;
    }
    let connector = SqlConnector::new(Arc::new(client), settings.planning_config());

    match args.command {
        Command::Plan { splits } => {
            let splits = connector.get_splits(splits.unwrap_or(settings.source.split_count)).await?;
            for (i, split) in splits.iter().enumerate() {
                println!("{}\t{}", i, split);
            }
        }
        Command::Scan { splits, partition } => {
            let splits = connector.get_splits(splits.unwrap_or(settings.source.split_count)).await?;
            if let Some(index) = partition {
                if index >= splits.len() {
                    bail!("Partition {} out of range, query has {} partitions", index, splits.len());
                }
            }
            let mut writer = csv::Writer::from_writer(io::stdout());
            for (i, split) in splits.into_iter().enumerate() {
                if partition.is_some_and(|p| p != i) {
                    continue;
                }
                let mut reader = connector.read_split(split).await?;
                let rows = scan_partition(&mut reader, &mut writer)
                    .await
                    .with_context(|| format!("Failed to scan partition {}", i))?;
                info!(partition = i, rows, "partition read");
            }
            writer.flush()?;
        }
    }

    Ok(())
}

/// Writes every row of `reader` as CSV and closes it, on failure too.
async fn scan_partition<W: io::Write>(reader: &mut PartitionReader, writer: &mut csv::Writer<W>) -> Result<u64> {
    let written = write_rows(reader, writer).await;
    let closed = reader.close().await;
    written?;
    closed?;
    Ok(reader.pos())
}

async fn write_rows<W: io::Write>(reader: &mut PartitionReader, writer: &mut csv::Writer<W>) -> Result<()> {
    while let Some((key, record)) = reader.next().await? {
        let mut fields = vec![key.to_string()];
        fields.extend(record.iter().map(render));
        writer.write_record(&fields).context("Failed to write row")?;
    }
    Ok(())
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
