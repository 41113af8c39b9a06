//! Shardman command line entry point
//!
//! Inspects shard ranges and the operation store.

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use shardman::{FileOpStore, ManagerConfig, OpStore, OperationRecord};

/// Shardman - shard topology operations
#[derive(Parser, Debug)]
#[command(name = "shardman")]
#[command(about = "Shard split orchestration for a sharded search cluster")]
struct Args {
    /// Configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// Data directory, overrides the configuration file
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print bounds, ring share and split halves of shard ranges
    Range {
        /// Ranges such as 80000000-7fffffff
        #[arg(required = true)]
        ranges: Vec<String>,
    },
    /// Print completed operations, most recent first
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Print operations recorded as in progress
    Pending,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => ManagerConfig::from_file(path)?,
        None => ManagerConfig::default(),
    };
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    match args.command {
        Command::Range { ranges } => print_ranges(&ranges),
        Command::History { limit } => {
            let store = FileOpStore::open(&config.data_dir).await?;
            info!("Reading history from {:?}", store.path());
            for entry in store.list(&config.completed_ops_key, limit).await? {
                println!("{}", entry);
            }
        }
        Command::Pending => {
            let store = FileOpStore::open(&config.data_dir).await?;
            let mut pending: Vec<(String, String)> =
                store.fields(&config.op_map_key).await?.into_iter().collect();
            pending.sort();
            for (key, json) in pending {
                match serde_json::from_str::<OperationRecord>(&json) {
                    Ok(op) => println!("{}\t{}", key, op),
                    Err(e) => println!("{}\t<undecodable: {}>", key, e),
                }
            }
        }
    }

    Ok(())
}

fn print_ranges(ranges: &[String]) {
    for range in ranges {
        match sm_core::compute_bounds(range) {
            Ok(bounds) => {
                print!("{}\t{}\tshare={:.8}", range, bounds, bounds.share());
                if let Some((lower, upper)) = bounds.halves() {
                    print!(
                        "\thalves={} {}",
                        lower.to_range_string(),
                        upper.to_range_string()
                    );
                }
                println!();
            }
            Err(e) => println!("{}\terror: {}", range, e),
        }
    }
}
