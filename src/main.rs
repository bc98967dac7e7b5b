use clap::{Parser, Subcommand};
use secdb::{FilterSpec, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "secdb", version = "1.0.0", about = "Per-symbol, per-day market microstructure store")]
struct Cli {
    /// Root directory under which `(symbol, date)` files are laid out.
    /// Overrides the process default ("db") for this invocation.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Append newline-delimited JSON events from stdin
    Append {
        symbol: String,
        date: String,
        #[arg(long, default_value = "1")]
        depth: u32,
        #[arg(long, default_value = "100")]
        scale: u32,
        #[arg(long = "chunk-size-ms", default_value = "300000")]
        chunk_size_ms: u64,
    },
    /// Dump events (optionally filtered) as newline-delimited JSON
    Dump {
        symbol: String,
        date: String,
        /// Start of range, as epoch milliseconds
        #[arg(long)]
        start: Option<i64>,
        /// End of range, as epoch milliseconds
        #[arg(long)]
        end: Option<i64>,
        /// Aggregate into candles of this many milliseconds
        #[arg(long = "candle-ms")]
        candle_ms: Option<u64>,
    },
    /// Print header + chunkmap occupancy for one file
    Info { symbol: String, date: String },
    /// List distinct symbols under root
    Symbols,
    /// List dates stored for one symbol
    Dates { symbol: String },
    /// List dates common to every given symbol
    CommonDates { symbols: Vec<String> },
}

fn main() -> secdb::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    if let Some(root) = &cli.root {
        secdb::config::set_root(root.clone());
    }
    let root = secdb::config::root();

    match cli.command {
        Commands::Append { symbol, date, depth, scale, chunk_size_ms } => {
            let opts = OpenOptions { depth, scale, chunk_size: chunk_size_ms };
            let mut appender = secdb::open_append(&root, &symbol, &date, opts)?;
            let stdin = io::stdin();
            let mut count = 0u64;
            for line in stdin.lock().lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let event: secdb::Event = serde_json::from_str(&line)
                    .map_err(|e| secdb::Error::CorruptStream(format!("invalid event JSON: {e}")))?;
                secdb::append(&mut appender, &event)?;
                count += 1;
            }
            secdb::close_appender(appender)?;
            tracing::info!(symbol, date, count, "appended events");
        }
        Commands::Dump { symbol, date, start, end, candle_ms } => {
            let mut filters = Vec::new();
            if start.is_some() || end.is_some() {
                filters.push(FilterSpec::Range {
                    start: start.map(secdb::Bound::Absolute),
                    end: end.map(secdb::Bound::Absolute),
                });
            }
            if let Some(period) = candle_ms {
                filters.push(FilterSpec::Candle { period_ms: Some(period) });
            }
            let emissions = secdb::events(&root, &symbol, &date, &filters)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for emission in emissions {
                let json = serde_json::to_string(&emission)
                    .map_err(|e| secdb::Error::Filter(format!("failed to serialize emission: {e}")))?;
                writeln!(out, "{json}")?;
            }
        }
        Commands::Info { symbol, date } => {
            let info = secdb::info(&root, &symbol, &date)?;
            println!("path:       {}", info.path.display());
            println!("symbol:     {}", info.symbol);
            println!("date:       {}", info.date);
            println!("version:    {}", info.version);
            println!("scale:      {}", info.scale);
            println!("depth:      {}", info.depth);
            println!("interval:   {} ms", info.interval);
            println!(
                "presence:   {}/{} chunks populated",
                info.present_chunk_indices.len(),
                info.chunk_count
            );
            println!("chunks:     {:?}", info.present_chunk_indices);
        }
        Commands::Symbols => {
            for s in secdb::stocks(&root) {
                println!("{s}");
            }
        }
        Commands::Dates { symbol } => {
            for d in secdb::dates(&root, &symbol) {
                println!("{d}");
            }
        }
        Commands::CommonDates { symbols } => {
            for d in secdb::common_dates(&root, &symbols) {
                println!("{d}");
            }
        }
    }

    Ok(())
}
