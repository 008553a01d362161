use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use kalshi_history::api::{Granularity, KalshiClient, Signer};
use kalshi_history::config::Config;
use kalshi_history::data::{store, Column, Processor};
use kalshi_history::history;

#[derive(Parser)]
#[command(name = "kalshi-history", version, about = "Settled Kalshi market history puller")]
struct Cli {
    /// TOML config file; missing file means defaults plus environment.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pull candlesticks for every settled market of a series and save them.
    Fetch {
        /// day, hour or minute; repeat for several (default: day and hour).
        #[arg(long = "granularity", short = 'g')]
        granularities: Vec<Granularity>,

        /// Overrides fetch.series.
        #[arg(long)]
        series: Option<String>,

        /// Overrides output.dir.
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },

    /// Decode timestamps and forward fill gaps in a saved table.
    Process {
        /// .csv or .bin table written by `fetch` (default: the bincode
        /// file for --granularity in --data-dir).
        #[arg(long)]
        input: Option<PathBuf>,

        /// Saved history to process when --input is not given: day or hour.
        #[arg(long, short = 'g', default_value = "day")]
        granularity: Granularity,

        /// Directory `fetch` wrote to.
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        /// CSV destination (default: <input stem>_processed.csv).
        #[arg(long)]
        output: Option<PathBuf>,

        /// Timestamp columns to decode (default: end_period_ts).
        #[arg(long = "datetime")]
        datetime_cols: Vec<Column>,

        /// Columns to forward fill (default: every nullable column).
        #[arg(long = "ffill")]
        ffill_cols: Vec<Column>,

        /// Maximum consecutive gaps filled per column.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Fetch {
            granularities,
            series,
            out_dir,
        } => {
            let cfg = Config::load(&cli.config)
                .with_context(|| format!("loading {}", cli.config.display()))?;
            init_tracing(&cfg.general.log_level);

            let granularities = if granularities.is_empty() {
                vec![Granularity::Day, Granularity::Hour]
            } else {
                granularities
            };
            let series = series.unwrap_or_else(|| cfg.fetch.series.clone());
            let out_dir = out_dir.unwrap_or_else(|| cfg.output.dir.clone());

            let signer = Signer::from_source(&cfg.api.private_key)?;
            let client = KalshiClient::new(&cfg.api, &cfg.fetch, signer)?;

            for granularity in granularities {
                let rows = history::fetch_history(&client, &series, granularity, cfg.fetch.lookback_secs)
                    .await
                    .with_context(|| format!("fetching {} history for {}", granularity, series))?;
                store::save_all(&out_dir, granularity, &rows)
                    .with_context(|| format!("saving {} history", granularity))?;
            }
        }

        Command::Process {
            input,
            granularity,
            data_dir,
            output,
            datetime_cols,
            ffill_cols,
            limit,
        } => {
            init_tracing("info");

            let datetime_cols = if datetime_cols.is_empty() {
                Processor::default_datetime_cols()
            } else {
                datetime_cols
            };
            let ffill_cols = (!ffill_cols.is_empty()).then_some(ffill_cols);

            let processor = match input {
                Some(input) => Processor::for_path(input, datetime_cols, ffill_cols, limit),
                None => Processor::in_dir(&data_dir, granularity, datetime_cols, ffill_cols, limit)?,
            };
            let input = processor.data_path().to_path_buf();
            let output = output.unwrap_or_else(|| processed_path(&input));

            let rows = processor
                .load()
                .with_context(|| format!("loading {}", input.display()))?;
            let frame = processor.process(rows)?;
            store::write_csv(&output, &frame)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(path = %output.display(), rows = frame.len(), "processed table saved");
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn processed_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "table".to_string());
    input.with_file_name(format!("{}_processed.csv", stem))
}
