//! Command-line shell for the gribfetch acquisition engine.
//!
//! Subcommands mirror the library surface: `data` prints the resolved
//! GRIB URL, `index` the resolved index URL, `inventory` the filtered
//! message table, and `download` fetches the full file or a subset.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use gribfetch::inventory::Inventory;
use gribfetch::{parse_lead, AppConfig, Fetcher, Member, Request};

#[derive(Parser, Debug)]
#[command(name = "gribfetch")]
#[command(about = "Find and download NWP GRIB2 files from archive mirrors")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (default: ~/.config/gribfetch/config.yaml)
    #[arg(long, global = true, env = "GRIBFETCH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// Model initialization datetime (e.g. 2023-01-01T06:00)
    #[arg(short, long)]
    date: Option<String>,

    /// Forecast valid datetime; an alternative to --date
    #[arg(long, conflicts_with = "date")]
    valid_date: Option<String>,

    /// Model name (hrrr, gfs, ifs, nam, rap, nbm, gefs, ...)
    #[arg(short, long)]
    model: Option<String>,

    /// Product stream (model-specific; defaults to the template's first)
    #[arg(short, long)]
    product: Option<String>,

    /// Forecast lead time in hours (or a duration like "6h")
    #[arg(short = 'f', long)]
    fxx: Option<String>,

    /// Source priority order, comma separated (e.g. aws,nomads)
    #[arg(long, value_delimiter = ',')]
    priority: Option<Vec<String>>,

    /// Directory for downloaded files
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Ensemble member (c00, avg, spr, or a number)
    #[arg(long)]
    member: Option<String>,

    /// Storm identifier for hurricane models (e.g. 11e)
    #[arg(long)]
    storm_id: Option<String>,

    /// Ignore existing local files
    #[arg(long)]
    overwrite: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resolved GRIB2 URL or path
    Data {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Print the resolved index URL or path
    Index {
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Print the (optionally filtered) inventory table
    Inventory {
        #[command(flatten)]
        request: RequestArgs,

        /// Search regex over the inventory (e.g. ":TMP:2 m")
        #[arg(short, long)]
        subset: Option<String>,
    },
    /// Download the full file or a regex-selected subset
    Download {
        #[command(flatten)]
        request: RequestArgs,

        /// Search regex over the inventory (e.g. ":TMP:2 m")
        #[arg(short, long)]
        subset: Option<String>,
    },
}

/// Accept the datetime spellings people actually type.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }
    // Compact cycle form, e.g. 2023010106.
    if s.len() == 10 && s.chars().all(|c| c.is_ascii_digit()) {
        if let (Ok(date), Ok(hour)) = (
            NaiveDate::parse_from_str(&s[..8], "%Y%m%d"),
            s[8..].parse::<u32>(),
        ) {
            if let Some(naive) = date.and_hms_opt(hour, 0, 0) {
                return Ok(Utc.from_utc_datetime(&naive));
            }
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
    }
    Err(anyhow!("cannot parse datetime {s:?}"))
}

fn build_request(args: &RequestArgs, config: &AppConfig) -> Result<Request> {
    let model = args.model.clone().unwrap_or_else(|| config.model.clone());
    let mut builder = Request::builder(model);

    if let Some(date) = &args.date {
        builder = builder.init_time(parse_datetime(date)?);
    } else if let Some(valid) = &args.valid_date {
        builder = builder.valid_time(parse_datetime(valid)?);
    } else {
        return Err(anyhow!("either --date or --valid-date is required"));
    }

    let lead = match &args.fxx {
        Some(fxx) => parse_lead(fxx)?,
        None => config.fxx,
    };
    builder = builder.lead(lead);

    if let Some(product) = args.product.clone().or_else(|| config.product.clone()) {
        builder = builder.product(product);
    }
    if let Some(priority) = args.priority.clone().or_else(|| config.priority.clone()) {
        builder = builder.priority(priority);
    }
    builder = builder.save_dir(
        args.save_dir
            .clone()
            .unwrap_or_else(|| config.save_dir.clone()),
    );
    if let Some(member) = &args.member {
        builder = builder.member(Member::parse(member)?);
    }
    if let Some(storm_id) = &args.storm_id {
        builder = builder.extra("storm_id", storm_id);
    }
    builder = builder.overwrite(args.overwrite || config.overwrite);

    Ok(builder.build()?)
}

fn print_inventory(inventory: &Inventory) {
    println!(
        "{:>4}  {:>12}  {:>12}  {:<16}  {:<16}  search",
        "msg", "start", "end", "reference", "valid"
    );
    for record in &inventory.records {
        let end = record
            .end_byte
            .map(|e| e.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4}  {:>12}  {:>12}  {:<16}  {:<16}  {}",
            record.message,
            record.start_byte,
            end,
            record.reference_time.format("%Y-%m-%d %H:%M"),
            record.valid_time.format("%Y-%m-%d %H:%M"),
            record.search_key,
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::load_or_init().context("loading configuration")?,
    };

    let level = match cli.verbose {
        0 if config.verbose => Level::INFO,
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let fetcher = Fetcher::with_config(config.clone()).context("building fetcher")?;

    match &cli.command {
        Command::Data { request } => {
            let req = build_request(request, &config)?;
            let resolved = fetcher.resolve(&req).await?;
            match resolved.grib {
                Some(location) => println!("{location}"),
                None => return Err(anyhow!("no GRIB found for {}", req.ident())),
            }
        }
        Command::Index { request } => {
            let req = build_request(request, &config)?;
            let resolved = fetcher.resolve(&req).await?;
            match resolved.idx {
                Some(location) => println!("{location}"),
                None => return Err(anyhow!("no index found for {}", req.ident())),
            }
        }
        Command::Inventory { request, subset } => {
            let req = build_request(request, &config)?;
            let inventory = fetcher.inventory(&req, subset.as_deref()).await?;
            print_inventory(&inventory);
        }
        Command::Download { request, subset } => {
            let req = build_request(request, &config)?;
            let path = fetcher.download(&req, subset.as_deref()).await?;
            println!("{}", path.display());
        }
    }

    Ok(())
}
