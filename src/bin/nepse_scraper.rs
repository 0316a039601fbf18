use nepse_scraper::models::outcome::Outcome;
use nepse_scraper::models::request::ExtractionRequest;
use nepse_scraper::services::batch_service::BatchService;
use nepse_scraper::services::extraction_service::ExtractionEngine;
use nepse_scraper::session::chrome::{ChromeFactory, ChromeOptions};
use nepse_scraper::session::replay::ReplayFactory;
use nepse_scraper::session::SessionFactory;
use nepse_scraper::util::{self, arrow_utils, csv_utils};
use nepse_scraper::{CancelFlag, Config};

use anyhow::{bail, Context};
use clap::{App, Arg, ArgMatches, SubCommand};
use log::{error, info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Serialize)]
struct RunSummary {
    symbol: String,
    status: &'static str,
    rows: usize,
    target_rows: usize,
    reason: Option<String>,
    output: Option<String>,
    started_at: String,
    elapsed_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let app = App::new("nepse_scraper")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Scrape paginated price history from rendered company pages")
        .subcommand(
            SubCommand::with_name("scrape")
                .about("Scrape price history for one or more symbols")
                .arg(
                    Arg::with_name("symbol")
                        .short('s')
                        .long("symbol")
                        .value_name("SYMBOL[,SYMBOL...]")
                        .help("Stock symbols to scrape, comma separated")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("rows")
                        .short('n')
                        .long("rows")
                        .value_name("ROWS")
                        .help("Number of rows to scrape per symbol")
                        .takes_value(true)
                        .default_value("100"),
                )
                .arg(
                    Arg::with_name("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .help("CSV file to write (single symbol only)")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("out-dir")
                        .long("out-dir")
                        .value_name("DIR")
                        .help("Directory for <SYMBOL>_price_history.csv files")
                        .takes_value(true)
                        .default_value("."),
                )
                .arg(
                    Arg::with_name("arrow")
                        .long("arrow")
                        .help("Also write an Arrow IPC file next to each CSV")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("JSON file overriding URL template, selectors and timeouts")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("locate-timeout-ms")
                        .long("locate-timeout-ms")
                        .value_name("MS")
                        .help("How long to wait for each candidate selector")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("headful")
                        .long("headful")
                        .help("Show the browser window")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("replay-dir")
                        .long("replay-dir")
                        .value_name("DIR")
                        .help("Replay captured landing.html and page_<n>.html instead of using Chrome")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("concurrency")
                        .long("concurrency")
                        .value_name("N")
                        .help("Symbols scraped at the same time")
                        .takes_value(true)
                        .default_value("2"),
                ),
        )
        .subcommand(
            SubCommand::with_name("explore")
                .about("Show rows from a scraped CSV or Arrow file")
                .arg(
                    Arg::with_name("file")
                        .short('f')
                        .long("file")
                        .value_name("FILE")
                        .help("File written by the scrape command")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("limit")
                        .short('l')
                        .long("limit")
                        .value_name("LIMIT")
                        .help("Limit the number of rows to display")
                        .takes_value(true)
                        .default_value("10"),
                ),
        );

    let matches = app.get_matches();

    if let Some(matches) = matches.subcommand_matches("scrape") {
        let all_ok = scrape(matches).await?;
        if !all_ok {
            std::process::exit(1);
        }
    } else if let Some(matches) = matches.subcommand_matches("explore") {
        explore(matches)?;
    } else {
        info!("No command specified. Use --help for usage information.");
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> anyhow::Result<Option<T>> {
    match matches.value_of(name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("--{} expects a number, got '{}'", name, raw)),
        None => Ok(None),
    }
}

/// Returns whether every run avoided a failure outcome.
async fn scrape(matches: &ArgMatches) -> anyhow::Result<bool> {
    let rows: usize = parse_number(matches, "rows")?.unwrap_or(100);
    let concurrency: usize = parse_number(matches, "concurrency")?.unwrap_or(2);

    let requests = matches
        .value_of("symbol")
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| ExtractionRequest::new(s, rows))
        .collect::<nepse_scraper::Result<Vec<_>>>()?;
    if requests.is_empty() {
        bail!("no symbol given");
    }
    if matches.is_present("output") && requests.len() > 1 {
        bail!("--output only works with a single symbol, use --out-dir instead");
    }

    let mut config = match matches.value_of("config") {
        Some(path) => Config::load_from_file(Path::new(path))
            .with_context(|| format!("loading config from {}", path))?,
        None => Config::new(),
    };
    if let Some(ms) = parse_number::<u64>(matches, "locate-timeout-ms")? {
        config = config.with_locate_timeout(Duration::from_millis(ms));
    }

    let factory: Arc<dyn SessionFactory> = match matches.value_of("replay-dir") {
        Some(dir) => {
            config = config.without_waits();
            Arc::new(ReplayFactory::from_dir(Path::new(dir))?)
        }
        None => Arc::new(ChromeFactory::new(ChromeOptions {
            headless: !matches.is_present("headful"),
            ..ChromeOptions::default()
        })),
    };
    let width = config.record_width;

    let engine = Arc::new(ExtractionEngine::new(config, factory)?);
    let batch = BatchService::new(engine, concurrency);

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current page");
            on_interrupt.cancel();
        }
    });

    let started_at = chrono::Local::now();
    let started = Instant::now();
    let results = batch.run_all(requests, cancel).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let out_dir = PathBuf::from(matches.value_of("out-dir").unwrap_or("."));
    let mut all_ok = true;

    for (request, outcome) in &results {
        all_ok &= !outcome.is_failure();

        let output = if outcome.records().is_empty() {
            error!("No data was scraped for {}", request.symbol());
            None
        } else {
            let csv_path = match matches.value_of("output") {
                Some(path) => PathBuf::from(path),
                None => out_dir.join(util::default_csv_name(request.symbol())),
            };
            save(request.symbol(), outcome, width, &csv_path, matches.is_present("arrow"))?;
            Some(csv_path.display().to_string())
        };

        let summary = RunSummary {
            symbol: request.symbol().to_string(),
            status: outcome.status(),
            rows: outcome.records().len(),
            target_rows: request.target_rows(),
            reason: outcome.reason(),
            output,
            started_at: started_at.to_rfc3339(),
            elapsed_ms,
        };
        println!("{}", serde_json::to_string(&summary)?);
    }

    Ok(all_ok)
}

fn save(symbol: &str, outcome: &Outcome, width: usize, csv_path: &Path, with_arrow: bool) -> anyhow::Result<()> {
    csv_utils::write_records(csv_path, outcome.records(), &util::column_names(width))
        .with_context(|| format!("writing {}", csv_path.display()))?;
    info!("Data for {} saved to {}", symbol, csv_path.display());

    if with_arrow {
        let arrow_path = csv_path.with_extension("arrow");
        arrow_utils::save_records_to_arrow(symbol, outcome.records(), width, &arrow_path)
            .with_context(|| format!("writing {}", arrow_path.display()))?;
    }
    Ok(())
}

fn explore(matches: &ArgMatches) -> anyhow::Result<()> {
    let path = Path::new(matches.value_of("file").unwrap_or_default());
    let limit: usize = parse_number(matches, "limit")?.unwrap_or(10);

    let (headers, rows) = match path.extension().and_then(|e| e.to_str()) {
        Some("arrow") => {
            let (headers, rows) = arrow_utils::read_records_from_arrow(path)?;
            (headers, rows.into_iter().map(|(_, record)| record).collect::<Vec<_>>())
        }
        _ => csv_utils::read_records(path)?,
    };

    info!("Found {} rows in {}", rows.len(), path.display());
    println!("{}", headers.join("\t"));
    println!("{:-<80}", "");
    for record in rows.iter().take(limit) {
        println!("{}", record.fields().join("\t"));
    }
    if rows.len() > limit {
        println!("... and {} more rows", rows.len() - limit);
    } else if rows.is_empty() {
        println!("No rows stored in this file");
    }

    Ok(())
}
