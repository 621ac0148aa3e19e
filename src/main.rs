mod cursor;
mod db;
mod error;
mod expand;
mod parser;
mod pipeline;
mod renderer;

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing::error;

use parser::segments::{Markers, DEFAULT_START_MARKER, DEFAULT_TRAILING_MARKER};
use pipeline::RunOptions;
use renderer::WebDriverRenderer;

#[derive(Parser)]
#[command(
    name = "gov_scraper",
    about = "gov.il dynamic-collector listing scraper via WebDriver"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drain one or more base URLs page by page into the records DB
    Run {
        /// Listing base URLs, processed sequentially and independently
        #[arg(required = true)]
        base_urls: Vec<String>,
        /// Cursor step when a page's item count is unknown
        #[arg(long, default_value_t = pipeline::DEFAULT_PAGE_SIZE)]
        page_size: usize,
        /// Safety cap on pages per base URL (default: run until zero items)
        #[arg(long)]
        max_pages: Option<usize>,
        /// Cap on "show more" expansion rounds per page
        #[arg(long, default_value_t = expand::DEFAULT_MAX_ROUNDS)]
        max_expand_rounds: usize,
        /// Seconds to wait for a page render before giving up
        #[arg(long, default_value_t = 20)]
        render_timeout: u64,
        /// Literal separating the item region from page chrome
        #[arg(long, default_value = DEFAULT_START_MARKER)]
        start_marker: String,
        /// Literal ending the repeating-item container
        #[arg(long, default_value = DEFAULT_TRAILING_MARKER)]
        trailing_marker: String,
    },
    /// Segment and reconstruct a saved rendered page, printing the records
    Parse {
        /// Path to a captured HTML file
        file: String,
        /// URL the page was fetched from (for resolving relative links)
        #[arg(long)]
        url: Option<String>,
        #[arg(long, default_value = DEFAULT_START_MARKER)]
        start_marker: String,
        #[arg(long, default_value = DEFAULT_TRAILING_MARKER)]
        trailing_marker: String,
    },
    /// Show record DB statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            base_urls,
            page_size,
            max_pages,
            max_expand_rounds,
            render_timeout,
            start_marker,
            trailing_marker,
        } => {
            let opts = RunOptions {
                page_size_hint: page_size,
                max_pages,
                max_expand_rounds,
                markers: Markers {
                    start: start_marker,
                    trailing: trailing_marker,
                    ..Markers::default()
                },
                ..RunOptions::default()
            };
            run_base_urls(&base_urls, &opts, Duration::from_secs(render_timeout)).await
        }
        Commands::Parse {
            file,
            url,
            start_marker,
            trailing_marker,
        } => {
            let markers = Markers {
                start: start_marker,
                trailing: trailing_marker,
                ..Markers::default()
            };
            parse_file(&file, url.as_deref(), &markers)
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Runs:    {}", s.runs);
            println!("Records: {}", s.records);
            println!("Titles:  {}", s.titles);
            println!("Values:  {}", s.values);
            println!("Links:   {}", s.links);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// One renderer session is held for the whole invocation; base URLs are
/// drained one after another, and one URL's failure does not stop the rest.
async fn run_base_urls(
    base_urls: &[String],
    opts: &RunOptions,
    render_timeout: Duration,
) -> anyhow::Result<()> {
    let mut renderer = WebDriverRenderer::connect(render_timeout).await?;
    let mut conn = db::connect()?;
    db::init_schema(&conn)?;

    let mut total_records = 0usize;
    let mut total_pages = 0usize;
    let mut failed = 0usize;

    for base_url in base_urls {
        println!("Draining {}", base_url);
        let mut sink = db::SqliteSink::begin_run(conn, base_url)?;

        match pipeline::run(&mut renderer, &mut sink, base_url, opts).await {
            Ok(summary) => {
                let warnings_json = serde_json::to_string(&summary.warnings)?;
                conn = sink.finish_run(
                    summary.pages_processed,
                    summary.records_emitted,
                    &warnings_json,
                )?;
                total_records += summary.records_emitted;
                total_pages += summary.pages_processed;
                println!(
                    "  {} pages, {} records, {} warnings",
                    summary.pages_processed,
                    summary.records_emitted,
                    summary.warnings.total()
                );
            }
            Err(e) => {
                error!("Base URL {} failed: {:#}", base_url, e);
                failed += 1;
                conn = sink.finish_run(0, 0, "{}")?;
            }
        }
    }

    renderer.quit().await?;
    println!(
        "Drained {} base URLs ({} failed): {} pages, {} records.",
        base_urls.len(),
        failed,
        total_pages,
        total_records
    );
    Ok(())
}

fn parse_file(path: &str, url: Option<&str>, markers: &Markers) -> anyhow::Result<()> {
    let html = std::fs::read_to_string(path)?;
    let doc = renderer::RenderedDocument {
        url: url.unwrap_or_default().to_string(),
        html,
    };
    let extract = parser::process_document(&doc, markers)?;

    println!(
        "{} segments (declared {}), {} records",
        extract.segment_count,
        extract.declared_total,
        extract.records.len()
    );
    println!("{:>4} | {:<5} | {}", "item", "kind", "text");
    println!("{}", "-".repeat(72));
    for record in &extract.records {
        println!(
            "{:>4} | {:<5} | {}",
            record.item_index,
            record.kind.as_str(),
            truncate(&record.text, 58)
        );
    }
    for warning in &extract.warnings {
        println!("warning: {:?}", warning);
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
