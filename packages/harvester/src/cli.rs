//! Command-line interface for the harvester.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{is_posting_url, HarvestConfig};
use crate::dedup::DedupStore;
use crate::error::{HarvesterError, Result};
use crate::extractor::{extract, ExtractInput};
use crate::harvest::{rule_table, Harvester};
use crate::session::{title_and_text, HttpSession};
use crate::types::{HarvestOptions, ScrapeRun};

/// Vacancy Harvester - Collect job postings from a classifieds listing.
#[derive(Parser)]
#[command(name = "vacancy-harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one harvest: discover, extract new postings and append them to the CSV.
    Run {
        /// Listing pages to scan
        #[arg(long)]
        max_pages: Option<u32>,

        /// Maximum number of new postings to fetch
        #[arg(long)]
        max_jobs: Option<usize>,

        /// Also harvest sponsored postings
        #[arg(long)]
        include_sponsored: bool,

        /// CSV output file (default: exports/jobs.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Dedup store file (default: exports/scraped_jobs_db.json)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List the posting links found on the listing pages.
    Discover {
        /// Listing pages to scan
        #[arg(long)]
        max_pages: Option<u32>,

        /// Include sponsored postings
        #[arg(long)]
        include_sponsored: bool,
    },

    /// Extract a posting from a saved page (HTML or visible text) and print it as JSON.
    Extract {
        /// Saved page file
        file: PathBuf,

        /// URL the page was saved from
        #[arg(long)]
        url: String,

        /// Document title, for text files without one
        #[arg(long)]
        title: Option<String>,
    },

    /// Remove dedup records not seen within the retention window.
    Evict {
        /// Retention window in days
        #[arg(long, default_value_t = crate::config::DEFAULT_RETENTION_DAYS)]
        days: i64,

        /// Dedup store file
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Show dedup store statistics.
    Stats {
        /// Dedup store file
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = HarvestConfig::from_env()?;

    match cli.command {
        Commands::Run {
            max_pages,
            max_jobs,
            include_sponsored,
            output,
            db,
        } => {
            let mut config = config;
            if let Some(output) = output {
                config = config.with_output_csv(output);
            }
            if let Some(db) = db {
                config = config.with_dedup_db(db);
            }
            let mut options = config.harvest_options();
            options.max_pages = max_pages.unwrap_or(options.max_pages);
            options.max_jobs = max_jobs.or(options.max_jobs);
            options.include_sponsored |= include_sponsored;
            run_command(config, &options)
        }
        Commands::Discover {
            max_pages,
            include_sponsored,
        } => {
            let mut options = config.harvest_options();
            options.max_pages = max_pages.unwrap_or(options.max_pages);
            options.include_sponsored |= include_sponsored;
            discover_command(config, &options)
        }
        Commands::Extract { file, url, title } => {
            extract_command(&config, &file, &url, title.as_deref())
        }
        Commands::Evict { days, db } => {
            evict_command(db.as_deref().unwrap_or(&config.dedup_db), days)
        }
        Commands::Stats { db } => stats_command(db.as_deref().unwrap_or(&config.dedup_db)),
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn session(config: &HarvestConfig) -> Result<HttpSession> {
    Ok(HttpSession::with_timeout(config.fetch_timeout)?.with_settle(config.page_settle))
}

/// Execute the run command.
fn run_command(config: HarvestConfig, options: &HarvestOptions) -> Result<()> {
    println!(
        "{} {} (max pages {}, sponsored {})",
        style("Harvesting").bold(),
        style(config.listing_page_url(1)).cyan(),
        options.max_pages,
        if options.include_sponsored { "included" } else { "excluded" }
    );
    println!();

    let pb = spinner("Discovering postings...");
    let progress_bar = pb.clone();
    let mut harvester = Harvester::new(session(&config)?, config)?.with_progress(Box::new(
        move |done, total, url| progress_bar.set_message(format!("[{done}/{total}] {url}")),
    ));

    let outcome = harvester.run(options);
    pb.finish_and_clear();

    print_run(&outcome.run);

    if let Some(error) = outcome.run.error {
        return Err(HarvesterError::RunFailed(error));
    }

    println!();
    println!(
        "{} {}",
        style("Saved to:").green().bold(),
        harvester.config().output_csv.display()
    );
    Ok(())
}

fn print_run(run: &ScrapeRun) {
    println!("  Pages scanned: {}", run.pages_scanned);
    println!("  Links discovered: {}", run.urls_discovered);
    println!("  Sponsored seen: {}", run.sponsored_seen);
    println!("  Already seen: {}", run.skipped_already_seen);
    println!("  New postings: {}", style(run.new_jobs).green());
    if run.failed_extractions > 0 {
        println!(
            "  Failed: {} ({} blocked)",
            style(run.failed_extractions).yellow().bold(),
            run.blocked
        );
    }
    println!(
        "  Written: {} (skipped duplicates: {})",
        run.written, run.skipped_duplicate
    );
    println!(
        "  With salary/contact/email: {}/{}/{}",
        run.coverage.with_salary, run.coverage.with_contact, run.coverage.with_email
    );
    if let Some(ms) = run.duration_ms() {
        println!("  Duration: {:.1}s", ms as f64 / 1000.0);
    }
}

/// Execute the discover command.
fn discover_command(config: HarvestConfig, options: &HarvestOptions) -> Result<()> {
    let pb = spinner("Scanning listing pages...");
    let mut harvester = Harvester::new(session(&config)?, config)?;
    let discovery = harvester.discover(options);
    pb.finish_and_clear();
    let discovery = discovery?;

    for link in &discovery.links {
        println!("{:<10} {}", link.class.as_str(), link.url);
    }
    println!();
    println!(
        "{} {} links ({} regular, {} sponsored, {} unknown) over {} page(s)",
        style("Found").bold(),
        discovery.links.len(),
        discovery.regular,
        discovery.sponsored,
        discovery.unknown,
        discovery.pages_scanned
    );
    Ok(())
}

/// Execute the extract command.
fn extract_command(
    config: &HarvestConfig,
    file: &Path,
    url: &str,
    title: Option<&str>,
) -> Result<()> {
    if !is_posting_url(url) {
        return Err(HarvesterError::InvalidPostingUrl(url.to_string()));
    }

    let content = std::fs::read_to_string(file)?;
    let (page_title, text) = if content.trim_start().starts_with('<') {
        title_and_text(&content)
    } else {
        (String::new(), content)
    };

    let rules = rule_table(config)?;
    let input = ExtractInput::new(url, title.map_or(page_title, str::to_string), text);
    let posting = extract(&input, &rules)?;
    println!("{}", serde_json::to_string_pretty(&posting)?);
    Ok(())
}

/// Execute the evict command.
fn evict_command(db: &Path, days: i64) -> Result<()> {
    if days < 0 {
        return Err(HarvesterError::Config(format!(
            "retention must not be negative (got {days})"
        )));
    }
    let retention = chrono::Duration::try_days(days).ok_or_else(|| {
        HarvesterError::Config(format!("retention of {days} days is out of range"))
    })?;
    let mut store = DedupStore::open(db);
    let evicted = store.evict_older_than(retention)?;
    println!(
        "{} {} record(s) older than {} day(s); {} remaining",
        style("Evicted").bold(),
        evicted,
        days,
        store.len()
    );
    Ok(())
}

/// Execute the stats command.
fn stats_command(db: &Path) -> Result<()> {
    let stats = DedupStore::open(db).stats();
    println!("{} {}", style("Dedup store:").bold(), db.display());
    println!("  Tracked: {}", stats.total_tracked);
    println!("  Seen in last 24h: {}", stats.recent_24h);
    println!("  Size: {} KB", stats.size_bytes.div_ceil(1024));
    Ok(())
}
