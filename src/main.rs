//! homescrape main entry point
//!
//! This is the command-line interface for the homescrape listing scraper.

use anyhow::Context;
use clap::Parser;
use homescrape::browser::{BrowserSettings, ChromeLauncher};
use homescrape::config::{load_config_with_hash, Config, Pagination};
use homescrape::dispatch::Dispatcher;
use homescrape::export::Exporter;
use homescrape::site::resolve_search_url;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// homescrape: a browser-driven real-estate listing scraper
///
/// homescrape visits each configured site's search results in a headless
/// browser, follows every listing to its detail page and appends the
/// normalized listings to combined JSON, CSV and SQLite outputs.
#[derive(Parser, Debug)]
#[command(name = "homescrape")]
#[command(version)]
#[command(about = "A browser-driven real-estate listing scraper", long_about = None)]
struct Cli {
    /// Path to the site configuration file (TOML, or JSON for .json files)
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Scrape only this site (repeatable)
    #[arg(long = "site", value_name = "NAME")]
    sites: Vec<String>,

    /// Directory for the combined output files
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Validate config and show what would be scraped without scraping
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Command-line overrides
    if let Some(dir) = cli.output_dir {
        config.scraper.output_dir = dir;
    }
    if cli.headed {
        config.scraper.headless = false;
    }

    let browser_settings = BrowserSettings::from(&config.scraper);
    let launcher = Arc::new(ChromeLauncher::new(browser_settings)?);
    let dispatcher = Dispatcher::new(config.clone(), launcher).select_sites(&cli.sites)?;

    if cli.dry_run {
        handle_dry_run(&config, dispatcher.sites());
        return Ok(());
    }

    handle_scrape(&config, &dispatcher, &config_hash).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("homescrape=info,warn"),
            1 => EnvFilter::new("homescrape=debug,info"),
            2 => EnvFilter::new("homescrape=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the validated config and the sites to scrape
fn handle_dry_run(config: &Config, sites: &[String]) {
    println!("=== homescrape Dry Run ===\n");

    let settings = &config.scraper;
    println!("Browser:");
    println!("  Headless: {}", settings.headless);
    match &settings.remote_debugging_url {
        Some(url) => println!("  Attach to: {}", url),
        None => println!(
            "  Executable: {}",
            settings
                .chrome_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "auto-detect".to_string())
        ),
    }
    println!("  Delay between sites: {}s", settings.site_delay);

    println!("\nOutput:");
    println!("  Directory: {}", settings.output_dir.display());
    println!("  Formats: {:?}", settings.formats);

    println!("\nSites ({}):", sites.len());
    for name in sites {
        let Some(site) = config.site(name) else {
            continue;
        };
        let search = resolve_search_url(site)
            .map(|url| url.to_string())
            .unwrap_or_else(|e| format!("<invalid: {}>", e));
        println!("  - {}", name);
        println!("    * Search: {}", search);
        println!("    * Timeout: {}s, delay: up to {}s", site.timeout, site.delay);
        match &site.pagination {
            Pagination::None => println!("    * Pagination: none"),
            Pagination::NumberedPageLinks {
                max_pages,
                link_selector,
            } => println!(
                "    * Pagination: up to {} pages via {}",
                max_pages, link_selector
            ),
        }
        if site.selectors.list_container.is_none() || site.selectors.product_card.is_none() {
            println!("    ! No list_container/product_card selector: no listings will be found");
        }
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main scrape operation
async fn handle_scrape(config: &Config, dispatcher: &Dispatcher, config_hash: &str) -> anyhow::Result<()> {
    let settings = &config.scraper;
    let mut exporter = Exporter::open(&settings.output_dir, &settings.formats, config_hash)
        .with_context(|| format!("Failed to open outputs in {}", settings.output_dir.display()))?;

    let summary = dispatcher.run(&mut exporter).await;

    println!(
        "Finished scraping {} site(s). {}",
        summary.total_sites(),
        summary
    );

    Ok(())
}
