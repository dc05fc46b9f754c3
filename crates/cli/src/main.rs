mod config;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use config::JobConfig;
use gridwatch_core::{diff, parse_snapshot, render_message, OutageRecord, Tile};
use gridwatch_scraper::{KubraFetch, KubraResolver, Orchestrator, OutageRenderer, PassOutcome};
use gridwatch_store::{ContentClient, UreqTransport};

/// Environment variable consulted when --token is absent.
const TOKEN_ENV: &str = "GRIDWATCH_GITHUB_TOKEN";

/// Utility outage scraper and changelog generator.
#[derive(Parser)]
#[command(name = "gridwatch", version, about = "Utility outage scraper and changelog generator")]
struct Cli {
    /// Suppress progress output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scrape-and-store pass for a configured utility
    Scrape {
        /// Path to the job TOML file
        #[arg(long)]
        config: PathBuf,
        /// API token (falls back to GRIDWATCH_GITHUB_TOKEN)
        #[arg(long)]
        token: Option<String>,
        /// Print the changelog without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Print every tile fetch as it happens
        #[arg(long)]
        verbose: bool,
        /// Override the configured starting zoom
        #[arg(long)]
        min_zoom: Option<u8>,
        /// Override the configured maximum zoom
        #[arg(long)]
        max_zoom: Option<u8>,
    },

    /// Print the changelog between two snapshot files
    Diff {
        /// Path to the older snapshot JSON
        old: PathBuf,
        /// Path to the newer snapshot JSON
        new: PathBuf,
        /// Display name used in the summary line
        #[arg(long, default_value = "snapshot")]
        name: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scrape {
            config,
            token,
            dry_run,
            verbose,
            min_zoom,
            max_zoom,
        } => {
            cmd_scrape(ScrapeOptions {
                config: &config,
                token,
                dry_run,
                verbose,
                min_zoom,
                max_zoom,
                quiet: cli.quiet,
            });
        }
        Commands::Diff { old, new, name } => {
            cmd_diff(&old, &new, &name);
        }
    }
}

struct ScrapeOptions<'a> {
    config: &'a Path,
    token: Option<String>,
    dry_run: bool,
    verbose: bool,
    min_zoom: Option<u8>,
    max_zoom: Option<u8>,
    quiet: bool,
}

fn cmd_scrape(options: ScrapeOptions<'_>) {
    let config = match JobConfig::load(options.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let token = match options.token.or_else(|| std::env::var(TOKEN_ENV).ok()) {
        Some(t) if !t.is_empty() => t,
        _ => {
            eprintln!("error: no API token: pass --token or set {}", TOKEN_ENV);
            process::exit(1);
        }
    };

    let min_zoom = options.min_zoom.unwrap_or(config.utility.min_zoom);
    let max_zoom = options.max_zoom.unwrap_or(config.utility.max_zoom);
    if min_zoom > max_zoom {
        eprintln!("error: min zoom {} exceeds max zoom {}", min_zoom, max_zoom);
        process::exit(1);
    }
    if max_zoom > Tile::MAX_ZOOM {
        eprintln!(
            "error: max zoom {} exceeds the supported limit of {}",
            max_zoom,
            Tile::MAX_ZOOM
        );
        process::exit(1);
    }

    let instance = config.instance();
    let mut resolver = match KubraResolver::discover(UreqTransport::new(), &instance) {
        Ok(r) => r.with_zoom_range(min_zoom, max_zoom),
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };
    if options.verbose {
        resolver = resolver.with_trace(|visit| {
            let mode = if visit.cluster_search {
                "cluster-search"
            } else {
                "scan"
            };
            println!("  GET {} (zoom {}, {})", visit.url, visit.zoom, mode);
        });
    }
    let mut fetch = KubraFetch::new(resolver);

    let mut client = ContentClient::new(UreqTransport::new(), config.location(), &token);
    if let Some(committer) = config.committer() {
        client = client.with_committer(committer);
    }
    let location = config.location();
    let mut orchestrator = Orchestrator::new(
        client,
        config.store.path.clone(),
        config.style(),
        OutageRenderer,
    );

    match orchestrator.run_pass(&mut fetch, options.dry_run) {
        Ok(PassOutcome::NoData) => {
            if !options.quiet {
                println!("{}: no data returned, nothing written", config.store.path);
            }
        }
        Ok(PassOutcome::Unchanged) => {
            if !options.quiet {
                println!("{}: no changes", config.store.path);
            }
        }
        Ok(PassOutcome::DryRun { message }) => {
            println!("{}", message);
            if !options.quiet {
                println!("(dry run: nothing written)");
            }
        }
        Ok(PassOutcome::Written { commit_sha, .. }) => {
            if !options.quiet {
                println!(
                    "https://github.com/{}/{}/commit/{}",
                    location.owner, location.repo, commit_sha
                );
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }

    if !options.quiet {
        if let Some((requests, bytes)) = fetch.last_stats() {
            println!(
                "Made {} requests, fetching {:.1} KB",
                requests,
                bytes as f64 / 1024.0
            );
        }
    }
}

fn cmd_diff(old_path: &Path, new_path: &Path, name: &str) {
    let old = read_snapshot(old_path);
    let new = read_snapshot(new_path);

    let delta = diff(&old, &new, |r| r.id.clone());
    if delta.is_empty() {
        println!("no differences");
        return;
    }

    let style = gridwatch_core::ReportStyle {
        display_name: name.to_string(),
        noun: "outage".to_string(),
        plural: None,
        show_changes: true,
        source_url: None,
    };
    println!("{}", render_message(&style, &OutageRenderer, &delta, false));
}

fn read_snapshot(path: &Path) -> Vec<OutageRecord> {
    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error reading '{}': {}", path.display(), e);
            process::exit(1);
        }
    };
    match parse_snapshot(&bytes) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("error parsing '{}': {}", path.display(), e);
            process::exit(1);
        }
    }
}
