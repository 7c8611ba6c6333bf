//! Bazaar: catalog and review crawler with a SQLite ETL sink.

use std::path::PathBuf;

use bazaar_core::PipelineConfig;
use bazaar_runtime::Orchestrator;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod stats;

const CONFIG_ENV: &str = "BAZAAR_CONFIG";

struct Args {
    command: String,
    config: Option<PathBuf>,
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
    let mut command = None;
    let mut config = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
    let mut iter = raw.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter
                    .next()
                    .ok_or_else(|| "--config requires a path".to_string())?;
                config = Some(PathBuf::from(path));
            }
            other if command.is_none() => command = Some(other.to_string()),
            other => return Err(format!("Unexpected argument: {}", other)),
        }
    }
    Ok(Args {
        command: command.unwrap_or_else(|| "run".into()),
        config,
    })
}

fn print_help() {
    println!("Bazaar: catalog and review crawler");
    println!();
    println!("Usage: bazaar [command] [--config <path>]");
    println!();
    println!("Commands:");
    println!("  run (default)            Crawl and load, or load the latest snapshots when skip_crawl is set");
    println!("  etl                      Load the latest snapshots without crawling");
    println!("  stats                    Show collection counts and latest snapshots");
    println!("  help                     Show this help message");
    println!();
    println!("Configuration: JSON file via --config or {}, then BAZAAR_* variables.", CONFIG_ENV);
}

async fn run(mut config: PipelineConfig, force_snapshot: bool) -> i32 {
    if force_snapshot {
        config.skip_crawl = true;
    }
    info!(
        "Store: {} (collections {}, {})",
        config.store.db_path.display(),
        config.store.products_collection,
        config.store.comments_collection
    );

    match Orchestrator::new(config).run().await {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => error!("Cannot render run report: {}", e),
            }
            if report.succeeded() {
                0
            } else {
                1
            }
        }
        Err(e) => {
            error!("Run aborted: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let raw: Vec<String> = std::env::args().collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}. Use 'bazaar help' for usage.", e);
            std::process::exit(1);
        }
    };

    if matches!(args.command.as_str(), "--help" | "-h" | "help") {
        print_help();
        return Ok(());
    }

    let config = PipelineConfig::load(args.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let code = match args.command.as_str() {
        "run" => run(config, false).await,
        "etl" => run(config, true).await,
        "stats" => {
            let report = stats::inspect(&config);
            stats::print_report(&report);
            if report.is_ok() {
                0
            } else {
                1
            }
        }
        other => {
            eprintln!("Unknown command: {}. Use 'bazaar help' for usage.", other);
            1
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        std::iter::once("bazaar")
            .chain(items.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let args = parse_args(&argv(&["etl", "--config", "/tmp/b.json"])).unwrap();
        assert_eq!(args.command, "etl");
        assert_eq!(args.config, Some(PathBuf::from("/tmp/b.json")));

        let args = parse_args(&argv(&["--config", "x.json", "stats"])).unwrap();
        assert_eq!(args.command, "stats");

        assert!(parse_args(&argv(&["run", "--config"])).is_err());
        assert!(parse_args(&argv(&["run", "extra"])).is_err());
    }
}
