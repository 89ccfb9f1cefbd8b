use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use certrun::catalog::{support, Test};
use certrun::config::RunConfig;

#[derive(Parser)]
#[command(
    name = "certrun",
    about = "Drives hardware-certification test runs against a test-lab controller",
    version,
    long_about = None
)]
struct Cli {
    /// Config file (falls back to $CERTRUN_CONFIG, then /etc/certrun/certrun.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full queue/monitor/archive cycle against a recorded lab scenario
    Replay {
        /// Scenario JSON: one catalog snapshot per poll
        #[arg(long)]
        scenario: PathBuf,

        /// Target key (overrides run.target_key)
        #[arg(long)]
        target_key: Option<String>,

        /// Project tag (overrides run.tag)
        #[arg(long)]
        tag: Option<String>,

        /// Result store directory (overrides storage.dir)
        #[arg(long)]
        results: Option<PathBuf>,

        /// Polling interval in seconds (overrides timing.poll_interval_secs)
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Filter settle delay in seconds (overrides timing.filter_settle_secs)
        #[arg(long)]
        filter_settle: Option<u64>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show which tests of a catalog need a support machine
    Classify {
        /// Catalog JSON: an array of tests
        #[arg(long)]
        catalog: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn init_tracing(config: &RunConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let resolved = RunConfig::resolve(cli.config.as_deref())?;
    init_tracing(&resolved.config);
    resolved.log();
    let mut config = resolved.config;

    match cli.command {
        Commands::Replay {
            scenario,
            target_key,
            tag,
            results,
            poll_interval,
            filter_settle,
            json,
        } => {
            if let Some(v) = target_key {
                config.run.target_key = v;
            }
            if let Some(v) = tag {
                config.run.tag = v;
            }
            if let Some(v) = results {
                config.storage.dir = v;
            }
            if let Some(v) = poll_interval {
                config.timing.poll_interval_secs = v;
            }
            if let Some(v) = filter_settle {
                config.timing.filter_settle_secs = v;
            }

            let report = certrun::replay(&config, &scenario).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report.final_stats)?);
            } else {
                println!("\ncertrun replay: {} cycle(s)", report.cycles);
                println!("{:<10} | {}", "Passed", report.final_stats.passed);
                println!("{:<10} | {}", "Failed", report.final_stats.failed);
                println!("{:<10} | {}", "InQueue", report.final_stats.in_queue);
                println!("{:<10} | {}", "Archived", report.archived.len());
                println!("Results in {}", config.storage.dir.display());
            }
        }
        Commands::Classify { catalog } => {
            let content = std::fs::read_to_string(&catalog)
                .with_context(|| format!("failed to read catalog: {}", catalog.display()))?;
            let tests: Vec<Test> = serde_json::from_str(&content)
                .with_context(|| format!("failed to parse catalog: {}", catalog.display()))?;

            let (single, multi) = support::partition(&tests);
            println!("{:<8} | {:<6} | Name", "Machines", "Id");
            println!("{:-<8}-|-{:-<6}-|-{:-<40}", "", "", "");
            for (label, group) in [("single", single), ("multi", multi)] {
                for t in group {
                    println!("{:<8} | {:<6} | {}", label, t.id, t.name);
                }
            }
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
