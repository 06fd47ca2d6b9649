use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use darkpool_core::config::{Config, CONFIG_FILE};
use darkpool_core::pipeline::{self, CollectionReport, NetworkReport, Pipeline};
use darkpool_core::types::FetchOutcome;
use darkpool_report::{json, text};

#[derive(Parser)]
#[command(name = "darkpool")]
#[command(about = "Detect dark pools of ad sellers shared across news and disinformation sites")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1", global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default darkpool.toml configuration file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
    /// Fetch ads.txt files, detect dark pools and compute category statistics
    Collect {
        /// Config file path (defaults to darkpool.toml in the current directory or above)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Read {domain}.txt files from this directory instead of fetching
        #[arg(long)]
        from_dir: Option<PathBuf>,
        /// Where to write the collection results
        #[arg(short, long, default_value = "results.json")]
        output: PathBuf,
        /// Also write the executive text report to this file
        #[arg(long)]
        report: Option<PathBuf>,
        /// Write single-line JSON
        #[arg(long)]
        compact: bool,
    },
    /// Build the site/intermediary graph from collection results and analyze it
    Network {
        /// Collection results written by `darkpool collect`
        #[arg(short, long, default_value = "results.json")]
        input: PathBuf,
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Where to write the network results
        #[arg(short, long, default_value = "network.json")]
        output: PathBuf,
        /// Also write the executive text report to this file
        #[arg(long)]
        report: Option<PathBuf>,
        /// Write single-line JSON
        #[arg(long)]
        compact: bool,
    },
    /// Run collection and network analysis back to back
    Run {
        /// Config file path
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Read {domain}.txt files from this directory instead of fetching
        #[arg(long)]
        from_dir: Option<PathBuf>,
        /// Directory receiving results.json, network.json and both text reports
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Init { force } => cmd_init(force),
        Commands::Collect {
            config,
            from_dir,
            output,
            report,
            compact,
        } => cmd_collect(
            config.as_deref(),
            from_dir.as_deref(),
            &output,
            report.as_deref(),
            compact,
        ),
        Commands::Network {
            input,
            config,
            output,
            report,
            compact,
        } => cmd_network(&input, config.as_deref(), &output, report.as_deref(), compact),
        Commands::Run {
            config,
            from_dir,
            out_dir,
        } => cmd_run(config.as_deref(), from_dir.as_deref(), &out_dir),
    };

    if let Err(e) = result {
        tracing::error!("{e:#}");
        eprintln!("Error: {e:#}");
        process::exit(2);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn cmd_init(force: bool) -> Result<()> {
    let target = PathBuf::from(CONFIG_FILE);
    if target.exists() && !force {
        anyhow::bail!("{CONFIG_FILE} already exists. Use --force to overwrite.");
    }
    std::fs::write(&target, Config::default_toml())
        .with_context(|| format!("failed to write {}", target.display()))?;
    println!("Created {CONFIG_FILE} with default configuration.");
    Ok(())
}

fn cmd_collect(
    config_path: Option<&Path>,
    from_dir: Option<&Path>,
    output: &Path,
    report_path: Option<&Path>,
    compact: bool,
) -> Result<()> {
    let pipeline = Pipeline::new(load_config(config_path)?);
    let collection = run_collection(&pipeline, from_dir)?;
    write_collection(&collection, output, compact)?;

    let report = text::format_collection(&collection);
    write_report(&report, report_path)?;
    print!("{report}");
    Ok(())
}

fn cmd_network(
    input: &Path,
    config_path: Option<&Path>,
    output: &Path,
    report_path: Option<&Path>,
    compact: bool,
) -> Result<()> {
    let pipeline = Pipeline::new(load_config(config_path)?);
    let network = run_network(&pipeline, input)?;
    write_network(&network, output, compact)?;

    let report = text::format_network(&network);
    write_report(&report, report_path)?;
    print!("{report}");
    Ok(())
}

fn cmd_run(config_path: Option<&Path>, from_dir: Option<&Path>, out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let pipeline = Pipeline::new(load_config(config_path)?);

    let collection = run_collection(&pipeline, from_dir)?;
    let results = out_dir.join("results.json");
    write_collection(&collection, &results, false)?;
    let collection_report = text::format_collection(&collection);
    write_report(&collection_report, Some(&out_dir.join("collection_report.txt")))?;

    let network = run_network(&pipeline, &results)?;
    write_network(&network, &out_dir.join("network.json"), false)?;
    let network_report = text::format_network(&network);
    write_report(&network_report, Some(&out_dir.join("network_report.txt")))?;

    print!("{collection_report}{network_report}");
    Ok(())
}

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = match config_path {
        Some(p) => Config::load(p)?,
        None => {
            let cwd = std::env::current_dir().context("failed to read current directory")?;
            Config::load_or_default(&cwd)
        }
    };
    config.validate()?;
    Ok(config)
}

fn fetch_outcomes(config: &Config, from_dir: Option<&Path>) -> Result<Vec<FetchOutcome>> {
    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let outcomes = match from_dir {
        Some(dir) => runtime.block_on(darkpool_fetch::load_from_dir(dir, &config.sites))?,
        None => runtime.block_on(darkpool_fetch::fetch_all(&config.sites, &config.fetch))?,
    };
    Ok(outcomes)
}

fn run_collection(pipeline: &Pipeline, from_dir: Option<&Path>) -> Result<CollectionReport> {
    info!("collecting {} sites", pipeline.config().sites.len());
    let outcomes = fetch_outcomes(pipeline.config(), from_dir)?;
    Ok(pipeline.collect(&outcomes))
}

fn run_network(pipeline: &Pipeline, input: &Path) -> Result<NetworkReport> {
    let loaded = pipeline::load_collection(input)?;
    info!("network analysis of {} ({})", input.display(), loaded.digest);
    Ok(pipeline.analyze_network(&loaded.report, Some(loaded.digest)))
}

fn write_collection(collection: &CollectionReport, path: &Path, compact: bool) -> Result<()> {
    std::fs::write(path, json::format_collection(collection, compact))
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

fn write_network(network: &NetworkReport, path: &Path, compact: bool) -> Result<()> {
    std::fs::write(path, json::format_network(network, compact))
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(())
}

fn write_report(report: &str, path: Option<&Path>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    std::fs::write(path, report).with_context(|| format!("failed to write {}", path.display()))
}
