//! govseed CLI
//!
//! Generates hierarchical ministry/department seed data, bulk-loads it into
//! a relational store and benchmarks load time across dataset sizes.

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use govseed_store::matrix::{parse_axis, parse_count};
use govseed_store::staging::{export_dataset, import_dataset};
use govseed_store::{
    BenchOptions, BenchSession, DatasetGenerator, GeneratorConfig, LoadOptions, MatrixSource,
    NameSuffix, Store, TrialSource, load_dataset,
};
use govseed_types::{BenchmarkReport, Dataset, EntityKind, SessionEnd};
use std::io::{self, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod prompt;
mod report;

use config::{StoreUrl, open_store};
use prompt::PromptSource;
use report::{ResultsFiles, write_bench_report, write_load_report};

#[derive(Parser)]
#[command(name = "govseed")]
#[command(author, version, about = "Ministry/department seed data generator and load benchmark")]
struct Cli {
    /// Store connection string: sqlite:PATH, sqlite::memory: or postgres://...
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Maximum pooled Postgres connections.
    #[arg(long, env = "GOVSEED_PG_POOL_SIZE", global = true, default_value_t = 2)]
    pg_pool_size: u32,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a dataset and stage it as two CSV files.
    Generate {
        #[command(flatten)]
        counts: Counts,
        #[command(flatten)]
        names: NameArgs,
        /// Directory receiving ministries.csv and departments.csv.
        #[arg(long, default_value = "csv_output")]
        out: PathBuf,
    },

    /// Load a staged or freshly generated dataset into the store.
    Load {
        /// Directory written by `generate`.
        #[arg(long, conflicts_with_all = ["ministries", "departments"])]
        from: Option<PathBuf>,
        #[command(flatten)]
        counts: OptionalCounts,
        #[command(flatten)]
        names: NameArgs,
        #[command(flatten)]
        load: LoadArgs,
    },

    /// Empty both tables and restart their identity counters.
    Reset,

    /// Run generate -> load -> measure trials and report the timings.
    Bench {
        /// Comma-separated ministry counts, e.g. 10,100,1000.
        #[arg(long, required_unless_present = "interactive", allow_hyphen_values = true)]
        ministries: Option<String>,
        /// Comma-separated departments-per-ministry counts.
        #[arg(long, required_unless_present = "interactive", allow_hyphen_values = true)]
        departments: Option<String>,
        /// Ask for each trial's counts on stdin instead of walking a matrix.
        #[arg(long, conflicts_with_all = ["ministries", "departments"])]
        interactive: bool,
        /// Reset the store after every trial.
        #[arg(long)]
        reset: bool,
        /// Reset the store once before the first trial.
        #[arg(long)]
        reset_first: bool,
        #[command(flatten)]
        names: NameArgs,
        #[command(flatten)]
        load: LoadArgs,
        /// Write the full report as JSON.
        #[arg(long)]
        results: Option<PathBuf>,
        /// Write the timing series as CSV for charting.
        #[arg(long)]
        results_csv: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Counts {
    /// Number of ministries (negative values count as 0).
    #[arg(long, value_parser = parse_count, allow_negative_numbers = true)]
    ministries: usize,
    /// Departments per ministry (negative values count as 0).
    #[arg(long, value_parser = parse_count, allow_negative_numbers = true)]
    departments: usize,
}

#[derive(Args)]
struct OptionalCounts {
    #[arg(long, value_parser = parse_count, allow_negative_numbers = true, requires = "departments")]
    ministries: Option<usize>,
    #[arg(long, value_parser = parse_count, allow_negative_numbers = true, requires = "ministries")]
    departments: Option<usize>,
}

#[derive(Args)]
struct NameArgs {
    #[arg(long, value_enum, default_value_t = SuffixArg::None)]
    suffix: SuffixArg,
    /// Redraw names until each is unused within the run, across both tables.
    #[arg(long)]
    unique: bool,
    /// Give up on a unique name after this many draws.
    #[arg(long, default_value_t = 64)]
    max_name_attempts: usize,
    /// Seed for reproducible datasets.
    #[arg(long)]
    seed: Option<u64>,
}

impl NameArgs {
    fn generator(&self) -> DatasetGenerator<rand::rngs::StdRng> {
        let config = GeneratorConfig {
            suffix: self.suffix.into(),
            unique_names: self.unique,
            max_name_attempts: self.max_name_attempts,
            ..GeneratorConfig::default()
        };
        match self.seed {
            Some(seed) => DatasetGenerator::seeded(config, seed),
            None => DatasetGenerator::from_entropy(config),
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SuffixArg {
    None,
    Sequence,
    RandomTag,
}

impl From<SuffixArg> for NameSuffix {
    fn from(value: SuffixArg) -> Self {
        match value {
            SuffixArg::None => NameSuffix::None,
            SuffixArg::Sequence => NameSuffix::Sequence,
            SuffixArg::RandomTag => NameSuffix::RandomTag,
        }
    }
}

#[derive(Args)]
struct LoadArgs {
    /// Records per insert statement.
    #[arg(long, default_value = "500")]
    batch_size: NonZeroUsize,
    /// Pause between chunks, in milliseconds.
    #[arg(long, default_value_t = 0)]
    throttle_ms: u64,
}

impl LoadArgs {
    fn options(&self) -> LoadOptions {
        LoadOptions::new(self.batch_size).with_throttle(Duration::from_millis(self.throttle_ms))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Generate { counts, names, out } => {
            cmd_generate(counts, names, out)?;
        }
        Commands::Load {
            from,
            counts,
            names,
            load,
        } => {
            let store = connect(&cli)?;
            cmd_load(store.as_ref(), from.as_deref(), counts, names, load)?;
        }
        Commands::Reset => {
            let store = connect(&cli)?;
            store.reset().context("store reset failed")?;
            println!("ministry and department tables emptied");
        }
        Commands::Bench {
            ministries,
            departments,
            interactive,
            reset,
            reset_first,
            names,
            load,
            results,
            results_csv,
        } => {
            let mut source: Box<dyn TrialSource> = if *interactive {
                Box::new(PromptSource::new(io::stdin().lock(), io::stdout()))
            } else {
                let ministries = parse_axis(ministries.as_deref().unwrap_or_default())
                    .context("invalid --ministries list")?;
                let departments = parse_axis(departments.as_deref().unwrap_or_default())
                    .context("invalid --departments list")?;
                Box::new(MatrixSource::from_axes(&ministries, &departments))
            };
            let store = connect(&cli)?;
            let options = BenchOptions {
                load: load.options(),
                reset_between_trials: *reset,
                reset_before_start: *reset_first,
            };
            let mut session = BenchSession::new(store.as_ref(), names.generator(), options);
            let mut sink = ResultsFiles {
                json: results.clone(),
                csv: results_csv.clone(),
            };
            let published = session.run_and_publish(source.as_mut(), &mut sink);
            let report = match &published {
                Ok(report) => report,
                Err(err) => &err.report,
            };
            write_bench_report(&mut io::stdout().lock(), report)?;
            let report = published.context("failed to write results")?;
            ensure_completed(&report)?;
        }
    }

    Ok(())
}

/// Turns an aborted session into a non-zero exit.
fn ensure_completed(report: &BenchmarkReport) -> Result<()> {
    match report.end {
        SessionEnd::Completed => Ok(()),
        SessionEnd::Aborted { trial } => Err(anyhow!(
            "benchmark aborted at trial {} after a load failure",
            trial
        )),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "govseed=debug" } else { "govseed=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn connect(cli: &Cli) -> Result<Box<dyn Store>> {
    let url = cli
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow!("DATABASE_URL is not set (pass --database-url or export it)"))?;
    let url = StoreUrl::parse(url)?;
    info!(backend = url.backend(), url = %url, "opening store");
    open_store(&url, cli.pg_pool_size).with_context(|| format!("cannot open store {}", url))
}

fn cmd_generate(counts: &Counts, names: &NameArgs, out: &Path) -> Result<()> {
    let dataset = names
        .generator()
        .generate(counts.ministries, counts.departments)?;
    let (ministries, departments) = export_dataset(out, &dataset)?;
    println!(
        "generated {} ministries and {} departments",
        dataset.ministries.len(),
        dataset.departments.len()
    );
    println!("  {}", ministries.display());
    println!("  {}", departments.display());
    Ok(())
}

fn cmd_load(
    store: &dyn Store,
    from: Option<&Path>,
    counts: &OptionalCounts,
    names: &NameArgs,
    load: &LoadArgs,
) -> Result<()> {
    let dataset: Dataset = match (from, counts.ministries, counts.departments) {
        (Some(dir), _, _) => import_dataset(dir)
            .with_context(|| format!("cannot read staged dataset from {}", dir.display()))?,
        (None, Some(ministries), Some(departments)) => {
            names.generator().generate(ministries, departments)?
        }
        _ => return Err(anyhow!("pass --from DIR or both --ministries and --departments")),
    };

    let report = match load_dataset(store, &dataset, &load.options()) {
        Ok(report) => report,
        Err(err) => {
            let persisted = store.count(err.kind).ok();
            let hint = match persisted {
                Some(rows) => format!("; {} {} rows now in the store", rows, err.kind),
                None => String::new(),
            };
            return Err(anyhow!("{}{}", err, hint));
        }
    };

    let mut out = io::stdout().lock();
    write_load_report(&mut out, &report)?;
    let stored = store.count(EntityKind::Department)?;
    writeln!(out, "store now holds {} departments", stored)?;
    Ok(())
}
