use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use polyinv::{
    algorithms::{Algorithm, EngineOptions},
    catalog,
    run::{
        append_log, compare, inversion_worker, regression, run, verification_worker,
        InversionStage, ProcessRunner, RunRequest, SupervisionResult,
    },
    supervisor::Limits,
};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

/// Invert polynomial automorphisms with the ABCH method and multi-modular reconstruction.
#[derive(Parser)]
#[command(name = "polyinv", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Invert a catalog map in a supervised worker and append the result to the log.
    Run(RunArgs),
    /// Run every algorithm on a catalog map, or on all catalog maps, and rank them by time.
    Compare(CompareArgs),
    /// Invert and verify the regression maps with every available algorithm.
    VerifyAll(VerifyAllArgs),
    /// List the maps in the catalog.
    List,
    #[command(hide = true)]
    InvertWorker(InvertWorkerArgs),
    #[command(hide = true)]
    VerifyWorker(VerifyWorkerArgs),
}

#[derive(Args)]
struct EngineArgs {
    /// The Gröbner basis method of the external engine.
    #[arg(short = 'e', long, default_value = "")]
    method: String,
    /// The command line of the external Gröbner engine.
    #[arg(long, env = "POLYINV_GROEBNER_ENGINE")]
    engine_command: Option<String>,
    /// The number of threads of the term-parallel evaluator.
    #[arg(long, default_value_t = 12)]
    workers: usize,
}

impl EngineArgs {
    fn options(&self) -> EngineOptions {
        EngineOptions {
            method: self.method.clone(),
            engine_command: self.engine_command.clone(),
            workers: self.workers,
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// ABCH, ABCH_PARALLEL, ABCH_CRT, ABCH_CRT_PARALLEL, GB_EXTERNAL or GB_EXTERNAL_CRT.
    #[arg(short, long)]
    algorithm: Algorithm,
    /// The name of the catalog map.
    #[arg(short, long)]
    mapping: String,
    #[command(flatten)]
    engine: EngineArgs,
    /// Log at debug level.
    #[arg(short, long)]
    debug: bool,
    /// Check the inverse in a second supervised worker.
    #[arg(short, long)]
    verify: bool,
    /// Check that the Jacobian determinant of the map is 1.
    #[arg(short, long)]
    jacobian: bool,
    /// The time limit in seconds.
    #[arg(short, long)]
    timeout: Option<f64>,
    /// The memory limit in MB.
    #[arg(short = 'r', long)]
    memory: Option<u64>,
    /// The log file.
    #[arg(short, long, default_value = "log.out")]
    output: PathBuf,
}

#[derive(Args)]
struct CompareArgs {
    /// The name of the catalog map. All catalog maps are compared if it is absent.
    mapping: Option<String>,
    #[command(flatten)]
    engine: EngineArgs,
    /// Log at debug level.
    #[arg(short, long)]
    debug: bool,
    /// Check the inverse in a second supervised worker.
    #[arg(short, long)]
    verify: bool,
    /// Check that the Jacobian determinant of the map is 1.
    #[arg(short, long)]
    jacobian: bool,
    /// The time limit in seconds.
    #[arg(short, long)]
    timeout: Option<f64>,
    /// The memory limit in MB.
    #[arg(short = 'r', long)]
    memory: Option<u64>,
    /// The log file.
    #[arg(short, long, default_value = "log.out")]
    output: PathBuf,
}

#[derive(Args)]
struct VerifyAllArgs {
    #[command(flatten)]
    engine: EngineArgs,
    /// Log at debug level.
    #[arg(short, long)]
    debug: bool,
    /// The time limit in seconds.
    #[arg(short, long, default_value_t = 120.)]
    timeout: f64,
    /// The memory limit in MB.
    #[arg(short = 'r', long, default_value_t = 4096)]
    memory: u64,
}

#[derive(Args)]
struct InvertWorkerArgs {
    #[arg(long)]
    algorithm: Algorithm,
    #[arg(long)]
    mapping: String,
    #[command(flatten)]
    engine: EngineArgs,
    #[arg(long)]
    jacobian: bool,
    #[arg(long)]
    report: PathBuf,
}

#[derive(Args)]
struct VerifyWorkerArgs {
    #[arg(long)]
    mapping: String,
    #[arg(long)]
    candidate: PathBuf,
    #[arg(long)]
    report: PathBuf,
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .with_env_var("POLYINV_LOG")
            .from_env_lossy()
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn limits(timeout: Option<f64>, memory: Option<u64>) -> Result<Limits> {
    let timeout = timeout
        .map(Duration::try_from_secs_f64)
        .transpose()
        .context("invalid timeout")?;

    Ok(Limits {
        timeout,
        memory_limit_mb: memory,
        ..Limits::default()
    })
}

fn log_results(output: &Path, results: &[SupervisionResult]) -> Result<()> {
    for r in results {
        append_log(output, &r.log_line()?)
            .with_context(|| format!("could not write to {}", output.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            init_logging(args.debug);

            let request = RunRequest {
                stage: InversionStage {
                    algorithm: args.algorithm,
                    mapping: args.mapping,
                    engine: args.engine.options(),
                    jacobian: args.jacobian,
                },
                verify: args.verify,
                limits: limits(args.timeout, args.memory)?,
                debug: args.debug,
            };

            let result = run(&request);
            let line = result.log_line()?;
            println!("{}", line);
            append_log(&args.output, &line)
                .with_context(|| format!("could not write to {}", args.output.display()))?;
        }
        Commands::Compare(args) => {
            init_logging(args.debug);

            let template = RunRequest {
                stage: InversionStage {
                    algorithm: Algorithm::Abch,
                    mapping: String::new(),
                    engine: args.engine.options(),
                    jacobian: args.jacobian,
                },
                verify: args.verify,
                limits: limits(args.timeout, args.memory)?,
                debug: args.debug,
            };

            let mappings: Vec<String> = match args.mapping {
                Some(m) => vec![m],
                None => catalog::names().map(|m| m.to_owned()).collect(),
            };

            for m in &mappings {
                let results = compare(&template, m, &mut ProcessRunner);
                println!("{}:", m);
                for r in &results {
                    println!(
                        "  {:<18} => {:<5} {:>9.3}s {:>9.1} MB{}",
                        r.algorithm.name(),
                        r.status.to_string(),
                        r.time,
                        r.memory,
                        match r.inverse_check_status {
                            Some(s) => format!(", inverse check {}", s),
                            None => String::new(),
                        }
                    );
                }
                log_results(&args.output, &results)?;
            }
        }
        Commands::VerifyAll(args) => {
            init_logging(args.debug);

            let template = RunRequest {
                stage: InversionStage {
                    algorithm: Algorithm::Abch,
                    mapping: String::new(),
                    engine: args.engine.options(),
                    jacobian: true,
                },
                verify: true,
                limits: limits(Some(args.timeout), Some(args.memory))?,
                debug: args.debug,
            };

            let results = regression(&template, &mut ProcessRunner);
            let failed: Vec<_> = results.iter().filter(|r| !r.is_verified()).collect();
            for r in &failed {
                println!("{}", r.log_line()?);
            }

            if !failed.is_empty() {
                bail!("{} of {} runs failed", failed.len(), results.len());
            }
            println!("all {} runs passed", results.len());
        }
        Commands::List => {
            for name in catalog::names() {
                let f = catalog::get(name).with_context(|| format!("invalid catalog map {}", name))?;
                println!(
                    "{:<5} n = {}, r = {}, primes = {:?}{}",
                    name,
                    f.n(),
                    f.r,
                    f.primes,
                    if f.imaginary { ", imaginary" } else { "" }
                );
            }
        }
        Commands::InvertWorker(args) => {
            init_logging(false);
            let stage = InversionStage {
                algorithm: args.algorithm,
                mapping: args.mapping,
                engine: args.engine.options(),
                jacobian: args.jacobian,
            };
            inversion_worker(&stage, &args.report)
                .with_context(|| format!("could not write {}", args.report.display()))?;
        }
        Commands::VerifyWorker(args) => {
            init_logging(false);
            verification_worker(&args.mapping, &args.candidate, &args.report)
                .with_context(|| format!("could not verify with {}", args.candidate.display()))?;
        }
    }

    Ok(())
}
