//! Autograde CLI
//!
//! A command-line tool for batch grading programming assignments.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use autograde::{
    Config, EXAMPLE_CONFIG, FileEncoding, GradeRecord, Grader, Normalization, Preprocessor,
    Roster, ScoreTable, SourceValidator, normalize::normalize_encoding, report::format_score,
    write_report,
};
use clap::{Parser, Subcommand};
use tracing::{Level, debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "autograde")]
#[command(about = "A tool for grading programming assignments in batch")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: autograde.toml)
        #[arg(short, long, default_value = "autograde.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Grade the roster (or one candidate) and write the report
    Grade {
        /// Assignment number
        #[arg(short, long)]
        assignment: Option<u32>,

        /// Number of problems
        #[arg(short, long)]
        problems: Option<u32>,

        /// Grade only this candidate and keep the work directory
        #[arg(long)]
        id: Option<String>,

        /// Report path (default: from configuration)
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Time limit per test case in seconds
        #[arg(short, long)]
        timeout: Option<f64>,
    },

    /// Normalize and validate one source file
    Check {
        /// Source file to check (normalized in place)
        #[arg(value_name = "FILE")]
        source: PathBuf,
    },

    /// Convert one file to the target encoding in place
    Normalize {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Target encoding (default: from configuration)
        #[arg(short, long)]
        encoding: Option<FileEncoding>,
    },

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Grade {
            assignment,
            problems,
            id,
            report,
            timeout,
        } => {
            let mut config = config;
            if let Some(assignment) = assignment {
                config.assignment = assignment;
            }
            if let Some(problems) = problems {
                config.problems = problems;
            }
            if let Some(timeout) = timeout {
                config.timeout = timeout;
            }
            config.validate().context("invalid grading options")?;
            run_grade(config, id, report).await
        }
        Commands::Check { source } => run_check(&config, &source).await,
        Commands::Normalize { file, encoding } => {
            run_normalize(&file, encoding.unwrap_or(config.target_encoding)).await
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_grade(mut config: Config, id: Option<String>, report: Option<PathBuf>) -> Result<()> {
    let roster = match id {
        Some(id) => {
            // Single candidate runs are for debugging; leave the artifacts behind
            config.keep_work_dir = true;
            Roster::single(id)
        }
        None => Roster::load(&config.roster).context("failed to load roster")?,
    };
    let scores = ScoreTable::load(&config.score_table).context("failed to load score table")?;
    let report = report.unwrap_or_else(|| config.report_path());
    let problems = config.problems;

    info!(
        assignment = config.assignment,
        problems,
        candidates = roster.len(),
        "starting grading"
    );

    let grader = Grader::new(config, scores).context("failed to set up grader")?;
    let records = match grader.grade_batch(&roster).await {
        Ok(records) => records,
        Err(e) if e.is_duplicate_submission() => {
            error!("fix the assignments directory and run again");
            return Err(e).context("grading halted");
        }
        Err(e) => return Err(e).context("grading failed"),
    };

    write_report(&report, &records, problems).context("failed to write report")?;

    print_summary(&records);
    println!("\nReport written to '{}'", report.display());
    Ok(())
}

fn print_summary(records: &[GradeRecord]) {
    for record in records {
        let reasons: Vec<String> = record
            .problems
            .iter()
            .filter(|(_, result)| !result.reasons.is_empty())
            .map(|(problem, result)| format!("p{problem:02}: {}", result.reason()))
            .collect();
        println!(
            "{:<15} {:>8}  {}",
            record.candidate,
            format_score(record.total()),
            reasons.join("; ")
        );
    }
}

async fn run_check(config: &Config, source: &Path) -> Result<()> {
    let preprocessor = Preprocessor::from_config(config.target_encoding, &config.preprocess)
        .context("invalid preprocess configuration")?;
    let validator = SourceValidator::from_config(&config.validator)
        .context("invalid validator patterns")?
        .with_encoding(config.target_encoding);

    let path = source.to_path_buf();
    let (normalization, violation) = tokio::task::spawn_blocking(move || -> Result<_> {
        let normalization = preprocessor
            .prepare(&path)
            .context("failed to prepare source")?;
        let violation = validator
            .find_violation(&path)
            .context("failed to read source")?;
        Ok((normalization, violation))
    })
    .await
    .context("check task failed")??;

    print_normalization(source, normalization);
    match violation {
        None => {
            println!("legal");
            Ok(())
        }
        Some(violation) => {
            println!("illegal");
            anyhow::bail!(
                "line {} matches forbidden pattern '{}'",
                violation.line,
                violation.pattern
            );
        }
    }
}

async fn run_normalize(file: &Path, encoding: FileEncoding) -> Result<()> {
    let path = file.to_path_buf();
    let normalization = tokio::task::spawn_blocking(move || normalize_encoding(&path, encoding))
        .await
        .context("normalize task failed")?
        .with_context(|| format!("failed to normalize '{}'", file.display()))?;

    print_normalization(file, normalization);
    Ok(())
}

fn print_normalization(file: &Path, normalization: Normalization) {
    match normalization {
        Normalization::Unchanged(encoding) => {
            println!("{}: already {encoding}", file.display());
        }
        Normalization::Converted { from, to } => {
            println!("{}: converted {from} -> {to}", file.display());
        }
    }
}

fn show_config(config: &Config) {
    println!("Assignment: {}", config.assignment);
    println!("Problems: {}", config.problems);
    println!("Timeout: {}s", config.timeout);
    println!("Parallelism: {}", config.parallelism);
    println!("Target encoding: {}", config.target_encoding);
    println!();
    println!("Work directory: {}", config.work_dir.display());
    println!("Test data: {}", config.testdata_dir.display());
    println!("Assignments: {}", config.assignments_dir.display());
    println!("Roster: {}", config.roster.display());
    println!("Score table: {}", config.score_table.display());
    println!("Report: {}", config.report_path().display());
    println!();
    println!("Source name: {}", config.source_name("<id>", 1));
    println!("Archive name: {}", config.archive_name("<id>"));
    println!("Artifact name: {}", config.artifact_name(1));
    println!();
    println!("Toolchain: {}", config.toolchain.command.join(" "));
    match &config.extract {
        Some(extract) => println!("Extract: {}", extract.command.join(" ")),
        None => println!("Extract: none (submissions are directories)"),
    }
    println!("Deny patterns: {}", config.validator.deny.len());
    println!("Rewrites: {}", config.preprocess.rewrites.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
