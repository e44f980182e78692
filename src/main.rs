use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use stomper::collect::collect_work_items;
use stomper::config::{SessionConfig, StomperConfig, TestValidation};
use stomper::format::OutputFormat;
use stomper::model::state::SessionResult;
use stomper::session::{Session, SessionDeps};

/// Automated repair of static-analysis findings
///
/// stomper runs your quality tools (lint, type checks), hands each failing
/// file to an AI fixing agent inside an isolated git worktree, verifies the
/// agent actually resolved the findings, and lands each successful fix as
/// one atomic commit on your working tree.
///
/// HOW IT WORKS:
///   1. Tools run once against the repository to collect findings
///   2. Each file with findings gets its own sandboxed fix branch
///      (up to --max-parallel-files at a time)
///   3. Fixes are verified by re-running the tools in the sandbox,
///      optionally gated on tests
///   4. Verified patches land serially, one commit per file
///
/// Tools and the agent command come from .stomper.toml in the target root:
///
///   [[tools]]
///   name = "ruff"
///   command = ["ruff", "check", "--output-format", "json-lines"]
///
///   [agent]
///   command = ["claude", "-p"]
#[derive(Parser)]
#[command(name = "stomper")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'stomper <command> --help' for more information on a specific command.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect and fix findings across the repository
    Fix(FixArgs),

    /// Collect findings and report them without fixing anything
    Check(CheckArgs),
}

#[derive(clap::Args)]
struct FixArgs {
    /// Repository root to fix
    #[arg(default_value = ".")]
    target: PathBuf,

    /// Only run these tools (repeatable; default: all configured tools)
    #[arg(short, long = "tool")]
    tools: Vec<String>,

    /// Maximum concurrent fix branches (1-32)
    #[arg(long)]
    max_parallel_files: Option<u32>,

    /// Fix attempts per file before giving up
    #[arg(long)]
    max_attempts: Option<u32>,

    /// Test validation mode: full, quick, final, or none
    #[arg(long)]
    test_validation: Option<TestValidation>,

    /// Stop dispatching new files after the first failure
    #[arg(long)]
    fail_fast: bool,

    /// Let the agent edit the working tree directly instead of sandboxes
    #[arg(long)]
    no_sandbox: bool,

    /// Exit zero even when some files failed
    #[arg(long)]
    allow_failures: bool,

    /// Output format: text or json
    #[arg(long, default_value = "text")]
    format: OutputFormat,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Repository root to check
    #[arg(default_value = ".")]
    target: PathBuf,

    /// Only run these tools (repeatable; default: all configured tools)
    #[arg(short, long = "tool")]
    tools: Vec<String>,

    /// Output format: text or json
    #[arg(long, default_value = "text")]
    format: OutputFormat,
}

fn main() -> ExitCode {
    stomper::telemetry::init();
    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Fix(args) => run_fix(&args),
        Commands::Check(args) => run_check(&args),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run_fix(args: &FixArgs) -> Result<ExitCode> {
    let file_config = StomperConfig::load(&args.target)?;
    let deps = SessionDeps::from_config(&file_config);

    let mut config = SessionConfig::new(args.target.clone());
    config.enabled_tools = args.tools.clone();
    config.max_parallel_files = args
        .max_parallel_files
        .unwrap_or(file_config.session.max_parallel_files);
    config.max_attempts_per_file = args
        .max_attempts
        .unwrap_or(file_config.session.max_attempts_per_file);
    config.test_validation = args
        .test_validation
        .unwrap_or(file_config.session.test_validation);
    config.continue_on_error = if args.fail_fast {
        false
    } else {
        file_config.session.continue_on_error
    };
    config.use_sandbox = if args.no_sandbox {
        false
    } else {
        file_config.session.use_sandbox
    };

    let result = Session::new(config, deps)
        .run()
        .context("fix session failed")?;

    match args.format {
        OutputFormat::Json => println!("{}", args.format.serialize(&result)?),
        OutputFormat::Text => print_result(&result),
    }

    if result.has_failures() && !args.allow_failures {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn run_check(args: &CheckArgs) -> Result<ExitCode> {
    let file_config = StomperConfig::load(&args.target)?;
    let deps = SessionDeps::from_config(&file_config);

    let tools: Vec<_> = if args.tools.is_empty() {
        deps.tools.clone()
    } else {
        deps.tools
            .iter()
            .filter(|t| args.tools.iter().any(|n| n == t.name()))
            .cloned()
            .collect()
    };

    let collected = collect_work_items(&args.target, &tools, 1);

    match args.format {
        OutputFormat::Json => println!("{}", args.format.serialize(&collected.items)?),
        OutputFormat::Text => {
            for item in &collected.items {
                for finding in &item.findings {
                    println!("{finding}");
                }
            }
            println!(
                "{} finding(s) in {} file(s)",
                collected.total_findings,
                collected.items.len()
            );
        }
    }

    for warning in &collected.warnings {
        eprintln!("warning: {warning}");
    }

    if collected.total_findings > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_result(result: &SessionResult) {
    println!(
        "session {} (base {})",
        result.session_id, result.base_revision
    );
    println!(
        "{} file(s) with findings, {} fixed, {} failed, {} error(s) resolved in {}ms",
        result.files_with_errors,
        result.successful_fixes.len(),
        result.failed_fixes.len(),
        result.total_errors_fixed,
        result.wall_time_ms
    );

    for fix in &result.successful_fixes {
        let commit = fix.revision.as_ref().map_or_else(
            || "no commit needed".to_owned(),
            |rev| format!("commit {}", &rev.as_str()[..8]),
        );
        println!(
            "  fixed  {} ({} error(s), {} attempt(s), {commit})",
            fix.file_path.display(),
            fix.errors_fixed,
            fix.attempts_used
        );
    }
    for failure in &result.failed_fixes {
        println!(
            "  failed {} ({}, {} attempt(s))",
            failure.file_path.display(),
            failure.reason,
            failure.attempts_used
        );
    }
    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
}
