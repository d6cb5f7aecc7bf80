//! pb - planbuilder command line entry point

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, error, info, warn};

use planbuilder::cli::Cli;
use planbuilder::config::Config;
use planbuilder::llm::{ModelInvoker, RetryPolicy, create_client};
use planbuilder::pipeline::{Pipeline, PipelineConfig, RunOutcome, RunReport, SectionOutcome};
use planbuilder::prompts::PromptLoader;
use planbuilder::source::DesignDocument;

/// Exit status when `--strict` is set and some sections failed
const EXIT_PARTIAL: u8 = 3;

fn setup_logging(level_str: Option<&str>) -> Result<PathBuf> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("planbuilder")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = match level_str.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_path = log_dir.join("planbuilder.log");
    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(log_path)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let strict = cli.strict;

    match run(cli).await {
        Ok(report) => summarize(&report, strict),
        Err(e) => {
            error!(error = ?e, "planbuilder failed");
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunReport> {
    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    cli.apply(&mut config);

    // Priority: CLI --log-level > config file > INFO
    let log_path = setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;
    debug!(?config, "run: config loaded");

    let doc = DesignDocument::load(&cli.input)?;
    info!(path = ?doc.path(), chars = doc.text().len(), "Loaded design document");

    let resolved = config.llm.resolve().context("Failed to resolve LLM configuration")?;
    let client = create_client(&resolved).context("Failed to create LLM client")?;
    let invoker = Arc::new(ModelInvoker::new(
        client,
        config.llm.protocol,
        RetryPolicy::from_config(&config.llm),
    ));

    let prompts = Arc::new(match &config.plan.prompts_dir {
        Some(dir) => PromptLoader::new(dir),
        None => PromptLoader::embedded_only(),
    });

    let pipeline = Pipeline::new(invoker, prompts, PipelineConfig::from_config(&config));
    println!(
        "{} {} -> {} (log: {})",
        "Planning".cyan().bold(),
        doc.path().display(),
        pipeline.materializer().root().display(),
        log_path.display()
    );

    Ok(pipeline.run(&doc).await?)
}

fn summarize(report: &RunReport, strict: bool) -> ExitCode {
    println!(
        "{} {} ({}, {} section(s))",
        "Overview:".green().bold(),
        report.overview_path.display(),
        report.plan.scope_classification,
        report.sections.len()
    );

    for outcome in &report.sections {
        match outcome {
            SectionOutcome::Written { record, path } => {
                println!("  {} {} -> {}", "ok".green(), record.label(), path.display());
            }
            SectionOutcome::Failed { record, error } => {
                println!("  {} {}: {}", "failed".red(), record.label(), error);
            }
        }
    }

    match report.outcome() {
        RunOutcome::Complete => {
            println!("{}", "All section plans written.".green());
            ExitCode::SUCCESS
        }
        RunOutcome::Partial => {
            let failed = report.failed().count();
            warn!(failed, total = report.sections.len(), "Run finished with failed sections");
            println!(
                "{} {} of {} section plan(s) failed; rerun to regenerate them.",
                "warning:".yellow().bold(),
                failed,
                report.sections.len()
            );
            if strict { ExitCode::from(EXIT_PARTIAL) } else { ExitCode::SUCCESS }
        }
    }
}
