//! codesmith: generate code and tests from a requirements document.
//!
//!   codesmith run --file requirements.txt
//!   codesmith run --requirements "build a calculator with add and subtract"
//!   echo "..." | codesmith run
//!
//! Requires GEMINI_API_KEY (or ANTHROPIC_API_KEY with --provider anthropic).

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use codesmith::config::{self, PipelineConfig};
use codesmith::llm::Provider;
use codesmith::pipeline::Pipeline;

#[derive(Parser)]
#[command(name = "codesmith", about = "Requirements in, tested Python out")]
struct Args {
    /// Config file (TOML). Defaults to ~/.config/codesmith/config.toml if present
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the plan → code → test → fix pipeline
    Run {
        /// Read requirements from a file
        #[arg(long, short, conflicts_with = "requirements")]
        file: Option<PathBuf>,

        /// Requirements text (otherwise read from stdin)
        #[arg(long, short)]
        requirements: Option<String>,

        /// Directory for generated artifacts
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Test runs in the self-healing loop
        #[arg(long)]
        max_fix_attempts: Option<u32>,

        /// Text-generation backend (gemini, anthropic)
        #[arg(long)]
        provider: Option<Provider>,

        /// API key for the provider
        #[arg(long, env = "CODESMITH_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Print the full run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::load_default()?,
    };
    if args.log_json {
        cfg.log.json = true;
    }
    init_tracing(&cfg.log);

    match args.command {
        Command::Config => {
            print!("{}", toml::to_string_pretty(&cfg).context("failed to render config")?);
            Ok(())
        }
        Command::Run {
            file,
            requirements,
            output_dir,
            max_fix_attempts,
            provider,
            api_key,
            json,
        } => {
            if let Some(dir) = output_dir {
                cfg.output_dir = dir;
            }
            if let Some(n) = max_fix_attempts {
                cfg.max_fix_attempts = n;
            }
            if let Some(p) = provider {
                cfg.provider = p;
            }
            if api_key.is_some() {
                cfg.api_key = api_key;
            }

            let text = read_requirements(file, requirements)?;
            if text.trim().is_empty() {
                eprintln!("ERROR: No requirements provided.");
                eprintln!("Pass --file, --requirements, or pipe the requirements on stdin.");
                std::process::exit(2);
            }

            run(cfg, &text, json).await
        }
    }
}

fn init_tracing(log: &config::LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log.directive().into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_requirements(file: Option<PathBuf>, inline: Option<String>) -> Result<String> {
    if let Some(path) = file {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()));
    }
    if let Some(text) = inline {
        return Ok(text);
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read requirements from stdin")?;
    Ok(buf)
}

/// Startup diagnostics. Never logs the key itself.
fn log_environment(cfg: &PipelineConfig) {
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "?".into());
    let key = cfg.resolve_api_key();
    let key_hint = key.as_deref().map(|k| {
        let tail: String = k.chars().skip(k.chars().count().saturating_sub(4)).collect();
        format!("present (...{tail})")
    });
    tracing::info!(
        cwd = %cwd,
        output_dir = %cfg.output_dir.display(),
        provider = %cfg.provider,
        planner = %cfg.models.planner,
        coder = %cfg.models.coder,
        tester = %cfg.models.tester,
        api_key = %key_hint.as_deref().unwrap_or("not set"),
        "starting codesmith"
    );
}

async fn run(cfg: PipelineConfig, requirements: &str, json: bool) -> Result<()> {
    log_environment(&cfg);
    let pipeline = Pipeline::from_config(cfg).context("Failed to initialize model backend")?;

    let report = match pipeline.run(requirements).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "pipeline failed");
            eprintln!("ERROR: Pipeline failed - {e}");
            std::process::exit(1);
        }
    };

    for warning in &report.warnings {
        tracing::warn!("{warning}");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("=== {} ===\n{}\n", report.app_file, report.code);
    println!("=== {} ===\n{}\n", report.test_file, report.tests);
    println!("=== Model usage ===\n{}\n", serde_json::to_string_pretty(&report.usage)?);
    println!("{}", report.instructions());
    Ok(())
}
