use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pipeline_compiler::logs::{LogEvent, LogStream};
use pipeline_compiler::parse::{self, Pipeline};
use pipeline_compiler::secrets::StaticSecretResolver;
use pipeline_compiler::service::{InMemoryPipelineStore, WorkflowService};
use pipeline_compiler::simulation::{SimulationConfig, SimulationRunner};
use pipeline_compiler::validate::Diagnostic;
use tracing_subscriber::EnvFilter;

/// Validate, compile and simulate pipeline documents
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every diagnostic as JSON; exits non-zero on errors
    Validate {
        /// Path to the pipeline JSON file
        pipeline: PathBuf,
    },
    /// Generate workflow code
    Compile {
        pipeline: PathBuf,
        /// Write the code here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Secret available to the workflow, as NAME=VALUE
        #[arg(long = "secret", value_parser = parse_secret)]
        secrets: Vec<(String, String)>,
    },
    /// Compile and run the workflow, streaming its output
    Simulate {
        pipeline: PathBuf,
        /// Runner configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long = "secret", value_parser = parse_secret)]
        secrets: Vec<(String, String)>,
    },
}

fn parse_secret(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

fn load(path: &PathBuf) -> Result<Pipeline> {
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(parse::parse(&json)?)
}

fn resolver(secrets: Vec<(String, String)>) -> StaticSecretResolver {
    secrets
        .into_iter()
        .fold(StaticSecretResolver::new(), |r, (name, value)| r.with(name, value))
}

fn print_warnings(warnings: &[Diagnostic]) {
    for warning in warnings {
        eprintln!("{}", warning);
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate { pipeline } => {
            let pipeline = load(&pipeline)?;
            let diagnostics = pipeline_compiler::validate::validate(&pipeline);
            println!("{}", serde_json::to_string_pretty(&diagnostics)?);
            if pipeline_compiler::validate::is_compilable(&diagnostics) {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Compile { pipeline, out, secrets } => {
            let pipeline = load(&pipeline)?;
            let id = pipeline.id.clone();
            let store = InMemoryPipelineStore::new();
            store.insert(pipeline);
            let service =
                WorkflowService::new(store, resolver(secrets), SimulationRunner::default());

            let generated = service.compile(&id)?;
            print_warnings(&generated.warnings);
            match out {
                Some(path) => fs::write(&path, &generated.code)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => print!("{}", generated.code),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Simulate {
            pipeline,
            config,
            secrets,
        } => {
            let config = match config {
                Some(path) => {
                    let json = fs::read_to_string(&path)
                        .with_context(|| format!("reading {}", path.display()))?;
                    SimulationConfig::from_json(&json)
                        .with_context(|| format!("parsing {}", path.display()))?
                }
                None => SimulationConfig::default(),
            };
            let pipeline = load(&pipeline)?;
            let id = pipeline.id.clone();
            let store = InMemoryPipelineStore::new();
            store.insert(pipeline);
            let service =
                WorkflowService::new(store, resolver(secrets), SimulationRunner::new(config));

            let session_id = service.simulate(&id)?;
            let mut subscription = service.subscribe(&session_id)?;
            while let Some(event) = subscription.recv().await {
                match event {
                    LogEvent::Log {
                        stream: LogStream::Stdout,
                        line,
                    } => println!("{}", line),
                    LogEvent::Log { stream, line } => eprintln!("[{:?}] {}", stream, line),
                    LogEvent::Gap { missed } => eprintln!("[gap] {} events dropped", missed),
                    LogEvent::Complete {
                        success,
                        exit_code,
                        reason,
                    } => {
                        eprintln!("[done] reason={:?} exit_code={:?}", reason, exit_code);
                        return Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE });
                    }
                }
            }
            bail!("log stream for session {} ended without completion", session_id)
        }
    }
}
