//! strand - run the built-in extraction pipeline.
//!
//! Usage:
//!   strand run extract_tmdb            Run a root and everything it needs
//!   strand plan extract_episodes       Show what a run would do
//!   strand status                      List completion records
//!   strand clear extract_tv_ids        Forget a completion record
//!   strand kinds                       List registered task kinds

mod logging;
mod pipeline;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use strand_core::app::{Engine, EngineConfig, FailureMode, RecordState, StoreConfig};
use strand_core::domain::{
    ConfigurationError, EngineError, ErrorKind, NodeStatus, RunReport, StoreError,
    TaskDescriptor, TaskKey,
};

const DEFAULT_STORE_DIR: &str = ".strand/completed";

#[derive(Parser)]
#[command(name = "strand", version, about = "Dependency-driven task runner")]
struct Cli {
    /// Engine configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Completion store directory (overrides the configured store)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Where pipeline stages write their output
    #[arg(long, global = true, default_value = "out")]
    out_dir: PathBuf,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run roots (`kind` or `kind:{json params}`) and their prerequisites
    Run {
        #[arg(required = true)]
        roots: Vec<String>,

        /// Worker pool size
        #[arg(short, long)]
        workers: Option<usize>,

        /// Stop dispatching after the first failure
        #[arg(long)]
        fail_fast: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve roots without executing anything
    Plan {
        #[arg(required = true)]
        roots: Vec<String>,

        #[arg(long)]
        json: bool,
    },
    /// Remove completion records
    Clear {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// List completion records
    Status {
        #[arg(long)]
        json: bool,
    },
    /// List registered task kinds
    Kinds,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            exit_code(classify(&e))
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    logging::init_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Command::Run {
            roots,
            workers,
            fail_fast,
            json,
        } => {
            let mut config = config;
            if let Some(n) = workers {
                config.workers = n;
            }
            if fail_fast {
                config.failure_mode = FailureMode::FailFast;
            }
            let engine = build_engine(config, &cli.out_dir)?;
            let roots = parse_roots(&roots)?;
            let report = engine.run(&roots).await.context("run aborted")?;
            print_report(&report, json)?;
            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                exit_code(ErrorKind::Execution)
            })
        }
        Command::Plan { roots, json } => {
            let engine = build_engine(config, &cli.out_dir)?;
            let roots = parse_roots(&roots)?;
            let plan = engine.plan(&roots).await.context("planning failed")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                for task in &plan.tasks {
                    let marker = if task.status == NodeStatus::Done {
                        "done"
                    } else {
                        "todo"
                    };
                    let prereqs: Vec<&str> =
                        task.prerequisites.iter().map(|k| k.as_str()).collect();
                    if prereqs.is_empty() {
                        println!("[{marker}] {}", task.key);
                    } else {
                        println!("[{marker}] {} <- {}", task.key, prereqs.join(", "));
                    }
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Clear { keys } => {
            let engine = build_engine(config, &cli.out_dir)?;
            for raw in &keys {
                let key = parse_key(raw)?;
                let removed = engine
                    .clear(&key)
                    .await
                    .with_context(|| format!("clearing {key}"))?;
                if removed {
                    println!("cleared {key}");
                } else {
                    println!("no record for {key}");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Status { json } => {
            let engine = build_engine(config, &cli.out_dir)?;
            let entries = engine.status().await.context("reading completion store")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("no completion records");
            } else {
                for e in &entries {
                    let state = match e.state {
                        RecordState::Current => "current",
                        RecordState::Stale => "stale",
                        RecordState::Orphaned => "orphaned",
                    };
                    println!(
                        "{:<32} v{:<8} {:<9} {} ({})",
                        e.key.as_str(),
                        e.version,
                        state,
                        e.completed_at.to_rfc3339(),
                        e.run_id
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Kinds => {
            let engine = build_engine(config, &cli.out_dir)?;
            for kind in engine.registry().registered_kinds() {
                println!("{kind}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// File values first, then flags. Without a config file the CLI keeps its
/// records on disk.
fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig {
            store: StoreConfig::File {
                dir: PathBuf::from(DEFAULT_STORE_DIR),
            },
            ..EngineConfig::default()
        },
    };
    if let Some(dir) = &cli.store_dir {
        config.store = StoreConfig::File { dir: dir.clone() };
    }
    Ok(config)
}

fn build_engine(config: EngineConfig, out_dir: &Path) -> Result<Engine> {
    let builder = Engine::builder()
        .config(config)
        .event_sink(Arc::new(logging::TracingEventSink));
    pipeline::register(builder, out_dir)
        .context("registering pipeline tasks")?
        .expect_kinds(pipeline::KINDS)
        .build()
        .context("building engine")
}

fn parse_roots(raw: &[String]) -> Result<Vec<TaskDescriptor>> {
    raw.iter()
        .map(|r| TaskDescriptor::parse(r).with_context(|| format!("invalid root `{r}`")))
        .collect()
}

/// Accepts either a stored key (`kind` / `kind({..})`) or `kind:{json}`.
fn parse_key(raw: &str) -> Result<TaskKey> {
    if raw.contains('(') {
        return Ok(TaskKey::new(raw));
    }
    let desc = TaskDescriptor::parse(raw).with_context(|| format!("invalid key `{raw}`"))?;
    Ok(desc.key().clone())
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let verdict = if report.is_success() { "succeeded" } else { "failed" };
    println!("run {} {verdict}", report.run_id);
    let executed = report.executed_keys().len();
    println!(
        "  done {} (executed {executed}), failed {}, skipped {}",
        report.counts.done, report.counts.failed, report.counts.skipped
    );
    for f in &report.failed {
        println!("  failed  {}: {}", f.key, f.error);
    }
    for s in &report.skipped {
        println!("  skipped {}: {}", s.key, s.cause);
    }
    Ok(())
}

/// Map an error chain onto the taxonomy used for exit codes.
fn classify(err: &anyhow::Error) -> ErrorKind {
    if let Some(e) = err.downcast_ref::<EngineError>() {
        return e.kind();
    }
    if err.downcast_ref::<StoreError>().is_some() {
        return ErrorKind::Store;
    }
    if err.downcast_ref::<ConfigurationError>().is_some() {
        return ErrorKind::Configuration;
    }
    if let Some(e) = err.downcast_ref::<strand_core::app::BuildError>() {
        return match e {
            strand_core::app::BuildError::Store(_) => ErrorKind::Store,
            _ => ErrorKind::Configuration,
        };
    }
    if err.downcast_ref::<strand_core::app::ConfigError>().is_some() {
        return ErrorKind::Configuration;
    }
    ErrorKind::Internal
}

fn exit_code(kind: ErrorKind) -> ExitCode {
    ExitCode::from(match kind {
        ErrorKind::Execution => 1,
        ErrorKind::Configuration => 2,
        ErrorKind::Store => 3,
        ErrorKind::Internal => 4,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "strand",
            "run",
            "extract_tmdb",
            "--workers",
            "2",
            "--fail-fast",
            "--store-dir",
            "/tmp/marks",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(
            config.store,
            StoreConfig::File {
                dir: PathBuf::from("/tmp/marks")
            }
        );
        match cli.command {
            Command::Run {
                roots,
                workers,
                fail_fast,
                json,
            } => {
                assert_eq!(roots, ["extract_tmdb"]);
                assert_eq!(workers, Some(2));
                assert!(fail_fast);
                assert!(!json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_requires_a_root() {
        assert!(Cli::try_parse_from(["strand", "run"]).is_err());
    }

    #[test]
    fn config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strand.toml");
        std::fs::write(&path, "workers = 7\nfailure_mode = \"fail_fast\"\n").unwrap();
        let cli = Cli::try_parse_from([
            "strand",
            "--config",
            path.to_str().unwrap(),
            "kinds",
        ])
        .unwrap();

        let config = load_config(&cli).unwrap();
        assert_eq!(config.workers, 7);
        assert_eq!(config.failure_mode, FailureMode::FailFast);
        assert_eq!(config.store, StoreConfig::Memory);
    }

    #[test]
    fn keys_accept_both_forms() {
        assert_eq!(parse_key("extract_tv_ids").unwrap().as_str(), "extract_tv_ids");
        let from_params = parse_key(r#"fetch:{"page":1}"#).unwrap();
        assert_eq!(parse_key(from_params.as_str()).unwrap(), from_params);
    }

    #[test]
    fn errors_map_to_exit_kinds() {
        let err = anyhow::Error::new(EngineError::from(StoreError::Unavailable("x".into())))
            .context("run aborted");
        assert_eq!(classify(&err), ErrorKind::Store);

        let err = anyhow::Error::new(ConfigurationError::Invalid("bad".into()));
        assert_eq!(classify(&err), ErrorKind::Configuration);
    }
}
