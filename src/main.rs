use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use inspekt::batch::{self, BatchSummary, Criteria, Query};
use inspekt::config::Config;
use inspekt::context::SharedContext;
use inspekt::filter::parse_literal;
use inspekt::resource::{global, Params};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Inspect a target through versioned resources
#[derive(Parser, Debug)]
#[command(name = "inspekt", version = inspekt::VERSION, about, long_about = None)]
struct Args {
    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Treat this directory as the target's `/`
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Extra directory of resource definition files
    #[arg(long = "resource-path", global = true)]
    resource_paths: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered resources
    List,
    /// Show a resource's descriptor and members
    Describe {
        name: String,
        /// Highest API version to resolve
        #[arg(short = 'V', long)]
        version: Option<u32>,
    },
    /// Instantiate one resource and evaluate members
    Query {
        name: String,
        #[arg(short = 'V', long)]
        version: Option<u32>,
        /// Parameter as key=value
        #[arg(short, long = "param")]
        params: Vec<String>,
        /// Filter criterion for plural resources (`slot=2`, `pid>100`)
        #[arg(short = 'w', long = "where")]
        criteria: Vec<String>,
        /// Member to evaluate (default: all)
        #[arg(short, long = "member")]
        members: Vec<String>,
    },
    /// Run the queries in a YAML or JSON file
    Batch { file: PathBuf },
    /// Remember a resource directory in the config file
    AddPath { dir: PathBuf },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("inspekt {} started with log level: {:?}", inspekt::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("inspekt").join("inspekt.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".inspekt").join("inspekt.log");
    }
    PathBuf::from("inspekt.log")
}

/// Parse `key=value` parameters; values are JSON literals or plain strings
fn parse_params(raw: &[String]) -> Result<Params> {
    let mut params = Params::new();
    for item in raw {
        let Some((key, value)) = item.split_once('=') else {
            bail!("Invalid parameter '{}', expected key=value", item);
        };
        params.insert(key.trim().to_string(), parse_literal(value.trim()));
    }
    Ok(params)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let mut config = Config::load();

    if let Command::AddPath { dir } = &args.command {
        let dir = dir
            .canonicalize()
            .with_context(|| format!("Resource directory {} not found", dir.display()))?;
        if config.add_resource_path(&dir) {
            config.save()?;
            println!("Added {}", dir.display());
        } else {
            println!("{} is already configured", dir.display());
        }
        return Ok(ExitCode::SUCCESS);
    }

    if args.root.is_some() {
        config.root = args.root.clone();
    }
    config.resource_paths.extend(args.resource_paths.iter().cloned());

    global::init(inspekt::build_registry(&config)?);
    let context: SharedContext = Arc::new(config.context());

    let code = match args.command {
        Command::List => {
            let descriptors = global::with_registry(|r| {
                r.descriptors().into_iter().cloned().collect::<Vec<_>>()
            })?;
            print_json(&descriptors)?;
            ExitCode::SUCCESS
        }
        Command::Describe { name, version } => {
            let described = global::with_registry(|r| {
                r.resolve(&name, version).map(|ctor| {
                    json!({
                        "descriptor": ctor.descriptor(),
                        "identifier": ctor.identifier(),
                        "plural": ctor.is_plural(),
                        "members": ctor.members().iter().collect::<Vec<_>>(),
                    })
                })
            })??;
            print_json(&described)?;
            ExitCode::SUCCESS
        }
        Command::Query {
            name,
            version,
            params,
            criteria,
            members,
        } => {
            let query = Query {
                resource: name,
                version,
                params: parse_params(&params)?,
                criteria: Criteria::Parsed(criteria),
                members,
            };
            let report = global::with_registry(|r| batch::run_query(r, &query, &context))?;
            print_json(&report)?;
            match report.status {
                batch::QueryStatus::Errored => ExitCode::FAILURE,
                _ => ExitCode::SUCCESS,
            }
        }
        Command::Batch { file } => {
            let queries = batch::load_queries(&file)?;
            let reports = global::with_registry(|r| batch::run_batch(r, &queries, &context))?;
            print_json(&reports)?;
            if BatchSummary::from_reports(&reports).errored > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Command::AddPath { .. } => ExitCode::SUCCESS,
    };

    global::teardown();
    Ok(code)
}
