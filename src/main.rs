/// Version injected at compile time via GCREF_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("GCREF_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gcref::config::{self, Properties};
use gcref::resource::{Fallthrough, Params, Registry, Resource};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Parameters that the `--project` flag fills
const PROJECT_PARAMS: &[&str] = &["project", "projectId", "projectsId"];

/// Resource names for Google Cloud
#[derive(Parser, Debug)]
#[command(name = "gcref", version, about, long_about = None)]
struct Args {
    /// GCP project to use, overriding the core/project property
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Named gcloud configuration to read properties from
    #[arg(short, long, global = true)]
    configuration: Option<String>,

    /// Extra collection definitions (YAML or JSON)
    #[arg(long, global = true)]
    definitions: Option<PathBuf>,

    /// Use a non-default API version, e.g. `compute=beta`
    #[arg(long = "api-version", value_parser = parse_key_value, global = true)]
    api_versions: Vec<(String, String)>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a URL, relative name or ID into a resource reference
    Parse {
        /// Resource string; may be empty when every parameter resolves
        resource: String,

        /// Collection to parse as, e.g. `compute.instances`; inferred from
        /// URLs, `gs://` paths and `api.collection::` prefixes when omitted
        #[arg(long)]
        collection: Option<String>,

        /// Explicit parameter value, e.g. `zone=us-central1-a`
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        #[arg(short, long, value_enum, default_value = "self-link")]
        output: Output,
    },
    /// Build a resource reference from parameters alone
    Create {
        #[arg(long)]
        collection: String,

        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        #[arg(short, long, value_enum, default_value = "self-link")]
        output: Output,
    },
    /// List registered collections
    Collections {
        /// Only show collections of this API
        #[arg(long)]
        api: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Output {
    RelativeName,
    SelfLink,
    Json,
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

fn parse_key_value(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got [{}]", s)),
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return None;
        }
    };

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

    tracing::info!("gcref {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gcref").join("gcref.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".gcref").join("gcref.log");
    }
    PathBuf::from("gcref.log")
}

fn build_registry(args: &Args) -> Result<Registry> {
    let properties = Properties::load(args.configuration.as_deref())
        .context("Failed to load gcloud configuration")?;

    let mut registry =
        Registry::builtin(properties).context("Failed to load built-in collections")?;

    if let Some(path) = &args.definitions {
        registry
            .load_definitions_file(path)
            .with_context(|| format!("Failed to load definitions from {:?}", path))?;
    }

    for (api, version) in &args.api_versions {
        registry = registry
            .clone_with_api_version(api, version)
            .with_context(|| format!("Unknown API version [{}/{}]", api, version))?;
    }

    if let Some(project) = &args.project {
        apply_project_flag(&mut registry, project);
    }

    Ok(registry)
}

/// `--project` wins over every registered chain, even when it looks invalid
fn apply_project_flag(registry: &mut Registry, project: &str) {
    if !config::is_valid_project_id(project) {
        tracing::warn!("Project ID [{}] does not look valid, using it anyway", project);
    }
    for param in PROJECT_PARAMS {
        registry.prepend_fallthrough(param, Fallthrough::arg("--project", Some(project)));
    }
}

fn print_resource(resource: &Resource, output: Output) -> Result<()> {
    match output {
        Output::RelativeName => println!("{}", resource.relative_name()),
        Output::SelfLink => println!("{}", resource.self_link()),
        Output::Json => println!(
            "{}",
            serde_json::to_string_pretty(resource).context("Failed to serialize resource")?
        ),
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    let registry = build_registry(&args)?;

    match args.command {
        Command::Parse {
            resource,
            collection,
            params,
            output,
        } => {
            let params: Params = params.into_iter().collect();
            let parsed = match &collection {
                Some(collection) => registry
                    .parse(&resource, collection, &params)
                    .with_context(|| format!("Failed to parse [{}] as {}", resource, collection))?,
                None => registry
                    .parse_any(&resource, &params)
                    .with_context(|| format!("Failed to parse [{}]", resource))?,
            };
            print_resource(&parsed, output)?;
        }
        Command::Create {
            collection,
            params,
            output,
        } => {
            let params: Params = params.into_iter().collect();
            let created = registry
                .create(&collection, &params)
                .with_context(|| format!("Failed to create a {} reference", collection))?;
            print_resource(&created, output)?;
        }
        Command::Collections { api } => {
            for info in registry
                .collections()
                .filter(|c| api.as_deref().map_or(true, |a| c.api_name() == a))
            {
                println!(
                    "{:<45} {:<10} {}",
                    info.full_name(),
                    info.api_version(),
                    info.canonical()
                );
            }
        }
    }

    Ok(())
}
