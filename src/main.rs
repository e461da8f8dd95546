/// Version injected at compile time via GDCL_VERSION env var (set by CI/CD),
/// or the crate version for local builds.
pub const VERSION: &str = match option_env!("GDCL_VERSION") {
    Some(v) => v,
    None => env!("CARGO_PKG_VERSION"),
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::future::join_all;
use gdcl::config::Config;
use gdcl::gcp::client::GcpClient;
use gdcl::gcp::http::format_gcp_error;
use gdcl::manifest::{fill_scope, Manifest};
use gdcl::reconcile::actuate::describe;
use gdcl::resource::{extract_json_value, fetch_all, get_all_resource_kinds, get_resource, Resource};
use gdcl::{ApplyOption, DclError, LifecycleParam, Reconciler};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Declarative resource client for Google Cloud
#[derive(Parser, Debug)]
#[command(name = "gdcl", version = VERSION, about, long_about = None)]
struct Args {
    /// GCP project used when a resource does not name one
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    log_stderr: bool,

    /// Override the API base path of every resource kind
    #[arg(long, global = true)]
    base_path: Option<String>,

    /// Timeout for one apply or delete, in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the resource kinds gdcl knows about
    Kinds,
    /// Show or change saved defaults
    Config {
        /// Default region for regional resources
        #[arg(long)]
        region: Option<String>,
        /// Default zone for zonal resources
        #[arg(long)]
        zone: Option<String>,
    },
    /// Show what apply would do
    Plan {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Converge every resource in a manifest, in file order
    Apply {
        #[arg(short, long)]
        file: PathBuf,
        /// Fail instead of creating missing resources
        #[arg(long)]
        block_creation: bool,
        /// Fail if a resource already exists
        #[arg(long)]
        block_acquire: bool,
        /// Fail instead of updating resources in place
        #[arg(long)]
        block_modification: bool,
        /// Fail instead of deleting (or recreating) resources
        #[arg(long)]
        block_destruction: bool,
    },
    /// Print the live state of every resource in a manifest
    Get {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Delete every resource in a manifest, in reverse file order
    Delete {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// List resources of one kind
    List {
        kind: String,
        /// Scope parameter, e.g. --param region=us-central1
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// Page size; all pages are fetched
        #[arg(long)]
        max_results: Option<u32>,
        /// Print these dot-path fields as tab-separated columns instead of JSON
        #[arg(long = "field", value_delimiter = ',')]
        fields: Vec<String>,
    },
    /// Delete all resources of one kind in a scope
    DeleteAll {
        kind: String,
        #[arg(long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,
        /// Only delete resources whose name starts with this prefix
        #[arg(long)]
        name_prefix: Option<String>,
    },
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

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got {:?}", s)),
    }
}

fn setup_logging(level: LogLevel, to_stderr: bool) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(tracing_level.as_str()));

    let (non_blocking, guard) = if to_stderr {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        let log_path = get_log_path();
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("opening log file {:?}", log_path))?;
        tracing_appender::non_blocking(file)
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("gdcl {} started with log level: {:?}", VERSION, level);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("gdcl").join("gdcl.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".gdcl").join("gdcl.log");
    }
    PathBuf::from("gdcl.log")
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn describe_error(resource: &Resource, error: &DclError) -> anyhow::Error {
    match error {
        DclError::DiffAfterApply { diffs, .. } => anyhow::anyhow!(
            "{}: resource did not converge:\n  {}",
            resource.identity(),
            diffs.join("\n  ")
        ),
        DclError::Multiple(errors) => anyhow::anyhow!(
            "{}: {} deletes failed:\n  {}",
            resource.kind,
            errors.len(),
            errors.join("\n  ")
        ),
        DclError::ApplyInfeasible(message) | DclError::Validation(message) => {
            anyhow::anyhow!("{}: {}", resource.identity(), message)
        },
        other => anyhow::anyhow!("{}: {}", resource.identity(), format_gcp_error(other)),
    }
}

/// Load a manifest and fill scope parameters from flags, config and gcloud
fn load_manifest(path: &Path, config: &Config, project: Option<&str>) -> Result<Manifest> {
    let mut manifest = Manifest::load(path)?;
    let project = config.effective_project(project);
    let region = config.effective_region();
    let zone = config.effective_zone();
    manifest.fill_scope(project.as_deref(), region.as_deref(), zone.as_deref());
    Ok(manifest)
}

/// Resource carrying the scope parameters of a list / delete-all
fn scope_resource(kind: &str, params: &[(String, String)], config: &Config, project: Option<&str>) -> Result<Resource> {
    if get_resource(kind).is_none() {
        bail!("unknown resource kind {:?}; run `gdcl kinds`", kind);
    }
    let mut scope = Resource::new(kind);
    for (key, value) in params {
        scope.set(key, value.as_str());
    }
    let project = config.effective_project(project);
    let region = config.effective_region();
    let zone = config.effective_zone();
    fill_scope(&mut scope, project.as_deref(), region.as_deref(), zone.as_deref());
    Ok(scope)
}

fn lifecycle_options(creation: bool, acquire: bool, modification: bool, destruction: bool) -> Vec<ApplyOption> {
    [
        (creation, LifecycleParam::BlockCreation),
        (acquire, LifecycleParam::BlockAcquire),
        (modification, LifecycleParam::BlockModification),
        (destruction, LifecycleParam::BlockDestruction),
    ]
    .into_iter()
    .filter(|(set, _)| *set)
    .map(|(_, p)| ApplyOption::Lifecycle(p))
    .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level, args.log_stderr)?;

    if let Command::Kinds = args.command {
        let kinds: Vec<Value> = get_all_resource_kinds()
            .into_iter()
            .filter_map(get_resource)
            .map(|def| {
                json!({
                    "kind": def.kind,
                    "display_name": def.display_name,
                    "parameters": def.parameters,
                })
            })
            .collect();
        return print_json(&Value::Array(kinds));
    }

    let mut config = Config::load();

    if let Command::Config { region, zone } = &args.command {
        let changed = args.project.is_some()
            || region.is_some()
            || zone.is_some()
            || args.base_path.is_some()
            || args.timeout.is_some();
        if let Some(project) = &args.project {
            config.project = Some(project.clone());
        }
        if let Some(region) = region {
            config.region = Some(region.clone());
        }
        if let Some(zone) = zone {
            config.zone = Some(zone.clone());
        }
        if let Some(base_path) = &args.base_path {
            config.base_path = Some(base_path.clone());
        }
        if let Some(timeout) = args.timeout {
            config.timeout_secs = Some(timeout);
        }
        if changed {
            config.save().context("saving config")?;
        }
        return print_json(&serde_json::to_value(&config)?);
    }

    let client_config = config.to_client_config(args.base_path.as_deref(), args.timeout);
    let client = GcpClient::new(client_config)
        .await
        .map_err(|e| anyhow::anyhow!(format_gcp_error(&e)))
        .context("initializing GCP client")?;
    let reconciler = Reconciler::new(client);
    let project = args.project.as_deref();

    match args.command {
        Command::Kinds | Command::Config { .. } => Ok(()),
        Command::Plan { file } => {
            let manifest = load_manifest(&file, &config, project)?;
            let mut plans = Vec::new();
            for resource in &manifest.resources {
                let plan = reconciler
                    .plan(resource, &[])
                    .await
                    .map_err(|e| describe_error(resource, &e))?;
                let mut summary = plan.to_json();
                let calls: Vec<String> = plan
                    .operations
                    .iter()
                    .filter_map(|op| describe(reconciler.client(), op, &plan.desired).ok())
                    .map(|(method, url)| format!("{} {}", method, url))
                    .collect();
                summary["requests"] = json!(calls);
                plans.push(summary);
            }
            print_json(&Value::Array(plans))
        },
        Command::Apply {
            file,
            block_creation,
            block_acquire,
            block_modification,
            block_destruction,
        } => {
            let manifest = load_manifest(&file, &config, project)?;
            let opts = lifecycle_options(block_creation, block_acquire, block_modification, block_destruction);
            let mut applied = Vec::new();
            for resource in &manifest.resources {
                let state = reconciler
                    .apply(resource, &opts)
                    .await
                    .map_err(|e| describe_error(resource, &e))?;
                applied.push(serde_json::to_value(&state)?);
            }
            print_json(&Value::Array(applied))
        },
        Command::Get { file } => {
            let manifest = load_manifest(&file, &config, project)?;
            let results = join_all(manifest.resources.iter().map(|r| reconciler.get(r))).await;
            let mut states = Vec::new();
            for (resource, result) in manifest.resources.iter().zip(results) {
                match result {
                    Ok(state) => states.push(serde_json::to_value(&state)?),
                    Err(e) if e.is_not_found() => states.push(Value::Null),
                    Err(e) => return Err(describe_error(resource, &e)),
                }
            }
            print_json(&Value::Array(states))
        },
        Command::Delete { file } => {
            let manifest = load_manifest(&file, &config, project)?;
            for resource in manifest.resources.iter().rev() {
                reconciler
                    .delete(resource)
                    .await
                    .map_err(|e| describe_error(resource, &e))?;
                eprintln!("Deleted {}", resource.identity());
            }
            Ok(())
        },
        Command::List {
            kind,
            params,
            max_results,
            fields,
        } => {
            let scope = scope_resource(&kind, &params, &config, project)?;
            let resources = match max_results {
                None => fetch_all(reconciler.client(), &scope)
                    .await
                    .map_err(|e| describe_error(&scope, &e))?,
                Some(page_size) => {
                    let mut list = reconciler
                        .list_with_max_results(&scope, page_size)
                        .await
                        .map_err(|e| describe_error(&scope, &e))?;
                    let mut all = std::mem::take(&mut list.items);
                    while list.has_next() {
                        list.next(reconciler.client())
                            .await
                            .map_err(|e| describe_error(&scope, &e))?;
                        all.append(&mut list.items);
                    }
                    all
                },
            };

            if fields.is_empty() {
                let items = resources
                    .iter()
                    .map(serde_json::to_value)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                return print_json(&Value::Array(items));
            }
            println!("{}", fields.join("\t"));
            for resource in &resources {
                let item = serde_json::to_value(resource)?;
                let row: Vec<String> = fields.iter().map(|f| extract_json_value(&item, f)).collect();
                println!("{}", row.join("\t"));
            }
            Ok(())
        },
        Command::DeleteAll {
            kind,
            params,
            name_prefix,
        } => {
            let scope = scope_resource(&kind, &params, &config, project)?;
            let prefix = name_prefix.unwrap_or_default();
            reconciler
                .delete_all(&scope, |r| {
                    prefix.is_empty()
                        || r.get_str("name").is_some_and(|name| name.starts_with(&prefix))
                })
                .await
                .map_err(|e| describe_error(&scope, &e))?;
            Ok(())
        },
    }
}
