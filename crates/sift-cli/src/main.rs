//! `sift` - run a filter definition against a request.
//!
//! ```text
//! sift apply -c filter.yaml -r request.json --rows rows.json
//! sift apply -c filter.yaml -p 'filter[status]=active' -p sort=-age -H X-Filter-Mode=tree
//! sift check -c filter.yaml
//! ```
//!
//! Output is JSON on stdout: the engine used, the predicates the in-memory
//! sink received and, with `--rows`, the rows they match. Logs go to stderr.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde_json::{json, Value};
use sift::memory::MemorySink;
use sift::{Filter, FilterConfig, FilterRequest, FilterRunContext};

#[derive(Parser)]
#[command(name = "sift", version, about = "Resolve request filters into query predicates")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a filter to a request and print the resulting predicates
    Apply(ApplyArgs),
    /// Validate a filter configuration
    Check {
        /// Filter configuration (YAML, or JSON with a .json extension)
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Args)]
struct ApplyArgs {
    /// Filter configuration (YAML, or JSON with a .json extension)
    #[arg(short, long)]
    config: PathBuf,

    /// Request parameters as a JSON object
    #[arg(short, long, conflicts_with = "param")]
    request: Option<PathBuf>,

    /// Query-string parameter as `key=value` (repeatable)
    #[arg(short, long, value_parser = parse_pair)]
    param: Vec<(String, String)>,

    /// Request header as `Name=value` (repeatable)
    #[arg(short = 'H', long, value_parser = parse_pair)]
    header: Vec<(String, String)>,

    /// Override the configured default engine
    #[arg(short, long)]
    engine: Option<String>,

    /// JSON array of rows to evaluate the predicates against
    #[arg(long)]
    rows: Option<PathBuf>,

    /// Include run events in the output
    #[arg(long)]
    events: bool,
}

fn parse_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected `key=value`, got `{raw}`")),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

fn load_config(path: &Path) -> Result<FilterConfig> {
    let text = read(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let config = if is_json {
        FilterConfig::from_json_str(&text)
    } else {
        FilterConfig::from_yaml_str(&text)
    };
    config.with_context(|| format!("invalid configuration in {}", path.display()))
}

fn build_request(args: &ApplyArgs) -> Result<FilterRequest> {
    let mut request = match &args.request {
        Some(path) => FilterRequest::from_json_str(&read(path)?)
            .with_context(|| format!("invalid request in {}", path.display()))?,
        None => FilterRequest::from_query_pairs(args.param.iter().map(|(k, v)| (k, v.clone()))),
    };
    for (name, value) in &args.header {
        request = request.with_header(name, value);
    }
    Ok(request)
}

fn load_rows(path: &Path) -> Result<Vec<Value>> {
    let rows: Value = serde_json::from_str(&read(path)?)
        .with_context(|| format!("invalid rows in {}", path.display()))?;
    match rows {
        Value::Array(rows) => Ok(rows),
        _ => bail!("rows in {} must be a JSON array", path.display()),
    }
}

fn apply(args: &ApplyArgs) -> Result<Value> {
    let config = load_config(&args.config)?;
    let mut builder = Filter::from_config(&config)?;
    if let Some(engine) = &args.engine {
        builder = builder.engine(engine);
    }
    let filter = builder.build()?;
    let request = build_request(args)?;

    let events = Rc::new(RefCell::new(Vec::new()));
    let mut context = FilterRunContext::new();
    if args.events {
        let log = Rc::clone(&events);
        context = context.on_event(move |event| log.borrow_mut().push(format!("{event:?}")));
    }

    let mut sink = MemorySink::new();
    let report = filter.apply_in(&request, &mut sink, &mut context)?;
    tracing::debug!(engine = %report.engine, applied = report.applied, "request resolved");

    let mut output = json!({
        "engine": report.engine,
        "applied": report.applied,
        "predicates": sink.predicates(),
        "orders": sink.orders(),
    });
    if args.events {
        output["events"] = json!(*events.borrow());
    }
    if let Some(path) = &args.rows {
        let rows = load_rows(path)?;
        let matched = sink.filter(&rows);
        output["matched"] = json!(matched.len());
        output["rows"] = json!(matched);
    }
    Ok(output)
}

fn check(path: &Path) -> Result<Value> {
    let config = load_config(path)?;
    let filter = Filter::from_config(&config)?.build()?;
    Ok(json!({
        "default_engine": filter.default_engine(),
        "filter_key": config.filter_key,
        "sort_key": config.sort_key,
        "engines": config.engines.keys().collect::<Vec<_>>(),
        "header": config.header,
        "sorting": config.sorting.is_some(),
    }))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = match &cli.command {
        Command::Apply(args) => apply(args)?,
        Command::Check { config } => check(config)?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
