// TfScope - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. Configuration loading (before logging, so it can set the level)
// 3. Logging initialisation (debug mode support)
// 4. Dispatch to the requested command

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tfscope::app::ingest::{self, IngestConfig};
use tfscope::app::store::LogStore;
use tfscope::core::correlate::{correlate, ChainKey};
use tfscope::core::export;
use tfscope::core::filter::{self, SearchFilters};
use tfscope::core::model::{Level, Section};
use tfscope::core::parser::ParseConfig;
use tfscope::core::plugin::PluginRegistry;
use tfscope::platform::config::{self, AppConfig, PlatformPaths};
use tfscope::util::error::{ExportError, FilterError, PluginError, TfScopeError};
use tfscope::util::{constants, logging};

/// TfScope - Terraform log analyser.
///
/// Parses Terraform debug logs (plain text or JSON) into entries, tracks
/// plan/apply phases, correlates provider requests and searches the result.
#[derive(Parser, Debug)]
#[command(name = "tfscope", version, about)]
struct Cli {
    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    /// Use this config file instead of the platform default.
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parsing statistics for one or more log files.
    Stats {
        files: Vec<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Search entries of a log file.
    Search {
        file: PathBuf,
        #[command(flatten)]
        filters: FilterArgs,
        /// Zero-based page index.
        #[arg(long, default_value_t = 0)]
        page: usize,
        /// Entries per page (default from config).
        #[arg(long)]
        size: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Correlate entries into chains.
    Chains {
        file: PathBuf,
        /// Grouping key (default from config).
        #[arg(long, value_parser = parse_chain_key)]
        mode: Option<ChainKey>,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long)]
        json: bool,
    },
    /// Plan/apply/other periods of a log file.
    Phases {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Export matching entries or chains to a file.
    Export {
        file: PathBuf,
        /// Destination file.
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        /// Grouping key for chain export (default from config).
        #[arg(long, value_parser = parse_chain_key)]
        mode: Option<ChainKey>,
        #[command(flatten)]
        filters: FilterArgs,
    },
    /// List or run analyzer plugins.
    Plugins {
        #[command(subcommand)]
        action: PluginAction,
    },
}

#[derive(Subcommand, Debug)]
enum PluginAction {
    /// Describe the registered analyzers.
    List,
    /// Run an analyzer over a log file.
    Run {
        name: String,
        file: PathBuf,
        /// Analyzer parameter as key=value (repeatable).
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ExportFormat {
    Csv,
    Json,
    Chains,
}

/// Filter options shared by search, chains and export.
#[derive(Args, Debug)]
struct FilterArgs {
    /// Case-insensitive text in message, raw text or JSON body.
    #[arg(short, long)]
    text: Option<String>,
    /// Regular expression over the same targets as --text.
    #[arg(long)]
    regex: Option<String>,
    #[arg(short, long, value_parser = parse_level)]
    level: Option<Level>,
    #[arg(long, value_parser = parse_section)]
    section: Option<Section>,
    #[arg(long = "resource-type")]
    resource_type: Option<String>,
    #[arg(long = "req-id")]
    req_id: Option<String>,
    /// Inclusive lower time bound.
    #[arg(long)]
    from: Option<String>,
    /// Inclusive upper time bound.
    #[arg(long)]
    to: Option<String>,
    /// Only entries flagged with a parsing error.
    #[arg(long = "parse-errors")]
    parse_errors: bool,
}

impl FilterArgs {
    fn to_filters(&self) -> Result<SearchFilters, FilterError> {
        let mut filters = SearchFilters {
            free_text: self.text.clone().unwrap_or_default(),
            tf_resource_type: self.resource_type.clone(),
            section: self.section,
            tf_req_id: self.req_id.clone(),
            level: self.level,
            timestamp_from: self.from.as_deref().map(filter::parse_bound).transpose()?,
            timestamp_to: self.to.as_deref().map(filter::parse_bound).transpose()?,
            has_parsing_error: self.parse_errors.then_some(true),
            ..Default::default()
        };
        if let Some(ref pattern) = self.regex {
            filters.set_regex(pattern)?;
        }
        Ok(filters)
    }
}

fn parse_level(raw: &str) -> Result<Level, String> {
    Level::from_token(raw).ok_or_else(|| format!("unknown level '{raw}'"))
}

fn parse_section(raw: &str) -> Result<Section, String> {
    Section::from_label(raw).ok_or_else(|| format!("unknown section '{raw}'"))
}

fn parse_chain_key(raw: &str) -> Result<ChainKey, String> {
    ChainKey::from_label(raw).ok_or_else(|| format!("unknown mode '{raw}' (request|resource)"))
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))
}

fn main() {
    let cli = Cli::parse();

    let (app_config, config_warnings) = match cli.config {
        Some(ref path) => config::load_config_file(path),
        None => config::load_config(&PlatformPaths::resolve().config_dir),
    };

    logging::init(cli.debug, app_config.log_level.as_deref());
    for warning in &config_warnings {
        tracing::warn!("{}", warning);
    }

    tracing::debug!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "TfScope starting"
    );

    if let Err(e) = run(cli.command, &app_config) {
        tracing::error!(error = %e, "Command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Parse `path` into a fresh store keyed by its display path.
fn load(path: &Path, app_config: &AppConfig) -> Result<(LogStore, String), TfScopeError> {
    let result = ingest::parse_file(path, &ingest_config(app_config))?;
    let store = LogStore::new(app_config.max_page_size);
    let id = path.display().to_string();
    store.ingest_result(&id, result);
    Ok((store, id))
}

fn ingest_config(app_config: &AppConfig) -> IngestConfig {
    IngestConfig {
        parse: ParseConfig {
            max_json_block_lines: app_config.max_json_block_lines,
            ..ParseConfig::default()
        },
        large_file_threshold: app_config.large_file_threshold,
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), TfScopeError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| ExportError::Json {
        path: PathBuf::from("<stdout>"),
        source: e,
    })?;
    println!("{text}");
    Ok(())
}

fn run(command: Command, app_config: &AppConfig) -> Result<(), TfScopeError> {
    match command {
        Command::Stats { files, json } => run_stats(&files, json, app_config),
        Command::Search {
            file,
            filters,
            page,
            size,
            json,
        } => {
            let (store, id) = load(&file, app_config)?;
            let mut search = filters.to_filters()?;
            search.page = page;
            search.size = size.unwrap_or(app_config.default_page_size);
            let results = store.search(&id, &search)?;
            if json {
                return print_json(&results);
            }
            for entry in &results.entries {
                let ts = entry
                    .timestamp
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
                    .unwrap_or_else(|| "-".to_string());
                let level = entry.level.map_or("-", |l| l.label());
                let first_line = entry.message.lines().next().unwrap_or("");
                println!(
                    "{:>7} {ts:<23} {level:<5} {:<5} {first_line}",
                    entry.line_number,
                    entry.section.label()
                );
            }
            println!(
                "-- page {} of {} ({} matching entries)",
                results.page + 1,
                results.total_pages.max(1),
                results.total_count
            );
            Ok(())
        }
        Command::Chains {
            file,
            mode,
            filters,
            json,
        } => {
            let (store, id) = load(&file, app_config)?;
            let mode = mode.unwrap_or(app_config.default_chain_mode);
            let report = store.chains(&id, mode, &filters.to_filters()?)?;
            if json {
                return print_json(&report);
            }
            for chain in &report.chains {
                println!(
                    "{:<7} {:>9}ms {:>5} entries  {}",
                    chain.status.label(),
                    chain.duration_ms,
                    chain.entry_count,
                    chain.key
                );
            }
            let o = &report.overview;
            println!(
                "-- {} chains ({} error, {} warning), avg {:.0}ms, max {}ms",
                o.total_chains, o.error_chains, o.warning_chains, o.avg_duration_ms, o.max_duration_ms
            );
            Ok(())
        }
        Command::Phases { file, json } => {
            let (store, id) = load(&file, app_config)?;
            let phases = store.phases(&id)?;
            if json {
                return print_json(&phases);
            }
            let fmt = |t: Option<chrono::DateTime<chrono::Utc>>| {
                t.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".to_string())
            };
            for period in &phases {
                println!(
                    "{:<5} {} -> {} ({} entries)",
                    period.section.label(),
                    fmt(period.start_time),
                    fmt(period.end_time),
                    period.entry_count
                );
            }
            Ok(())
        }
        Command::Export {
            file,
            output,
            format,
            mode,
            filters,
        } => run_export(&file, &output, format, mode, &filters, app_config),
        Command::Plugins { action } => run_plugins(action, app_config),
    }
}

fn run_stats(files: &[PathBuf], json: bool, app_config: &AppConfig) -> Result<(), TfScopeError> {
    if files.is_empty() {
        eprintln!("No log files given.");
        return Ok(());
    }

    let results = ingest::parse_files(files, &ingest_config(app_config));
    let mut failed = 0;
    let mut report = Vec::new();
    for (path, result) in results {
        match result {
            Ok(parsed) => report.push((path.display().to_string(), parsed)),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {e}", path.display());
            }
        }
    }

    if json {
        let stats: BTreeMap<&str, _> = report
            .iter()
            .map(|(path, parsed)| (path.as_str(), &parsed.stats))
            .collect();
        print_json(&stats)?;
    } else {
        for (path, parsed) in &report {
            let s = &parsed.stats;
            println!("{path}");
            println!(
                "  entries: {} from {} lines",
                s.total_entries, parsed.lines_processed
            );
            println!(
                "  sections: plan={} apply={} other={}",
                s.section_count(Section::Plan),
                s.section_count(Section::Apply),
                s.section_count(Section::Other)
            );
            println!(
                "  errors: {}  warnings: {}  parse errors: {}  with JSON: {}",
                s.error_count, s.warn_count, s.parse_error_count, s.json_entry_count
            );
            println!(
                "  resource types: {}  request ids: {}  phases: {}",
                filter::distinct_resource_types(&parsed.entries).len(),
                filter::distinct_request_ids(&parsed.entries).len(),
                parsed.phases.len()
            );
        }
    }

    if failed > 0 && report.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_export(
    file: &Path,
    output: &Path,
    format: ExportFormat,
    mode: Option<ChainKey>,
    filters: &FilterArgs,
    app_config: &AppConfig,
) -> Result<(), TfScopeError> {
    let result = ingest::parse_file(file, &ingest_config(app_config))?;
    let search = filters.to_filters()?;

    let out = std::fs::File::create(output).map_err(|e| ExportError::Io {
        path: output.to_path_buf(),
        source: e,
    })?;
    let writer = std::io::BufWriter::new(out);

    let matched = filter::apply_filters(&result.entries, &search);
    let selected: Vec<_> = matched.iter().map(|&idx| &result.entries[idx]).collect();

    let written = match format {
        ExportFormat::Csv => export::export_csv(selected.iter().copied(), writer, output)?,
        ExportFormat::Json => export::export_json(&selected, writer, output)?,
        ExportFormat::Chains => {
            let mode = mode.unwrap_or(app_config.default_chain_mode);
            let summaries: Vec<_> = correlate(selected.iter().copied(), mode)
                .iter()
                .map(|c| c.summary())
                .collect();
            export::export_chains_json(&summaries, writer, output)?
        }
    };

    tracing::info!(path = %output.display(), records = written, "Export complete");
    println!("Wrote {written} records to {}", output.display());
    Ok(())
}

fn run_plugins(action: PluginAction, app_config: &AppConfig) -> Result<(), TfScopeError> {
    let registry = PluginRegistry::with_builtins();
    match action {
        PluginAction::List => {
            for info in registry.describe_all() {
                println!("{} v{} - {}", info.name, info.version, info.description);
                if !info.supported_parameters.is_empty() {
                    println!("  parameters: {}", info.supported_parameters.join(", "));
                }
            }
            Ok(())
        }
        PluginAction::Run { name, file, params } => {
            if !registry.names().contains(&name) {
                return Err(PluginError::NotFound { name }.into());
            }
            let (store, id) = load(&file, app_config)?;
            let parameters: HashMap<String, String> = params.into_iter().collect();
            let result = store.analyze(&id, &registry, &name, &parameters)?;
            print_json(&result)
        }
    }
}
