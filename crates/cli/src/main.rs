//! `ctse`: command-line front end for the CTSE retrieval core
//!
//! Every invocation opens the index directory, runs one command and
//! closes it again (persisting any change).

mod commands;
mod format;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process;

use clap::ArgMatches;
use ctse_core::{CtseConfig, CtseError, CtseResult, DocumentId, FusionWeights, RawRecord, SearchOptions, CONFIG_FILE_NAME};
use ctse_engine::Engine;
use ctse_search::record_from_xml_file;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use commands::build_cli;
use format::{
    format_compaction, format_document, format_error, format_ingest, format_reindex, format_search,
    format_stats, OutputMode,
};

const DEFAULT_DATA_DIR: &str = ".ctse";

fn main() {
    let matches = build_cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    match run(&matches, mode) {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output.trim_end());
            }
        }
        Err(e) => {
            eprintln!("{}", format_error(&e, mode));
            process::exit(1);
        }
    }
}

/// Logs go to stderr; stdout carries command output only.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn data_dir(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<String>("data-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// `--config`, else `<data-dir>/ctse.toml`, else defaults; the data
/// directory always comes from the command line when given.
fn load_config(matches: &ArgMatches) -> CtseResult<CtseConfig> {
    let dir = data_dir(matches);
    let explicit = matches.get_one::<String>("config").map(PathBuf::from);
    let path = explicit.or_else(|| Some(dir.join(CONFIG_FILE_NAME)).filter(|p| p.exists()));
    let mut config = match &path {
        Some(p) => {
            debug!(target: "ctse::cli", path = %p.display(), "Loading configuration");
            CtseConfig::from_file(p)?
        }
        None => CtseConfig::default(),
    };
    if matches.get_one::<String>("data-dir").is_some() || config.data_dir.is_none() {
        config.data_dir = Some(dir);
    }
    Ok(config)
}

fn run(matches: &ArgMatches, mode: OutputMode) -> CtseResult<String> {
    let Some((command, sub)) = matches.subcommand() else {
        return Err(CtseError::InvalidConfig("no command given".to_string()));
    };

    if command == "init" {
        let dir = data_dir(matches);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(CONFIG_FILE_NAME);
        CtseConfig::write_default_if_missing(&path)?;
        return Ok(format!("configuration at {}", path.display()));
    }

    let engine = Engine::open(load_config(matches)?)?;
    let output = dispatch(&engine, command, sub, mode);
    let closed = engine.close();
    let output = output?;
    closed?;
    Ok(output)
}

fn dispatch(engine: &Engine, command: &str, sub: &ArgMatches, mode: OutputMode) -> CtseResult<String> {
    match command {
        "ingest" => {
            let mut out = String::new();
            for file in sub.get_many::<String>("files").into_iter().flatten() {
                out.push_str(&ingest_file(engine, Path::new(file), mode)?);
                out.push('\n');
            }
            Ok(out)
        }
        "search" => {
            let query = required(sub, "query")?;
            let options = search_options(engine.config(), sub)?;
            let response = engine.search(query, &options)?;
            Ok(format_search(&response, mode))
        }
        "show" => {
            let id = DocumentId::new(required(sub, "id")?)?;
            match engine.document(&id)? {
                Some(doc) => Ok(format_document(&doc, mode)),
                None => Err(CtseError::InvalidConfig(format!("no document {}", id))),
            }
        }
        "remove" => {
            let id = DocumentId::new(required(sub, "id")?)?;
            let removed = engine.remove_document(&id)?;
            Ok(match mode {
                OutputMode::Json => serde_json::json!({ "id": id, "removed": removed }).to_string(),
                OutputMode::Human if removed => format!("removed {}", id),
                OutputMode::Human => format!("{} not found", id),
            })
        }
        "compact" => Ok(format_compaction(&engine.compact()?, mode)),
        "reindex" => Ok(format_reindex(&engine.reindex_missing()?, mode)),
        "missing" => {
            let missing = engine.missing_vectors()?;
            Ok(match mode {
                OutputMode::Json => serde_json::json!(missing
                    .iter()
                    .map(|(id, m)| serde_json::json!({ "id": id, "reason": m.reason, "attempts": m.attempts }))
                    .collect::<Vec<_>>())
                .to_string(),
                OutputMode::Human => missing
                    .iter()
                    .map(|(id, m)| format!("{} ({} attempts): {}", id, m.attempts, m.reason))
                    .collect::<Vec<_>>()
                    .join("\n"),
            })
        }
        "stats" => Ok(format_stats(&engine.stats()?, mode)),
        other => Err(CtseError::InvalidConfig(format!("unknown command {}", other))),
    }
}

fn required<'a>(sub: &'a ArgMatches, name: &str) -> CtseResult<&'a str> {
    sub.get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| CtseError::InvalidConfig(format!("missing argument {}", name)))
}

fn search_options(config: &CtseConfig, sub: &ArgMatches) -> CtseResult<SearchOptions> {
    let mut options = SearchOptions::from_config(&config.fusion)
        .with_require_both(sub.get_flag("require-both") || config.fusion.require_both)
        .with_rerank(sub.get_flag("rerank"))
        .with_expansion(sub.get_flag("expand"))
        .with_feedback_expansion(sub.get_flag("feedback"))
        .with_translation(sub.get_flag("translate"));
    if let Some(k) = sub.get_one::<usize>("top-k") {
        options = options.with_top_k(*k);
    }
    if let Some(w) = sub.get_one::<f32>("lexical-weight") {
        options = options.with_weights(FusionWeights::new(*w, 1.0 - *w)?);
    }
    if let Some(ms) = sub.get_one::<u64>("timeout-ms") {
        options = options.with_timeout_ms(*ms);
    }
    Ok(options)
}

/// Ingest one input as a single batch: a JSONL file, a ClinicalTrials.gov
/// XML study, or a directory searched recursively for XML studies. Inputs
/// that cannot be parsed are reported alongside the records the normalizer
/// rejected.
fn ingest_file(engine: &Engine, path: &Path, mode: OutputMode) -> CtseResult<String> {
    let (records, parse_errors) = if path.is_dir() {
        let mut files = Vec::new();
        collect_xml_files(path, &mut files)?;
        files.sort();
        read_xml_studies(&files)
    } else if is_xml(path) {
        read_xml_studies(&[path.to_path_buf()])
    } else {
        read_jsonl(path)?
    };
    debug!(target: "ctse::cli", path = %path.display(), records = records.len(), "Read ingest input");
    let report = engine.ingest_batch(&records)?;
    Ok(format_ingest(&path.display().to_string(), &report, &parse_errors, mode))
}

type ParsedInput = (Vec<RawRecord>, Vec<(String, String)>);

fn read_jsonl(path: &Path) -> CtseResult<ParsedInput> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    let mut parse_errors = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match RawRecord::from_json(&line) {
            Ok(record) => records.push(record),
            Err(e) => parse_errors.push((format!("line {}", index + 1), e.to_string())),
        }
    }
    Ok((records, parse_errors))
}

fn read_xml_studies(files: &[PathBuf]) -> ParsedInput {
    let mut records = Vec::new();
    let mut parse_errors = Vec::new();
    for file in files {
        match record_from_xml_file(file) {
            Ok(record) => records.push(record),
            Err(e) => parse_errors.push((file.display().to_string(), e.to_string())),
        }
    }
    (records, parse_errors)
}

fn collect_xml_files(dir: &Path, out: &mut Vec<PathBuf>) -> CtseResult<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_xml_files(&path, out)?;
        } else if is_xml(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn is_xml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xml"))
}
