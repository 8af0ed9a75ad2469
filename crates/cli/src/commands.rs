//! Clap command tree definition.

use clap::{Arg, ArgAction, Command};

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("ctse")
        .about("Hybrid lexical + semantic search over clinical-trial records")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .help("Index directory (default: .ctse)")
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("Configuration file (default: <data-dir>/ctse.toml if present)")
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Debug logging (RUST_LOG takes precedence)")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(Command::new("init").about("Write a default ctse.toml into the data directory"))
        .subcommand(build_ingest())
        .subcommand(build_search())
        .subcommand(
            Command::new("show")
                .about("Print a stored document")
                .arg(Arg::new("id").required(true).help("Document id")),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove a document from both indexes")
                .arg(Arg::new("id").required(true).help("Document id")),
        )
        .subcommand(Command::new("compact").about("Rewrite segments, dropping removed entries"))
        .subcommand(Command::new("reindex").about("Retry embedding for lexical-only documents"))
        .subcommand(Command::new("missing").about("List documents without a vector"))
        .subcommand(Command::new("stats").about("Index counters"))
}

fn build_ingest() -> Command {
    Command::new("ingest")
        .about("Ingest trial records: JSONL files (one JSON object per line), ClinicalTrials.gov XML studies, or directories of XML studies")
        .arg(
            Arg::new("files")
                .required(true)
                .num_args(1..)
                .help("JSONL files, .xml studies or directories"),
        )
}

fn build_search() -> Command {
    Command::new("search")
        .about("Hybrid search")
        .arg(Arg::new("query").required(true).help("Free-text query"))
        .arg(
            Arg::new("top-k")
                .short('k')
                .long("top-k")
                .value_parser(clap::value_parser!(usize))
                .help("Result count limit"),
        )
        .arg(
            Arg::new("lexical-weight")
                .long("lexical-weight")
                .value_parser(clap::value_parser!(f32))
                .help("w_lex; w_vec becomes 1 - w_lex"),
        )
        .arg(
            Arg::new("require-both")
                .long("require-both")
                .action(ArgAction::SetTrue)
                .help("Only documents found by both sub-indexes"),
        )
        .arg(
            Arg::new("rerank")
                .long("rerank")
                .action(ArgAction::SetTrue)
                .help("Re-rank the top results with the generative model"),
        )
        .arg(
            Arg::new("expand")
                .long("expand")
                .action(ArgAction::SetTrue)
                .help("Add the query's medical condition to the lexical terms"),
        )
        .arg(
            Arg::new("feedback")
                .long("feedback")
                .action(ArgAction::SetTrue)
                .help("Add Bo1 terms from the top lexical hits (pseudo-relevance feedback)"),
        )
        .arg(
            Arg::new("translate")
                .long("translate")
                .action(ArgAction::SetTrue)
                .help("Also search the generative model's English translation of the query"),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .value_parser(clap::value_parser!(u64))
                .help("Budget for external model calls"),
        )
}
