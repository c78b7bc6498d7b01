//! `weave` command-line driver (spec.md §6).
//!
//! Reads one or more YAML/JSON documents, merges and evaluates them, and
//! prints the result. Exit codes: `0` success, `1` a `WeaveError` was
//! reported, `2` a usage error (bad arguments, unreadable file).

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use weave::document::{Document, Engine};
use weave::error::ParseError;

#[derive(Parser, Debug)]
#[command(name = "weave", version, about = "Merge and evaluate YAML/JSON documents")]
struct Cli {
    /// Input documents, merged in order. Reads stdin if none are given.
    files: Vec<PathBuf>,

    /// Prune this path from the final result; may be given multiple times.
    #[arg(long = "prune", value_name = "PATH")]
    prune: Vec<String>,

    /// Cherry-pick only this path into the final result; may be given
    /// multiple times. Mutually exclusive with `--prune`.
    #[arg(long = "cherry-pick", value_name = "PATH")]
    cherry_pick: Vec<String>,

    /// Merge and report but do not evaluate `(( ... ))` expressions.
    #[arg(long)]
    skip_eval: bool,

    /// Treat a go-patch document as input (unsupported; always errors).
    #[arg(long)]
    go_patch: bool,

    /// When an array has no merge directive and isn't uniformly keyed,
    /// append instead of merging element-by-element.
    #[arg(long = "fallback-append")]
    fallback_append: bool,

    /// Emit JSON instead of YAML.
    #[arg(short = 'j', long)]
    json: bool,

    /// Increase logging verbosity; repeatable.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).format_timestamp(None).init();

    match run(&cli) {
        Ok(output) => {
            print!("{}", output);
            ExitCode::from(0)
        }
        Err(CliError::Usage(message)) => {
            eprintln!("weave: {}", message);
            ExitCode::from(2)
        }
        Err(CliError::Weave(e)) => {
            eprintln!("weave: {}", e);
            ExitCode::from(1)
        }
    }
}

enum CliError {
    Usage(String),
    Weave(weave::WeaveError),
}

impl From<weave::WeaveError> for CliError {
    fn from(e: weave::WeaveError) -> Self {
        CliError::Weave(e)
    }
}

fn run(cli: &Cli) -> Result<String, CliError> {
    if !cli.prune.is_empty() && !cli.cherry_pick.is_empty() {
        return Err(CliError::Usage("--prune and --cherry-pick cannot be used together".into()));
    }

    let documents = read_documents(&cli.files)?;

    let mut engine = Engine::new();
    engine.options_mut().skip_eval = cli.skip_eval;
    engine.options_mut().append_by_default = cli.fallback_append;
    engine.postprocess_mut().prune_paths = cli.prune.clone();
    engine.postprocess_mut().cherry_pick_paths = cli.cherry_pick.clone();
    if cli.go_patch {
        engine.postprocess_mut().go_patch = Some(weave::value::Value::Null);
    }

    let outcome = engine.weave(documents)?;
    for warning in &outcome.warnings {
        log::warn!("{}", warning);
    }

    if cli.json {
        outcome
            .document
            .to_json_string_pretty()
            .map(|s| s + "\n")
            .map_err(|e| CliError::Usage(format!("failed to render JSON: {}", e)))
    } else {
        outcome
            .document
            .to_yaml_string()
            .map_err(|e| CliError::Usage(format!("failed to render YAML: {}", e)))
    }
}

fn read_documents(files: &[PathBuf]) -> Result<Vec<Document>, CliError> {
    if files.is_empty() {
        let mut text = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut text)
            .map_err(|e| CliError::Usage(format!("failed to read stdin: {}", e)))?;
        return Ok(vec![parse_one(&text, None)?]);
    }

    let mut docs = Vec::with_capacity(files.len());
    for path in files {
        let text = fs::read_to_string(path)
            .map_err(|e| CliError::Usage(format!("failed to read {}: {}", path.display(), e)))?;
        docs.push(parse_one(&text, Some(path))?);
    }
    Ok(docs)
}

fn parse_one(text: &str, path: Option<&PathBuf>) -> Result<Document, CliError> {
    let is_json = path.map(|p| p.extension().and_then(|e| e.to_str()) == Some("json")).unwrap_or(false);
    let result = if is_json { Document::parse_json(text) } else { Document::parse_yaml(text) };
    result.map_err(|e: ParseError| {
        let where_ = path.map(|p| p.display().to_string()).unwrap_or_else(|| "<stdin>".to_string());
        CliError::Usage(format!("{}: {}", where_, e))
    })
}
