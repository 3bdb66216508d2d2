use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use sift_core::{DocId, DocumentRecord, Engine, EngineConfig, NewDocument};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct InputDoc {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(alias = "content")]
    body: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl InputDoc {
    fn into_document(self, fallback_source: String) -> NewDocument {
        let source = self.source.or(self.url).or(self.id).unwrap_or(fallback_source);
        NewDocument::new(self.title, source, self.body)
    }
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build, query and moderate a boolean full-text index", long_about = None)]
struct Cli {
    /// Index directory
    #[arg(long, global = true, default_value = "./index")]
    index: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest JSON/JSONL/text files or a directory of them
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Documents committed per atomic batch
        #[arg(long, default_value_t = 500)]
        batch_size: usize,
        /// Do not keep compressed full content
        #[arg(long, default_value_t = false)]
        no_content: bool,
    },
    /// Run a boolean query, e.g. "(cat and dog) or bird"
    Search {
        query: String,
        /// Include deactivated documents
        #[arg(long, default_value_t = false)]
        all: bool,
    },
    /// Terms within edit distance of the given word
    Suggest { term: String },
    Activate { doc_id: DocId },
    Deactivate { doc_id: DocId },
    Blacklist {
        #[command(subcommand)]
        command: BlacklistCommand,
    },
    /// List documents
    List {
        #[arg(long, value_enum, default_value_t = ListState::All)]
        state: ListState,
    },
    /// Show one document
    Show {
        doc_id: DocId,
        /// Print the full stored content instead of the preview
        #[arg(long, default_value_t = false)]
        content: bool,
    },
    Stats,
}

#[derive(Subcommand)]
enum BlacklistCommand {
    Add { word: String },
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum ListState {
    Active,
    Inactive,
    All,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    let mut config = EngineConfig::default();
    if let Commands::Build { no_content: true, .. } = cli.command {
        config.store_content = false;
    }
    let engine = Engine::open(&cli.index, config).with_context(|| format!("opening index at {}", cli.index))?;

    match cli.command {
        Commands::Build { input, batch_size, .. } => build_index(&engine, &input, batch_size),
        Commands::Search { query, all } => {
            let ids = if all { engine.search(&query)? } else { engine.search_active(&query)? };
            for id in &ids {
                print_doc(*id, &engine.get_document(*id)?);
            }
            println!("{} result(s)", ids.len());
            Ok(())
        }
        Commands::Suggest { term } => {
            for t in engine.suggest(&term)? {
                println!("{t}");
            }
            Ok(())
        }
        Commands::Activate { doc_id } => Ok(engine.activate(doc_id)?),
        Commands::Deactivate { doc_id } => Ok(engine.deactivate(doc_id)?),
        Commands::Blacklist { command: BlacklistCommand::Add { word } } => {
            if !engine.blacklist_add(&word)? {
                println!("{word} already blacklisted");
            }
            Ok(())
        }
        Commands::Blacklist { command: BlacklistCommand::List } => {
            for w in engine.blacklist_list()? {
                println!("{w}");
            }
            Ok(())
        }
        Commands::List { state } => {
            let docs = match state {
                ListState::Active => engine.list_active()?,
                ListState::Inactive => engine.list_inactive()?,
                ListState::All => engine.list_documents()?,
            };
            for (id, doc) in &docs {
                print_doc(*id, doc);
            }
            Ok(())
        }
        Commands::Show { doc_id, content } => {
            let doc = engine.get_document(doc_id)?;
            print_doc(doc_id, &doc);
            let text = if content { engine.get_content(doc_id)?.unwrap_or_default() } else { doc.preview };
            println!("\n{text}");
            Ok(())
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&engine.stats()?)?);
            Ok(())
        }
    }
}

fn print_doc(id: DocId, doc: &DocumentRecord) {
    let flag = if doc.active { "" } else { " [inactive]" };
    println!("#{id:03} \"{}\" / {}{flag}", doc.title, doc.source_reference);
}

fn build_index(engine: &Engine, input: &str, batch_size: usize) -> Result<()> {
    let input_path = Path::new(input);
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(extension(p), Some("json" | "jsonl" | "txt")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    } else {
        anyhow::bail!("input {input} does not exist");
    }

    let mut pending: Vec<NewDocument> = Vec::new();
    for file in &files {
        match extension(file) {
            Some("jsonl") => read_jsonl(file, &mut pending)?,
            Some("json") => read_json(file, &mut pending)?,
            _ => read_text(file, &mut pending)?,
        }
    }

    // Known sources are skipped so a directory can be re-indexed after adding files.
    let mut seen: HashSet<String> = HashSet::new();
    let mut fresh: Vec<NewDocument> = Vec::with_capacity(pending.len());
    let mut skipped = 0usize;
    for doc in pending {
        if engine.contains_source(&doc.source_reference)? || !seen.insert(doc.source_reference.clone()) {
            tracing::debug!(source = %doc.source_reference, "already indexed, skipping");
            skipped += 1;
            continue;
        }
        fresh.push(doc);
    }

    let mut indexed = 0usize;
    for chunk in fresh.chunks(batch_size.max(1)) {
        indexed += engine.ingest_batch(chunk)?.len();
    }
    let stats = engine.stats()?;
    tracing::info!(files = files.len(), indexed, skipped, terms = stats.terms, "build complete");
    println!("indexed {indexed} document(s), skipped {skipped}");
    Ok(())
}

fn extension(p: &Path) -> Option<&str> {
    p.extension().and_then(|s| s.to_str())
}

fn read_jsonl(file: &Path, out: &mut Vec<NewDocument>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let doc: InputDoc = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", file.display(), lineno + 1))?;
        out.push(doc.into_document(format!("{}#{}", file.display(), lineno + 1)));
    }
    Ok(())
}

fn read_json(file: &Path, out: &mut Vec<NewDocument>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for (i, v) in arr.into_iter().enumerate() {
                let doc: InputDoc = serde_json::from_value(v)?;
                out.push(doc.into_document(format!("{}#{}", file.display(), i)));
            }
        }
        serde_json::Value::Object(_) => {
            let doc: InputDoc = serde_json::from_value(json)?;
            out.push(doc.into_document(file.display().to_string()));
        }
        _ => tracing::warn!(file = %file.display(), "expected a JSON object or array, ignoring"),
    }
    Ok(())
}

fn read_text(file: &Path, out: &mut Vec<NewDocument>) -> Result<()> {
    let body = fs::read_to_string(file)?;
    let title = file.file_stem().and_then(|s| s.to_str()).unwrap_or_default().to_string();
    out.push(NewDocument::new(title, file.display().to_string(), body));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_prefers_explicit_field_then_url_then_id() {
        let doc: InputDoc =
            serde_json::from_str(r#"{"id":"7","title":"t","body":"b","url":"http://x"}"#).unwrap();
        assert_eq!(doc.into_document("fallback".into()).source_reference, "http://x");

        let doc: InputDoc = serde_json::from_str(r#"{"title":"t","content":"b"}"#).unwrap();
        let doc = doc.into_document("file.json#0".into());
        assert_eq!(doc.source_reference, "file.json#0");
        assert_eq!(doc.content, "b");
    }
}
