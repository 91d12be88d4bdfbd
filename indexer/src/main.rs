use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use rankfuse_core::{Document, PipelineConfig, SledCache, SparseEngine};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct InputDoc {
    text: String,
    #[serde(default)]
    source_ref: Option<String>,
}

#[derive(Parser)]
#[command(name = "rankfuse-indexer")]
#[command(about = "Build and query a persisted BM25 index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index file
        #[arg(long)]
        output: String,
        /// Sled directory backing the document cache
        #[arg(long)]
        cache: String,
        /// Keep stop words in the token stream
        #[arg(long, default_value_t = false)]
        keep_stopwords: bool,
    },
    /// Run a sparse query against a persisted index
    Search {
        /// Index file written by `build`
        #[arg(long)]
        index: String,
        /// Sled directory backing the document cache
        #[arg(long)]
        cache: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Must match the flag used at build time
        #[arg(long, default_value_t = false)]
        keep_stopwords: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            cache,
            keep_stopwords,
        } => build(&input, &output, &cache, keep_stopwords).await,
        Commands::Search {
            index,
            cache,
            query,
            limit,
            keep_stopwords,
        } => search(&index, &cache, &query, limit, keep_stopwords).await,
    }
}

fn pipeline(keep_stopwords: bool) -> PipelineConfig {
    PipelineConfig {
        remove_stopwords: !keep_stopwords,
        ..PipelineConfig::default()
    }
}

async fn build(input: &str, output: &str, cache_dir: &str, keep_stopwords: bool) -> Result<()> {
    let documents = collect_documents(Path::new(input))?;
    tracing::info!(num_docs = documents.len(), "ingested documents");

    let cache = Arc::new(SledCache::open(Path::new(cache_dir))?);
    let engine = SparseEngine::new(cache);
    engine
        .build_index(&documents, Path::new(output), pipeline(keep_stopwords))
        .await?;

    tracing::info!(output, "index build complete");
    Ok(())
}

async fn search(
    index: &str,
    cache_dir: &str,
    query: &str,
    limit: usize,
    keep_stopwords: bool,
) -> Result<()> {
    let cache = Arc::new(SledCache::open(Path::new(cache_dir))?);
    let engine = SparseEngine::new(cache);
    if !engine.load_index(Path::new(index), pipeline(keep_stopwords)) {
        bail!("no usable index at {index}");
    }

    let results = engine.search(query, limit).await;
    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{:.4}] {}",
            i + 1,
            result.score,
            result.document.source_ref
        );
        println!("   {}", snippet(&result.document.text));
    }
    Ok(())
}

fn collect_documents(input: &Path) -> Result<Vec<Document>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
        files.sort();
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input path {} does not exist", input.display());
    }

    let mut documents = Vec::new();
    for file in files {
        if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file, &mut documents)?;
        } else {
            read_json(&file, &mut documents)?;
        }
    }
    Ok(documents)
}

fn read_jsonl(file: &Path, documents: &mut Vec<Document>) -> Result<()> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let doc: InputDoc = serde_json::from_str(&line)?;
        documents.push(into_document(doc, file));
    }
    Ok(())
}

fn read_json(file: &Path, documents: &mut Vec<Document>) -> Result<()> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                let doc: InputDoc = serde_json::from_value(v)?;
                documents.push(into_document(doc, file));
            }
        }
        serde_json::Value::Object(_) => {
            let doc: InputDoc = serde_json::from_value(json)?;
            documents.push(into_document(doc, file));
        }
        _ => {}
    }
    Ok(())
}

fn into_document(doc: InputDoc, file: &Path) -> Document {
    Document {
        text: doc.text,
        source_ref: doc
            .source_ref
            .unwrap_or_else(|| file.display().to_string()),
    }
}

fn snippet(text: &str) -> String {
    let one_line = text.replace('\n', " ");
    let mut s: String = one_line.chars().take(160).collect();
    if one_line.chars().count() > 160 {
        s.push('…');
    }
    s
}
