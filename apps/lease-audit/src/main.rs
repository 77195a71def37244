//! Lease audit CLI
//!
//! Runs the PII-redacting lease analysis pipeline from the command line:
//!
//! - `analyze`: redact, chunk, retrieve statutes, analyze with Gemini and
//!   write the consolidated report
//! - `redact`: show what the redactor would send out, without the mapping
//! - `search`: query the statute corpus the way chunk retrieval does
//!
//! The redaction-mapping key is read from `LEASE_PII_KEY`, the Gemini key
//! from `GEMINI_API_KEY`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use analysis_engine::{AnalysisEngine, EngineConfig, Redactor};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use corpus_core::{KeywordLawIndex, LawCorpus, LawRetriever};
use shared_pdf::{LayoutJsonExtractor, PdfTextExtractor, TextExtractor};
use shared_types::{ConsolidatedAnalysis, DocumentRecord};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod gemini;

use gemini::{GeminiModel, API_KEY_ENV, DEFAULT_MODEL};

#[derive(Parser, Debug)]
#[command(name = "lease-audit")]
#[command(about = "Audit a residential lease against Massachusetts tenant law")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a lease and write the report as JSON
    Analyze {
        /// Lease as a PDF, or as layout JSON (pages of positioned words)
        input: PathBuf,

        /// Statute corpus: JSON array of {chapter, section, title?, text}
        #[arg(long)]
        corpus: PathBuf,

        /// Engine configuration (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Where to write the document record; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Gemini model name
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,

        /// Per-request model timeout in seconds
        #[arg(long, default_value = "120")]
        timeout_secs: u64,
    },

    /// Print the redacted text and per-category counts
    Redact {
        input: PathBuf,
    },

    /// Search the statute corpus
    Search {
        query: String,

        #[arg(long)]
        corpus: PathBuf,

        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },
}

/// Pick the extractor from the file extension
fn extractor_for(path: &Path) -> Result<Arc<dyn TextExtractor>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("json") => Ok(Arc::new(LayoutJsonExtractor)),
        Some("pdf") => Ok(Arc::new(PdfTextExtractor)),
        _ => bail!("unsupported input {}: expected .pdf or .json", path.display()),
    }
}

fn load_index(corpus: &Path) -> Result<KeywordLawIndex> {
    let corpus = LawCorpus::load(corpus).with_context(|| format!("loading corpus {}", corpus.display()))?;
    let index = KeywordLawIndex::build(&corpus).context("building statute index")?;
    info!(sections = index.len(), "Statute index ready");
    Ok(index)
}

fn print_summary(analysis: &ConsolidatedAnalysis) {
    println!("Severity: {:?}", analysis.severity);
    println!("{}", analysis.summary);
    println!("Potential recovery: {}", analysis.potential_recovery);
    for (rank, issue) in analysis.top_issues.iter().enumerate() {
        let damages = issue
            .damages
            .map(|d| format!(" ({})", d))
            .unwrap_or_default();
        println!(
            "{}. [{}] {}{}: {}",
            rank + 1,
            issue.category,
            issue.statute,
            damages,
            issue.excerpt
        );
    }
}

fn write_record(record: &DocumentRecord, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn run_analyze(
    input: &Path,
    corpus: &Path,
    config: Option<&Path>,
    output: Option<&Path>,
    model: &str,
    timeout_secs: u64,
) -> Result<()> {
    // Configuration and secrets first: nothing external runs if they are wrong
    let config = match config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let key = EngineConfig::sealing_key()?;
    let api_key = std::env::var(API_KEY_ENV).with_context(|| format!("{} is not set", API_KEY_ENV))?;

    let extractor = extractor_for(input)?;
    let retriever: Arc<dyn LawRetriever> = Arc::new(load_index(corpus)?);
    let model = Arc::new(GeminiModel::new(api_key, model, Duration::from_secs(timeout_secs))?);
    let store = config.redaction.open_store();

    let engine = AnalysisEngine::new(config, &key, store, extractor, retriever, model)?;

    let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "lease".to_string());

    let id = engine.ingest(&filename, &bytes).await?;
    let result = engine.analyze(&id).await;

    let record = engine
        .get(&id)
        .await
        .context("document record disappeared")?;
    write_record(&record, output)?;

    let analysis = result?;
    print_summary(&analysis);
    Ok(())
}

fn run_redact(input: &Path) -> Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let document = extractor_for(input)?.extract(&bytes)?;
    let outcome = Redactor::new().redact(&document.full_text());

    println!("{}", outcome.redacted);
    eprintln!();
    for (category, count) in &outcome.counts {
        eprintln!("{}: {}", category.as_str(), count);
    }
    Ok(())
}

async fn run_search(query: &str, corpus: &Path, top_k: usize) -> Result<()> {
    let index = load_index(corpus)?;
    let entries = index.search(query, top_k).await?;
    if entries.is_empty() {
        println!("No matching sections");
    }
    for entry in entries {
        let title = entry.title.as_deref().unwrap_or("");
        println!("{:.3}  Chapter {}, Section {}  {}", entry.score, entry.chapter, entry.section, title);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Analyze {
            input,
            corpus,
            config,
            output,
            model,
            timeout_secs,
        } => {
            run_analyze(
                &input,
                &corpus,
                config.as_deref(),
                output.as_deref(),
                &model,
                timeout_secs,
            )
            .await
        }
        Command::Redact { input } => run_redact(&input),
        Command::Search {
            query,
            corpus,
            top_k,
        } => run_search(&query, &corpus, top_k).await,
    }
}
