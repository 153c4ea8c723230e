use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use localrag_core::config::{resolve_with_base, EmbedderKind, IndexBackend, Settings};
use localrag_core::traits::Embedder;
use localrag_llm::{generator_from_settings, OllamaEmbedder};
use localrag_pipeline::{Pipeline, PipelineState};

#[derive(Parser)]
#[command(name = "localrag")]
#[command(about = "Ingest text documents and answer questions over them", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the configured index (no-op when it already exists)
    Provision,

    /// Chunk, embed and store documents
    Ingest {
        /// Files to ingest; defaults to every matching file in `data.dir`
        paths: Vec<PathBuf>,

        /// Directory to scan instead of `data.dir`
        #[arg(short, long, conflicts_with = "paths")]
        dir: Option<PathBuf>,
    },

    /// Answer a question from the ingested documents
    Ask {
        question: String,

        /// Number of chunks to retrieve (defaults to `retrieval.k`)
        #[arg(short)]
        k: Option<usize>,

        /// Print the retrieved chunks before the answer
        #[arg(long)]
        show_context: bool,
    },

    /// Drop the configured index and everything in it
    Teardown,

    /// Show the index state and entry count
    Status,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

fn build_embedder(settings: &Settings) -> anyhow::Result<Box<dyn Embedder>> {
    let dim = settings.index.dimension;
    if settings.embedding.kind == EmbedderKind::Ollama && !localrag_embed::fake_embeddings_requested() {
        return Ok(Box::new(OllamaEmbedder::from_settings(&settings.embedding, dim)?));
    }
    Ok(localrag_embed::local_embedder(&settings.embedding, dim)?)
}

fn build_pipeline(settings: &Settings, base: &Path) -> anyhow::Result<Pipeline> {
    // Every subcommand is its own process; the index has to outlive it.
    if settings.index.backend == IndexBackend::Memory {
        anyhow::bail!("index.backend = \"memory\" does not persist between commands; use \"lance\"");
    }
    let embedder = build_embedder(settings).context("creating embedder")?;
    let index = localrag_vector::open_index(&settings.index, base).context("opening vector index")?;
    let generator = generator_from_settings(&settings.generator).context("creating generator")?;
    Ok(Pipeline::new(settings, embedder, index, generator)?)
}

fn ingest(pipeline: &Pipeline, files: Vec<PathBuf>) -> anyhow::Result<usize> {
    if files.is_empty() {
        println!("No documents to ingest");
        return Ok(0);
    }
    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents {msg}")?
            .progress_chars("#>-"),
    );
    let result = pipeline.ingest_with(&files, |path, chunks| {
        pb.set_message(format!("{} ({} chunks)", path.display(), chunks));
        pb.inc(1);
    });
    match result {
        Ok(n) => {
            pb.finish_with_message("done");
            Ok(n)
        }
        Err(e) => {
            pb.abandon();
            Err(e.into())
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let settings = Settings::load().context("loading configuration")?;
    let base = std::env::current_dir()?;
    let mut pipeline = build_pipeline(&settings, &base)?;
    let index_name = &settings.index.name;

    match cli.command {
        Commands::Provision => {
            pipeline.provision()?;
            println!("Index '{}' ready (dimension {}, {})", index_name, settings.index.dimension, settings.index.metric);
        }
        Commands::Ingest { paths, dir } => {
            pipeline.attach()?;
            let files = if paths.is_empty() {
                let dir = dir.unwrap_or_else(|| resolve_with_base(&base, &settings.data.dir));
                info!(dir = %dir.display(), "scanning for documents");
                pipeline.discover(&dir)
            } else {
                paths
            };
            let written = ingest(&pipeline, files)?;
            println!("Ingested {} chunks into '{}'", written, index_name);
        }
        Commands::Ask { question, k, show_context } => {
            pipeline.attach()?;
            let k = k.unwrap_or(settings.retrieval.k);
            if show_context {
                for (i, hit) in pipeline.retrieve(&question, k)?.iter().enumerate() {
                    println!("[{}] {} (score {:.3})\n{}\n", i + 1, hit.id, hit.score, hit.text);
                }
            }
            let answer = pipeline.ask(&question, k)?;
            println!("{}", answer.trim_end());
        }
        Commands::Teardown => {
            pipeline.teardown()?;
            println!("Index '{}' removed", index_name);
        }
        Commands::Status => {
            let state = pipeline.attach()?;
            println!("index: {}", index_name);
            println!("state: {}", state);
            if state == PipelineState::Ready {
                println!("entries: {}", pipeline.entry_count()?);
            }
        }
    }
    Ok(())
}
