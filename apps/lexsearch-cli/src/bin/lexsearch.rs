use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lexsearch_cli::{deadline_from_secs, run_queries, QueryOutcome};
use lexsearch_core::config::{expand_path, Config};
use lexsearch_embed::get_default_embedder;
use lexsearch_hybrid::IndexBundle;

#[derive(Parser)]
#[command(name = "lexsearch", version, about = "Hybrid semantic + BM25 retrieval over legal-document chunks")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding config.toml and config.<env>.toml (default: current directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Index directory (overrides index.dir)
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    /// Enable debug logging unless RUST_LOG is set
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Load the corpus and build both indices
    Build {
        /// Corpus directory of converted *.json files (overrides corpus.dir)
        #[arg(long)]
        corpus: Option<PathBuf>,
    },
    /// Retrieve chunks for one or more queries
    Query {
        #[arg(required = true)]
        queries: Vec<String>,

        /// Candidates recalled by the semantic index
        #[arg(long)]
        top_k_semantic: Option<usize>,

        /// Results kept after the BM25 rerank
        #[arg(long)]
        top_k: Option<usize>,

        /// Print ids and both scores, as JSON
        #[arg(long)]
        detailed: bool,
    },
    /// Print statistics of a built index
    Stats,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config_dir {
        Some(dir) => Config::load_from(dir, &std::env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string()))?,
        None => Config::load()?,
    };
    let settings = config.settings()?;
    let index_dir = cli.index.clone().unwrap_or_else(|| expand_path(&settings.index.dir));
    let embedder = get_default_embedder(&settings.embed).context("loading embedder")?;

    match cli.command {
        Command::Build { corpus } => {
            let corpus_dir = corpus.unwrap_or_else(|| expand_path(&settings.corpus.dir));
            info!(corpus = %corpus_dir.display(), index = %index_dir.display(), "building indices");
            let (bundle, report) = IndexBundle::build(&corpus_dir, embedder, &settings)?;
            bundle.save(&index_dir)?;
            for (path, reason) in &report.files_skipped {
                eprintln!("skipped {}: {}", path.display(), reason);
            }
            println!(
                "Indexed {} chunks from {} files ({} malformed entries, {} empty) into {}",
                report.chunks,
                report.files_loaded,
                report.entries_malformed,
                report.entries_empty,
                index_dir.display()
            );
        }
        Command::Query { queries, top_k_semantic, top_k, detailed } => {
            let k_sem = top_k_semantic.unwrap_or(settings.retrieval.top_k_semantic);
            let k_final = top_k.unwrap_or(settings.retrieval.top_k_final);
            let retriever = Arc::new(IndexBundle::load(&index_dir, embedder)?.into_retriever(settings.retrieval.on_inconsistency));
            let reports = run_queries(
                Arc::clone(&retriever),
                queries,
                k_sem,
                k_final,
                deadline_from_secs(settings.embed.deadline_secs),
            )
            .await;

            let mut failures = 0usize;
            for report in reports {
                println!("== {}", report.query);
                match report.outcome {
                    QueryOutcome::Ranked(ranked) if detailed => println!("{}", serde_json::to_string_pretty(&ranked)?),
                    QueryOutcome::Ranked(ranked) if ranked.is_empty() => println!("(no results)"),
                    QueryOutcome::Ranked(ranked) => {
                        for (i, r) in ranked.iter().enumerate() { println!("{}. {}\n", i + 1, r.text); }
                    }
                    QueryOutcome::Failed(e) => { failures += 1; eprintln!("error: {e}"); }
                    QueryOutcome::TimedOut => { failures += 1; eprintln!("error: deadline exceeded"); }
                }
            }
            if retriever.inconsistencies() > 0 {
                eprintln!("{} semantic hits had no lexical counterpart", retriever.inconsistencies());
            }
            if failures > 0 { anyhow::bail!("{failures} queries failed"); }
        }
        Command::Stats => {
            let bundle = IndexBundle::load(&index_dir, embedder)?;
            println!("{}", serde_json::to_string_pretty(&bundle.stats())?);
        }
    }
    Ok(())
}
