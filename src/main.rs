use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use genewalk::{
    expected_corpus_size, load_artifact, load_graph, FsStore, GraphRef, Orchestrator, Settings,
    Word2Vec,
};

#[derive(Parser, Debug)]
#[command(name = "genewalk", about = "Random-walk embedding ensembles over gene networks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate walks and train node vectors for every replicate.
    Run(RunArgs),

    /// Print graph statistics and the corpus size per replicate.
    Stats {
        /// Graph artifact (.json or tab-separated edge list)
        #[arg(long)]
        graph: PathBuf,
        /// Walk iterations used for the corpus-size estimate
        #[arg(long, default_value_t = 100)]
        iterations: usize,
    },

    /// Nearest neighbors of a node in one replicate's vectors.
    Similar {
        /// Replicate artifact (node_vectors_<r>.json)
        #[arg(long)]
        artifact: PathBuf,
        /// Node identifier
        #[arg(long)]
        node: String,
        /// Number of results to return
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Settings file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Graph artifact (.json or tab-separated edge list)
    #[arg(long)]
    graph: Option<PathBuf>,
    /// Output directory for replicate artifacts
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    replicates: Option<usize>,
    /// Replicates running at once
    #[arg(long)]
    parallelism: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    walk_length: Option<usize>,
    #[arg(long)]
    iterations: Option<usize>,
    #[arg(long)]
    vector_size: Option<usize>,
    #[arg(long)]
    window_size: Option<usize>,
    /// Trainer threads per replicate
    #[arg(long)]
    worker_threads: Option<usize>,
    /// Train with CBOW instead of skip-gram
    #[arg(long)]
    cbow: bool,
    /// Per-replicate timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Successes required for a zero exit status (default: all)
    #[arg(long)]
    min_success: Option<usize>,
    /// Also write each replicate's walks
    #[arg(long)]
    save_walks: bool,
}

impl RunArgs {
    fn into_settings(self) -> anyhow::Result<Settings> {
        let mut s = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        if let Some(v) = self.graph {
            s.graph = Some(v);
        }
        if let Some(v) = self.output_dir {
            s.output_dir = v;
        }
        let run = &mut s.run;
        if let Some(v) = self.replicates {
            run.replicates = v;
        }
        if let Some(v) = self.parallelism {
            run.parallelism = v;
        }
        if let Some(v) = self.seed {
            run.master_seed = v;
        }
        if let Some(v) = self.walk_length {
            run.walk.length = v;
        }
        if let Some(v) = self.iterations {
            run.walk.iterations = v;
        }
        if let Some(v) = self.vector_size {
            run.train.vector_size = v;
        }
        if let Some(v) = self.window_size {
            run.train.window_size = v;
        }
        if let Some(v) = self.worker_threads {
            run.train.worker_threads = v;
        }
        if self.cbow {
            run.train.use_skipgram = false;
        }
        if let Some(v) = self.timeout_secs {
            run.replicate_timeout_ms = Some(v.saturating_mul(1000));
        }
        if self.min_success.is_some() {
            run.min_success = self.min_success;
        }
        if self.save_walks {
            run.save_walks = true;
        }
        Ok(s)
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => cmd_run(args.into_settings()?),
        Commands::Stats { graph, iterations } => cmd_stats(graph, iterations),
        Commands::Similar { artifact, node, top_k } => cmd_similar(artifact, &node, top_k),
    }
}

fn cmd_run(settings: Settings) -> anyhow::Result<()> {
    let Some(graph_path) = settings.graph.as_deref() else {
        bail!("no graph given; pass --graph or set `graph` in the settings file");
    };
    settings.run.validate()?;

    let graph = load_graph(graph_path)
        .with_context(|| format!("loading graph from {}", graph_path.display()))?;
    let graph = Arc::new(graph);

    let store = FsStore::create(&settings.output_dir)
        .with_context(|| format!("creating {}", settings.output_dir.display()))?;
    store.save_graph(&graph)?;

    let report = Orchestrator::new(Word2Vec).run(graph, &settings.run, &store)?;
    let report_path = store.save_report(&report)?;

    println!(
        "{}/{} replicates succeeded in {:.2}s; report at {}",
        report.succeeded.len(),
        report.requested,
        report.elapsed_secs,
        report_path.display()
    );
    for f in &report.failures {
        println!("  replicate {} failed ({:?}): {}", f.replicate, f.kind, f.message);
    }
    report.ensure_min_success(settings.run.required_successes())?;
    Ok(())
}

fn cmd_stats(path: PathBuf, iterations: usize) -> anyhow::Result<()> {
    let graph =
        load_graph(&path).with_context(|| format!("loading graph from {}", path.display()))?;
    println!("nodes:    {}", graph.node_count());
    println!("edges:    {}", graph.edge_count());
    for (kind, count) in graph.kind_counts() {
        println!("  {kind}: {count}");
    }
    println!("isolated: {}", graph.isolated_nodes().count());
    println!("degree:   {}", graph.total_degree());
    println!("walks per replicate ({iterations} iterations): {}", expected_corpus_size(&graph, iterations));
    Ok(())
}

fn cmd_similar(path: PathBuf, node: &str, top_k: usize) -> anyhow::Result<()> {
    let artifact = load_artifact(&path)?;
    if artifact.vectors.get(node).is_none() {
        bail!("node `{node}` has no vector in replicate {}", artifact.replicate);
    }
    for (id, score) in artifact.vectors.most_similar(node, top_k) {
        println!("{score:.4}\t{id}");
    }
    Ok(())
}
