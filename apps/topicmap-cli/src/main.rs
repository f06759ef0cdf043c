use std::{env, fs, path::{Path, PathBuf}};
use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use topicmap_cluster::{ClusterBackend, ClusterEngine, JsonMetadataDir};
use topicmap_core::budget::budget_from_settings;
use topicmap_core::config::{Config, Settings};
use topicmap_core::embeddings::load_embeddings;
use topicmap_core::error::{Error, Result as CoreResult};
use topicmap_core::retry::RetryPolicy;
use topicmap_core::traits::{Labeler, MetadataProvider};
use topicmap_core::types::Document;
use topicmap_embed::{embedder_from_settings, spec, OpenAiLabeler};
use topicmap_retrieve::{Ingestor, Retriever};
use topicmap_vector::VectorStore;

const USAGE: &str = "usage:
  topicmap ingest [<dir>] [--reset]
  topicmap query [-k <n>] [--text] [--aggregate] [--file <path>] <text>...
  topicmap cluster";

/// Stand-in when no chat provider can be configured; every cluster ends up "Unlabeled".
struct NoLabeler;

impl Labeler for NoLabeler {
    fn label(&self, _prompt: &str) -> CoreResult<String> { Err(Error::Unavailable("no labeling provider configured".into())) }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let settings = Config::load().and_then(|c| c.settings()).context("loading configuration")?;
    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("ingest") => ingest(&settings, &args[1..]),
        Some("query") => query(&settings, &args[1..]),
        Some("cluster") => cluster(&settings),
        _ => { eprintln!("{USAGE}"); std::process::exit(2); }
    }
}

/// `.txt` and `.md` files under `dir`, sorted; the file stem becomes the document id.
fn read_documents(dir: &Path) -> anyhow::Result<Vec<Document>> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt" || ext == "md"))
        .collect();
    files.sort();
    let mut docs = Vec::with_capacity(files.len());
    for path in files {
        let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else { continue };
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(_) => String::from_utf8_lossy(&fs::read(&path)?).to_string(),
        };
        docs.push(Document::new(stem, text));
    }
    Ok(docs)
}

fn ingest(settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let reset = args.iter().any(|a| a == "--reset");
    let dir = args.iter().find(|a| !a.starts_with('-')).map(PathBuf::from).unwrap_or_else(|| settings.paths.parsed_dir());
    let docs = read_documents(&dir)?;
    info!(dir = %dir.display(), documents = docs.len(), "read documents");

    let vector_dir = settings.paths.vector_dir();
    if reset { VectorStore::reset(&vector_dir)?; }
    let dim = spec(&settings.embedding.model)?.dim;
    let mut store = VectorStore::open(&vector_dir, dim)
        .with_context(|| format!("opening vector store at {} (use --reset to rebuild)", vector_dir.display()))?;

    let embedder = embedder_from_settings(settings, budget_from_settings(&settings.budget))?;
    let backend = ClusterBackend::builtin(&settings.cluster);
    let report = Ingestor::new(&embedder, &backend, settings).with_progress(true).ingest(&docs, &mut store)?;
    println!("Ingested {} documents as {} entries ({})", report.documents, report.chunks, report.method);
    println!("Embeddings: {}", report.embeddings_file.display());
    println!("Vector store: {}", report.vector_dir.display());
    Ok(())
}

fn query(settings: &Settings, args: &[String]) -> anyhow::Result<()> {
    let (mut k, mut return_text, mut aggregate, mut file) = (5usize, false, false, None);
    let mut texts = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-k" => { i += 1; k = args.get(i).context("-k requires a number")?.parse().context("-k requires a number")?; }
            "--text" => return_text = true,
            "--aggregate" => aggregate = true,
            "--file" => { i += 1; file = Some(PathBuf::from(args.get(i).context("--file requires a path")?)); }
            other => texts.push(other.to_string()),
        }
        i += 1;
    }

    let retriever = Retriever::from_settings(settings, budget_from_settings(&settings.budget))?;
    let hits = match file {
        Some(path) if texts.is_empty() && !aggregate => retriever.query_file(&path, k, return_text)?,
        Some(path) => {
            texts.push(fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?);
            retriever.query_multi(&texts, k, return_text, aggregate)?
        }
        None if texts.is_empty() => bail!("no query text given\n{USAGE}"),
        None => retriever.query_multi(&texts, k, return_text, aggregate)?,
    };
    for (rank, hit) in hits.iter().enumerate() {
        println!("{:>2}. {:.4}  {}", rank + 1, hit.score, hit.id);
        if let Some(text) = hit.text.as_deref().filter(|t| !t.is_empty()) {
            println!("    {}", text.replace('\n', "\n    "));
        }
    }
    Ok(())
}

fn cluster(settings: &Settings) -> anyhow::Result<()> {
    let set = load_embeddings(&settings.paths.embeddings_path())?;
    let engine = ClusterEngine::builtin(settings.cluster.clone())?;

    let retry = RetryPolicy::from_settings(&settings.retry);
    let labeler: Box<dyn Labeler> = match OpenAiLabeler::new(&settings.embedding, settings.labeling.clone(), retry) {
        Ok(l) => match budget_from_settings(&settings.budget) {
            Some(b) => Box::new(l.with_budget(b)),
            None => Box::new(l),
        },
        Err(e) => {
            warn!(error = %e, "labeling provider unavailable; clusters stay unlabeled");
            Box::new(NoLabeler)
        }
    };

    let metadata_dir = settings.paths.metadata_dir();
    let metadata = metadata_dir.is_dir().then(|| JsonMetadataDir::new(&metadata_dir));
    let out_dir = settings.paths.output_dir();
    let (run, paths) = engine.run_and_export(&set, labeler.as_ref(), metadata.as_ref().map(|m| m as &dyn MetadataProvider), &out_dir)?;

    println!("Clustered {} members into {} clusters", run.ids.len(), run.cluster_count());
    for (cid, label) in &run.labels {
        println!("  {cid:>3}  {label}");
    }
    println!("Artifacts in {}", out_dir.display());
    if paths.summary.is_none() { println!("(no metadata directory; summary CSV skipped)"); }
    Ok(())
}
