//! Resolve probe CLI
//!
//! Loads models by id through a batching model loader against a live api and
//! prints them as JSON.
//!
//! Usage:
//!   cargo run --features cli --bin resolve_probe -- students s1 s2 s3
//!   cargo run --features cli --bin resolve_probe -- --base-href http://localhost:8000/api teachers t1

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use futures::future::join_all;
use serde::Serialize;

use assessment_client::config::ClientConfig;
use assessment_client::domain::{StudentApi, SubjectClassApi, TeacherApi};
use assessment_client::queue::{FetchQueue, LoadOptions, ModelLoader};
use assessment_client::service::ModelApiService;
use assessment_client::{Backend, HttpBackend, Model, Ref};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    Students,
    Teachers,
    Classes,
}

/// Resolve models by id using the batching fetch queue
#[derive(Parser, Debug)]
#[command(name = "resolve_probe")]
struct Args {
    /// Kind of model to load
    #[arg(value_enum)]
    kind: Kind,

    /// Ids to load
    #[arg(required = true)]
    ids: Vec<String>,

    /// Api base href (overrides ASSESSMENT_API_BASE_HREF)
    #[arg(long, env = "ASSESSMENT_API_BASE_HREF")]
    base_href: Option<String>,

    /// Authorization header value, e.g. "Token abc123"
    #[arg(long, env = "ASSESSMENT_API_TOKEN")]
    token: Option<String>,

    /// Ids per batch request
    #[arg(long)]
    batch_size: Option<usize>,

    /// Fail a batch after this many seconds
    #[arg(long)]
    batch_timeout_secs: Option<u64>,

    /// Give up waiting on an id after this many seconds
    #[arg(long, default_value_t = 30)]
    wait_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    assessment_client::telemetry::init(tracing::Level::INFO);

    let args = Args::parse();

    let mut config = ClientConfig::from_env().context("Invalid client configuration")?;
    if let Some(href) = &args.base_href {
        config.api_base_href = href.clone();
    }
    if let Some(size) = args.batch_size {
        config.queue.batch_size = size;
    }
    if let Some(secs) = args.batch_timeout_secs {
        config.queue.batch_timeout = Some(Duration::from_secs(secs));
    }
    config.validate().context("Invalid client configuration")?;

    let mut http = HttpBackend::new(&config).context("Failed to create HTTP backend")?;
    if let Some(token) = args.token.clone() {
        http = http.with_authenticator(Arc::new(assessment_client::backend::StaticToken(token)));
    }
    let backend: Arc<dyn Backend> = Arc::new(http);

    match args.kind {
        Kind::Students => {
            let service = StudentApi::new(backend).service().clone();
            probe(service, &config, &args).await
        }
        Kind::Teachers => {
            let service = TeacherApi::new(backend).service().clone();
            probe(service, &config, &args).await
        }
        Kind::Classes => {
            let service = SubjectClassApi::new(backend).service().clone();
            probe(service, &config, &args).await
        }
    }
}

async fn probe<T>(service: ModelApiService<T>, config: &ClientConfig, args: &Args) -> Result<()>
where
    T: Model + Serialize,
{
    let queue = FetchQueue::start(service, config.queue.clone())?;
    let loader = ModelLoader::new(queue);

    let fetches: Vec<_> = args
        .ids
        .iter()
        .map(|id| loader.load(&Ref::from(id.as_str()), LoadOptions::default()))
        .collect();
    println!("Queued {} id(s): {:?}", fetches.len(), loader.loading_ids());

    let wait = Duration::from_secs(args.wait_secs);
    let outcomes = join_all(
        fetches
            .iter()
            .map(|fetch| tokio::time::timeout(wait, fetch.wait())),
    )
    .await;

    let mut failed = 0;
    for (fetch, outcome) in fetches.iter().zip(outcomes) {
        match outcome {
            Ok(Ok(model)) => println!("{}", serde_json::to_string_pretty(&model)?),
            Ok(Err(err)) => {
                failed += 1;
                eprintln!("{}: {}", fetch.id(), err);
            }
            Err(_) => {
                failed += 1;
                eprintln!("{}: still pending after {:?}", fetch.id(), wait);
            }
        }
    }

    let stats = loader.queue().resolve_queue().stats();
    println!(
        "Batches: {} dispatched, {} failed; {} model(s) resolved",
        stats.batches_dispatched, stats.batches_failed, stats.ids_resolved
    );
    loader.shutdown();

    if failed > 0 {
        anyhow::bail!("{failed} id(s) failed to load");
    }
    Ok(())
}
