use anyhow::Context;
use hs_optimizer::{Benchmark, RunCoordinator, SearchConfig};
use hs_types::{Evaluation, EvaluationError, ParameterAssignment};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HS_SEARCH_CONFIG").ok())
        .context("usage: hs-search <config.json> (or set HS_SEARCH_CONFIG)")?;
    let objective: Benchmark = std::env::var("HS_SEARCH_OBJECTIVE")
        .unwrap_or_else(|_| "sphere".to_string())
        .parse()?;

    let config = SearchConfig::from_path(&path).with_context(|| format!("loading {path}"))?;
    let coordinator = RunCoordinator::new(config)?;

    let evaluate = |params: &ParameterAssignment| -> Result<Evaluation, EvaluationError> {
        objective.evaluate(params)
    };
    let outcome = coordinator.run(&evaluate)?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
