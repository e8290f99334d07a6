use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netmatrix::{
    config::Config,
    k8s::KubeClusters,
    models::ClusterHandle,
    render::render,
    report::MatrixReport,
    topology::Cluster,
};

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    tracing::info!("Starting netmatrix");

    // Load configuration
    let config = Config::load()?;
    tracing::info!(clusters = config.clusters.len(), "Configuration loaded");

    let handles: Vec<ClusterHandle> = config.clusters.iter().map(ClusterHandle::from).collect();
    let kube = KubeClusters::connect(&handles, &config.remap).await?;

    // Snapshot every cluster; an unreachable cluster is left out of the matrix
    let mut clusters = Vec::with_capacity(handles.len());
    for handle in handles {
        let name = handle.name.clone();
        let discovered = match kube.health_check(&name).await {
            Ok(()) => Cluster::discover(handle, &kube).await,
            Err(e) => Err(e),
        };
        match discovered {
            Ok(cluster) => clusters.push(cluster),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::error!(cluster = %name, error = %e, "Cluster unavailable, leaving it out of the matrix");
            }
        }
    }
    if clusters.is_empty() {
        anyhow::bail!("no cluster could be scanned");
    }

    let matrix = netmatrix::run(&clusters, &kube, &kube, &config.probe, &config.remap).await;

    let grid = render(matrix.sources(), matrix.destinations(), &matrix.results());
    println!("{}", grid);

    if let Some(path) = &config.output.report_path {
        MatrixReport::from_matrix(&matrix).write_json(path)?;
    }

    Ok(())
}
