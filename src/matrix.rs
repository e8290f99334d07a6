//! Source × destination probe matrix
//!
//! Every pod that may host an exec session is a source; every source plus
//! every service is a destination. Cells are planned up front (skip, fail,
//! or probe a possibly remapped address) so the matrix shape is fixed before
//! the first probe runs. Probes then run through a bounded pool and each
//! result lands in its own (row, column) slot.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::net::Ipv4Addr;
use tracing::{info, instrument, warn};

use crate::config::{ProbeConfig, RemapConfig};
use crate::k8s::{ClusterDirectory, RemoteExec};
use crate::models::{ClusterHandle, Workload, WorkloadAddress};
use crate::probe::{ProbeResult, Prober};
use crate::remap::{RemapError, RemapTable};
use crate::topology::Cluster;

/// Ordered probe sources and destinations
#[derive(Debug, Clone, Default)]
pub struct Endpoints {
    pub sources: Vec<Workload>,
    pub destinations: Vec<Workload>,
}

impl Endpoints {
    /// Sources are the non-excluded pods of every cluster; destinations are
    /// the sources followed by every service.
    pub fn build(clusters: &[Cluster]) -> Self {
        let sources: Vec<Workload> = clusters
            .iter()
            .flat_map(|cluster| cluster.sources().cloned())
            .collect();

        let mut destinations = sources.clone();
        destinations.extend(
            clusters
                .iter()
                .flat_map(|cluster| cluster.snapshot.services().cloned()),
        );

        Self {
            sources,
            destinations,
        }
    }
}

/// What to do for one cell before any probe runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellPlan {
    Skip,
    Fail(String),
    Probe { target: Ipv4Addr },
}

/// Decide how the cell (`source`, `destination`) is filled
pub fn plan_cell(source: &Workload, destination: &Workload, remaps: &RemapTable) -> CellPlan {
    if source.same_as(destination) {
        return CellPlan::Skip;
    }

    let address = match &destination.address {
        WorkloadAddress::Resolved(ip) => *ip,
        WorkloadAddress::Unresolved => {
            return CellPlan::Fail(format!("{} has no address assigned", destination.id))
        }
        WorkloadAddress::Invalid(raw) => {
            return CellPlan::Fail(RemapError::NotIpv4(raw.clone()).to_string())
        }
    };

    match remaps.remap(address, source.cluster(), destination.cluster()) {
        Ok(target) => CellPlan::Probe { target },
        Err(e) => CellPlan::Fail(e.to_string()),
    }
}

/// One filled cell of the matrix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatrixCell {
    pub result: ProbeResult,
    /// Address that was probed, after remapping
    pub target: Option<Ipv4Addr>,
}

impl MatrixCell {
    fn skipped() -> Self {
        Self {
            result: ProbeResult::Skipped,
            target: None,
        }
    }

    fn failed(reason: String) -> Self {
        Self {
            result: ProbeResult::Error(reason),
            target: None,
        }
    }
}

/// Dense `sources × destinations` grid of probe results
#[derive(Debug, Clone)]
pub struct ProbeMatrix {
    sources: Vec<Workload>,
    destinations: Vec<Workload>,
    cells: Vec<Vec<MatrixCell>>,
}

impl ProbeMatrix {
    pub fn sources(&self) -> &[Workload] {
        &self.sources
    }

    pub fn destinations(&self) -> &[Workload] {
        &self.destinations
    }

    pub fn rows(&self) -> &[Vec<MatrixCell>] {
        &self.cells
    }

    pub fn cell(&self, source: usize, destination: usize) -> Option<&MatrixCell> {
        self.cells.get(source).and_then(|row| row.get(destination))
    }

    /// Results only, in matrix order
    pub fn results(&self) -> Vec<Vec<ProbeResult>> {
        self.cells
            .iter()
            .map(|row| row.iter().map(|cell| cell.result.clone()).collect())
            .collect()
    }

    /// Every cell with its source and destination
    pub fn iter(&self) -> impl Iterator<Item = (&Workload, &Workload, &MatrixCell)> {
        self.cells.iter().enumerate().flat_map(move |(i, row)| {
            row.iter()
                .enumerate()
                .map(move |(j, cell)| (&self.sources[i], &self.destinations[j], cell))
        })
    }
}

/// Probe every cell of `endpoints`, at most `prober.settings().concurrency` at a time
pub async fn probe_all<E: RemoteExec + ?Sized>(
    endpoints: Endpoints,
    remaps: &RemapTable,
    prober: &Prober<'_, E>,
) -> ProbeMatrix {
    let Endpoints {
        sources,
        destinations,
    } = endpoints;

    let mut slots: Vec<Vec<Option<MatrixCell>>> = vec![vec![None; destinations.len()]; sources.len()];
    let mut jobs = Vec::new();

    for (i, source) in sources.iter().enumerate() {
        for (j, destination) in destinations.iter().enumerate() {
            match plan_cell(source, destination, remaps) {
                CellPlan::Skip => slots[i][j] = Some(MatrixCell::skipped()),
                CellPlan::Fail(reason) => {
                    warn!(
                        source = %source.id,
                        destination = %destination.id,
                        error = %reason,
                        "Cannot probe destination"
                    );
                    slots[i][j] = Some(MatrixCell::failed(reason));
                }
                CellPlan::Probe { target } => jobs.push((i, j, target)),
            }
        }
    }

    let total = jobs.len();
    let concurrency = prober.settings().concurrency.max(1);
    info!(probes = total, concurrency, "Starting probes");

    {
        let sources = &sources;
        let destinations = &destinations;
        let mut results = stream::iter(jobs)
            .map(move |(i, j, target)| async move {
                let destination = &destinations[j];
                let expected = destination.is_pod().then(|| destination.name());
                let result = prober.probe(&sources[i], target, expected).await;
                (i, j, target, result)
            })
            .buffer_unordered(concurrency);

        let mut done = 0;
        while let Some((i, j, target, result)) = results.next().await {
            done += 1;
            info!(
                progress = %format!("{}/{}", done, total),
                source = %sources[i].id,
                source_ip = %sources[i].address,
                destination = %destinations[j].id,
                destination_ip = %destinations[j].address,
                via = %target,
                outcome = %result,
                "Probed"
            );
            slots[i][j] = Some(MatrixCell {
                result,
                target: Some(target),
            });
        }
    }

    let cells = slots
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|slot| slot.unwrap_or_else(|| MatrixCell::failed("probe never completed".to_string())))
                .collect()
        })
        .collect();

    ProbeMatrix {
        sources,
        destinations,
        cells,
    }
}

/// Discover remap prefixes, build the endpoints and probe the whole matrix
#[instrument(skip_all, fields(clusters = clusters.len()))]
pub async fn run<D, E>(
    clusters: &[Cluster],
    directory: &D,
    exec: &E,
    probe: &ProbeConfig,
    remap: &RemapConfig,
) -> ProbeMatrix
where
    D: ClusterDirectory + ?Sized,
    E: RemoteExec + ?Sized,
{
    let handles: Vec<ClusterHandle> = clusters.iter().map(|c| c.handle.clone()).collect();
    let remaps = RemapTable::discover(&handles, directory, remap).await;

    let endpoints = Endpoints::build(clusters);
    info!(
        sources = endpoints.sources.len(),
        destinations = endpoints.destinations.len(),
        remap_pairs = remaps.len(),
        "Built probe endpoints"
    );

    let prober = Prober::new(exec, probe.clone());
    probe_all(endpoints, &remaps, &prober).await
}
