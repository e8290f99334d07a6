//! JSON report of a matrix run

use serde::Serialize;
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::info;

use crate::error::Result;
use crate::matrix::ProbeMatrix;
use crate::models::WorkloadId;
use crate::probe::ProbeResult;

/// Result of one probed (or unprobeable) cell
#[derive(Debug, Clone, Serialize)]
pub struct CellRecord {
    pub source: WorkloadId,
    pub destination: WorkloadId,
    pub target: Option<Ipv4Addr>,
    #[serde(flatten)]
    pub result: ProbeResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatrixSummary {
    pub sources: u32,
    pub destinations: u32,
    pub probed: u32,
    pub reachable: u32,
    pub unreachable: u32,
    pub errors: u32,
    pub skipped: u32,
    /// Reachable share of the probed cells, in percent
    pub success_rate: f64,
}

/// Full report for one matrix run
#[derive(Debug, Clone, Serialize)]
pub struct MatrixReport {
    pub timestamp: String,
    pub summary: MatrixSummary,
    pub results: Vec<CellRecord>,
}

impl MatrixReport {
    pub fn from_matrix(matrix: &ProbeMatrix) -> Self {
        let mut summary = MatrixSummary {
            sources: matrix.sources().len() as u32,
            destinations: matrix.destinations().len() as u32,
            ..Default::default()
        };
        let mut results = Vec::new();

        for (source, destination, cell) in matrix.iter() {
            match &cell.result {
                ProbeResult::Skipped => {
                    summary.skipped += 1;
                    continue;
                }
                ProbeResult::Reachable => summary.reachable += 1,
                ProbeResult::Unreachable => summary.unreachable += 1,
                ProbeResult::Error(_) => summary.errors += 1,
            }

            results.push(CellRecord {
                source: source.id.clone(),
                destination: destination.id.clone(),
                target: cell.target,
                result: cell.result.clone(),
            });
        }

        summary.probed = summary.reachable + summary.unreachable + summary.errors;
        summary.success_rate = if summary.probed > 0 {
            (summary.reachable as f64 / summary.probed as f64) * 100.0
        } else {
            100.0
        };

        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            summary,
            results,
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Wrote matrix report");
        Ok(())
    }
}
