//! Colorized terminal grid of probe results

use colored::{ColoredString, Colorize};
use std::fmt;
use tabled::{builder::Builder as TableBuilder, settings::Style as TableStyle};

use crate::models::{Workload, WorkloadKind};
use crate::probe::ProbeResult;

/// Corner label of the header row
pub const CORNER_LABEL: &str = "source pod";

/// Background of a row or column label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    Yellow,
    Blue,
    Magenta,
    Cyan,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
}

const POD_TINTS: [Tint; 4] = [Tint::Yellow, Tint::Blue, Tint::BrightYellow, Tint::BrightBlue];
const SERVICE_TINTS: [Tint; 4] = [
    Tint::Magenta,
    Tint::Cyan,
    Tint::BrightMagenta,
    Tint::BrightCyan,
];

impl Tint {
    /// Label color for a workload kind in the `cluster_index`-th cluster
    pub fn for_workload(kind: WorkloadKind, cluster_index: usize) -> Self {
        match kind {
            WorkloadKind::Pod => POD_TINTS[cluster_index % POD_TINTS.len()],
            WorkloadKind::Service => SERVICE_TINTS[cluster_index % SERVICE_TINTS.len()],
        }
    }

    fn paint(self, text: &str) -> ColoredString {
        let text = format!(" {} ", text);
        match self {
            Tint::Yellow => text.on_yellow(),
            Tint::Blue => text.on_blue(),
            Tint::Magenta => text.on_magenta(),
            Tint::Cyan => text.on_cyan(),
            Tint::BrightYellow => text.on_bright_yellow(),
            Tint::BrightBlue => text.on_bright_blue(),
            Tint::BrightMagenta => text.on_bright_magenta(),
            Tint::BrightCyan => text.on_bright_cyan(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub text: String,
    pub tint: Tint,
}

/// Content of one grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// green `Y`
    Reachable,
    /// red `N`
    Unreachable,
    /// red `E`
    Error,
    Blank,
}

impl From<&ProbeResult> for Mark {
    fn from(result: &ProbeResult) -> Self {
        match result {
            ProbeResult::Reachable => Mark::Reachable,
            ProbeResult::Unreachable => Mark::Unreachable,
            ProbeResult::Error(_) => Mark::Error,
            ProbeResult::Skipped => Mark::Blank,
        }
    }
}

impl Mark {
    fn paint(self) -> String {
        match self {
            Mark::Reachable => "  Y  ".on_green().to_string(),
            Mark::Unreachable => "  N  ".on_red().to_string(),
            Mark::Error => "  E  ".on_red().to_string(),
            Mark::Blank => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridRow {
    pub label: Label,
    pub cells: Vec<Mark>,
}

/// Renderable matrix: one labeled column per destination, one labeled row per source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    pub header: Vec<Label>,
    pub rows: Vec<GridRow>,
}

impl Grid {
    pub fn count(&self, mark: Mark) -> usize {
        self.rows
            .iter()
            .flat_map(|row| row.cells.iter())
            .filter(|m| **m == mark)
            .count()
    }
}

/// Build the grid for `matrix`, indexed by (source, destination) position.
///
/// Clusters are numbered in order of first appearance, destinations first,
/// which is also the order clusters were configured in.
pub fn render(sources: &[Workload], destinations: &[Workload], matrix: &[Vec<ProbeResult>]) -> Grid {
    let mut clusters: Vec<&str> = Vec::new();
    for workload in destinations.iter().chain(sources) {
        if !clusters.contains(&workload.cluster()) {
            clusters.push(workload.cluster());
        }
    }

    let label = |workload: &Workload| {
        let index = clusters
            .iter()
            .position(|c| *c == workload.cluster())
            .unwrap_or_default();
        Label {
            text: workload.name().to_string(),
            tint: Tint::for_workload(workload.kind, index),
        }
    };

    let header = destinations.iter().map(&label).collect();
    let rows = sources
        .iter()
        .zip(matrix)
        .map(|(source, results)| GridRow {
            label: label(source),
            cells: results.iter().map(Mark::from).collect(),
        })
        .collect();

    Grid { header, rows }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = TableBuilder::default();

        let mut header = vec![CORNER_LABEL.to_string()];
        header.extend(self.header.iter().map(|l| l.tint.paint(&l.text).to_string()));
        builder.set_header(header);

        for row in &self.rows {
            let mut record = vec![row.label.tint.paint(&row.label.text).to_string()];
            record.extend(row.cells.iter().map(|m| m.paint()));
            builder.push_record(record);
        }

        let mut table = builder.build();
        table.with(TableStyle::rounded());
        write!(f, "{}", table)
    }
}
