use crate::{
    comm::{CommError, Communicator},
    worker::RunCounters,
};
use std::{fs, path::Path};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to reduce the fleet counters")]
    Comm(#[from] CommError),
    #[error("Failed to write the report file")]
    WriteReport(#[from] std::io::Error),
}

/// Fleet-wide totals after the reduction, identical on every rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunTotals {
    pub attempted: u64,
    pub succeeded: u64,
}

impl RunTotals {
    pub fn remaining(&self) -> u64 {
        self.attempted.saturating_sub(self.succeeded)
    }
}

/// Fold the per-rank counters into fleet totals. Every rank participates in
/// the reduction even with nothing attempted; the leader additionally writes
/// the remaining-count file an outer scheduler polls for.
pub fn aggregate(
    comm: &Communicator,
    counters: RunCounters,
    report_path: Option<&Path>,
) -> Result<RunTotals, ReportError> {
    let summed = comm.allreduce_sum(&counters.to_counts())?;
    let totals = RunTotals {
        attempted: summed.first().copied().unwrap_or(0),
        succeeded: summed.get(1).copied().unwrap_or(0),
    };

    info!(
        attempted = totals.attempted,
        succeeded = totals.succeeded,
        remaining = totals.remaining(),
        "Fleet totals"
    );

    if comm.is_leader() {
        if let Some(path) = report_path {
            fs::write(path, format!("{}\n", totals.remaining()))?;
            info!(path = ?path, "Wrote the remaining-count report");
        }
    }

    Ok(totals)
}
