pub mod comm;
pub mod config;
pub mod fasta;
pub mod history;
pub mod partition;
pub mod plan;
pub mod records;
pub mod report;
pub mod shard;
pub mod tool;
pub mod units;
pub mod worker;

#[cfg(test)]
mod config_test;
#[cfg(test)]
mod partition_test;
#[cfg(test)]
mod shard_test;
#[cfg(test)]
mod units_test;

use comm::{CommError, Communicator};
use config::{ConfigErrors, FleetLayout, RunConfig};
use fasta::FastaError;
use plan::PlanError;
use report::{ReportError, RunTotals};
use thiserror::Error;
use tracing::info;
use worker::{Worker, WorkerError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to read the input")]
    Input(#[from] FastaError),
    #[error("Invalid configuration")]
    Config(#[from] ConfigErrors),
    #[error("Fleet coordination failed")]
    Comm(#[from] CommError),
    #[error("Failed to establish the run plan")]
    Plan(#[from] PlanError),
    #[error("A worker failed")]
    Worker(#[from] WorkerError),
    #[error("Failed to account the run")]
    Report(#[from] ReportError),
    #[error("Failed to prepare the run directories")]
    Prepare(#[from] std::io::Error),
    #[error("The local fleet did not complete")]
    LocalFleet,
}

/// One rank's whole run: read the input, agree on the plan, work the stripe,
/// fold the counters. Every rank flows through every stage even when its
/// stripe is empty, the collectives require it.
pub fn run_rank(
    config: &RunConfig,
    layout: FleetLayout,
    comm: &Communicator,
) -> Result<RunTotals, PipelineError> {
    std::fs::create_dir_all(config.result_dir(layout.job_id))?;
    std::fs::create_dir_all(&config.output_dir)?;

    let pairs = fasta::read_fasta(&config.input)?;
    let plan = plan::establish(config, comm, layout, &pairs)?;

    let stripe = partition::stripe(&plan.units, comm.rank(), comm.size());
    info!(
        rank = comm.rank(),
        size = comm.size(),
        assigned = stripe.len(),
        pending = plan.units.len(),
        "Starting the stripe"
    );

    let mut worker = Worker::new(config, plan.shard_map.as_ref(), comm.rank(), layout.job_id)?;
    let counters = worker.run(&stripe)?;

    Ok(report::aggregate(comm, counters, config.report_path.as_deref())?)
}
