use crate::{
    comm::{CommError, Communicator},
    config::{FleetLayout, RunConfig},
    history::{self, Classification, HistoryError},
    partition,
    records::RecordError,
    shard::{self, ShardError, ShardMap},
    tool,
    units::{self, SequenceUnit},
};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Failed to establish the shard map")]
    Shard(#[from] ShardError),
    #[error("Failed to reconcile the run history")]
    History(#[from] HistoryError),
    #[error("Failed to snapshot the before-state")]
    Snapshot(#[from] RecordError),
    #[error("Failed to agree on the plan across the fleet")]
    Comm(#[from] CommError),
}

/// The fleet-wide agreement on one run: the still-pending units in cost
/// order, plus the shard map they were classified under.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RunPlan {
    pub units: Vec<SequenceUnit>,
    pub shard_map: Option<ShardMap>,
    pub original_total: u64,
    pub pending_total: u64,
}

/// Establish the plan for this run. The leader classifies against history and
/// publishes; everyone else receives the exact same plan, so the fleet never
/// acts on divergent views of the dataset.
pub fn establish(
    config: &RunConfig,
    comm: &Communicator,
    layout: FleetLayout,
    pairs: &[(String, String)],
) -> Result<RunPlan, PlanError> {
    if comm.is_leader() {
        let plan = compute(config, layout, pairs)?;
        Ok(comm.broadcast(Some(&plan))?)
    } else {
        Ok(comm.broadcast::<RunPlan>(None)?)
    }
}

fn compute(
    config: &RunConfig,
    layout: FleetLayout,
    pairs: &[(String, String)],
) -> Result<RunPlan, PlanError> {
    let names = pairs.iter().map(|(name, _)| name.clone()).collect_vec();
    let renamed = units::uniquify_names(&names)
        .into_iter()
        .zip(pairs.iter())
        .map(|(name, (_, sequence))| (name, sequence.clone()))
        .collect_vec();
    let all_units = units::dedup_units(&renamed);

    // the layout must be fixed before anything consults history: completion
    // checks and alias links resolve through it
    let shard_map = ShardMap::establish(&config.shard_map_path(), config.shard.size, &all_units)?;

    let records = history::scan_history(&config.history_root())?;
    let upstream = history::load_upstream_sets(&config.upstream.completed_lists)?;
    let policy = config.retry_policy();

    let classes = history::classify_units(
        &all_units,
        &records,
        &policy,
        upstream.as_ref(),
        layout.job_id,
        |unit| {
            let dir = shard::unit_dir(&config.output_dir, shard_map.as_ref(), unit.canonical_name());
            tool::outputs_present(&config.tool.outputs, &dir)
        },
    );
    history::write_snapshots(&config.result_dir(layout.job_id), &all_units, &classes)?;

    let mut pending = all_units
        .iter()
        .zip(classes.iter())
        .filter(|(_, class)| **class == Classification::Pending)
        .map(|(unit, _)| unit.clone())
        .collect_vec();
    partition::order_by_cost(&mut pending);

    let count_of = |wanted: Classification| {
        classes.iter().filter(|class| **class == wanted).count()
    };
    info!(
        units = all_units.len(),
        done = count_of(Classification::AlreadyDone),
        skipped = count_of(Classification::SkipPermanent),
        gated = count_of(Classification::SkipUnmetDependency),
        pending = pending.len(),
        "Planned the run"
    );

    let pending_total = pending
        .iter()
        .map(|unit| unit.names.len() as u64)
        .sum::<u64>();

    Ok(RunPlan {
        units: pending,
        shard_map,
        original_total: pairs.len() as u64,
        pending_total,
    })
}
