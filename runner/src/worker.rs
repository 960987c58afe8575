use crate::{
    config::RunConfig,
    records::{self, RecordError, ResultLogEntry, UnitStatus},
    shard::{self, ShardMap},
    tool::{self, ToolOutcome},
    units::SequenceUnit,
};
use nix::unistd::gethostname;
use once_cell::sync::Lazy;
use std::{
    fs,
    os::unix::fs as unix_fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, info, warn};

// cached once, every worker log line carries the node name
static HOSTNAME: Lazy<String> = Lazy::new(|| {
    gethostname()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| String::from("unknown"))
});

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to prepare the rank temp directory")]
    TempDir(#[from] std::io::Error),
    // losing an accounting record would defeat the completion detection of
    // every future run, so the rank aborts instead of carrying on
    #[error("Failed to account a unit outcome")]
    Accounting(#[from] RecordError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub attempted: u64,
    pub succeeded: u64,
}

impl RunCounters {
    pub fn to_counts(&self) -> Vec<u64> {
        vec![self.attempted, self.succeeded]
    }
}

/// Works through one rank's stripe: per unit an idempotent completion check,
/// one bounded tool invocation, alias materialization and exactly one result
/// log append per member name.
pub struct Worker<'a> {
    config: &'a RunConfig,
    shard_map: Option<&'a ShardMap>,
    rank: usize,
    log_path: PathBuf,
    temp_dir: PathBuf,
    counters: RunCounters,
}

impl<'a> Worker<'a> {
    pub fn new(
        config: &'a RunConfig,
        shard_map: Option<&'a ShardMap>,
        rank: usize,
        job_id: u64,
    ) -> Result<Self, WorkerError> {
        let temp_dir = config.temp_dir.join(format!("seqfleet_{job_id}_rank_{rank}"));
        fs::create_dir_all(&temp_dir)?;

        Ok(Self {
            config,
            shard_map,
            rank,
            log_path: config.result_log_path(job_id),
            temp_dir,
            counters: RunCounters::default(),
        })
    }

    /// Process the assigned units strictly in assignment order.
    pub fn run(&mut self, units: &[SequenceUnit]) -> Result<RunCounters, WorkerError> {
        for (index, unit) in units.iter().enumerate() {
            self.process_unit(unit)?;
            info!(
                host = HOSTNAME.as_str(),
                rank = self.rank,
                done = index + 1,
                total = units.len(),
                unit = unit.canonical_name(),
                "Processed unit"
            );
        }

        if let Err(error) = fs::remove_dir_all(&self.temp_dir) {
            debug!(error = ?error, "Failed to remove the rank temp directory");
        }

        Ok(self.counters)
    }

    fn process_unit(&mut self, unit: &SequenceUnit) -> Result<(), WorkerError> {
        let canonical = unit.canonical_name();
        let unit_dir = self.output_dir_for(canonical);
        self.counters.attempted += unit.names.len() as u64;

        // presence check, not a log check: an interrupted run may have
        // finished this unit without getting its record out
        if tool::outputs_present(&self.config.tool.outputs, &unit_dir) {
            debug!(unit = canonical, "Outputs already present, skipping the tool");
            return self.satisfy_unit(unit, &unit_dir, 0.0, 0.0, 0.0);
        }

        // the upstream lists let this unit through, but its prerequisite
        // data can still be missing on disk
        if let Some(data_dir) = &self.config.upstream.data_dir {
            let prereq_dir = shard::unit_dir(data_dir, self.shard_map, canonical);
            if !prereq_dir.exists() {
                warn!(unit = canonical, path = ?prereq_dir, "Prerequisite data is missing");
                return self.record_all(unit, UnitStatus::NoAlignment, 0.0, 0.0, 0.0);
            }
        }

        if let Err(error) = ensure_dir(&unit_dir) {
            warn!(unit = canonical, error = ?error, "Cannot create the unit directory");
            return self.record_all(unit, UnitStatus::Unknown, 0.0, 0.0, 0.0);
        }

        let input = self.temp_dir.join(format!("{canonical}.fasta"));
        if let Err(error) = fs::write(&input, format!(">{canonical}\n{}\n", unit.sequence)) {
            warn!(unit = canonical, error = ?error, "Cannot stage the tool input");
            return self.record_all(unit, UnitStatus::Unknown, 0.0, 0.0, 0.0);
        }

        let outcome = tool::invoke(
            &self.config.tool.exec,
            &self.config.tool.params,
            &input,
            &unit_dir,
            self.config.tool.timeout(),
        );
        let _ = fs::remove_file(&input);

        match outcome {
            ToolOutcome::Completed {
                total_time,
                phase_a_time,
                phase_b_time,
            } => {
                if tool::outputs_present(&self.config.tool.outputs, &unit_dir) {
                    self.satisfy_unit(unit, &unit_dir, total_time, phase_a_time, phase_b_time)
                } else {
                    warn!(unit = canonical, "Tool exited cleanly but left outputs missing");
                    self.record_all(unit, UnitStatus::Unknown, total_time, phase_a_time, phase_b_time)
                }
            }
            ToolOutcome::TimedOut => {
                warn!(
                    unit = canonical,
                    timeout = self.config.tool.timeout,
                    "Tool timed out"
                );
                let total_time = self.config.tool.timeout().as_secs_f64();
                self.record_all(unit, UnitStatus::Timeout, total_time, 0.0, 0.0)
            }
            ToolOutcome::Failed { detail } => {
                warn!(unit = canonical, detail = %detail, "Tool failed");
                self.record_all(unit, UnitStatus::Unknown, 0.0, 0.0, 0.0)
            }
        }
    }

    /// The canonical outputs exist: record them, then materialize and record
    /// every alias so future history scans see the whole unit as complete.
    fn satisfy_unit(
        &mut self,
        unit: &SequenceUnit,
        unit_dir: &Path,
        total_time: f64,
        phase_a_time: f64,
        phase_b_time: f64,
    ) -> Result<(), WorkerError> {
        self.record(
            unit.canonical_name(),
            unit,
            UnitStatus::Ok,
            total_time,
            phase_a_time,
            phase_b_time,
        )?;
        self.counters.succeeded += 1;

        for alias in unit.aliases() {
            if self.link_alias(alias, unit, unit_dir) {
                self.record(alias, unit, UnitStatus::Ok, 0.0, 0.0, 0.0)?;
                self.counters.succeeded += 1;
            } else {
                self.record(alias, unit, UnitStatus::Unknown, 0.0, 0.0, 0.0)?;
            }
        }

        Ok(())
    }

    /// Satisfy an alias with relative symlinks into the canonical directory,
    /// falling back to plain copies where the filesystem refuses links.
    fn link_alias(&self, alias: &str, unit: &SequenceUnit, unit_dir: &Path) -> bool {
        let alias_dir = self.output_dir_for(alias);
        if let Err(error) = ensure_dir(&alias_dir) {
            warn!(alias = alias, error = ?error, "Cannot create the alias directory");
            return false;
        }

        let mut satisfied = true;
        for output in &self.config.tool.outputs {
            let link = alias_dir.join(output);
            if link.exists() {
                continue;
            }

            let target = self.relative_canonical(unit.canonical_name(), output);
            if unix_fs::symlink(&target, &link).is_ok() {
                continue;
            }

            if let Err(error) = fs::copy(unit_dir.join(output), &link) {
                warn!(
                    alias = alias,
                    output = output.as_str(),
                    error = ?error,
                    "Cannot materialize an alias output"
                );
                satisfied = false;
            }
        }

        satisfied
    }

    /// Relative link target from an alias directory to a canonical output,
    /// so the whole tree stays relocatable.
    fn relative_canonical(&self, canonical: &str, output: &str) -> PathBuf {
        let mut target = PathBuf::from("..");

        if self.shard_map.is_some() {
            // alias directories sit one shard level deeper
            target.push("..");
            if let Some(shard) = self.shard_map.and_then(|map| map.get(canonical)) {
                target.push(shard);
            }
        }

        target.push(canonical);
        target.push(output);

        target
    }

    fn output_dir_for(&self, name: &str) -> PathBuf {
        shard::unit_dir(&self.config.output_dir, self.shard_map, name)
    }

    fn record(
        &self,
        name: &str,
        unit: &SequenceUnit,
        status: UnitStatus,
        total_time: f64,
        phase_a_time: f64,
        phase_b_time: f64,
    ) -> Result<(), WorkerError> {
        records::append_entry(
            &self.log_path,
            &ResultLogEntry {
                name: name.to_owned(),
                length: unit.sequence.len(),
                status,
                total_time,
                phase_a_time,
                phase_b_time,
            },
        )?;

        Ok(())
    }

    fn record_all(
        &self,
        unit: &SequenceUnit,
        status: UnitStatus,
        total_time: f64,
        phase_a_time: f64,
        phase_b_time: f64,
    ) -> Result<(), WorkerError> {
        for name in &unit.names {
            self.record(name, unit, status, total_time, phase_a_time, phase_b_time)?;
        }

        Ok(())
    }
}

// create-if-absent with tolerated races: only report failure when the
// directory is genuinely not there afterwards
fn ensure_dir(path: &Path) -> std::io::Result<()> {
    match fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(error) => {
            if path.is_dir() {
                Ok(())
            } else {
                Err(error)
            }
        }
    }
}
