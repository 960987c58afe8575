use crate::{
    records::{
        self, RecordError, UnitStatus, RESULT_LOG, SNAPSHOT_COMPLETE, SNAPSHOT_INCOMPLETE,
        SNAPSHOT_NOALIGN, SNAPSHOT_SKIP,
    },
    units::SequenceUnit,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("Failed to scan the history root")]
    ScanFailed(#[from] std::io::Error),
    #[error("Failed to read a prior result log")]
    UnreadableLog(#[from] RecordError),
    #[error("Failed to read the upstream completion list {path:?}")]
    UnreadableUpstreamList { path: PathBuf, source: RecordError },
}

/// One prior outcome, parsed back out of an earlier job's result log.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryRecord {
    pub name: String,
    pub status: UnitStatus,
    pub job_id: u64,
    pub timestamp: SystemTime,
}

/// When previously failed units become eligible again, per status class.
/// A class is released by naming a reset job id: everything that failed
/// before that job id is retried from that job id onward. Unset means the
/// class is never retried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout_reset_job: Option<u64>,
    pub failure_reset_job: Option<u64>,
}

impl RetryPolicy {
    fn reset_job(&self, status: UnitStatus) -> Option<u64> {
        match status {
            UnitStatus::Timeout => self.timeout_reset_job,
            UnitStatus::Unknown => self.failure_reset_job,
            _ => None,
        }
    }

    pub fn allows_retry(&self, status: UnitStatus, failed_job: u64, current_job: u64) -> bool {
        match self.reset_job(status) {
            Some(reset) => failed_job < reset && reset <= current_job,
            None => false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    AlreadyDone,
    SkipPermanent,
    SkipUnmetDependency,
    Pending,
}

/// Collect every record from `<history_root>/<job id>/processed.csv`.
/// Entries of the current job id are included as well; a crashed earlier
/// attempt of the same job leaves valid history behind.
pub fn scan_history(history_root: &Path) -> Result<Vec<HistoryRecord>, HistoryError> {
    let mut history = Vec::new();

    if !history_root.is_dir() {
        debug!(root = ?history_root, "No history root yet, first run");
        return Ok(history);
    }

    for entry in fs::read_dir(history_root)? {
        let entry = entry?;
        let job_id = match entry.file_name().to_str().and_then(|name| name.parse::<u64>().ok()) {
            Some(job_id) => job_id,
            None => {
                debug!(entry = ?entry.file_name(), "Skipping non-numeric history entry");
                continue;
            }
        };

        let log_path = entry.path().join(RESULT_LOG);
        if !log_path.is_file() {
            debug!(job_id = job_id, "History directory has no result log yet");
            continue;
        }

        let timestamp = fs::metadata(&log_path)
            .and_then(|metadata| metadata.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        for record in records::read_log(&log_path)? {
            history.push(HistoryRecord {
                name: record.name,
                status: record.status,
                job_id,
                timestamp,
            });
        }
    }

    debug!(records = history.len(), "Scanned run history");

    Ok(history)
}

/// Intersect the configured upstream completion lists. A unit is usable only
/// once every upstream sub-task finished it, so membership means presence in
/// all lists. No lists configured means no gating.
pub fn load_upstream_sets(paths: &[PathBuf]) -> Result<Option<BTreeSet<String>>, HistoryError> {
    let mut completed: Option<BTreeSet<String>> = None;

    for path in paths {
        let names = records::read_name_list(path).map_err(|source| {
            HistoryError::UnreadableUpstreamList {
                path: path.clone(),
                source,
            }
        })?;
        let set: BTreeSet<String> = names.into_iter().collect();

        completed = Some(match completed {
            None => set,
            Some(acc) => acc.intersection(&set).cloned().collect(),
        });
    }

    Ok(completed)
}

/// Classify every unit against the accumulated history, the retry policy,
/// the upstream gate and a live output presence check, in that order of
/// precedence.
pub fn classify_units<F>(
    units: &[SequenceUnit],
    history: &[HistoryRecord],
    policy: &RetryPolicy,
    upstream: Option<&BTreeSet<String>>,
    current_job_id: u64,
    output_present: F,
) -> Vec<Classification>
where
    F: Fn(&SequenceUnit) -> bool,
{
    let mut by_name: BTreeMap<&str, Vec<&HistoryRecord>> = BTreeMap::new();
    for record in history {
        by_name.entry(record.name.as_str()).or_default().push(record);
    }

    units
        .iter()
        .map(|unit| {
            let canonical = unit.canonical_name();
            let prior = by_name.get(canonical).map(Vec::as_slice).unwrap_or(&[]);

            if prior.iter().any(|record| record.status.is_ok()) || output_present(unit) {
                return Classification::AlreadyDone;
            }

            // only the most recent disqualifying outcome counts
            let latest_failure = prior
                .iter()
                .filter(|record| record.status.is_disqualifying())
                .max_by_key(|record| record.job_id);

            if let Some(failure) = latest_failure {
                if !policy.allows_retry(failure.status, failure.job_id, current_job_id) {
                    return Classification::SkipPermanent;
                }
            }

            if let Some(completed) = upstream {
                if !completed.contains(canonical) {
                    return Classification::SkipUnmetDependency;
                }
            }

            Classification::Pending
        })
        .collect()
}

/// Dump the before-state of the run, one file per class, every member name.
pub fn write_snapshots(
    result_dir: &Path,
    units: &[SequenceUnit],
    classes: &[Classification],
) -> Result<(), RecordError> {
    let mut complete = Vec::new();
    let mut incomplete = Vec::new();
    let mut noalign = Vec::new();
    let mut skip = Vec::new();

    for (unit, class) in units.iter().zip(classes.iter()) {
        let bucket = match class {
            Classification::AlreadyDone => &mut complete,
            Classification::Pending => &mut incomplete,
            Classification::SkipUnmetDependency => &mut noalign,
            Classification::SkipPermanent => &mut skip,
        };
        bucket.extend(unit.names.iter().cloned());
    }

    records::write_name_list(&result_dir.join(SNAPSHOT_COMPLETE), &complete)?;
    records::write_name_list(&result_dir.join(SNAPSHOT_INCOMPLETE), &incomplete)?;
    records::write_name_list(&result_dir.join(SNAPSHOT_NOALIGN), &noalign)?;
    records::write_name_list(&result_dir.join(SNAPSHOT_SKIP), &skip)?;

    Ok(())
}
