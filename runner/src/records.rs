use std::{
    fmt,
    fs::{self, OpenOptions},
    io::Write,
    path::Path,
};
use thiserror::Error;
use tracing::warn;

/// shared result log appended by every rank of a job
pub const RESULT_LOG: &str = "processed.csv";

// before-state snapshots, one name per line, diagnostic only
pub const SNAPSHOT_COMPLETE: &str = "before_complete.csv";
pub const SNAPSHOT_INCOMPLETE: &str = "before_incomplete.csv";
pub const SNAPSHOT_NOALIGN: &str = "before_noalign.csv";
pub const SNAPSHOT_SKIP: &str = "before_skip.csv";

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Failed to access the result log")]
    LogAccess(#[from] std::io::Error),
}

/// Outcome of processing one name, as it appears in the result log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnitStatus {
    Ok,
    Timeout,
    Unknown,
    NoAlignment,
}

impl UnitStatus {
    /// the exact strings consumed by downstream tooling, do not reword
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Timeout => "NG_timeout",
            Self::Unknown => "NG_unknown",
            Self::NoAlignment => "NG_noalignment",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "OK" => Some(Self::Ok),
            "NG_timeout" => Some(Self::Timeout),
            "NG_unknown" => Some(Self::Unknown),
            "NG_noalignment" => Some(Self::NoAlignment),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// statuses that block a retry until the retry policy releases them
    pub fn is_disqualifying(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unknown)
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the result log.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultLogEntry {
    pub name: String,
    pub length: usize,
    pub status: UnitStatus,
    pub total_time: f64,
    pub phase_a_time: f64,
    pub phase_b_time: f64,
}

impl ResultLogEntry {
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{:.3},{:.3},{:.3}\n",
            self.name, self.length, self.status, self.total_time, self.phase_a_time, self.phase_b_time
        )
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.split(',');
        let name = fields.next()?;
        let length = fields.next()?.parse().ok()?;
        let status = UnitStatus::parse(fields.next()?)?;
        let total_time = fields.next()?.parse().ok()?;
        let phase_a_time = fields.next()?.parse().ok()?;
        let phase_b_time = fields.next()?.parse().ok()?;

        if fields.next().is_some() || name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_owned(),
            length,
            status,
            total_time,
            phase_a_time,
            phase_b_time,
        })
    }
}

/// Append one entry to the shared result log.
/// The whole line goes through a single write under O_APPEND so concurrent
/// ranks never interleave partial lines.
pub fn append_entry(log_path: &Path, entry: &ResultLogEntry) -> Result<(), RecordError> {
    let mut log = OpenOptions::new().append(true).create(true).open(log_path)?;
    log.write_all(entry.to_line().as_bytes())?;

    Ok(())
}

/// Read a whole result log, skipping lines that do not parse.
pub fn read_log(log_path: &Path) -> Result<Vec<ResultLogEntry>, RecordError> {
    let content = fs::read_to_string(log_path)?;
    let mut entries = Vec::new();

    for line in content.lines() {
        if line.is_empty() {
            continue;
        }

        match ResultLogEntry::parse_line(line) {
            Some(entry) => entries.push(entry),
            None => warn!(line = line, "Skipping malformed result log line"),
        }
    }

    Ok(entries)
}

/// Write a one-name-per-line list, the snapshot and upstream-set format.
pub fn write_name_list(path: &Path, names: &[String]) -> Result<(), RecordError> {
    let mut content = names.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    fs::write(path, content)?;

    Ok(())
}

pub fn read_name_list(path: &Path) -> Result<Vec<String>, RecordError> {
    let content = fs::read_to_string(path)?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}
