use chrono::{DateTime, Local};
use clap::Parser;
use seqfleet_runner::records::{
    self, RecordError, RESULT_LOG, SNAPSHOT_COMPLETE, SNAPSHOT_INCOMPLETE, SNAPSHOT_NOALIGN,
    SNAPSHOT_SKIP,
};
use std::{
    fs,
    path::{Path, PathBuf},
    process::exit,
    time::SystemTime,
};
use thiserror::Error;
use tracing::error;
use tracing_subscriber::EnvFilter;


#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Log directory of the runner, the job table is read from its result tree
    #[arg(long, default_value = "log")]
    log_dir: PathBuf,

    /// Order the table by last update instead of job id
    #[arg(long)]
    sort_by_time: bool,
}

#[derive(Error, Debug)]
enum StatusError {
    #[error("Failed to scan the result tree")]
    Scan(#[from] std::io::Error),
    #[error("Failed to read a job's records")]
    Records(#[from] RecordError),
}

/// One row of the job table, assembled from a job's result directory.
#[derive(Debug)]
struct JobStatus {
    job_id: u64,
    updated: Option<SystemTime>,
    complete_before: usize,
    incomplete_before: usize,
    noalign_before: usize,
    skip_before: usize,
    success: usize,
    failure: usize,
}

impl JobStatus {
    fn read(job_id: u64, result_dir: &Path) -> Result<Self, StatusError> {
        let log_path = result_dir.join(RESULT_LOG);

        // a planned job may not have produced any results yet
        let (success, failure, updated) = if log_path.is_file() {
            let entries = records::read_log(&log_path)?;
            let success = entries.iter().filter(|entry| entry.status.is_ok()).count();

            (
                success,
                entries.len() - success,
                fs::metadata(&log_path)?.modified().ok(),
            )
        } else {
            (0, 0, fs::metadata(result_dir)?.modified().ok())
        };

        Ok(Self {
            job_id,
            updated,
            complete_before: snapshot_len(result_dir, SNAPSHOT_COMPLETE),
            incomplete_before: snapshot_len(result_dir, SNAPSHOT_INCOMPLETE),
            noalign_before: snapshot_len(result_dir, SNAPSHOT_NOALIGN),
            skip_before: snapshot_len(result_dir, SNAPSHOT_SKIP),
            success,
            failure,
        })
    }

    /// Share of the job's workload that is done, counting both what was
    /// already complete going in and what this job finished.
    fn progress(&self) -> f64 {
        let total = self.complete_before + self.incomplete_before;
        if total == 0 {
            return 100.0;
        }

        (self.complete_before + self.success) as f64 * 100.0 / total as f64
    }

    fn updated_stamp(&self) -> String {
        match self.updated {
            Some(updated) => DateTime::<Local>::from(updated)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            None => "-".to_owned(),
        }
    }
}

fn snapshot_len(result_dir: &Path, file: &str) -> usize {
    records::read_name_list(&result_dir.join(file))
        .map(|names| names.len())
        .unwrap_or(0)
}

fn collect(log_dir: &Path) -> Result<Vec<JobStatus>, StatusError> {
    let root = log_dir.join("result");
    let mut jobs = Vec::new();

    if !root.is_dir() {
        return Ok(jobs);
    }

    for entry in fs::read_dir(&root)? {
        let entry = entry?;
        let job_id = match entry
            .file_name()
            .to_str()
            .and_then(|name| name.parse::<u64>().ok())
        {
            Some(job_id) => job_id,
            None => continue,
        };

        jobs.push(JobStatus::read(job_id, &entry.path())?);
    }

    jobs.sort_by_key(|job| job.job_id);

    Ok(jobs)
}

fn print_table(jobs: &[JobStatus]) {
    if jobs.is_empty() {
        println!("No data!");
        return;
    }

    println!(
        "{:>10} {:>19} {:>10} {:>12} {:>9} {:>7} {:>8} {:>8} {:>11}",
        "Job ID",
        "Last update",
        "#Compl.(b)",
        "#Incompl.(b)",
        "#NoAlign.",
        "#Skip",
        "#Success",
        "#Failure",
        "Progress[%]"
    );

    for job in jobs {
        println!(
            "{:>10} {:>19} {:>10} {:>12} {:>9} {:>7} {:>8} {:>8} {:>11.1}",
            job.job_id,
            job.updated_stamp(),
            job.complete_before,
            job.incomplete_before,
            job.noalign_before,
            job.skip_before,
            job.success,
            job.failure,
            job.progress(),
        );
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut jobs = match collect(&cli.log_dir) {
        Ok(jobs) => jobs,
        Err(error) => {
            error!(error = ?error, "Failed to scan {}", cli.log_dir.display());
            exit(1);
        }
    };

    if cli.sort_by_time {
        jobs.sort_by_key(|job| job.updated);
    }

    print_table(&jobs);
}
