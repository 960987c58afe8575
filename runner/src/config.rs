use crate::{history::RetryPolicy, records, shard};
use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::File,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use thiserror::Error;
use tracing::error;

// launcher environments the fleet parameters can be picked up from
const RANK_VARIABLES: &[&str] = &["OMPI_COMM_WORLD_RANK", "PMIX_RANK", "SLURM_PROCID"];
const SIZE_VARIABLES: &[&str] = &["OMPI_COMM_WORLD_SIZE", "OMPI_UNIVERSE_SIZE", "SLURM_NTASKS"];
const JOB_ID_VARIABLES: &[&str] = &["PJM_JOBID", "SLURM_JOB_ID"];

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound)
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Failed to read the config file")]
    Unreadable(std::io::Error),
    #[error("Config file is not valid YAML")]
    InvalidYaml(#[from] serde_yaml::Error),
    #[error("File not found")]
    FileNotFound,
    #[error("Metadata not found")]
    MetadataNotFound(#[from] std::io::Error),
    #[error("No job id was provided")]
    MissingJobId,
    #[error("Fleet layout is invalid: {0}")]
    InvalidFleet(String),
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    // input sequences, one fleet-wide FASTA
    pub input: PathBuf,
    // root under which per-unit output directories are materialized
    pub output_dir: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    // remaining-count report for resubmission automation
    #[serde(default)]
    pub report_path: Option<PathBuf>,

    pub tool: ToolConfig,
    #[serde(default)]
    pub shard: ShardConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub fleet: FleetConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    pub exec: PathBuf,
    #[serde(default)]
    pub params: Vec<String>,
    // filenames the tool must leave in the unit directory on success
    pub outputs: Vec<String>,
    // per-unit timeout in seconds
    pub timeout: u64,
}

impl ToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ShardConfig {
    // bounded per-directory fanout, ignored when a persisted map exists
    #[serde(default)]
    pub size: Option<usize>,
    // defaults to <output_dir>/shard_map.csv
    #[serde(default)]
    pub map_path: Option<PathBuf>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default)]
    pub timeout_reset_job: Option<u64>,
    #[serde(default)]
    pub failure_reset_job: Option<u64>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    // on-disk root checked per unit for prerequisite data
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    // completion lists whose intersection gates the current input
    #[serde(default)]
    pub completed_lists: Vec<PathBuf>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    #[serde(default)]
    pub rank: Option<usize>,
    #[serde(default)]
    pub size: Option<usize>,
    #[serde(default)]
    pub job_id: Option<u64>,
    // optional bound on the barrier-like collectives, in seconds
    #[serde(default)]
    pub collective_timeout: Option<u64>,
}

/// The resolved fleet parameters of this process, populated once at startup
/// and never read from the environment again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FleetLayout {
    pub rank: usize,
    pub size: usize,
    pub job_id: u64,
}

impl FleetConfig {
    /// Rank, size and job id from the config if set, otherwise from the
    /// launcher environment. Rank falls back to 0 and size to 1 for bare
    /// local runs; the job id has no sane fallback.
    pub fn resolve(&self) -> Result<FleetLayout, ConfigErrors> {
        let rank = self.rank.or_else(|| env_number(RANK_VARIABLES)).unwrap_or(0);
        let size = self.size.or_else(|| env_number(SIZE_VARIABLES)).unwrap_or(1);
        let job_id = self.resolve_job_id()?;

        if size == 0 {
            return Err(ConfigErrors::InvalidFleet("fleet size cannot be 0".into()));
        }

        if rank >= size {
            return Err(ConfigErrors::InvalidFleet(format!(
                "rank {rank} is out of range for a fleet of {size}"
            )));
        }

        Ok(FleetLayout { rank, size, job_id })
    }

    pub fn resolve_job_id(&self) -> Result<u64, ConfigErrors> {
        self.job_id
            .or_else(|| env_number(JOB_ID_VARIABLES))
            .ok_or(ConfigErrors::MissingJobId)
    }

    pub fn collective_timeout(&self) -> Option<Duration> {
        self.collective_timeout.map(Duration::from_secs)
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let file = File::open(path).map_err(ConfigErrors::Unreadable)?;

        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn history_root(&self) -> PathBuf {
        self.log_dir.join("result")
    }

    pub fn result_dir(&self, job_id: u64) -> PathBuf {
        self.history_root().join(job_id.to_string())
    }

    pub fn result_log_path(&self, job_id: u64) -> PathBuf {
        self.result_dir(job_id).join(records::RESULT_LOG)
    }

    pub fn shard_map_path(&self) -> PathBuf {
        self.shard
            .map_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join(shard::SHARD_MAP_FILE))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout_reset_job: self.retry.timeout_reset_job,
            failure_reset_job: self.retry.failure_reset_job,
        }
    }

    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if !self.input.is_file() {
            error!(
                "input {} is not a readable file",
                self.input.to_string_lossy()
            );
            contains_error = true;
        }

        if !self.tool.exec.is_file() {
            error!(
                "Failed to find tool.exec. Either not a file or not found at {}",
                self.tool.exec.to_string_lossy()
            );
            contains_error = true;
        } else {
            match check_executable(&self.tool.exec) {
                Ok(is_executable) => {
                    if !is_executable {
                        error!(
                            "tool.exec {} is not executable, this might cause problems",
                            self.tool.exec.to_string_lossy()
                        );
                        contains_error = true;
                    }
                }
                Err(e) => {
                    error!(
                        "Failed to determine if tool.exec ({}) is an executable: {e}",
                        self.tool.exec.to_string_lossy()
                    );
                    contains_error = true;
                }
            }
        }

        if self.tool.outputs.is_empty() {
            error!("tool.outputs cannot be empty, completion checks need at least one expected filename");
            contains_error = true;
        }

        if self.tool.timeout == 0 {
            error!("tool.timeout cannot be 0, every unit would time out immediately");
            contains_error = true;
        }

        if self.shard.size == Some(0) {
            error!("shard.size cannot be 0");
            contains_error = true;
        }

        for path in self.upstream.completed_lists.iter() {
            if !path.is_file() {
                error!(
                    "upstream.completed_lists entry {} was not found, it would gate every unit",
                    path.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if let Some(data_dir) = &self.upstream.data_dir {
            if !data_dir.is_dir() {
                error!(
                    "upstream.data_dir {} is not a directory",
                    data_dir.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if let Some(report_path) = &self.report_path {
            if let Some(parent) = report_path.parent() {
                if !parent.as_os_str().is_empty() && !parent.is_dir() {
                    error!(
                        "report_path parent {} does not exist",
                        parent.to_string_lossy()
                    );
                    contains_error = true;
                }
            }
        }

        contains_error
    }
}

fn env_number<T: FromStr>(variables: &[&str]) -> Option<T> {
    variables
        .iter()
        .find_map(|name| env::var(name).ok().and_then(|value| value.parse().ok()))
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("log")
}

// the temp dir comes from the environment with a fallback to /tmp
fn default_temp_dir() -> PathBuf {
    env::var("TMPDIR")
        .map(PathBuf::from)
        .unwrap_or(PathBuf::from("/tmp"))
}
