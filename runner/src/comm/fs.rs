use super::CommError;
use itertools::Itertools;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};
use tracing::debug;

/// rendezvous directory inside the job's result directory
pub const COMM_DIR: &str = "comm";

const BROADCAST_FILE: &str = "plan.yaml";
const COUNTER_PREFIX: &str = "counters_";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Collectives realized as files in a shared directory. Everything lands
/// through a rename, so a reader either misses a file or sees it whole.
#[derive(Debug)]
pub struct FsComm {
    session: PathBuf,
    rank: usize,
    size: usize,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl FsComm {
    pub fn new(session: PathBuf, rank: usize, size: usize) -> Result<Self, CommError> {
        fs::create_dir_all(&session)?;

        let comm = Self {
            session,
            rank,
            size,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        };

        // a crashed attempt of the same job id can leave payloads behind,
        // the leader clears them before anything fresh is published
        if rank == 0 {
            comm.clear_stale_files()?;
        }

        Ok(comm)
    }

    // TODO: back the poll off exponentially once fleets grow past a few hundred ranks
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn clear_stale_files(&self) -> Result<(), CommError> {
        for entry in fs::read_dir(&self.session)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();

            if file_name == BROADCAST_FILE || file_name.starts_with(COUNTER_PREFIX) {
                debug!(file = %file_name, "Removing stale rendezvous file");
                let _ = fs::remove_file(entry.path());
            }
        }

        Ok(())
    }

    fn publish(&self, path: &Path, content: &str) -> Result<(), CommError> {
        let staged = path.with_extension(format!("staged.{}", self.rank));
        fs::write(&staged, content)?;
        fs::rename(&staged, path)?;

        Ok(())
    }

    fn await_file(&self, path: &Path) -> Result<String, CommError> {
        let started = Instant::now();

        loop {
            match fs::read_to_string(path) {
                Ok(content) => return Ok(content),
                Err(error) if error.kind() == io::ErrorKind::NotFound => {}
                Err(error) => return Err(error.into()),
            }

            if let Some(timeout) = self.timeout {
                if started.elapsed() >= timeout {
                    return Err(CommError::Timeout);
                }
            }

            thread::sleep(self.poll_interval);
        }
    }

    pub fn broadcast<T>(&self, payload: Option<&T>) -> Result<T, CommError>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        let path = self.session.join(BROADCAST_FILE);

        match payload {
            Some(value) => {
                let content = serde_yaml::to_string(value)?;
                self.publish(&path, &content)?;
                debug!(path = ?path, bytes = content.len(), "Published the broadcast payload");

                Ok(value.clone())
            }
            None => {
                let content = self.await_file(&path)?;

                Ok(serde_yaml::from_str(&content)?)
            }
        }
    }

    pub fn allreduce_sum(&self, counts: &[u64]) -> Result<Vec<u64>, CommError> {
        let own = self.session.join(format!("{COUNTER_PREFIX}{}.csv", self.rank));
        self.publish(&own, &format!("{}\n", counts.iter().join(",")))?;

        let mut sums = vec![0u64; counts.len()];
        for rank in 0..self.size {
            let path = self.session.join(format!("{COUNTER_PREFIX}{rank}.csv"));
            let content = self.await_file(&path)?;

            for (slot, value) in sums.iter_mut().zip(parse_counters(content.trim())?) {
                *slot += value;
            }
        }

        Ok(sums)
    }
}

fn parse_counters(line: &str) -> Result<Vec<u64>, CommError> {
    line.split(',')
        .map(|field| field.trim().parse::<u64>())
        .collect::<Result<Vec<u64>, _>>()
        .map_err(|_| CommError::MalformedCounters(line.to_owned()))
}
