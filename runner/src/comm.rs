pub mod fs;
pub mod memory;

#[cfg(test)]
mod fs_test;
#[cfg(test)]
mod memory_test;

use fs::FsComm;
use memory::MemoryComm;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommError {
    #[error("Failed to serialize a collective payload")]
    Payload(#[from] serde_yaml::Error),
    #[error("Failed to access the rendezvous directory")]
    Rendezvous(#[from] std::io::Error),
    #[error("Timed out waiting for the fleet")]
    Timeout,
    #[error("The broadcast root provided no payload")]
    MissingRoot,
    #[error("A fleet member abandoned the run")]
    Abandoned,
    #[error("Counter file content is malformed: {0}")]
    MalformedCounters(String),
}

/// All communicator variants the fleet can agree over
/// (this is deliberately an enum instead of dynamic dispatch to avoid the headache)
#[derive(Debug)]
pub enum Communicator {
    /// fleet of one, collectives are identity operations
    Single,
    /// rendezvous directory on the shared filesystem
    SharedFs(FsComm),
    /// in-process bus for the local thread fleet
    Memory(MemoryComm),
}

impl Communicator {
    pub fn rank(&self) -> usize {
        match self {
            Self::Single => 0,
            Self::SharedFs(comm) => comm.rank(),
            Self::Memory(comm) => comm.rank(),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Single => 1,
            Self::SharedFs(comm) => comm.size(),
            Self::Memory(comm) => comm.size(),
        }
    }

    pub fn is_leader(&self) -> bool {
        self.rank() == 0
    }

    /// Distribute the root's payload to every member. The root passes
    /// `Some`, everyone else `None`; all members return the agreed value.
    pub fn broadcast<T>(&self, payload: Option<&T>) -> Result<T, CommError>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        match self {
            Self::Single => payload.cloned().ok_or(CommError::MissingRoot),
            Self::SharedFs(comm) => comm.broadcast(payload),
            Self::Memory(comm) => comm.broadcast(payload),
        }
    }

    /// Element-wise sum of every member's counters; all members return the
    /// same totals. Barrier-like, the whole fleet must arrive.
    pub fn allreduce_sum(&self, counts: &[u64]) -> Result<Vec<u64>, CommError> {
        match self {
            Self::Single => Ok(counts.to_vec()),
            Self::SharedFs(comm) => comm.allreduce_sum(counts),
            Self::Memory(comm) => comm.allreduce_sum(counts),
        }
    }
}
