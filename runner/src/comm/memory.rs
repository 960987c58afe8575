use super::CommError;
use parking_lot::{Condvar, Mutex};
use serde::{de::DeserializeOwned, Serialize};
use std::{collections::BTreeMap, sync::Arc};

#[derive(Debug, Default)]
struct BusState {
    broadcast: Option<String>,
    counters: BTreeMap<usize, Vec<u64>>,
    abandoned: usize,
}

#[derive(Debug)]
struct BusInner {
    size: usize,
    state: Mutex<BusState>,
    changed: Condvar,
}

/// In-process fan-out bus for running a whole fleet as threads. Payloads go
/// through the same serialization as the filesystem variant, so the thread
/// fleet exercises the identical agreement path.
#[derive(Clone, Debug)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

impl MemoryBus {
    pub fn new(size: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                size,
                state: Mutex::new(BusState::default()),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn attach(&self, rank: usize) -> MemoryComm {
        MemoryComm {
            inner: Arc::clone(&self.inner),
            rank,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MemoryComm {
    inner: Arc<BusInner>,
    rank: usize,
}

impl MemoryComm {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Mark this member as gone so blocked collectives fail instead of
    /// stalling the remaining threads forever.
    pub fn abandon(&self) {
        let mut state = self.inner.state.lock();
        state.abandoned += 1;
        self.inner.changed.notify_all();
    }

    pub fn broadcast<T>(&self, payload: Option<&T>) -> Result<T, CommError>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        if let Some(value) = payload {
            let content = serde_yaml::to_string(value)?;
            let mut state = self.inner.state.lock();
            state.broadcast = Some(content);
            self.inner.changed.notify_all();

            return Ok(value.clone());
        }

        let mut state = self.inner.state.lock();
        loop {
            if let Some(content) = state.broadcast.as_deref() {
                return Ok(serde_yaml::from_str(content)?);
            }

            if state.abandoned > 0 {
                return Err(CommError::Abandoned);
            }

            self.inner.changed.wait(&mut state);
        }
    }

    pub fn allreduce_sum(&self, counts: &[u64]) -> Result<Vec<u64>, CommError> {
        let mut state = self.inner.state.lock();
        state.counters.insert(self.rank, counts.to_vec());
        self.inner.changed.notify_all();

        loop {
            if state.counters.len() == self.inner.size {
                let mut sums = vec![0u64; counts.len()];
                for values in state.counters.values() {
                    for (slot, value) in sums.iter_mut().zip(values.iter()) {
                        *slot += value;
                    }
                }

                return Ok(sums);
            }

            // whoever is missing is never going to arrive
            if state.counters.len() + state.abandoned >= self.inner.size {
                return Err(CommError::Abandoned);
            }

            self.inner.changed.wait(&mut state);
        }
    }
}
