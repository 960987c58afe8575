use crate::units::SequenceUnit;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    process,
};
use thiserror::Error;
use tracing::{debug, info, warn};

pub const SHARD_MAP_FILE: &str = "shard_map.csv";

#[derive(Error, Debug)]
pub enum ShardError {
    #[error("Failed to access the shard map file")]
    MapAccess(#[from] std::io::Error),
    #[error("Shard map line is malformed: {0}")]
    MalformedLine(String),
    #[error("Shard map has no entry for {0}")]
    MissingEntry(String),
}

/// name -> shard id, the bounded-fanout directory layout of a dataset.
/// Write once, read many; downstream phases reuse the persisted file.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ShardMap {
    entries: BTreeMap<String, String>,
}

impl ShardMap {
    /// Assign `floor(name index / shard_size)` over the deterministic unit
    /// order, names within a unit in their sorted order.
    pub fn build(units: &[SequenceUnit], shard_size: usize) -> Self {
        let mut entries = BTreeMap::new();
        let mut index = 0usize;

        for unit in units {
            for name in &unit.names {
                entries.insert(name.clone(), (index / shard_size).to_string());
                index += 1;
            }
        }

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn load(path: &Path) -> Result<Self, ShardError> {
        let content = fs::read_to_string(path)?;
        let mut entries = BTreeMap::new();

        for line in content.lines() {
            if line.is_empty() {
                continue;
            }

            match line.split_once(',') {
                Some((name, shard)) if !name.is_empty() && !shard.is_empty() => {
                    entries.insert(name.to_owned(), shard.to_owned());
                }
                _ => return Err(ShardError::MalformedLine(line.to_owned())),
            }
        }

        Ok(Self { entries })
    }

    /// Persist unless the file already exists. The content lands through a
    /// rename so a concurrent creator is tolerated; both ranks computed the
    /// same map from the same unit order. Returns whether we wrote it.
    pub fn persist_once(&self, path: &Path) -> Result<bool, ShardError> {
        if path.exists() {
            debug!(path = ?path, "Shard map already persisted, leaving it in place");
            return Ok(false);
        }

        let mut content = String::new();
        for (name, shard) in &self.entries {
            content.push_str(name);
            content.push(',');
            content.push_str(shard);
            content.push('\n');
        }

        let staged = path.with_extension(format!("tmp.{}", process::id()));
        fs::write(&staged, content)?;
        fs::rename(&staged, path)?;
        info!(path = ?path, entries = self.entries.len(), "Persisted shard map");

        Ok(true)
    }

    /// Every current name must be covered before any rank starts working.
    pub fn ensure_covers(&self, units: &[SequenceUnit]) -> Result<(), ShardError> {
        for unit in units {
            for name in &unit.names {
                if !self.entries.contains_key(name) {
                    return Err(ShardError::MissingEntry(name.clone()));
                }
            }
        }

        Ok(())
    }

    /// Reuse the persisted map when there is one, otherwise build and persist
    /// from `shard_size`. Neither configured means a flat layout.
    pub fn establish(
        path: &Path,
        shard_size: Option<usize>,
        units: &[SequenceUnit],
    ) -> Result<Option<Self>, ShardError> {
        if path.is_file() {
            if shard_size.is_some() {
                warn!(
                    path = ?path,
                    "Reusing the persisted shard map, the configured shard size is ignored"
                );
            }

            let map = Self::load(path)?;
            map.ensure_covers(units)?;
            debug!(path = ?path, entries = map.len(), "Loaded shard map");

            Ok(Some(map))
        } else if let Some(size) = shard_size {
            let map = Self::build(units, size);
            map.persist_once(path)?;

            Ok(Some(map))
        } else {
            Ok(None)
        }
    }
}

/// Where a name's outputs live under `base` for the given layout.
pub fn unit_dir(base: &Path, shard_map: Option<&ShardMap>, name: &str) -> PathBuf {
    match shard_map.and_then(|map| map.get(name)) {
        Some(shard) => base.join(shard).join(name),
        None => base.join(name),
    }
}
