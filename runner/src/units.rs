use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One logically distinct piece of work: a unique sequence and every input
/// name that carried it. `names` is sorted, so `names[0]` is reproducible
/// from the sequence content alone, independent of input order.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct SequenceUnit {
    pub sequence: String,
    pub names: Vec<String>,
}

impl SequenceUnit {
    /// the member that actually runs the tool
    pub fn canonical_name(&self) -> &str {
        &self.names[0]
    }

    /// members satisfied by linking the canonical outputs
    pub fn aliases(&self) -> &[String] {
        &self.names[1..]
    }
}

/// Make raw input names pairwise distinct by appending `_<n>` to repeats.
/// A candidate suffix is re-checked against both already assigned names and
/// names still to come, so it cannot collide with a pre-existing distinct
/// name further down the input.
pub fn uniquify_names(names: &[String]) -> Vec<String> {
    let reserved: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    let mut assigned: BTreeSet<String> = BTreeSet::new();
    let mut unique = Vec::with_capacity(names.len());

    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 0usize;

        while assigned.contains(&candidate)
            || (candidate != *name && reserved.contains(candidate.as_str()))
        {
            candidate = format!("{name}_{suffix}");
            suffix += 1;
        }

        assigned.insert(candidate.clone());
        unique.push(candidate);
    }

    unique
}

/// Collapse identical sequences into units. Names must be pairwise distinct
/// on input (run `uniquify_names` first). Names within a unit are sorted and
/// units are ordered by their smallest name, so every rank that recomputes
/// this agrees byte for byte.
pub fn dedup_units(pairs: &[(String, String)]) -> Vec<SequenceUnit> {
    let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for (name, sequence) in pairs {
        groups.entry(sequence).or_default().push(name);
    }

    groups
        .into_iter()
        .map(|(sequence, names)| SequenceUnit {
            sequence: sequence.to_owned(),
            names: names.into_iter().sorted().map(str::to_owned).collect(),
        })
        .sorted_by(|left, right| left.names[0].cmp(&right.names[0]))
        .collect_vec()
}
