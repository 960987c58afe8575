use crate::units::SequenceUnit;
use itertools::Itertools;

/// Ascending cost order for static balancing: sequence length first, with
/// the sequence content and then the canonical name breaking ties into a
/// total order. The leader sorts once before broadcasting, so every rank
/// stripes the identical sequence.
pub fn order_by_cost(units: &mut [SequenceUnit]) {
    units.sort_by(|left, right| {
        left.sequence
            .len()
            .cmp(&right.sequence.len())
            .then_with(|| left.sequence.cmp(&right.sequence))
            .then_with(|| left.names[0].cmp(&right.names[0]))
    });
}

/// This rank's stripe of the agreed pending sequence: every `size`-th unit
/// starting at `rank`, so each rank gets a spread of cheap and expensive
/// units instead of a contiguous block. `size` must be nonzero.
pub fn stripe(units: &[SequenceUnit], rank: usize, size: usize) -> Vec<SequenceUnit> {
    units.iter().skip(rank).step_by(size).cloned().collect_vec()
}
