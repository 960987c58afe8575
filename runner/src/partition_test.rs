use crate::{
    partition::{order_by_cost, stripe},
    units::SequenceUnit,
};
use itertools::Itertools;
use std::collections::BTreeSet;

fn unit(name: &str, sequence: &str) -> SequenceUnit {
    SequenceUnit {
        sequence: sequence.to_owned(),
        names: vec![name.to_owned()],
    }
}

#[test]
pub fn cost_order_is_by_length_then_content() {
    let mut units = vec![
        unit("p1", "MKV"),
        unit("p3", "AAA"),
        unit("p2", "LONGERSEQ"),
    ];

    order_by_cost(&mut units);

    let order = units.iter().map(|unit| unit.canonical_name()).collect_vec();
    assert_eq!(order, vec!["p3", "p1", "p2"]);
}

#[test]
pub fn stripes_partition_the_whole_set() {
    let units = (0..7usize)
        .map(|index| unit(&format!("p{index}"), &"A".repeat(index + 1)))
        .collect_vec();

    for size in 1..=5 {
        let mut seen = BTreeSet::new();
        let mut total = 0;

        for rank in 0..size {
            let assigned = stripe(&units, rank, size);
            total += assigned.len();
            for unit in assigned {
                // no unit lands on two ranks
                assert!(seen.insert(unit.names[0].clone()));
            }
        }

        // and none is lost
        assert_eq!(total, units.len());
    }
}

#[test]
pub fn stripes_follow_the_cost_order() {
    let mut units = vec![unit("p1", "MKV"), unit("p3", "AAA")];
    order_by_cost(&mut units);

    assert_eq!(stripe(&units, 0, 2)[0].canonical_name(), "p3");
    assert_eq!(stripe(&units, 1, 2)[0].canonical_name(), "p1");
}

#[test]
pub fn ranks_beyond_the_unit_count_get_empty_stripes() {
    let units = vec![unit("p1", "MKV")];

    assert_eq!(stripe(&units, 0, 4).len(), 1);
    assert!(stripe(&units, 1, 4).is_empty());
}
