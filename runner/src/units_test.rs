use crate::units::{dedup_units, uniquify_names, SequenceUnit};

#[test]
pub fn uniquify_leaves_distinct_names_alone() {
    let names = vec!["a".to_owned(), "b".to_owned(), "c".to_owned()];

    assert_eq!(uniquify_names(&names), names);
}

#[test]
pub fn uniquify_suffixes_repeats_in_order() {
    let names = vec![
        "a".to_owned(),
        "a".to_owned(),
        "b".to_owned(),
        "a".to_owned(),
    ];

    assert_eq!(uniquify_names(&names), vec!["a", "a_0", "b", "a_1"]);
}

#[test]
pub fn uniquify_never_claims_a_pre_existing_name() {
    let names = vec!["a".to_owned(), "a".to_owned(), "a_0".to_owned()];

    // the second "a" has to skip over the "a_0" that occurs later on
    assert_eq!(uniquify_names(&names), vec!["a", "a_1", "a_0"]);
}

#[test]
pub fn dedup_groups_identical_sequences() {
    let pairs = vec![
        ("n2".to_owned(), "MKV".to_owned()),
        ("n1".to_owned(), "MKV".to_owned()),
        ("n3".to_owned(), "AAA".to_owned()),
    ];

    let units = dedup_units(&pairs);

    assert_eq!(
        units,
        vec![
            SequenceUnit {
                sequence: "MKV".to_owned(),
                names: vec!["n1".to_owned(), "n2".to_owned()],
            },
            SequenceUnit {
                sequence: "AAA".to_owned(),
                names: vec!["n3".to_owned()],
            },
        ]
    );
}

#[test]
pub fn dedup_of_nothing_is_nothing() {
    assert!(dedup_units(&[]).is_empty());
}

#[test]
pub fn canonical_is_the_smallest_name() {
    let unit = SequenceUnit {
        sequence: "MKV".to_owned(),
        names: vec!["n1".to_owned(), "n2".to_owned()],
    };

    assert_eq!(unit.canonical_name(), "n1");
    assert_eq!(unit.aliases(), ["n2".to_owned()]);
}
