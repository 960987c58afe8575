use crate::{
    shard::{unit_dir, ShardMap},
    units::SequenceUnit,
};
use std::path::Path;
use tempfile::tempdir;

fn unit(names: &[&str]) -> SequenceUnit {
    SequenceUnit {
        sequence: names.join(""),
        names: names.iter().map(|name| name.to_string()).collect(),
    }
}

#[test]
pub fn build_assigns_contiguous_shards() {
    let units = vec![unit(&["a", "b"]), unit(&["c"])];
    let map = ShardMap::build(&units, 2);

    assert_eq!(map.len(), 3);
    assert_eq!(map.get("a"), Some("0"));
    assert_eq!(map.get("b"), Some("0"));
    assert_eq!(map.get("c"), Some("1"));
    assert_eq!(map.get("d"), None);
}

#[test]
pub fn persist_once_never_overwrites() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shard_map.csv");

    let first = ShardMap::build(&[unit(&["a"])], 1);
    assert!(first.persist_once(&path).unwrap());

    let second = ShardMap::build(&[unit(&["a"]), unit(&["b"])], 1);
    assert!(!second.persist_once(&path).unwrap());

    assert_eq!(ShardMap::load(&path).unwrap(), first);
}

#[test]
pub fn load_rejects_malformed_lines() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shard_map.csv");
    std::fs::write(&path, "a,0\nbroken\n").unwrap();

    assert!(ShardMap::load(&path).is_err());
}

#[test]
pub fn establish_prefers_the_persisted_map() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shard_map.csv");
    let units = vec![unit(&["a", "b"]), unit(&["c"])];

    ShardMap::build(&units, 2).persist_once(&path).unwrap();

    // a different configured size does not rebuild the map
    let map = ShardMap::establish(&path, Some(1), &units).unwrap().unwrap();
    assert_eq!(map.get("c"), Some("1"));
}

#[test]
pub fn establish_without_size_or_file_stays_flat() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shard_map.csv");

    let map = ShardMap::establish(&path, None, &[unit(&["a"])]).unwrap();
    assert!(map.is_none());
    assert!(!path.exists());
}

#[test]
pub fn establish_rejects_a_map_missing_names() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shard_map.csv");

    ShardMap::build(&[unit(&["a"])], 1).persist_once(&path).unwrap();

    assert!(ShardMap::establish(&path, None, &[unit(&["a"]), unit(&["z"])]).is_err());
}

#[test]
pub fn unit_dir_follows_the_layout() {
    let map = ShardMap::build(&[unit(&["a"])], 4);

    assert_eq!(unit_dir(Path::new("out"), None, "a"), Path::new("out/a"));
    assert_eq!(
        unit_dir(Path::new("out"), Some(&map), "a"),
        Path::new("out/0/a")
    );
    // unmapped names fall back to the flat layout
    assert_eq!(
        unit_dir(Path::new("out"), Some(&map), "z"),
        Path::new("out/z")
    );
}
