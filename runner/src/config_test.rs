use crate::config::{
    check_executable, ConfigErrors, FleetConfig, RetryConfig, RunConfig, ShardConfig, ToolConfig,
    UpstreamConfig,
};
use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};
use tempfile::tempdir;

const MINIMAL_CONFIG: &str = "\
input: input.fasta
output_dir: out
tool:
  exec: tool.sh
  outputs:
    - out.txt
  timeout: 60
";

#[test]
pub fn minimal_config_fills_the_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.yaml");
    fs::write(&path, MINIMAL_CONFIG).unwrap();

    let config = RunConfig::load(&path).unwrap();

    assert_eq!(config.input, PathBuf::from("input.fasta"));
    assert_eq!(config.log_dir, PathBuf::from("log"));
    assert_eq!(config.tool.outputs, vec!["out.txt"]);
    assert_eq!(config.tool.timeout, 60);
    assert!(config.tool.params.is_empty());
    assert!(config.shard.size.is_none());
    assert!(config.upstream.completed_lists.is_empty());
    assert!(config.fleet.job_id.is_none());
    assert!(config.report_path.is_none());
}

#[test]
pub fn unknown_fields_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.yaml");
    fs::write(&path, format!("{MINIMAL_CONFIG}unexpected: true\n")).unwrap();

    assert!(matches!(
        RunConfig::load(&path),
        Err(ConfigErrors::InvalidYaml(_))
    ));
}

#[test]
pub fn a_missing_config_file_is_unreadable() {
    assert!(matches!(
        RunConfig::load(Path::new("/nonexistent/run.yaml")),
        Err(ConfigErrors::Unreadable(_))
    ));
}

#[test]
pub fn run_paths_hang_off_the_log_dir() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("run.yaml");
    fs::write(&path, MINIMAL_CONFIG).unwrap();
    let config = RunConfig::load(&path).unwrap();

    assert_eq!(config.history_root(), PathBuf::from("log/result"));
    assert_eq!(
        config.result_log_path(42),
        PathBuf::from("log/result/42/processed.csv")
    );
    assert_eq!(config.shard_map_path(), PathBuf::from("out/shard_map.csv"));
}

#[test]
pub fn fleet_resolution_validates_the_layout() {
    let explicit = FleetConfig {
        rank: Some(1),
        size: Some(4),
        job_id: Some(7),
        collective_timeout: None,
    };
    let layout = explicit.resolve().unwrap();
    assert_eq!((layout.rank, layout.size, layout.job_id), (1, 4, 7));

    let zero = FleetConfig {
        rank: Some(0),
        size: Some(0),
        job_id: Some(7),
        collective_timeout: None,
    };
    assert!(matches!(zero.resolve(), Err(ConfigErrors::InvalidFleet(_))));

    let out_of_range = FleetConfig {
        rank: Some(4),
        size: Some(4),
        job_id: Some(7),
        collective_timeout: None,
    };
    assert!(matches!(
        out_of_range.resolve(),
        Err(ConfigErrors::InvalidFleet(_))
    ));
}

#[test]
pub fn fleet_resolution_falls_back_to_the_launcher_environment() {
    // every environment-touching assertion lives in this one test, the
    // variables are process-global and tests run in parallel
    assert!(matches!(
        FleetConfig::default().resolve(),
        Err(ConfigErrors::MissingJobId)
    ));

    std::env::set_var("OMPI_COMM_WORLD_RANK", "2");
    std::env::set_var("OMPI_COMM_WORLD_SIZE", "8");
    std::env::set_var("PJM_JOBID", "31");

    let layout = FleetConfig::default().resolve().unwrap();
    assert_eq!((layout.rank, layout.size, layout.job_id), (2, 8, 31));

    // explicit settings win over the environment
    let explicit = FleetConfig {
        rank: Some(0),
        size: Some(1),
        job_id: Some(9),
        collective_timeout: None,
    };
    let layout = explicit.resolve().unwrap();
    assert_eq!((layout.rank, layout.size, layout.job_id), (0, 1, 9));

    std::env::remove_var("OMPI_COMM_WORLD_RANK");
    std::env::remove_var("OMPI_COMM_WORLD_SIZE");
    std::env::remove_var("PJM_JOBID");
}

#[test]
pub fn executability_is_read_from_the_mode_bits() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tool.sh");
    fs::write(&path, "#!/bin/sh\n").unwrap();

    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
    assert!(!check_executable(&path).unwrap());

    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    assert!(check_executable(&path).unwrap());

    assert!(check_executable(&dir.path().join("missing")).is_err());
}

#[test]
pub fn preflight_reports_every_problem_at_once() {
    let dir = tempdir().unwrap();
    let config = RunConfig {
        input: dir.path().join("missing.fasta"),
        output_dir: dir.path().join("out"),
        log_dir: dir.path().join("log"),
        temp_dir: dir.path().join("tmp"),
        report_path: None,
        tool: ToolConfig {
            exec: dir.path().join("missing_tool"),
            params: vec![],
            outputs: vec![],
            timeout: 0,
        },
        shard: ShardConfig {
            size: Some(0),
            map_path: None,
        },
        retry: RetryConfig::default(),
        upstream: UpstreamConfig {
            data_dir: Some(dir.path().join("missing_upstream")),
            completed_lists: vec![dir.path().join("missing_list.csv")],
        },
        fleet: FleetConfig::default(),
    };

    assert!(config.preflight_checks());
}

#[test]
pub fn preflight_accepts_a_complete_setup() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.fasta");
    fs::write(&input, ">p1\nMKV\n").unwrap();
    let exec = dir.path().join("tool.sh");
    fs::write(&exec, "#!/bin/sh\n").unwrap();
    fs::set_permissions(&exec, fs::Permissions::from_mode(0o755)).unwrap();

    let config = RunConfig {
        input,
        output_dir: dir.path().join("out"),
        log_dir: dir.path().join("log"),
        temp_dir: dir.path().join("tmp"),
        report_path: Some(dir.path().join("remaining.txt")),
        tool: ToolConfig {
            exec,
            params: vec![],
            outputs: vec!["out.txt".to_owned()],
            timeout: 60,
        },
        shard: ShardConfig::default(),
        retry: RetryConfig::default(),
        upstream: UpstreamConfig::default(),
        fleet: FleetConfig::default(),
    };

    assert!(!config.preflight_checks());
}
