use crate::comm::{fs::FsComm, CommError};
use std::{thread, time::Duration};
use tempfile::tempdir;

#[test]
pub fn collectives_agree_across_a_two_rank_fleet() {
    let dir = tempdir().unwrap();
    let session = dir.path().join("comm");

    let run_member = |rank: usize, counts: [u64; 2]| {
        let session = session.clone();
        move || {
            let comm = FsComm::new(session, rank, 2)
                .unwrap()
                .with_poll_interval(Duration::from_millis(10));

            let payload = vec!["p1".to_owned(), "p2".to_owned()];
            let agreed = if rank == 0 {
                comm.broadcast(Some(&payload))
            } else {
                comm.broadcast::<Vec<String>>(None)
            };
            let sums = comm.allreduce_sum(&counts);

            (agreed, sums)
        }
    };

    let (leader, follower) = thread::scope(|scope| {
        let leader = scope.spawn(run_member(0, [1, 2]));
        let follower = scope.spawn(run_member(1, [10, 20]));

        (leader.join().unwrap(), follower.join().unwrap())
    });

    let payload = vec!["p1".to_owned(), "p2".to_owned()];
    assert_eq!(leader.0.unwrap(), payload);
    assert_eq!(follower.0.unwrap(), payload);
    assert_eq!(leader.1.unwrap(), vec![11, 22]);
    assert_eq!(follower.1.unwrap(), vec![11, 22]);
}

#[test]
pub fn the_leader_clears_stale_rendezvous_files() {
    let dir = tempdir().unwrap();
    let session = dir.path().join("comm");
    std::fs::create_dir_all(&session).unwrap();
    std::fs::write(session.join("plan.yaml"), "stale").unwrap();
    std::fs::write(session.join("counters_3.csv"), "9,9\n").unwrap();
    std::fs::write(session.join("unrelated.txt"), "keep").unwrap();

    FsComm::new(session.clone(), 0, 2).unwrap();

    assert!(!session.join("plan.yaml").exists());
    assert!(!session.join("counters_3.csv").exists());
    assert!(session.join("unrelated.txt").exists());
}

#[test]
pub fn followers_leave_the_session_untouched() {
    let dir = tempdir().unwrap();
    let session = dir.path().join("comm");
    std::fs::create_dir_all(&session).unwrap();
    std::fs::write(session.join("plan.yaml"), "fresh").unwrap();

    FsComm::new(session.clone(), 1, 2).unwrap();

    assert!(session.join("plan.yaml").exists());
}

#[test]
pub fn waiting_gives_up_after_the_timeout() {
    let dir = tempdir().unwrap();
    let comm = FsComm::new(dir.path().join("comm"), 1, 2)
        .unwrap()
        .with_poll_interval(Duration::from_millis(5))
        .with_timeout(Some(Duration::from_millis(50)));

    assert!(matches!(
        comm.broadcast::<Vec<String>>(None),
        Err(CommError::Timeout)
    ));
}
