use crate::comm::{memory::MemoryBus, CommError};
use itertools::Itertools;
use std::thread;

#[test]
pub fn collectives_agree_across_the_thread_fleet() {
    let bus = MemoryBus::new(3);

    let results = thread::scope(|scope| {
        (0..3)
            .map(|rank| {
                let member = bus.attach(rank);
                scope.spawn(move || {
                    let payload = vec!["p1".to_owned()];
                    let agreed = if rank == 0 {
                        member.broadcast(Some(&payload))
                    } else {
                        member.broadcast::<Vec<String>>(None)
                    };
                    let sums = member.allreduce_sum(&[rank as u64, 1]);

                    (agreed, sums)
                })
            })
            .collect_vec()
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect_vec()
    });

    for (agreed, sums) in results {
        assert_eq!(agreed.unwrap(), vec!["p1".to_owned()]);
        assert_eq!(sums.unwrap(), vec![3, 3]);
    }
}

#[test]
pub fn an_abandoned_member_fails_the_blocked_collectives() {
    let bus = MemoryBus::new(2);

    let result = thread::scope(|scope| {
        let survivor = {
            let member = bus.attach(0);
            scope.spawn(move || member.allreduce_sum(&[1]))
        };

        bus.attach(1).abandon();

        survivor.join().unwrap()
    });

    assert!(matches!(result, Err(CommError::Abandoned)));
}

#[test]
pub fn a_follower_does_not_wait_for_a_dead_root() {
    let bus = MemoryBus::new(2);

    let result = thread::scope(|scope| {
        let follower = {
            let member = bus.attach(1);
            scope.spawn(move || member.broadcast::<Vec<String>>(None))
        };

        bus.attach(0).abandon();

        follower.join().unwrap()
    });

    assert!(matches!(result, Err(CommError::Abandoned)));
}

#[test]
pub fn complete_counters_still_sum_after_an_abandon() {
    let bus = MemoryBus::new(2);

    let sums = thread::scope(|scope| {
        let first = {
            let member = bus.attach(0);
            scope.spawn(move || member.allreduce_sum(&[5]))
        };
        let second = {
            let member = bus.attach(1);
            scope.spawn(move || {
                let sums = member.allreduce_sum(&[7]);
                member.abandon();
                sums
            })
        };

        (first.join().unwrap(), second.join().unwrap())
    });

    assert_eq!(sums.0.unwrap(), vec![12]);
    assert_eq!(sums.1.unwrap(), vec![12]);
}
