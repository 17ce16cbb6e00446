//! Rejected arguments and aborted jobs

use psort::{
    psort, Error, Exchange, SortAlgorithm, SortParams, Transport, TransportError, World,
};
use strum::IntoEnumIterator;

#[test]
fn too_many_bits_rejected_everywhere() {
    // 62 tag bits plus 3 rank bits don't fit in a key
    for transport in Transport::iter() {
        let world = World::new(5, transport).unwrap();
        let results = world.run(|mut ep| psort(&mut *ep, &SortParams::new(62), vec![1, 2, 3]));
        for result in results {
            assert!(matches!(result, Err(Error::Argument(_))), "{transport}");
        }
    }
}

#[test]
fn whole_key_tag_on_one_rank() {
    // With every bit a tag bit the keys must all be equal
    let world = World::new(1, Transport::Symmetric).unwrap();
    let results = world.run(|mut ep| psort(&mut *ep, &SortParams::new(64), vec![7, 7, 7]));
    let out = results.into_iter().next().unwrap().unwrap();
    assert_eq!(out.keys, vec![7, 7, 7]);

    let results = world.run(|mut ep| psort(&mut *ep, &SortParams::new(64), vec![9, 3, 5]));
    assert!(matches!(
        results[0],
        Err(Error::MixedTags { low: 3, high: 9 })
    ));
}

#[test]
fn empty_world_rejected() {
    assert!(matches!(
        World::new(0, Transport::OneSided),
        Err(Error::Argument(_))
    ));
}

#[test]
fn mixed_tags_on_one_rank_abort_the_job() {
    // Rank 2 mixes two bucket tags. Every rank must fail instead of
    // hanging, whichever algorithm sorts the keys.
    for algorithm in SortAlgorithm::iter() {
        let params = SortParams::new(2).with_algorithm(algorithm);
        for transport in Transport::iter() {
            let world = World::new(4, transport).unwrap();
            let results = world.run(|mut ep| {
                let rank = ep.rank() as u64;
                let keys = if rank == 2 {
                    vec![(0b01 << 62) | (0b11 << 60), 0b10 << 62]
                } else {
                    vec![(rank << 60) | 1]
                };
                psort(&mut *ep, &params, keys)
            });
            for (rank, result) in results.into_iter().enumerate() {
                match result {
                    Err(Error::MixedTags {
                        low: 0b01,
                        high: 0b10,
                    }) => assert_eq!(rank, 2, "{algorithm} {transport}"),
                    Err(Error::Transport(TransportError::Aborted)) => {
                        assert_ne!(rank, 2, "{algorithm} {transport}")
                    }
                    other => panic!("{algorithm} {transport}: rank {rank} got {other:?}"),
                }
            }
        }
    }
}

#[test]
fn radix_sort_rejects_mixed_tags() {
    // The radix sort ignores tag bits, so without the tag check this job
    // would return rank 0's keys out of order.
    let params = SortParams::new(1);
    assert_eq!(params.algorithm, SortAlgorithm::Radix);
    let world = World::new(2, Transport::Messaging).unwrap();
    let results = world.run(|mut ep| {
        let keys = if ep.rank() == 0 { vec![1 << 63, 1] } else { Vec::new() };
        psort(&mut *ep, &params, keys)
    });
    assert!(matches!(results[0], Err(Error::MixedTags { low: 0, high: 1 })));
    assert!(matches!(
        results[1],
        Err(Error::Transport(TransportError::Aborted))
    ));
}

#[test]
fn ranks_with_different_tags_all_fail() {
    // Each rank is uniform on its own, but rank 1 disagrees with the rest.
    // Every rank learns it from the tag gather, before any keys move.
    let params = SortParams::new(3);
    for transport in Transport::iter() {
        let world = World::new(3, transport).unwrap();
        let results = world.run(|mut ep| {
            let rank = ep.rank() as u64;
            let tag: u64 = if rank == 1 { 0b110 } else { 0b010 };
            psort(&mut *ep, &params, vec![(tag << 61) | rank, (tag << 61) | 40])
        });
        for (rank, result) in results.iter().enumerate() {
            assert!(
                matches!(result, Err(Error::MixedTags { low: 0b010, high: 0b110 })),
                "{transport}: rank {rank} got {result:?}"
            );
        }
    }
}

#[test]
fn empty_ranks_take_no_part_in_tag_agreement() {
    let params = SortParams::new(2);
    let world = World::new(3, Transport::Partitioned).unwrap();
    let results = world.run(|mut ep| {
        let keys = if ep.rank() == 1 { Vec::new() } else { vec![(0b11 << 62) | 5] };
        psort(&mut *ep, &params, keys)
    });
    let keys: Vec<u64> = results.into_iter().flat_map(|r| r.unwrap().keys).collect();
    assert_eq!(keys, vec![(0b11 << 62) | 5; 2]);
}

#[test]
fn aborted_world_stays_aborted() {
    let world = World::new(2, Transport::Messaging).unwrap();
    let results = world.run(|mut ep| {
        if ep.rank() == 0 {
            ep.abort();
        }
        ep.barrier()
    });
    assert_eq!(results, vec![Err(TransportError::Aborted); 2]);

    let again = world.run(|mut ep| psort(&mut *ep, &SortParams::default(), vec![1]));
    assert!(again
        .iter()
        .all(|r| matches!(r, Err(Error::Transport(TransportError::Aborted)))));
}
