//! Moving every key to the rank that owns its bucket range

use crate::err::{try_zeroed, Error};
use crate::exchange::{peer_above, peer_below, Exchange, Flow};
use crate::map::ExchangeMap;

/// Collective: send the runs of the sorted array `keys` to their owners and
/// return the keys this rank receives, in sender rank order.
///
/// The receive window is allocated here, sized from the map. Distance round
/// `d` pairs every rank with `rank + d` (push) or `rank - d` (pull), so
/// each rank takes part in exactly one remote transfer per round, possibly
/// of zero keys. The run a rank keeps for itself is copied after the last
/// round.
pub(crate) fn exchange_keys<E: Exchange + ?Sized>(
    ex: &mut E,
    map: &ExchangeMap,
    keys: Vec<u64>,
) -> Result<Vec<u64>, Error> {
    let rank = ex.rank();
    let size = ex.size();

    let destination = try_zeroed("destination", map.own_recv())?;
    ex.open_window(keys, destination)?;
    ex.barrier()?;

    let flow = ex.flow();
    for distance in 1..size {
        let (sender, receiver, peer) = match flow {
            Flow::Push => {
                let dest = peer_above(rank, distance, size);
                (rank, dest, dest)
            }
            Flow::Pull => {
                let source = peer_below(rank, distance, size);
                (source, rank, source)
            }
        };
        let run = map.placement(ex, sender, receiver)?;
        ex.transfer_slice(peer, run.src_offset, run.dst_offset, run.len)?;
    }
    ex.barrier()?;

    let own = map.placement(ex, rank, rank)?;
    ex.transfer_slice(rank, own.src_offset, own.dst_offset, own.len)?;
    Ok(ex.close_window()?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::exchange::{Transport, World};
    use strum::IntoEnumIterator;

    #[test]
    fn runs_land_in_sender_order() {
        // Rank r holds keys 100r + j for j < 6 and sends key j to rank j % 3,
        // after local grouping: two keys per destination.
        let size = 3;
        for transport in Transport::iter() {
            let world = World::new(size, transport).unwrap();
            let received = world.run(|mut ep| {
                let rank = ep.rank() as u64;
                let keys: Vec<u64> = (0..3u64)
                    .flat_map(|dest| [100 * rank + dest, 100 * rank + dest + 3])
                    .collect();
                let map = ExchangeMap::build(&mut *ep, vec![2; size]).unwrap();
                exchange_keys(&mut *ep, &map, keys).unwrap()
            });
            for (dest, keys) in received.into_iter().enumerate() {
                let dest = dest as u64;
                assert_eq!(
                    keys,
                    vec![dest, dest + 3, 100 + dest, 103 + dest, 200 + dest, 203 + dest],
                    "{transport}"
                );
            }
        }
    }

    #[test]
    fn uneven_and_empty_runs() {
        // Rank 0 sends all three keys to rank 2; rank 1 and 2 send nothing.
        for transport in Transport::iter() {
            let world = World::new(3, transport).unwrap();
            let received = world.run(|mut ep| {
                let (keys, sends) = match ep.rank() {
                    0 => (vec![7, 8, 9], vec![0, 0, 3]),
                    _ => (vec![], vec![0, 0, 0]),
                };
                let map = ExchangeMap::build(&mut *ep, sends).unwrap();
                exchange_keys(&mut *ep, &map, keys).unwrap()
            });
            assert_eq!(received, vec![vec![], vec![], vec![7, 8, 9]], "{transport}");
        }
    }
}
