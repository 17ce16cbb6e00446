//! The distributed sort driver
//!
//! Every rank runs [`psort`] with its own endpoint, in lockstep:
//!
//! 1. sort the local keys,
//! 2. check that every rank carries the same bucket tag,
//! 3. split the keys into one run per destination rank,
//! 4. share the run lengths so every rank knows what it will receive,
//! 5. move the runs to their owners,
//! 6. sort what arrived.
//!
//! Nothing survives the call: every count table and window is released
//! before it returns.

use crate::bucketize::{bucketize, local_tag};
use crate::err::Error;
use crate::exchange::Exchange;
use crate::map::ExchangeMap;
use crate::observe::{Observer, Phase, PhaseReport, Timeline};
use crate::partition::{partition, pe_bits, right_shift, BucketRange};
use crate::sorter::{local_sort, BitSpan, SortAlgorithm};
use crate::transfer::exchange_keys;
use serde::{Deserialize, Serialize};
use tracing::{debug_span, warn};

/// Caller-chosen parameters of a sort, identical on every rank
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct SortParams {
    /// Number of high key bits holding the upstream bucket tag
    pub bbits: u32,
    /// Strategy for both local sorts
    pub algorithm: SortAlgorithm,
}

impl SortParams {
    /// Parameters for keys tagged in their top `bbits` bits, sorted with
    /// the default algorithm.
    pub fn new(bbits: u32) -> Self {
        Self {
            bbits,
            ..Self::default()
        }
    }

    /// Use `algorithm` for the local sorts.
    pub fn with_algorithm(mut self, algorithm: SortAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }
}

/// The result of a sort on one rank
#[derive(Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub struct SortOutput {
    /// Keys owned by this rank, ascending
    pub keys: Vec<u64>,
    /// Post-exchange key count of every rank
    pub recvs: Vec<usize>,
    /// Keys this rank sent to every rank, itself included
    pub sends: Vec<usize>,
    /// Largest post-exchange count on any rank
    pub global_max: usize,
}

/// Everything derived from the arguments before communicating
#[derive(Debug)]
struct Plan {
    /// `64 - pe_bits`
    rshft: u32,
    /// Bucket range of every rank
    ranges: Vec<BucketRange>,
    /// Radix span for the first local sort
    first_span: BitSpan,
    /// Radix span for the final sort
    final_span: BitSpan,
}

impl Plan {
    /// Check the arguments and derive the partition.
    ///
    /// Uses only values every rank shares, so a rejection happens on all
    /// ranks alike.
    fn new(npes: usize, rank: usize, params: &SortParams) -> Result<Self, Error> {
        if npes == 0 {
            return Err(Error::Argument("process count must be at least 1".into()));
        }
        if rank >= npes {
            return Err(Error::Argument(format!(
                "rank {rank} out of range for {npes} processes"
            )));
        }
        let pe_bits = pe_bits(npes);
        if params.bbits.saturating_add(pe_bits) > u64::BITS {
            return Err(Error::Argument(format!(
                "{} bucket bits and {pe_bits} rank bits exceed a 64-bit key",
                params.bbits
            )));
        }

        // With a power-of-two job every rank owns a single shifted bucket
        // value, so the rank bits below the tag are uniform after the
        // exchange too.
        let final_span = if npes.is_power_of_two() {
            BitSpan::below_top(params.bbits + pe_bits)
        } else {
            BitSpan::below_top(params.bbits)
        };

        Ok(Self {
            rshft: right_shift(npes),
            ranges: partition(npes),
            first_span: BitSpan::below_top(params.bbits),
            final_span,
        })
    }
}

/// Sort a distributed key set.
///
/// Collective: every rank of the job calls this with its own endpoint, the
/// same `params` and its local `keys`. On return rank `p` holds, in
/// ascending order, exactly the keys whose shifted bucket value falls in its
/// bucket range.
///
/// The top `params.bbits` bits of every key must carry the same value on
/// every rank; keys are ordered by the bits below them. A violation is
/// reported as [`Error::MixedTags`] whatever the sort algorithm, before any
/// keys move.
///
/// Any failure after the arguments have been checked aborts the job through
/// [`Exchange::abort`], so that every peer fails too.
pub fn psort<E: Exchange + ?Sized>(
    exchange: &mut E,
    params: &SortParams,
    keys: Vec<u64>,
) -> Result<SortOutput, Error> {
    psort_observed(exchange, params, keys, &mut |_: &PhaseReport| {})
}

/// Like [`psort`], reporting the timing of every phase to `observer`.
pub fn psort_observed<E: Exchange + ?Sized>(
    exchange: &mut E,
    params: &SortParams,
    keys: Vec<u64>,
    observer: &mut dyn Observer,
) -> Result<SortOutput, Error> {
    let rank = exchange.rank();
    let npes = exchange.size();
    let _span = debug_span!("psort", rank, npes, transport = %exchange.transport()).entered();

    let mut timeline = Timeline::start(rank, observer);
    let plan = Plan::new(npes, rank, params)?;
    timeline.finish(Phase::Init, keys.len());

    run(exchange, params, &plan, keys, &mut timeline).map_err(|e| {
        warn!(rank, error = %e, "sort failed, aborting job");
        exchange.abort();
        e
    })
}

/// The communicating phases of [`psort_observed`].
fn run<E: Exchange + ?Sized>(
    ex: &mut E,
    params: &SortParams,
    plan: &Plan,
    mut keys: Vec<u64>,
    timeline: &mut Timeline<'_>,
) -> Result<SortOutput, Error> {
    local_sort(params.algorithm, &mut keys, plan.first_span)?;
    timeline.finish(Phase::LocalSort1, keys.len());

    agree_on_tag(ex, &keys, params.bbits)?;
    let sends = bucketize(&keys, params.bbits, plan.rshft, &plan.ranges)?;
    timeline.finish(Phase::Bucketize, keys.len());

    let map = ExchangeMap::build(ex, sends)?;
    let global_max = ex.reduce_max(map.own_recv())?;
    timeline.finish(Phase::MapExchange, keys.len());

    let mut received = exchange_keys(ex, &map, keys)?;
    timeline.finish(Phase::DataExchange, received.len());

    local_sort(params.algorithm, &mut received, plan.final_span)?;
    timeline.finish(Phase::LocalSort2, received.len());

    let (sends, recvs) = map.into_counts();
    timeline.finish(Phase::Done, received.len());
    Ok(SortOutput {
        keys: received,
        recvs,
        sends,
        global_max,
    })
}

/// Marks a rank without a tag in the tag gather. Jobs of two or more ranks
/// have at most 63 tag bits, so no real tag collides with it.
const NO_TAG: u64 = u64::MAX;

/// Collective: check that every rank holding keys carries one and the same
/// tag in the top `bbits` bits.
///
/// A single rank has nobody to disagree with. Without tag bits every rank
/// skips the gather alike, since `bbits` is the same everywhere.
fn agree_on_tag<E: Exchange + ?Sized>(ex: &mut E, keys: &[u64], bbits: u32) -> Result<(), Error> {
    let tag = local_tag(keys, bbits)?;
    if bbits == 0 || ex.size() == 1 {
        return Ok(());
    }
    let tag = tag.unwrap_or(NO_TAG);
    // Gathered as 32-bit halves so the values fit any usize
    let high = ex.all_gather((tag >> 32) as usize)?;
    let low = ex.all_gather((tag & u64::from(u32::MAX)) as usize)?;
    let tags = high
        .into_iter()
        .zip(low)
        .map(|(h, l)| ((h as u64) << 32) | l as u64)
        .filter(|&t| t != NO_TAG);
    let (low, high) = tags.fold((NO_TAG, 0), |(low, high), t| (low.min(t), high.max(t)));
    if low < high {
        return Err(Error::MixedTags { low, high });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::exchange::{Transport, World};

    #[test]
    fn plan_spans() {
        let params = SortParams::new(2);
        let pow2 = Plan::new(4, 0, &params).unwrap();
        assert_eq!(pow2.first_span, BitSpan::new(0, 61).unwrap());
        assert_eq!(pow2.final_span, BitSpan::new(0, 59).unwrap());
        let odd = Plan::new(3, 2, &params).unwrap();
        assert_eq!(odd.final_span, BitSpan::new(0, 61).unwrap());
        let single = Plan::new(1, 0, &SortParams::new(0)).unwrap();
        assert_eq!(single.final_span, BitSpan::FULL);
        assert_eq!(single.rshft, 64);
    }

    #[test]
    fn argument_checks() {
        let params = SortParams::new(60);
        assert!(Plan::new(16, 0, &params).is_ok());
        assert!(matches!(Plan::new(17, 0, &params), Err(Error::Argument(_))));
        assert!(matches!(Plan::new(4, 4, &params), Err(Error::Argument(_))));
        assert!(matches!(Plan::new(0, 0, &params), Err(Error::Argument(_))));
        let whole_key = SortParams::new(64);
        assert!(Plan::new(1, 0, &whole_key).is_ok());
        assert!(Plan::new(2, 0, &whole_key).is_err());
    }

    #[test]
    fn params_from_config() {
        use figment::providers::{Format, Toml};
        use figment::Figment;

        let parse = |doc: &str| Figment::from(Toml::string(doc)).extract::<SortParams>();
        assert_eq!(
            parse("bbits = 3\nalgorithm = \"qsort\"").unwrap(),
            SortParams::new(3).with_algorithm(SortAlgorithm::Quick)
        );
        assert_eq!(parse("").unwrap(), SortParams::default());
        assert!(parse("buckets = 3").is_err());
    }

    #[test]
    fn phases_reported_in_order() {
        let world = World::new(2, Transport::Messaging).unwrap();
        let phases = world.run(|mut ep| {
            let mut seen = Vec::new();
            let keys = vec![3u64 << 62, 1, 1 << 63];
            psort_observed(&mut *ep, &SortParams::default(), keys, &mut |r: &PhaseReport| {
                seen.push(r.phase)
            })
            .unwrap();
            seen
        });
        for seen in phases {
            assert_eq!(
                seen,
                vec![
                    Phase::Init,
                    Phase::LocalSort1,
                    Phase::Bucketize,
                    Phase::MapExchange,
                    Phase::DataExchange,
                    Phase::LocalSort2,
                    Phase::Done
                ]
            );
        }
    }
}
