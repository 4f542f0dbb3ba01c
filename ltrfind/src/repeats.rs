//! Seeds: maximal exact self-matches feeding the LTR search.
//!
//! The enumeration itself is an external collaborator; this module keeps
//! the record type and the constraint filter applied as matches stream in.

use aligncore::provider::SequenceProvider;
use serde::{Deserialize, Serialize};

/// One maximal exact self-match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct Seed {
    /// first position of the match
    pub pos1: u64,
    /// second position is `pos1 + offset`
    pub offset: u64,
    /// match length
    pub len: u64,
    /// sequence number both instances live on
    pub contig: u64,
}

/// Length and distance window constraints for LTRs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct SeedConstraints {
    /// minimum LTR length
    pub lmin: u64,
    /// maximum LTR length
    pub lmax: u64,
    /// minimum distance between the LTR 5' borders
    pub dmin: u64,
    /// maximum distance between the LTR 5' borders
    pub dmax: u64,
}

/// Sequence number containing `pos`, by binary search over the recorded
/// sequence starts.
pub fn sequence_number_of(provider: &dyn SequenceProvider, pos: u64) -> u64 {
    let n = provider.num_sequences();
    debug_assert!(n > 0);
    let (mut lo, mut hi) = (0usize, n - 1);
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if provider.sequence_start(mid) <= pos {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo as u64
}

/// Collects matches from the external maximal-repeat enumerator, keeping
/// only those on one contig and inside the distance window.
pub struct SeedCollector<'a> {
    provider: &'a dyn SequenceProvider,
    constraints: SeedConstraints,
    pub seeds: Vec<Seed>,
}

impl<'a> SeedCollector<'a> {
    pub fn new(provider: &'a dyn SequenceProvider, constraints: SeedConstraints) -> Self {
        Self {
            provider,
            constraints,
            seeds: Vec::new(),
        }
    }

    /// Callback for one `(len, pos1, pos2)` match; position order does not
    /// matter.
    pub fn process_match(&mut self, len: u64, pos1: u64, pos2: u64) {
        let (pos1, pos2) = if pos1 > pos2 {
            (pos2, pos1)
        } else {
            (pos1, pos2)
        };
        let offset = pos2 - pos1;

        let seqnum1 = sequence_number_of(self.provider, pos1);
        let seqnum2 = sequence_number_of(self.provider, pos2);
        if seqnum1 != seqnum2 {
            return;
        }
        let c = &self.constraints;
        if len <= c.lmax && c.dmin <= offset && offset <= c.dmax {
            log::debug!("seed: len {len} pos1 {pos1} pos2 {pos2}");
            self.seeds.push(Seed {
                pos1,
                offset,
                len,
                contig: seqnum1,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aligncore::provider::FlatSequence;

    fn constraints() -> SeedConstraints {
        SeedConstraints {
            lmin: 4,
            lmax: 100,
            dmin: 5,
            dmax: 1000,
        }
    }

    #[test]
    fn sequence_numbers() {
        let fs = FlatSequence::from_sequences(&[b"acgtacgt".as_slice(), b"ggcc".as_slice()]);
        assert_eq!(0, sequence_number_of(&fs, 0));
        assert_eq!(0, sequence_number_of(&fs, 7));
        // the separator belongs to the first record range
        assert_eq!(1, sequence_number_of(&fs, 9));
        assert_eq!(1, sequence_number_of(&fs, 12));
    }

    #[test]
    fn collector_filters_by_contig_and_distance() {
        let fs = FlatSequence::from_sequences(&[b"acgtacgtacgtacgtacgt".as_slice(), b"acgtacgt".as_slice()]);
        let mut collector = SeedCollector::new(&fs, constraints());
        collector.process_match(6, 0, 12); // same contig, offset 12
        collector.process_match(6, 12, 0); // swapped order, duplicate record
        collector.process_match(6, 0, 21); // crosses the separator
        collector.process_match(6, 0, 2); // offset below dmin
        assert_eq!(2, collector.seeds.len());
        assert_eq!(
            Seed {
                pos1: 0,
                offset: 12,
                len: 6,
                contig: 0
            },
            collector.seeds[0]
        );
    }
}
