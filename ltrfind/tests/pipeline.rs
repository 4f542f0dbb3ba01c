//! End-to-end run of the LTR search over a synthetic contig.

use aligncore::provider::FlatSequence;
use ltrfind::search::GreedyUnitEditDistance;
use ltrfind::tsdmotif::{BorderCorrection, Motif};
use ltrfind::{
    LtrSearchParams, OverlapPolicy, Seed, SeedConstraints, XdropScores, search_for_ltrs,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn random_unit(rng: &mut SmallRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| b"ACGT"[rng.random_range(0..4)]).collect()
}

/// One LTR pair: two identical 200-nt stretches 5000 nt apart. The
/// flanking stretches are homopolymers chosen so that every extension
/// mismatches immediately and the X-drop borders land exactly on the
/// repeat.
fn synthetic_contig(rng: &mut SmallRng) -> (Vec<u8>, Vec<u8>) {
    let ltr = random_unit(rng, 200);
    let mut seq = vec![b'A'; 300];
    seq.extend_from_slice(&ltr);
    seq.extend(std::iter::repeat_n(b'G', 100));
    seq.extend(random_unit(rng, 4600));
    seq.extend(std::iter::repeat_n(b'C', 100));
    seq.extend_from_slice(&ltr);
    seq.extend(std::iter::repeat_n(b'T', 300));
    (seq, ltr)
}

fn params() -> LtrSearchParams {
    LtrSearchParams {
        constraints: SeedConstraints {
            lmin: 100,
            lmax: 1000,
            dmin: 1000,
            dmax: 15_000,
        },
        scores: XdropScores {
            mat: 2,
            mis: -2,
            ins: -3,
            del: -3,
        },
        xdrop_below: 5,
        similarity_threshold: 85.0,
        correction: BorderCorrection {
            min_tsd_len: 1,
            max_tsd_len: 20,
            vicinity: 60,
            motif: Motif::off(),
        },
        overlaps: OverlapPolicy::BestOfOverlap,
    }
}

#[test]
fn one_ltr_pair_is_reported() {
    let mut rng = SmallRng::seed_from_u64(42);
    let (seq, _) = synthetic_contig(&mut rng);
    let provider = FlatSequence::from_sequences(&[seq.as_slice()]);
    let seeds = [Seed {
        pos1: 300,
        offset: 5000,
        len: 200,
        contig: 0,
    }];
    let mut oracle = GreedyUnitEditDistance::new();
    let candidates = search_for_ltrs(&provider, &seeds, &params(), &mut oracle).unwrap();

    assert_eq!(1, candidates.len());
    let c = &candidates[0];
    assert!(!c.skipped);
    assert_eq!(300, c.left_ltr_5);
    assert_eq!(499, c.left_ltr_3);
    assert_eq!(5300, c.right_ltr_5);
    assert_eq!(5499, c.right_ltr_3);
    assert_eq!(5000, c.ltr_distance());
    assert!(c.length_dist_constraint);
    assert!(c.similarity >= 99.0);
}

#[test]
fn different_seeds_converging_to_one_prediction_are_duplicates() {
    let mut rng = SmallRng::seed_from_u64(42);
    let (seq, _) = synthetic_contig(&mut rng);
    let provider = FlatSequence::from_sequences(&[seq.as_slice()]);
    // the second seed is an inner part of the same repeat; extension
    // recovers the same borders
    let seeds = [
        Seed {
            pos1: 300,
            offset: 5000,
            len: 200,
            contig: 0,
        },
        Seed {
            pos1: 310,
            offset: 5000,
            len: 180,
            contig: 0,
        },
    ];
    let mut oracle = GreedyUnitEditDistance::new();
    let candidates = search_for_ltrs(&provider, &seeds, &params(), &mut oracle).unwrap();

    assert_eq!(2, candidates.len());
    let survivors: Vec<_> = candidates.iter().filter(|c| !c.skipped).collect();
    assert_eq!(1, survivors.len());
    assert_eq!((300, 5499), survivors[0].span());
}

#[test]
fn demanding_tsds_drops_unsupported_candidates() {
    // the unit's prefix uses {A,C} and its suffix {G,T}, so the two
    // border vicinities share no exact 4-mer and no TSD can be found
    let mut ltr: Vec<u8> = b"AC".iter().cycle().take(100).copied().collect();
    ltr.extend(b"GT".iter().cycle().take(100));
    let mut seq = vec![b'A'; 300];
    seq.extend_from_slice(&ltr);
    seq.extend(std::iter::repeat_n(b'G', 100));
    let mut rng = SmallRng::seed_from_u64(43);
    seq.extend(random_unit(&mut rng, 4600));
    seq.extend(std::iter::repeat_n(b'C', 100));
    seq.extend_from_slice(&ltr);
    seq.extend(std::iter::repeat_n(b'T', 300));
    let provider = FlatSequence::from_sequences(&[seq.as_slice()]);
    let seeds = [Seed {
        pos1: 300,
        offset: 5000,
        len: 200,
        contig: 0,
    }];
    let mut with_tsd = params();
    with_tsd.correction.min_tsd_len = 4;
    let mut oracle = GreedyUnitEditDistance::new();
    let candidates = search_for_ltrs(&provider, &seeds, &with_tsd, &mut oracle).unwrap();
    // the homopolymer flanks carry no target-site duplication
    assert!(candidates.is_empty());
}

#[test]
fn inverted_ranges_are_rejected_up_front() {
    use ltrfind::LtrSearchError;

    let provider = FlatSequence::from_sequences(&[b"acgt".as_slice()]);
    let mut oracle = GreedyUnitEditDistance::new();
    let mut bad = params();
    bad.correction.min_tsd_len = 30;
    bad.correction.max_tsd_len = 20;
    let r = search_for_ltrs(&provider, &[], &bad, &mut oracle);
    assert!(matches!(r, Err(LtrSearchError::TsdRange { .. })));

    let mut bad = params();
    bad.constraints.dmin = 100;
    bad.constraints.dmax = 10;
    let r = search_for_ltrs(&provider, &[], &bad, &mut oracle);
    assert!(matches!(r, Err(LtrSearchError::DistanceRange { .. })));
}

#[test]
fn similarity_threshold_is_a_silent_filter() {
    let mut rng = SmallRng::seed_from_u64(44);
    let (mut seq, _) = synthetic_contig(&mut rng);
    // damage the right copy heavily
    for i in 0..100 {
        let pos = 5300 + 2 * i;
        seq[pos] = match seq[pos] {
            b'A' => b'C',
            b'C' => b'G',
            b'G' => b'T',
            _ => b'A',
        };
    }
    let provider = FlatSequence::from_sequences(&[seq.as_slice()]);
    let seeds = [Seed {
        pos1: 300,
        offset: 5000,
        len: 200,
        contig: 0,
    }];
    let mut oracle = GreedyUnitEditDistance::new();
    let candidates = search_for_ltrs(&provider, &seeds, &params(), &mut oracle).unwrap();
    assert!(candidates.is_empty());
}
