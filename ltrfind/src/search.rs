//! The per-contig LTR search pipeline: X-drop extension of every seed,
//! border correction, length/distance filtering, similarity scoring.

use aligncore::front::FullFrontEdist;
use aligncore::provider::SequenceProvider;
use aligncore::seqview::{ReadMode, SeqSource, SeqView};
use serde::{Deserialize, Serialize};

use crate::candidate::LtrCandidate;
use crate::dedup;
use crate::repeats::{Seed, SeedConstraints};
use crate::tsdmotif::{self, BorderCorrection};
use crate::xdrop::{self, XdropFronts, XdropScores};

/// What happens to overlapping predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub enum OverlapPolicy {
    /// keep everything
    All,
    /// of two overlapping predictions the lower-similarity one drops out
    BestOfOverlap,
    /// overlapping predictions all drop out
    NoOverlap,
}

#[derive(Debug, Clone, Copy)]
pub struct LtrSearchParams {
    pub constraints: SeedConstraints,
    pub scores: XdropScores,
    pub xdrop_below: i64,
    /// minimum percentage similarity of the two LTRs
    pub similarity_threshold: f64,
    pub correction: BorderCorrection,
    pub overlaps: OverlapPolicy,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LtrSearchError {
    #[error("minimum TSD length {min} exceeds maximum {max}")]
    TsdRange { min: u64, max: u64 },
    #[error("minimum LTR length {lmin} exceeds maximum {lmax}")]
    LengthRange { lmin: u64, lmax: u64 },
    #[error("minimum LTR distance {dmin} exceeds maximum {dmax}")]
    DistanceRange { dmin: u64, dmax: u64 },
}

/// The greedy unit edit-distance oracle used for LTR similarity.
pub trait UnitEditDistance {
    fn distance(&mut self, useq: &[u8], vseq: &[u8]) -> u64;
}

/// Default oracle: the full (non-pruned) wavefront.
#[derive(Debug, Default)]
pub struct GreedyUnitEditDistance {
    full: FullFrontEdist,
}

impl GreedyUnitEditDistance {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UnitEditDistance for GreedyUnitEditDistance {
    fn distance(&mut self, useq: &[u8], vseq: &[u8]) -> u64 {
        self.full.distance(useq, vseq)
    }
}

fn check_length_and_distance_constraints(
    boundaries: &mut LtrCandidate,
    constraints: &SeedConstraints,
) -> bool {
    let ulen = boundaries.left_len();
    let vlen = boundaries.right_len();
    let dist_between_ltrs = boundaries.ltr_distance();
    if ulen > constraints.lmax
        || vlen > constraints.lmax
        || ulen < constraints.lmin
        || vlen < constraints.lmin
        || dist_between_ltrs > constraints.dmax
        || dist_between_ltrs < constraints.dmin
        || boundaries.left_ltr_3 >= boundaries.right_ltr_5
    {
        boundaries.length_dist_constraint = false;
        boundaries.similarity = 0.0;
        false
    } else {
        boundaries.length_dist_constraint = true;
        true
    }
}

fn extract(provider: &dyn SequenceProvider, from: u64, to: u64) -> Vec<u8> {
    (from..=to).map(|p| provider.char_at(p)).collect()
}

fn validate(params: &LtrSearchParams) -> Result<(), LtrSearchError> {
    let c = &params.constraints;
    if c.lmin > c.lmax {
        return Err(LtrSearchError::LengthRange {
            lmin: c.lmin,
            lmax: c.lmax,
        });
    }
    if c.dmin > c.dmax {
        return Err(LtrSearchError::DistanceRange {
            dmin: c.dmin,
            dmax: c.dmax,
        });
    }
    let t = &params.correction;
    if t.min_tsd_len > t.max_tsd_len {
        return Err(LtrSearchError::TsdRange {
            min: t.min_tsd_len,
            max: t.max_tsd_len,
        });
    }
    Ok(())
}

/// Applies the filter cascade to every seed and returns the surviving
/// candidates, duplicates and overlaps already resolved according to the
/// overlap policy. Candidate-level failures are silent; rejected
/// candidates simply do not survive.
pub fn search_for_ltrs(
    provider: &dyn SequenceProvider,
    seeds: &[Seed],
    params: &LtrSearchParams,
    oracle: &mut dyn UnitEditDistance,
) -> Result<Vec<LtrCandidate>, LtrSearchError> {
    validate(params)?;
    let total_length = provider.len();
    let mut fronts = XdropFronts::new();
    let mut candidates = Vec::new();

    for seed in seeds {
        let seed_end = seed.pos1 + seed.offset + seed.len;
        if seed.len > params.constraints.lmax || seed_end > total_length {
            log::warn!(
                "ignoring malformed seed at {}: len {} offset {}",
                seed.pos1,
                seed.len,
                seed.offset
            );
            continue;
        }
        let alilen = params.constraints.lmax - seed.len;

        // left (reverse) extension; do not run over the buffer start
        let (left_ulen, left_vlen) = if alilen <= seed.pos1 {
            (alilen, alilen)
        } else {
            (seed.pos1, seed.pos1 + seed.offset)
        };
        let best_left = if left_ulen > 0 && left_vlen > 0 {
            let useq = SeqView::new(
                SeqSource::Access(provider),
                false,
                ReadMode::Forward,
                0,
                seed.pos1 - left_ulen,
                left_ulen,
                Some(total_length),
            )
            .expect("left extension window is inside the buffer");
            let vseq = SeqView::new(
                SeqSource::Access(provider),
                false,
                ReadMode::Forward,
                0,
                seed.pos1 + seed.offset - left_vlen,
                left_vlen,
                Some(total_length),
            )
            .expect("left extension window is inside the buffer");
            xdrop::evaluate_xdrop(&params.scores, &mut fronts, &useq, &vseq, params.xdrop_below)
        } else {
            Default::default()
        };

        // right extension; do not run over the buffer end
        let seed1_end = seed.pos1 + seed.len;
        let seed2_end = seed.pos1 + seed.offset + seed.len;
        let (right_ulen, right_vlen) = if alilen <= total_length - seed2_end {
            (alilen, alilen)
        } else {
            (total_length - seed1_end, total_length - seed2_end)
        };
        let best_right = if right_ulen > 0 && right_vlen > 0 {
            let useq = SeqView::new(
                SeqSource::Access(provider),
                true,
                ReadMode::Forward,
                0,
                seed1_end,
                right_ulen,
                Some(total_length),
            )
            .expect("right extension window is inside the buffer");
            let vseq = SeqView::new(
                SeqSource::Access(provider),
                true,
                ReadMode::Forward,
                0,
                seed2_end,
                right_vlen,
                Some(total_length),
            )
            .expect("right extension window is inside the buffer");
            xdrop::evaluate_xdrop(&params.scores, &mut fronts, &useq, &vseq, params.xdrop_below)
        } else {
            Default::default()
        };

        let mut boundaries = LtrCandidate::new(seed.contig);
        boundaries.left_ltr_5 = seed.pos1 - best_left.ivalue;
        boundaries.right_ltr_5 = seed.pos1 + seed.offset - best_left.jvalue;
        boundaries.left_ltr_3 = seed1_end - 1 + best_right.ivalue;
        boundaries.right_ltr_3 = seed2_end - 1 + best_right.jvalue;

        if params.correction.is_enabled() {
            tsdmotif::find_correct_boundaries(&params.correction, provider, &mut boundaries);
            let motif = &params.correction.motif;
            let full_prediction = boundaries.tsd
                && (!motif.is_enabled() || (boundaries.motif_near_tsd && boundaries.motif_far_tsd));
            let motif_only_prediction = !params.correction.wants_tsd()
                && boundaries.motif_near_tsd
                && boundaries.motif_far_tsd;
            if !full_prediction && !motif_only_prediction {
                log::debug!(
                    "dropping candidate at {}: no TSD/motif support",
                    seed.pos1
                );
                continue;
            }
        }

        if !check_length_and_distance_constraints(&mut boundaries, &params.constraints) {
            continue;
        }

        // similarity of the two LTRs
        let useq = extract(provider, boundaries.left_ltr_5, boundaries.left_ltr_3);
        let vseq = extract(provider, boundaries.right_ltr_5, boundaries.right_ltr_3);
        let edist = oracle.distance(&useq, &vseq);
        boundaries.similarity =
            100.0 * (1.0 - edist as f64 / useq.len().max(vseq.len()) as f64);
        if boundaries.similarity < params.similarity_threshold {
            continue;
        }

        candidates.push(boundaries);
    }

    dedup::remove_duplicates(&mut candidates);
    match params.overlaps {
        OverlapPolicy::All => {}
        OverlapPolicy::BestOfOverlap => dedup::remove_overlaps(&mut candidates, false),
        OverlapPolicy::NoOverlap => dedup::remove_overlaps(&mut candidates, true),
    }
    Ok(candidates)
}
