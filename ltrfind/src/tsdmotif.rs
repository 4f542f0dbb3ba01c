//! Border correction: target-site duplications and palindromic motifs.
//!
//! The X-drop borders of a candidate are refined by searching the
//! vicinities of the outer borders for TSDs (short exact repeats flanking
//! the element) and/or a 4-character palindromic motif; among all hits the
//! one closest to the X-drop borders wins. With a motif but no TSD search
//! the four border vicinities are scanned directly, outside and inside.

use aligncore::chars;
use aligncore::provider::SequenceProvider;
use serde::{Deserialize, Serialize};

use crate::candidate::LtrCandidate;

/// Motif checks are off once this many mismatches are allowed (both
/// half-motifs together can never collect more).
const MOTIF_OFF_MISMATCHES: u32 = 4;

#[derive(Debug, Clone, thiserror::Error)]
pub enum MotifError {
    #[error("the motif must consist of exactly 4 characters, got {got}")]
    InvalidLength { got: usize },
    #[error("illegal nucleotide character {found:?} in motif")]
    IllegalCharacter { found: char },
    #[error("motif is not palindromic")]
    NotPalindromic,
}

/// Encoded start/end dinucleotides of the LTRs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct Motif {
    first_left: u8,
    second_left: u8,
    first_right: u8,
    second_right: u8,
    allowed_mismatches: u32,
}

impl Motif {
    /// Parses a 4-character motif like `tgca`. The motif must be
    /// palindromic: the left dinucleotide reverse-complements to the right
    /// one.
    pub fn from_chars(motif: &str, allowed_mismatches: u32) -> Result<Self, MotifError> {
        let bytes = motif.as_bytes();
        if bytes.len() != 4 {
            return Err(MotifError::InvalidLength { got: bytes.len() });
        }
        let mut enc = [0u8; 4];
        for (i, &b) in bytes.iter().enumerate() {
            enc[i] = chars::encode_base(b);
            if chars::is_special(enc[i]) {
                return Err(MotifError::IllegalCharacter { found: b as char });
            }
        }
        let [first_left, second_left, first_right, second_right] = enc;
        if chars::complement(first_left) != second_right
            || chars::complement(second_left) != first_right
        {
            return Err(MotifError::NotPalindromic);
        }
        Ok(Self {
            first_left,
            second_left,
            first_right,
            second_right,
            allowed_mismatches,
        })
    }

    /// No motif constraint.
    pub fn off() -> Self {
        Self {
            first_left: 0,
            second_left: 0,
            first_right: 0,
            second_right: 0,
            allowed_mismatches: MOTIF_OFF_MISMATCHES,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.allowed_mismatches < MOTIF_OFF_MISMATCHES
    }

    pub fn allowed_mismatches(&self) -> u32 {
        self.allowed_mismatches
    }
}

/// Parameters of the border search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct BorderCorrection {
    /// TSDs are searched when this exceeds 1
    pub min_tsd_len: u64,
    pub max_tsd_len: u64,
    /// how far around each X-drop border to look
    pub vicinity: u64,
    pub motif: Motif,
}

impl BorderCorrection {
    pub fn wants_tsd(&self) -> bool {
        self.min_tsd_len > 1
    }

    pub fn is_enabled(&self) -> bool {
        self.wants_tsd() || self.motif.is_enabled()
    }
}

/// A TSD candidate repeat: one instance at `pos1`, the other at
/// `pos1 + offset`, both of length `len` (absolute positions).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SubRepeat {
    pos1: u64,
    offset: u64,
    len: u64,
}

/// Maximal exact matches of at least `min_len` between two short encoded
/// stretches, by diagonal runs. Special residues never take part.
fn maximal_exact_matches(db: &[u8], query: &[u8], min_len: u64) -> Vec<(u64, u64, u64)> {
    let mut out = Vec::new();
    let dblen = db.len() as i64;
    let qlen = query.len() as i64;
    for diag in (1 - qlen)..dblen {
        let mut i = diag.max(0);
        let mut j = i - diag;
        let mut run = 0u64;
        while i <= dblen && j <= qlen {
            let matches = i < dblen
                && j < qlen
                && db[i as usize] == query[j as usize]
                && !chars::is_special(db[i as usize]);
            if matches {
                run += 1;
            } else {
                if run >= min_len {
                    out.push(((i - run as i64) as u64, (j - run as i64) as u64, run));
                }
                run = 0;
            }
            i += 1;
            j += 1;
        }
    }
    out
}

fn abs_diff(a: u64, b: u64) -> u64 {
    a.max(b) - a.min(b)
}

/// Searches for TSDs and/or the motif at the 5' border of the left LTR
/// and the 3' border of the right LTR; among all vicinity repeats the one
/// with minimal deviation from the X-drop borders wins.
#[allow(clippy::too_many_arguments)]
fn search_best_tsd_and_motif_at_borders(
    subrepeats: &[SubRepeat],
    correction: &BorderCorrection,
    provider: &dyn SequenceProvider,
    boundaries: &mut LtrCandidate,
    motif_mismatches_left: &mut u32,
    motif_mismatches_right: &mut u32,
) {
    let motif = &correction.motif;
    let old_left_ltr_5 = boundaries.left_ltr_5;
    let old_right_ltr_3 = boundaries.right_ltr_3;
    let mut diff_from_old_boundary_1 = 0;
    let mut diff_from_old_boundary_2 = 0;

    if !subrepeats.is_empty() {
        boundaries.tsd = true;
    }
    boundaries.motif_near_tsd = false;

    for repeat in subrepeats {
        // first position after the left repeat instance
        let motifpos1 = repeat.pos1 + repeat.len;
        // two positions before the right repeat instance
        let motifpos2 = repeat.pos1 + repeat.offset - 2;

        for back in 0..repeat.len - correction.min_tsd_len + 1 {
            for forward in 0..repeat.len - correction.min_tsd_len + 1 - back {
                let mut tmp_mismatches_left = 0;
                let mut tmp_mismatches_right = 0;
                if provider.char_at(motifpos1 - back) != motif.first_left {
                    tmp_mismatches_left += 1;
                }
                if provider.char_at(motifpos1 + 1 - back) != motif.second_left {
                    tmp_mismatches_left += 1;
                }
                if provider.char_at(motifpos2 + forward) != motif.first_right {
                    tmp_mismatches_right += 1;
                }
                if provider.char_at(motifpos2 + 1 + forward) != motif.second_right {
                    tmp_mismatches_right += 1;
                }
                if tmp_mismatches_left > motif.allowed_mismatches
                    || tmp_mismatches_right > motif.allowed_mismatches
                {
                    continue;
                }
                let tsd_len = repeat.len - back - forward;
                if tsd_len > correction.max_tsd_len {
                    continue;
                }
                let new_left = motifpos1 - back;
                let new_right = motifpos2 + 1 + forward;
                if !boundaries.motif_near_tsd {
                    *motif_mismatches_left = tmp_mismatches_left;
                    *motif_mismatches_right = tmp_mismatches_right;
                    boundaries.motif_near_tsd = true;
                    boundaries.left_ltr_5 = new_left;
                    boundaries.right_ltr_3 = new_right;
                    boundaries.len_left_tsd = tsd_len;
                    boundaries.len_right_tsd = tsd_len;
                    diff_from_old_boundary_1 = abs_diff(old_left_ltr_5, new_left);
                    diff_from_old_boundary_2 = abs_diff(old_right_ltr_3, new_right);
                } else {
                    // keep the hit nearest to the x-drop borders
                    let diff_from_new_boundary_1 = abs_diff(old_left_ltr_5, new_left);
                    let diff_from_new_boundary_2 = abs_diff(old_right_ltr_3, new_right);
                    if diff_from_new_boundary_1 + diff_from_new_boundary_2
                        < diff_from_old_boundary_1 + diff_from_old_boundary_2
                    {
                        *motif_mismatches_left = tmp_mismatches_left;
                        *motif_mismatches_right = tmp_mismatches_right;
                        boundaries.left_ltr_5 = new_left;
                        boundaries.right_ltr_3 = new_right;
                        boundaries.len_left_tsd = tsd_len;
                        boundaries.len_right_tsd = tsd_len;
                        diff_from_old_boundary_1 = diff_from_new_boundary_1;
                        diff_from_old_boundary_2 = diff_from_new_boundary_2;
                    }
                }
            }
        }
    }
}

/// Searches only for the motif at the outer borders.
#[allow(clippy::too_many_arguments)]
fn search_motif_only_borders(
    correction: &BorderCorrection,
    provider: &dyn SequenceProvider,
    boundaries: &mut LtrCandidate,
    start_left_ltr: u64,
    end_left_ltr: u64,
    start_right_ltr: u64,
    end_right_ltr: u64,
    motif_mismatches_left: &mut u32,
    motif_mismatches_right: &mut u32,
) {
    let motif = &correction.motif;
    let mut motif1 = false;
    let mut motif2 = false;
    let mut mismatches_from_best = 0;
    let old_left_ltr_5 = boundaries.left_ltr_5;
    let old_right_ltr_3 = boundaries.right_ltr_3;
    let mut diff_from_old_boundary = 0;

    for idx in start_left_ltr..end_left_ltr {
        let mut tmp_mismatches = 0;
        if provider.char_at(idx) != motif.first_left {
            tmp_mismatches += 1;
        }
        if provider.char_at(idx + 1) != motif.second_left {
            tmp_mismatches += 1;
        }
        if tmp_mismatches + *motif_mismatches_left > motif.allowed_mismatches {
            continue;
        }
        if !motif1 {
            mismatches_from_best = tmp_mismatches;
            boundaries.left_ltr_5 = idx;
            motif1 = true;
            diff_from_old_boundary = abs_diff(old_left_ltr_5, idx);
        } else {
            let diff_from_new_boundary = abs_diff(old_left_ltr_5, idx);
            if diff_from_new_boundary < diff_from_old_boundary {
                mismatches_from_best = tmp_mismatches;
                boundaries.left_ltr_5 = idx;
                diff_from_old_boundary = diff_from_new_boundary;
            }
        }
    }
    *motif_mismatches_left += mismatches_from_best;
    mismatches_from_best = 0;

    for idx in start_right_ltr + 1..=end_right_ltr {
        let mut tmp_mismatches = 0;
        if provider.char_at(idx) != motif.second_right {
            tmp_mismatches += 1;
        }
        if provider.char_at(idx - 1) != motif.first_right {
            tmp_mismatches += 1;
        }
        if tmp_mismatches + *motif_mismatches_right > motif.allowed_mismatches {
            continue;
        }
        if !motif2 {
            mismatches_from_best = tmp_mismatches;
            boundaries.right_ltr_3 = idx;
            motif2 = true;
            diff_from_old_boundary = abs_diff(old_right_ltr_3, idx);
        } else {
            let diff_from_new_boundary = abs_diff(old_right_ltr_3, idx);
            if diff_from_new_boundary < diff_from_old_boundary {
                mismatches_from_best = tmp_mismatches;
                boundaries.right_ltr_3 = idx;
                diff_from_old_boundary = diff_from_new_boundary;
            }
        }
    }
    if !motif2 {
        log::debug!("no right motif found");
    }
    *motif_mismatches_right += mismatches_from_best;

    boundaries.motif_near_tsd = motif1 && motif2;
}

/// Searches for the motif at the inner borders (3' of the left LTR, 5' of
/// the right LTR).
fn search_motif_only_inside(
    correction: &BorderCorrection,
    provider: &dyn SequenceProvider,
    boundaries: &mut LtrCandidate,
    motif_mismatches_left: &mut u32,
    motif_mismatches_right: &mut u32,
) {
    let motif = &correction.motif;
    let mut motif1 = false;
    let mut motif2 = false;
    let old_left_ltr_3 = boundaries.left_ltr_3;
    let old_right_ltr_5 = boundaries.right_ltr_5;
    let mut diff_from_old_boundary = 0;
    let mut mismatches_from_best = 0;

    // vicinity of the 3' border of the left LTR, kept inside the element
    let start_left_ltr = (boundaries.left_ltr_3.saturating_sub(correction.vicinity))
        .max(boundaries.left_ltr_5 + 2);
    let end_left_ltr = (boundaries.left_ltr_3 + correction.vicinity).min(boundaries.right_ltr_5 - 1);
    // vicinity of the 5' border of the right LTR
    let start_right_ltr = (boundaries.right_ltr_5.saturating_sub(correction.vicinity))
        .max(boundaries.left_ltr_3 + 1);
    let end_right_ltr =
        (boundaries.right_ltr_5 + correction.vicinity).min(boundaries.right_ltr_3 - 2);

    for idx in start_left_ltr + 1..=end_left_ltr {
        let mut tmp_mismatches = 0;
        if provider.char_at(idx) != motif.second_right {
            tmp_mismatches += 1;
        }
        if provider.char_at(idx - 1) != motif.first_right {
            tmp_mismatches += 1;
        }
        if tmp_mismatches + *motif_mismatches_left > motif.allowed_mismatches {
            continue;
        }
        if !motif1 {
            mismatches_from_best = tmp_mismatches;
            boundaries.left_ltr_3 = idx;
            motif1 = true;
            diff_from_old_boundary = abs_diff(old_left_ltr_3, idx);
        } else {
            let diff_from_new_boundary = abs_diff(old_left_ltr_3, idx);
            if diff_from_new_boundary < diff_from_old_boundary {
                mismatches_from_best = tmp_mismatches;
                boundaries.left_ltr_3 = idx;
                diff_from_old_boundary = diff_from_new_boundary;
            }
        }
    }
    *motif_mismatches_left += mismatches_from_best;
    mismatches_from_best = 0;

    for idx in start_right_ltr..end_right_ltr {
        let mut tmp_mismatches = 0;
        if provider.char_at(idx) != motif.first_left {
            tmp_mismatches += 1;
        }
        if provider.char_at(idx + 1) != motif.second_left {
            tmp_mismatches += 1;
        }
        if tmp_mismatches + *motif_mismatches_right > motif.allowed_mismatches {
            continue;
        }
        if !motif2 {
            mismatches_from_best = tmp_mismatches;
            boundaries.right_ltr_5 = idx;
            motif2 = true;
            diff_from_old_boundary = abs_diff(old_right_ltr_5, idx);
        } else {
            let diff_from_new_boundary = abs_diff(old_right_ltr_5, idx);
            if diff_from_new_boundary < diff_from_old_boundary {
                mismatches_from_best = tmp_mismatches;
                boundaries.right_ltr_5 = idx;
                diff_from_old_boundary = diff_from_new_boundary;
            }
        }
    }
    *motif_mismatches_right += mismatches_from_best;

    boundaries.motif_far_tsd = motif1 && motif2;
}

/// Refines the X-drop borders of `boundaries` against TSDs and/or the
/// motif. Search windows never leave the candidate's sequence.
pub fn find_correct_boundaries(
    correction: &BorderCorrection,
    provider: &dyn SequenceProvider,
    boundaries: &mut LtrCandidate,
) {
    let mut motif_mismatches_left = 0u32;
    let mut motif_mismatches_right = 0u32;
    log::debug!(
        "searching for correct boundaries in the vicinity of {}..{}",
        boundaries.left_ltr_5,
        boundaries.right_ltr_3
    );

    let seq_start = provider.sequence_start(boundaries.contig as usize);
    let seq_len = provider.sequence_length(boundaries.contig as usize);
    let sequence_end = seq_start + seq_len - 1;

    // vicinity of the 5' border of the left LTR, clamped at the sequence
    // start
    let start_left_ltr = boundaries
        .left_ltr_5
        .saturating_sub(correction.vicinity)
        .max(seq_start);
    // -2 leaves room for a possible motif
    let end_left_ltr = (boundaries.left_ltr_5 + correction.vicinity).min(boundaries.left_ltr_3 - 2);
    // vicinity of the 3' border of the right LTR
    let start_right_ltr = boundaries
        .right_ltr_3
        .saturating_sub(correction.vicinity)
        .max(boundaries.right_ltr_5 + 2);
    let end_right_ltr = (boundaries.right_ltr_3 + correction.vicinity).min(sequence_end);

    if correction.wants_tsd() {
        let db: Vec<u8> = (start_left_ltr..=end_left_ltr)
            .map(|p| provider.char_at(p))
            .collect();
        let query: Vec<u8> = (start_right_ltr..=end_right_ltr)
            .map(|p| provider.char_at(p))
            .collect();
        let subrepeats: Vec<SubRepeat> = maximal_exact_matches(&db, &query, correction.min_tsd_len)
            .into_iter()
            .map(|(dbstart, querystart, len)| SubRepeat {
                pos1: start_left_ltr + dbstart,
                offset: (start_right_ltr + querystart) - (start_left_ltr + dbstart),
                len,
            })
            .collect();
        search_best_tsd_and_motif_at_borders(
            &subrepeats,
            correction,
            provider,
            boundaries,
            &mut motif_mismatches_left,
            &mut motif_mismatches_right,
        );
    } else {
        search_motif_only_borders(
            correction,
            provider,
            boundaries,
            start_left_ltr,
            end_left_ltr,
            start_right_ltr,
            end_right_ltr,
            &mut motif_mismatches_left,
            &mut motif_mismatches_right,
        );
    }

    if correction.motif.is_enabled() {
        log::debug!("searching for the motif at the inner borders");
        search_motif_only_inside(
            correction,
            provider,
            boundaries,
            &mut motif_mismatches_left,
            &mut motif_mismatches_right,
        );
    }
}
