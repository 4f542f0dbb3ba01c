//! Stored front generations and the backtrace over them.
//!
//! The aligner appends one header per generation (trim delta and width)
//! and one `(backreference, local match count)` record per front, in
//! order. A `(distance, diagonal)` pair maps to an offset through the
//! cumulative widths, which is all the backtrace needs to walk an
//! alignment out of the table again.

use crate::front::PolishedPoint;
use crate::script::{EditScript, PolishMeta};

/// Backreference bit: the front was reachable through a mismatch.
pub const FT_EOP_MISMATCH: u8 = 1;
/// Backreference bit: the front was reachable through an insertion.
pub const FT_EOP_INSERTION: u8 = 1 << 1;
/// Backreference bit: the front was reachable through a deletion.
pub const FT_EOP_DELETION: u8 = 1 << 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BackRef {
    bits: u8,
    lcs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Generation {
    trimleft_diff: u32,
    valid: u32,
}

#[derive(Debug, Clone, Copy)]
struct PathElem {
    eopcode: Eop,
    lcs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eop {
    Mismatch,
    Deletion,
    Insertion,
}

#[derive(Debug, Clone, Copy)]
struct StackElem {
    diagonal: i64,
    score_sum: i64,
    distance: u64,
    global_offset: u64,
    trimleft: u64,
    lcs_sum: u64,
    path_length: u64,
    row: u32,
    lcs: u32,
    trace: u8,
    eopcode: Eop,
}

/// Every front value the aligner emitted, generation by generation. The
/// backtrace scratch (path and stack) lives here too and is reused across
/// calls.
#[derive(Debug, Default)]
pub struct FrontTrace {
    backrefs: Vec<BackRef>,
    gens: Vec<Generation>,
    previous_trimleft: u64,
    path: Vec<PathElem>,
    stack: Vec<StackElem>,
}

impl FrontTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.backrefs.clear();
        self.gens.clear();
        self.previous_trimleft = 0;
    }

    pub fn num_generations(&self) -> usize {
        self.gens.len()
    }

    pub fn num_fronts(&self) -> usize {
        self.backrefs.len()
    }

    /// Trim-left delta recorded for generation `idx`.
    pub fn generation_trim_delta(&self, idx: usize) -> u64 {
        u64::from(self.gens[idx].trimleft_diff)
    }

    /// Width recorded for generation `idx`.
    pub fn generation_valid(&self, idx: usize) -> u64 {
        u64::from(self.gens[idx].valid)
    }

    pub fn add_generation(&mut self, trimleft: u64, valid: u64) {
        let trimleft_diff = if self.gens.is_empty() {
            0
        } else {
            debug_assert!(self.previous_trimleft <= trimleft);
            trimleft - self.previous_trimleft
        };
        self.previous_trimleft = trimleft;
        debug_assert!(trimleft_diff <= u64::from(u32::MAX) && valid <= u64::from(u32::MAX));
        self.gens.push(Generation {
            trimleft_diff: trimleft_diff as u32,
            valid: valid as u32,
        });
    }

    pub fn add_front(&mut self, backref: u8, local_match_count: u32) {
        self.backrefs.push(BackRef {
            bits: backref,
            lcs: local_match_count,
        });
    }

    /// Offset of a point within its generation. Works for any front, not
    /// just polished points.
    fn point_offset(&self, pp: &PolishedPoint) -> u64 {
        let pp_diagonal = pp.aligned_len as i64 - 2 * i64::from(pp.row);
        debug_assert!((pp.distance as usize) < self.gens.len());
        let base_diagonal = pp.trimleft as i64 - pp.distance as i64;
        debug_assert!(base_diagonal <= pp_diagonal);
        debug_assert!(
            pp_diagonal < base_diagonal + i64::from(self.gens[pp.distance as usize].valid)
        );
        (pp_diagonal - base_diagonal) as u64
    }

    fn valid_total_fronts(&self, start: usize, end: usize) -> u64 {
        self.gens[start..end]
            .iter()
            .map(|g| u64::from(g.valid))
            .sum()
    }

    /// Follows the preferred edit operation greedily (match > mismatch >
    /// insertion > deletion as recorded) and emits a chronological script.
    /// Used when any co-optimal alignment will do.
    pub fn to_script_directed(
        &self,
        pp: &PolishedPoint,
        useq: Option<&[u8]>,
        vseq: Option<&[u8]>,
        script: &mut EditScript,
    ) {
        debug_assert!(!self.gens.is_empty());
        let mut local_offset = self.point_offset(pp);
        let remaining = self.valid_total_fronts(pp.distance as usize, self.gens.len());
        debug_assert!(remaining <= self.backrefs.len() as u64);
        let mut global_offset = self.backrefs.len() as u64 - remaining;
        let mut distance = pp.distance;
        let mut diagonal = pp.aligned_len as i64 - 2 * i64::from(pp.row);
        let mut trace = self.backrefs[(global_offset + local_offset) as usize].bits;
        let mut lcs = self.backrefs[(global_offset + local_offset) as usize].lcs;
        let mut row = pp.row;
        let mut trimleft = pp.trimleft;
        let mut preferred = FT_EOP_MISMATCH;
        let first_index = script.len();

        while distance > 0 {
            if lcs > 0 {
                check_diagonal_run(useq, vseq, diagonal, row - lcs, row);
                script.add_match(u64::from(lcs));
            }
            let next_row_add;
            if trace & preferred != 0 {
                next_row_add = match preferred {
                    FT_EOP_MISMATCH => 1,
                    FT_EOP_INSERTION => {
                        diagonal -= 1;
                        0
                    }
                    _ => {
                        debug_assert!(preferred == FT_EOP_DELETION);
                        diagonal += 1;
                        1
                    }
                };
            } else if trace & FT_EOP_MISMATCH != 0 {
                preferred = FT_EOP_MISMATCH;
                next_row_add = 1;
            } else if trace & FT_EOP_INSERTION != 0 {
                diagonal -= 1;
                preferred = FT_EOP_INSERTION;
                next_row_add = 0;
            } else {
                debug_assert!(trace & FT_EOP_DELETION != 0);
                diagonal += 1;
                preferred = FT_EOP_DELETION;
                next_row_add = 1;
            }
            match preferred {
                FT_EOP_DELETION => script.add_deletion(),
                FT_EOP_INSERTION => script.add_insertion(),
                _ => script.add_mismatch(),
            }
            let generation = self.gens[distance as usize];
            debug_assert!(trimleft >= u64::from(generation.trimleft_diff));
            trimleft -= u64::from(generation.trimleft_diff);
            distance -= 1;
            let generation = self.gens[distance as usize];
            let base_diagonal = trimleft as i64 - distance as i64;
            debug_assert!(base_diagonal <= diagonal);
            debug_assert!(diagonal < base_diagonal + i64::from(generation.valid));
            local_offset = (diagonal - base_diagonal) as u64;
            debug_assert!(u64::from(generation.valid) <= global_offset);
            global_offset -= u64::from(generation.valid);
            debug_assert!(row >= lcs + next_row_add);
            row -= lcs + next_row_add;
            trace = self.backrefs[(global_offset + local_offset) as usize].bits;
            lcs = self.backrefs[(global_offset + local_offset) as usize].lcs;
        }
        debug_assert!(global_offset + local_offset == 0 && trace == 0);
        if lcs > 0 {
            check_diagonal_run(useq, vseq, diagonal, row - lcs, row);
            script.add_match(u64::from(lcs));
        }
        script.reverse_suffix_from(first_index);
    }

    /// DFS over the recorded predecessors guided by a running score; on the
    /// polish-size suffix branches whose score would go negative are
    /// pruned, so the reconstructed alignment has polished ends. Emits a
    /// chronological script.
    #[allow(clippy::too_many_arguments)]
    pub fn to_script_polished(
        &mut self,
        pp: &PolishedPoint,
        pol_size: u32,
        match_score: i32,
        difference_score: i32,
        ulen: u64,
        vlen: u64,
        useq: Option<&[u8]>,
        vseq: Option<&[u8]>,
        script: &mut EditScript,
    ) {
        debug_assert!(!self.gens.is_empty());
        let mut on_polsize_suffix = true;
        self.stack.clear();
        self.path.clear();
        self.path.resize(
            pp.distance as usize + 1,
            PathElem {
                eopcode: Eop::Mismatch,
                lcs: 0,
            },
        );
        let local_offset = self.point_offset(pp);
        let remaining = self.valid_total_fronts(pp.distance as usize, self.gens.len());
        debug_assert!(remaining <= self.backrefs.len() as u64);
        let global_offset = self.backrefs.len() as u64 - remaining;
        let backref = self.backrefs[(global_offset + local_offset) as usize];
        let last_lcs = backref.lcs;
        self.stack.push(StackElem {
            diagonal: pp.aligned_len as i64 - 2 * i64::from(pp.row),
            score_sum: i64::from(backref.lcs) * i64::from(match_score),
            distance: pp.distance,
            global_offset,
            trimleft: pp.trimleft,
            lcs_sum: u64::from(backref.lcs),
            path_length: 0,
            row: pp.row,
            lcs: backref.lcs,
            trace: backref.bits,
            eopcode: Eop::Mismatch,
        });
        let mut final_path_length = 0;
        while let Some(top) = self.stack.pop() {
            if on_polsize_suffix && top.lcs_sum + top.path_length >= u64::from(pol_size) {
                on_polsize_suffix = false;
            }
            if top.path_length > 0 {
                debug_assert!(top.path_length - 1 <= pp.distance);
                self.path[top.path_length as usize - 1] = PathElem {
                    eopcode: top.eopcode,
                    lcs: top.lcs,
                };
            }
            if top.trace == 0 {
                final_path_length = top.path_length;
                break;
            }
            check_diagonal_run(useq, vseq, top.diagonal, top.row - top.lcs, top.row);
            self.backtrace_step(
                &top,
                on_polsize_suffix,
                match_score,
                difference_score,
                ulen,
                vlen,
            );
        }

        let first_index = script.len();
        if last_lcs > 0 {
            script.add_match(u64::from(last_lcs));
        }
        for idx in 0..final_path_length as usize {
            let elem = self.path[idx];
            match elem.eopcode {
                Eop::Deletion => script.add_deletion(),
                Eop::Insertion => script.add_insertion(),
                Eop::Mismatch => script.add_mismatch(),
            }
            if elem.lcs > 0 {
                script.add_match(u64::from(elem.lcs));
            }
        }
        script.reverse_suffix_from(first_index);
        script.set_polish_meta(PolishMeta {
            match_score,
            difference_score,
            pol_size,
        });
    }

    fn backtrace_step(
        &mut self,
        top: &StackElem,
        on_polsize_suffix: bool,
        match_score: i32,
        difference_score: i32,
        ulen: u64,
        vlen: u64,
    ) {
        debug_assert!(top.distance > 0 && top.trace != 0);
        let affordable = top.score_sum >= i64::from(difference_score);
        if top.trace & FT_EOP_INSERTION != 0 && (!on_polsize_suffix || affordable) {
            debug_assert!(-(ulen as i64) < top.diagonal);
            self.push_single(
                top,
                match_score,
                difference_score,
                top.diagonal - 1,
                top.row - top.lcs,
                Eop::Insertion,
            );
            if !on_polsize_suffix {
                return;
            }
        }
        if top.trace & FT_EOP_DELETION != 0 && (!on_polsize_suffix || affordable) {
            debug_assert!(top.diagonal < vlen as i64);
            self.push_single(
                top,
                match_score,
                difference_score,
                top.diagonal + 1,
                top.row - top.lcs - 1,
                Eop::Deletion,
            );
            if !on_polsize_suffix {
                return;
            }
        }
        if top.trace & FT_EOP_MISMATCH != 0 && (!on_polsize_suffix || affordable) {
            self.push_single(
                top,
                match_score,
                difference_score,
                top.diagonal,
                top.row - top.lcs - 1,
                Eop::Mismatch,
            );
        }
    }

    fn push_single(
        &mut self,
        top: &StackElem,
        match_score: i32,
        difference_score: i32,
        diagonal: i64,
        row: u32,
        eopcode: Eop,
    ) {
        let distance = top.distance - 1;
        let gen_above = self.gens[top.distance as usize];
        debug_assert!(top.trimleft >= u64::from(gen_above.trimleft_diff));
        let trimleft = top.trimleft - u64::from(gen_above.trimleft_diff);
        let generation = self.gens[distance as usize];
        let base_diagonal = trimleft as i64 - distance as i64;
        debug_assert!(base_diagonal <= diagonal);
        debug_assert!(diagonal < base_diagonal + i64::from(generation.valid));
        let local_offset = (diagonal - base_diagonal) as u64;
        debug_assert!(u64::from(generation.valid) <= top.global_offset);
        let global_offset = top.global_offset - u64::from(generation.valid);
        let backref = self.backrefs[(global_offset + local_offset) as usize];
        self.stack.push(StackElem {
            diagonal,
            score_sum: top.score_sum - i64::from(difference_score)
                + i64::from(backref.lcs) * i64::from(match_score),
            distance,
            global_offset,
            trimleft,
            lcs_sum: top.lcs_sum + u64::from(backref.lcs),
            path_length: top.path_length + 1,
            row,
            lcs: backref.lcs,
            trace: backref.bits,
            eopcode,
        });
    }
}

fn check_diagonal_run(
    useq: Option<&[u8]>,
    vseq: Option<&[u8]>,
    diagonal: i64,
    first_row: u32,
    next_row: u32,
) {
    if cfg!(debug_assertions)
        && let (Some(useq), Some(vseq)) = (useq, vseq)
    {
        debug_assert!(first_row <= next_row);
        for idx in first_row..next_row {
            let vpos = i64::from(idx) + diagonal;
            debug_assert!(vpos >= 0);
            debug_assert!(useq[idx as usize] == vseq[vpos as usize]);
        }
    }
}
