//! The banded front-pruning edit-distance aligner.
//!
//! For growing edit distance the aligner evolves one generation of front
//! values over consecutive antidiagonals, walks matches along each
//! diagonal, trims hopeless fronts from both ends of the band, consults
//! the polishing lattice for better alignment endpoints, and records every
//! front into the trace table for the later backtrace.
//!
//! The front reservoir is owned by the caller and reused across calls on
//! the same thread; it grows monotonically to the high-water mark of a
//! pipeline and shifts are in-place moves, never reallocations.

use serde::{Deserialize, Serialize};

use crate::chars;
use crate::fronttrace::{FT_EOP_DELETION, FT_EOP_INSERTION, FT_EOP_MISMATCH, FrontTrace};
use crate::polish::PolishLattice;
use crate::seqview::SeqView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct FrontValue {
    match_history_bits: u64,
    row: u32,
    local_match_count: u32,
    match_history_size: u8,
    backref: u8,
    /// maximum number of mismatches on a path to this front
    max_mismatches: u32,
}

/// Best alignment endpoint found so far. Monotone: only replaced by a
/// strictly larger `aligned_len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(Serialize, Deserialize)]
pub struct PolishedPoint {
    pub aligned_len: u64,
    pub row: u32,
    pub distance: u64,
    pub trimleft: u64,
    pub max_mismatches: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub enum TrimmingStrategy {
    Always,
    OnNewPolishedPoint,
    Never,
}

/// Caller-owned storage for the current generation of fronts.
#[derive(Debug, Default)]
pub struct FrontReservoir {
    space: Vec<FrontValue>,
    offset: u64,
}

impl FrontReservoir {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.offset = 0;
    }

    /// Makes room for a generation of `valid` fronts starting at absolute
    /// antidiagonal `trimleft`; once enough dead space has accumulated on
    /// the left the live fronts are moved down in place.
    fn ensure(&mut self, minsize_for_shift: u64, trimleft: u64, valid: u64) {
        debug_assert!(trimleft >= self.offset);
        let needed = (trimleft - self.offset + valid) as usize;
        if needed >= self.space.len() {
            let new_len = 255 + (self.space.len() + self.space.len() / 5).max(needed);
            self.space.resize(new_len, FrontValue::default());
        }
        let lead = (trimleft - self.offset) as usize;
        if lead as u64 > valid.max(minsize_for_shift) {
            let copy_len = (valid as usize).min(self.space.len() - lead);
            self.space.copy_within(lead..lead + copy_len, 0);
            self.offset = trimleft;
        }
    }

    fn window(&mut self, trimleft: u64, valid: u64) -> &mut [FrontValue] {
        let base = (trimleft - self.offset) as usize;
        &mut self.space[base..base + valid as usize]
    }
}

/// Everything the pruning loop is parameterised with beyond the two
/// sequences.
#[derive(Debug, Clone, Copy)]
pub struct FrontPruneParams<'p> {
    pub lattice: &'p PolishLattice,
    pub trim_strategy: TrimmingStrategy,
    /// history window, at most 64
    pub max_history: u32,
    /// minimum percentage of matches in the history
    pub min_match_pct: u64,
    pub max_aligned_len_diff: u64,
    /// exact seed the extension starts from; pre-fills the match history
    pub seed_length: u64,
}

fn aligned_len(row: u32, diagonal: i64) -> i64 {
    2 * i64::from(row) + diagonal
}

fn update_match_history(fv: &mut FrontValue, max_history: u32) {
    if u32::from(fv.match_history_size) < max_history {
        fv.match_history_size += 1;
    }
    fv.match_history_bits <<= 1;
}

fn add_matches(fv: &mut FrontValue, diagonal: i64, max_history: u32, useq: &SeqView, vseq: &SeqView) {
    let vpos = i64::from(fv.row) + diagonal;
    fv.local_match_count = if u64::from(fv.row) >= useq.len() || vpos < 0 || vpos as u64 >= vseq.len()
    {
        0
    } else {
        useq.lcp(vseq, u64::from(fv.row), vpos as u64) as u32
    };
    if fv.local_match_count > 0 {
        let count = fv.local_match_count;
        let match_mask = if count >= max_history {
            u64::MAX
        } else {
            (1u64 << count) - 1
        };
        fv.match_history_bits = if count >= 64 {
            match_mask
        } else {
            (fv.match_history_bits << count) | match_mask
        };
        if u32::from(fv.match_history_size) < max_history {
            fv.match_history_size =
                (u32::from(fv.match_history_size) + count).min(max_history) as u8;
        }
        fv.row += count;
    }
}

/// Fan-out from the single distance-0 front to the three fronts of
/// distance 1.
fn front_second_inplace(
    window: &mut [FrontValue],
    base_diag: i64,
    max_history: u32,
    useq: &SeqView,
    vseq: &SeqView,
) -> i64 {
    debug_assert!(window.len() == 3);
    window[1] = window[0];
    window[2] = window[0];
    window[0].row += 1;
    window[0].backref = FT_EOP_DELETION;
    update_match_history(&mut window[0], max_history);
    add_matches(&mut window[0], base_diag, max_history, useq, vseq);
    let mut max_aligned = aligned_len(window[0].row, base_diag);

    window[1].row += 1;
    window[1].backref = FT_EOP_MISMATCH;
    window[1].max_mismatches += 1;
    update_match_history(&mut window[1], max_history);
    add_matches(&mut window[1], base_diag + 1, max_history, useq, vseq);
    max_aligned = max_aligned.max(aligned_len(window[1].row, base_diag + 1));

    window[2].backref = FT_EOP_INSERTION;
    update_match_history(&mut window[2], max_history);
    add_matches(&mut window[2], base_diag + 2, max_history, useq, vseq);
    max_aligned.max(aligned_len(window[2].row, base_diag + 2))
}

/// Evolves a generation in place. Each new front is the best of up to
/// three parents combined with a mismatch, insertion or deletion step;
/// ties accumulate backreference bits so every optimal predecessor stays
/// recoverable.
fn front_next_inplace(
    window: &mut [FrontValue],
    base_diag: i64,
    max_history: u32,
    useq: &SeqView,
    vseq: &SeqView,
) -> i64 {
    let valid = window.len();
    debug_assert!(valid >= 4);
    // the front on the lowest diagonal only has a deletion parent
    let mut insertion_value = window[0];
    let mut bestfront = insertion_value;
    bestfront.row += 1;
    update_match_history(&mut bestfront, max_history);
    window[0] = bestfront;
    window[0].backref = FT_EOP_DELETION;
    add_matches(&mut window[0], base_diag, max_history, useq, vseq);
    let mut max_aligned = aligned_len(window[0].row, base_diag);

    let mut replacement_value = window[1];
    if bestfront.row < replacement_value.row + 1 {
        bestfront = replacement_value;
        bestfront.backref = FT_EOP_DELETION;
        bestfront.row += 1;
        update_match_history(&mut bestfront, max_history);
    } else {
        bestfront.backref = FT_EOP_MISMATCH;
        bestfront.max_mismatches += 1;
        if bestfront.row == replacement_value.row + 1 {
            bestfront.backref |= FT_EOP_DELETION;
            if bestfront.max_mismatches < replacement_value.max_mismatches {
                bestfront.max_mismatches = replacement_value.max_mismatches;
            }
        }
    }
    window[1] = bestfront;
    add_matches(&mut window[1], base_diag + 1, max_history, useq, vseq);
    max_aligned = max_aligned.max(aligned_len(window[1].row, base_diag + 1));

    for i in 2..valid {
        let mut bestfront = insertion_value;
        bestfront.backref = FT_EOP_INSERTION;
        if i <= valid - 2 {
            if bestfront.row < replacement_value.row + 1 {
                bestfront = replacement_value;
                bestfront.backref = FT_EOP_MISMATCH;
                bestfront.max_mismatches += 1;
                bestfront.row += 1;
            } else if bestfront.row == replacement_value.row + 1 {
                bestfront.backref |= FT_EOP_MISMATCH;
                if bestfront.max_mismatches < replacement_value.max_mismatches + 1 {
                    bestfront.max_mismatches = replacement_value.max_mismatches + 1;
                }
            }
        }
        if i <= valid - 3 {
            let old = window[i];
            if bestfront.row < old.row + 1 {
                bestfront = old;
                bestfront.backref = FT_EOP_DELETION;
                bestfront.row += 1;
            } else if bestfront.row == old.row + 1 {
                bestfront.backref |= FT_EOP_DELETION;
            }
        }
        update_match_history(&mut bestfront, max_history);
        if i < valid - 1 {
            insertion_value = replacement_value;
            replacement_value = window[i];
        }
        window[i] = bestfront;
        add_matches(&mut window[i], base_diag + i as i64, max_history, useq, vseq);
        max_aligned = max_aligned.max(aligned_len(window[i].row, base_diag + i as i64));
    }
    max_aligned
}

fn trim_this_entry(
    fv: &FrontValue,
    diagonal: i64,
    min_match_pct128: u64,
    min_len_from_max_diff: i64,
    max_history_mask: u64,
) -> bool {
    if aligned_len(fv.row, diagonal) < min_len_from_max_diff {
        return true;
    }
    u64::from((fv.match_history_bits & max_history_mask).count_ones())
        < (u64::from(fv.match_history_size) * min_match_pct128) >> 7
}

#[allow(clippy::too_many_arguments)]
fn trim_front(
    window: &[FrontValue],
    base_diag: i64,
    upward: bool,
    distance: u64,
    ulen: u64,
    vlen: u64,
    min_match_pct128: u64,
    min_len_from_max_diff: i64,
    strategy: TrimmingStrategy,
    best_pp: &PolishedPoint,
    max_history_mask: u64,
) -> u64 {
    match strategy {
        TrimmingStrategy::Never => return 0,
        TrimmingStrategy::OnNewPolishedPoint => {
            if best_pp.distance + 1 < distance && best_pp.distance + 30 >= distance {
                return 0;
            }
        }
        TrimmingStrategy::Always => {}
    }
    let mut trimmed = 0;
    let len = window.len();
    for step in 0..len {
        let i = if upward { step } else { len - 1 - step };
        let fv = &window[i];
        let diagonal = base_diag + i as i64;
        let vreach = i64::from(fv.row) + diagonal;
        if u64::from(fv.row) <= ulen
            && vreach <= vlen as i64
            && !trim_this_entry(fv, diagonal, min_match_pct128, min_len_from_max_diff, max_history_mask)
        {
            break;
        }
        trimmed += 1;
    }
    trimmed
}

fn update_trace_and_polished(
    best_pp: &mut PolishedPoint,
    front_trace: Option<&mut FrontTrace>,
    lattice: &PolishLattice,
    distance: u64,
    trimleft: u64,
    window: &[FrontValue],
    base_diag: i64,
) {
    let mut trace = front_trace;
    for (i, fv) in window.iter().enumerate() {
        let diagonal = base_diag + i as i64;
        debug_assert!(diagonal >= 0 || i64::from(fv.row) >= -diagonal);
        let aligned = aligned_len(fv.row, diagonal);
        if aligned > best_pp.aligned_len as i64 {
            let mut filled = fv.match_history_bits;
            let pol_size = lattice.pol_size();
            if u32::from(fv.match_history_size) < pol_size {
                let shift = pol_size - u32::from(fv.match_history_size);
                let fill_bits = (1u64 << shift) - 1;
                filled |= fill_bits << fv.match_history_size;
            }
            if lattice.is_polished(filled) {
                best_pp.aligned_len = aligned as u64;
                best_pp.row = fv.row;
                best_pp.distance = distance;
                best_pp.trimleft = trimleft;
                best_pp.max_mismatches = u64::from(fv.max_mismatches);
            }
        }
        if let Some(trace) = trace.as_deref_mut() {
            trace.add_front(fv.backref, fv.local_match_count);
        }
    }
}

/// Pruned wavefront edit distance between the two views.
///
/// Returns the edit distance of the full alignment when one is reached
/// inside the band, and `ulen + vlen + 1` when the band died out or the
/// distance left it. `best_pp` is updated with the best polished endpoint
/// either way; when `front_trace` is given every surviving generation is
/// recorded for the backtrace.
pub fn front_prune_edist(
    reservoir: &mut FrontReservoir,
    best_pp: &mut PolishedPoint,
    mut front_trace: Option<&mut FrontTrace>,
    params: &FrontPruneParams<'_>,
    useq: &SeqView<'_>,
    vseq: &SeqView<'_>,
) -> u64 {
    let ulen = useq.len();
    let vlen = vseq.len();
    let sum_seq_length = ulen + vlen;
    let minsize_for_shift = sum_seq_length / 1000;
    debug_assert!(params.max_history >= 1 && params.max_history <= 64);
    // pre-scaled so the percentage check is a shift
    let pct = params.min_match_pct;
    let min_match_pct128 = (pct * 128) / 100 + u64::from((pct * 128) % 100 != 0);
    let max_history_mask = if params.max_history == 64 {
        u64::MAX
    } else {
        (1u64 << params.max_history) - 1
    };

    reservoir.reset();
    if let Some(trace) = front_trace.as_deref_mut() {
        trace.reset();
    }
    let mut trimleft: u64 = 0;
    let mut valid: u64 = 1;
    let mut distance: u64 = 0;
    let mut died_out = false;

    loop {
        debug_assert!(valid <= 2 * distance + 1);
        reservoir.ensure(minsize_for_shift, trimleft, valid);
        let base_diag = trimleft as i64 - distance as i64;
        let max_aligned;
        {
            let window = reservoir.window(trimleft, valid);
            if distance == 0 {
                let front = &mut window[0];
                front.row = 0;
                front.match_history_bits = if params.seed_length >= 64 {
                    u64::MAX
                } else {
                    (1u64 << params.seed_length) - 1
                };
                front.match_history_size =
                    u64::from(params.max_history).min(params.seed_length) as u8;
                front.backref = 0;
                front.max_mismatches = 0;
                front.local_match_count = 0;
                add_matches(front, 0, params.max_history, useq, vseq);
                max_aligned = aligned_len(window[0].row, 0);
            } else if valid == 3 {
                max_aligned =
                    front_second_inplace(window, base_diag, params.max_history, useq, vseq);
            } else {
                max_aligned = front_next_inplace(window, base_diag, params.max_history, useq, vseq);
            }
        }
        let min_len_from_max_diff = max_aligned - params.max_aligned_len_diff as i64;

        let trim = trim_front(
            reservoir.window(trimleft, valid),
            base_diag,
            true,
            distance,
            ulen,
            vlen,
            min_match_pct128,
            min_len_from_max_diff,
            params.trim_strategy,
            best_pp,
            max_history_mask,
        );
        if trim > 0 {
            debug_assert!(valid >= trim);
            trimleft += trim;
            valid -= trim;
        }
        if valid > 0 {
            let base_diag = trimleft as i64 - distance as i64;
            let trim = trim_front(
                reservoir.window(trimleft, valid),
                base_diag,
                false,
                distance,
                ulen,
                vlen,
                min_match_pct128,
                min_len_from_max_diff,
                params.trim_strategy,
                best_pp,
                max_history_mask,
            );
            debug_assert!(trim < valid || trim == 0);
            valid -= trim;
        }
        if valid == 0 {
            died_out = true;
            break;
        }
        if let Some(trace) = front_trace.as_deref_mut() {
            trace.add_generation(trimleft, valid);
        }
        {
            let base_diag = trimleft as i64 - distance as i64;
            let window = &reservoir.space
                [(trimleft - reservoir.offset) as usize..(trimleft - reservoir.offset + valid) as usize];
            update_trace_and_polished(
                best_pp,
                front_trace.as_deref_mut(),
                params.lattice,
                distance,
                trimleft,
                window,
                base_diag,
            );
        }
        if (vlen > ulen && vlen - ulen <= distance) || (vlen <= ulen && ulen - vlen <= distance) {
            let target = distance + vlen - ulen;
            if target >= trimleft && target <= trimleft + valid - 1 {
                let front = &reservoir.space[(target - reservoir.offset) as usize];
                if u64::from(front.row) == ulen {
                    break;
                }
            }
        }
        if distance >= sum_seq_length {
            died_out = true;
            break;
        }
        distance += 1;
        valid += 2;
    }
    if died_out {
        sum_seq_length + 1
    } else {
        distance
    }
}

/// The full, history-free wavefront with trace recording. Used to
/// re-align tracepoint segments and as the unit edit-distance oracle.
#[derive(Debug, Default)]
pub struct FullFrontEdist {
    space: Vec<FrontValue>,
    trace: FrontTrace,
}

fn full_add_matches(fv: &mut FrontValue, diagonal: i64, useq: &[u8], vseq: &[u8]) {
    let mut upos = u64::from(fv.row);
    let mut vpos = i64::from(fv.row) + diagonal;
    while upos < useq.len() as u64
        && vpos >= 0
        && (vpos as u64) < vseq.len() as u64
        && useq[upos as usize] == vseq[vpos as usize]
        && !chars::is_special(useq[upos as usize])
    {
        upos += 1;
        vpos += 1;
    }
    fv.local_match_count = upos as u32 - fv.row;
    fv.row = upos as u32;
}

fn full_front_second_inplace(window: &mut [FrontValue], base_diag: i64, useq: &[u8], vseq: &[u8]) {
    window[1] = window[0];
    window[2] = window[0];
    window[0].row += 1;
    window[0].backref = FT_EOP_DELETION;
    full_add_matches(&mut window[0], base_diag, useq, vseq);
    window[1].row += 1;
    window[1].backref = FT_EOP_MISMATCH;
    full_add_matches(&mut window[1], base_diag + 1, useq, vseq);
    window[2].backref = FT_EOP_INSERTION;
    full_add_matches(&mut window[2], base_diag + 2, useq, vseq);
}

fn full_front_next_inplace(window: &mut [FrontValue], base_diag: i64, useq: &[u8], vseq: &[u8]) {
    let valid = window.len();
    let mut insertion_value = window[0];
    let mut bestfront = insertion_value;
    bestfront.row += 1;
    window[0] = bestfront;
    window[0].backref = FT_EOP_DELETION;
    full_add_matches(&mut window[0], base_diag, useq, vseq);

    let mut replacement_value = window[1];
    if bestfront.row < replacement_value.row + 1 {
        bestfront = replacement_value;
        bestfront.backref = FT_EOP_DELETION;
        bestfront.row += 1;
    } else {
        bestfront.backref = FT_EOP_MISMATCH;
        if bestfront.row == replacement_value.row + 1 {
            bestfront.backref |= FT_EOP_DELETION;
        }
    }
    window[1] = bestfront;
    full_add_matches(&mut window[1], base_diag + 1, useq, vseq);
    for i in 2..valid {
        let mut bestfront = insertion_value;
        bestfront.backref = FT_EOP_INSERTION;
        if i <= valid - 2 {
            if bestfront.row < replacement_value.row + 1 {
                bestfront = replacement_value;
                bestfront.backref = FT_EOP_MISMATCH;
                bestfront.row += 1;
            } else if bestfront.row == replacement_value.row + 1 {
                bestfront.backref |= FT_EOP_MISMATCH;
            }
        }
        if i <= valid - 3 {
            let old = window[i];
            if bestfront.row < old.row + 1 {
                bestfront = old;
                bestfront.backref = FT_EOP_DELETION;
                bestfront.row += 1;
            } else if bestfront.row == old.row + 1 {
                bestfront.backref |= FT_EOP_DELETION;
            }
        }
        if i < valid - 1 {
            insertion_value = replacement_value;
            replacement_value = window[i];
        }
        window[i] = bestfront;
        full_add_matches(&mut window[i], base_diag + i as i64, useq, vseq);
    }
}

impl FullFrontEdist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace(&self) -> &FrontTrace {
        &self.trace
    }

    /// Unit edit distance with full trace recording; never fails since the
    /// band is not pruned.
    pub fn distance_with_trace(&mut self, useq: &[u8], vseq: &[u8]) -> u64 {
        self.distance_generic(useq, vseq, true)
    }

    /// Unit edit distance only.
    pub fn distance(&mut self, useq: &[u8], vseq: &[u8]) -> u64 {
        self.distance_generic(useq, vseq, false)
    }

    fn distance_generic(&mut self, useq: &[u8], vseq: &[u8], with_trace: bool) -> u64 {
        let ulen = useq.len() as u64;
        let vlen = vseq.len() as u64;
        let sum_seq_length = ulen + vlen;
        self.trace.reset();
        let mut distance = 0;
        loop {
            debug_assert!(distance <= sum_seq_length);
            let width = (2 * distance + 1) as usize;
            if width >= self.space.len() {
                let new_len = (self.space.len() + self.space.len() / 5 + 32).max(width + 1);
                self.space.resize(new_len, FrontValue::default());
            }
            let base_diag = -(distance as i64);
            let window = &mut self.space[..width];
            if distance == 0 {
                window[0] = FrontValue::default();
                full_add_matches(&mut window[0], 0, useq, vseq);
            } else if distance == 1 {
                full_front_second_inplace(window, base_diag, useq, vseq);
            } else {
                full_front_next_inplace(window, base_diag, useq, vseq);
            }
            if with_trace {
                self.trace.add_generation(0, width as u64);
                for fv in window.iter() {
                    self.trace.add_front(fv.backref, fv.local_match_count);
                }
            }
            if (vlen > ulen && vlen - ulen <= distance) || (vlen <= ulen && ulen - vlen <= distance)
            {
                let target = (distance + vlen - ulen) as usize;
                if u64::from(self.space[target].row) == ulen {
                    break;
                }
            }
            distance += 1;
        }
        distance
    }

    /// Endpoint record for the backtrace of the last
    /// [Self::distance_with_trace] run.
    pub fn endpoint(&self, ulen: u64, vlen: u64, distance: u64) -> PolishedPoint {
        PolishedPoint {
            aligned_len: ulen + vlen,
            row: ulen as u32,
            distance,
            trimleft: 0,
            max_mismatches: 0,
        }
    }
}
