//! Seed extension with the arbitrary-score X-drop wavefront.
//!
//! Scores are normalised to unit distances through their greatest common
//! divisor (doubling everything first when the match score is odd); the
//! fronts of one extension live in a caller-owned quadratic table indexed
//! by `d*d + d + k`. A diagonal is dropped once its score falls more than
//! the X-drop term below the best score seen, and the extension ends when
//! the permitted number of all-dead generations is exceeded.

use aligncore::chars;
use aligncore::seqview::SeqView;
use serde::{Deserialize, Serialize};

/// Match, mismatch and indel scores of the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct XdropScores {
    pub mat: i32,
    pub mis: i32,
    pub ins: i32,
    pub del: i32,
}

/// Unit distances derived from the scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct XdropDistances {
    mis: u64,
    ins: u64,
    del: u64,
    gcd: i64,
    /// scaled match score after normalisation
    mat: i64,
    /// 1 when the scores were used as given, 2 when they were doubled
    factor: i64,
}

fn gcd_step(mut m: u64, mut n: u64) -> u64 {
    if m < n {
        std::mem::swap(&mut m, &mut n);
    }
    while n != 0 {
        let r = m % n;
        m = n;
        n = r;
    }
    m
}

impl XdropScores {
    /// The distances from the scores: mismatches, insertions and deletions
    /// cost `(mat - mis) / gcd`, `(mat/2 - ins) / gcd` and
    /// `(mat/2 - del) / gcd` generations.
    fn distances(&self) -> XdropDistances {
        debug_assert!(self.mat > 0 && self.mis < self.mat && self.ins < self.mat && self.del < self.mat);
        // an odd match score has no exact half; double everything
        let (mat, mis, ins, del, factor) = if self.mat % 2 != 0 {
            (
                i64::from(self.mat) * 2,
                i64::from(self.mis) * 2,
                i64::from(self.ins) * 2,
                i64::from(self.del) * 2,
                2,
            )
        } else {
            (
                i64::from(self.mat),
                i64::from(self.mis),
                i64::from(self.ins),
                i64::from(self.del),
                1,
            )
        };
        let m = (mat - mis) as u64;
        let n = (mat / 2 - ins) as u64;
        let g = gcd_step(m, n);
        let g = gcd_step(g, (mat / 2 - del) as u64);
        XdropDistances {
            mis: (mat - mis) as u64 / g,
            ins: (mat / 2 - ins) as u64 / g,
            del: (mat / 2 - del) as u64 / g,
            gcd: g as i64,
            mat,
            factor,
        }
    }
}

/// Best extension endpoint: `ivalue`/`jvalue` positions consumed of the
/// two sequences, and the score there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(Serialize, Deserialize)]
pub struct XdropBest {
    pub ivalue: u64,
    pub jvalue: u64,
    pub score: i64,
}

const MINUS_INFINITY: i64 = i64::MIN / 2;

/// Caller-owned front table, reused across extensions.
#[derive(Debug, Default)]
pub struct XdropFronts {
    rows: Vec<i64>,
}

impl XdropFronts {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.rows.clear();
    }

    fn index(d: i64, k: i64) -> usize {
        debug_assert!(d >= 0 && -d <= k && k <= d);
        (d * d + d + k) as usize
    }

    fn get(&self, d: i64, k: i64) -> i64 {
        if d < 0 || k < -d || k > d {
            return MINUS_INFINITY;
        }
        let idx = Self::index(d, k);
        if idx >= self.rows.len() {
            MINUS_INFINITY
        } else {
            self.rows[idx]
        }
    }

    fn set(&mut self, d: i64, k: i64, row: i64) {
        let idx = Self::index(d, k);
        if idx >= self.rows.len() {
            self.rows.resize(idx + 1, MINUS_INFINITY);
        }
        self.rows[idx] = row;
    }
}

/// Walks matches on a diagonal; a separator in either sequence truncates
/// that sequence for the rest of the extension, a wildcard or difference
/// just stops the walk.
fn walk_matches(
    useq: &SeqView<'_>,
    vseq: &SeqView<'_>,
    mut i: i64,
    mut j: i64,
    ulen: &mut i64,
    vlen: &mut i64,
) -> (i64, i64) {
    while i < *ulen && j < *vlen {
        let a = useq.char_at(i as u64);
        if chars::is_separator(a) {
            *ulen = i;
            break;
        }
        let b = vseq.char_at(j as u64);
        if chars::is_separator(b) {
            *vlen = j;
            break;
        }
        if a != b || chars::is_wildcard(a) {
            break;
        }
        i += 1;
        j += 1;
    }
    (i, j)
}

/// Extends an alignment from the origin of the two views until every
/// diagonal of the band scores below `best - xdrop_below`. The views
/// decide the direction: build them right-to-left for a left extension.
pub fn evaluate_xdrop(
    scores: &XdropScores,
    fronts: &mut XdropFronts,
    useq: &SeqView<'_>,
    vseq: &SeqView<'_>,
    xdrop_below: i64,
) -> XdropBest {
    let dists = scores.distances();
    let xdrop_scaled = xdrop_below * dists.factor;
    // diagonals carry k = i - j
    let mut ulen = useq.len() as i64;
    let mut vlen = vseq.len() as i64;
    let allowed_dead_generations =
        dists.mis.max(dists.ins).max(dists.del) as i64 - 1;
    let score_of = |aligned: i64, d: i64| aligned * (dists.mat / 2) - d * dists.gcd;

    fronts.reset();
    let (i, _j) = walk_matches(useq, vseq, 0, 0, &mut ulen, &mut vlen);
    fronts.set(0, 0, i);
    let mut best = XdropBest {
        ivalue: i as u64,
        jvalue: i as u64,
        score: score_of(2 * i, 0) / dists.factor,
    };
    let mut best_scaled = score_of(2 * i, 0);
    if i >= ulen || i >= vlen {
        // one sequence is exhausted straight away
        return best;
    }

    let max_dist = dists.mis.max(dists.ins).max(dists.del) as i64;
    let cap = (ulen + vlen + 2) * max_dist + 1;
    let mut lbound: i64 = 0;
    let mut ubound: i64 = 0;
    let mut dead_generations = 0i64;
    let mut d: i64 = 0;
    loop {
        d += 1;
        if d > cap {
            break;
        }
        let klo = (lbound - 1).max(-d).max(-vlen);
        let khi = (ubound + 1).min(d).min(ulen);
        let mut gen_lbound = i64::MAX;
        let mut gen_ubound = i64::MIN;
        let mut finished = false;
        for k in klo..=khi {
            // best reachable row among the three predecessors
            let mut row = MINUS_INFINITY;
            let from_mis = fronts.get(d - dists.mis as i64, k);
            if from_mis != MINUS_INFINITY {
                row = from_mis + 1;
            }
            let from_ins = fronts.get(d - dists.ins as i64, k + 1);
            if from_ins != MINUS_INFINITY && from_ins > row {
                row = from_ins;
            }
            let from_del = fronts.get(d - dists.del as i64, k - 1);
            if from_del != MINUS_INFINITY && from_del + 1 > row {
                row = from_del + 1;
            }
            if row == MINUS_INFINITY || row < 0 || row > ulen || row - k > vlen || row - k < 0 {
                fronts.set(d, k, MINUS_INFINITY);
                continue;
            }
            let (i, j) = walk_matches(useq, vseq, row, row - k, &mut ulen, &mut vlen);
            let score = score_of(i + j, d);
            if score > best_scaled {
                best_scaled = score;
                best = XdropBest {
                    ivalue: i as u64,
                    jvalue: j as u64,
                    score: score / dists.factor,
                };
            }
            if score < best_scaled - xdrop_scaled {
                fronts.set(d, k, MINUS_INFINITY);
            } else {
                fronts.set(d, k, i);
                gen_lbound = gen_lbound.min(k);
                gen_ubound = gen_ubound.max(k);
                if i >= ulen && j >= vlen {
                    finished = true;
                }
            }
        }
        if finished {
            break;
        }
        if gen_lbound > gen_ubound {
            // a whole generation died; later generations may still reach
            // back across it when the unit distances differ
            dead_generations += 1;
            if dead_generations > allowed_dead_generations {
                break;
            }
            lbound -= 1;
            ubound += 1;
        } else {
            dead_generations = 0;
            lbound = gen_lbound;
            ubound = gen_ubound;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores() -> XdropScores {
        XdropScores {
            mat: 2,
            mis: -2,
            ins: -3,
            del: -3,
        }
    }

    fn forward_view(enc: &[u8]) -> SeqView<'_> {
        SeqView::over_bytes(enc)
    }

    #[test]
    fn distances_from_scores() {
        let d = scores().distances();
        assert_eq!(4, d.gcd);
        assert_eq!(1, d.mis);
        assert_eq!(1, d.ins);
        assert_eq!(1, d.del);
        assert_eq!(1, d.factor);

        let odd = XdropScores {
            mat: 3,
            mis: -1,
            ins: -2,
            del: -2,
        };
        let d = odd.distances();
        assert_eq!(2, d.factor);
        assert_eq!(6, d.mat);
        // doubled: mat-mis = 8, mat/2-ins = 7 -> gcd 1
        assert_eq!(1, d.gcd);
        assert_eq!(8, d.mis);
        assert_eq!(7, d.ins);
    }

    #[test]
    fn identical_sequences_extend_to_the_end() {
        let u = chars::encode(b"ACGTACGTACGT");
        let v = chars::encode(b"ACGTACGTACGT");
        let mut fronts = XdropFronts::new();
        let best = evaluate_xdrop(&scores(), &mut fronts, &forward_view(&u), &forward_view(&v), 5);
        assert_eq!(12, best.ivalue);
        assert_eq!(12, best.jvalue);
        // twelve matches at score 2 each
        assert_eq!(24, best.score);
    }

    #[test]
    fn mismatch_tail_stops_the_extension() {
        let u = chars::encode(b"ACGTACGTAAAAAAAA");
        let v = chars::encode(b"ACGTACGTCCCCCCCC");
        let mut fronts = XdropFronts::new();
        let best = evaluate_xdrop(&scores(), &mut fronts, &forward_view(&u), &forward_view(&v), 5);
        assert_eq!(8, best.ivalue);
        assert_eq!(8, best.jvalue);
        assert_eq!(16, best.score);
    }

    #[test]
    fn single_mismatch_is_bridged() {
        let u = chars::encode(b"ACGTACGTTTTTGGCA");
        let v = chars::encode(b"ACGTACGATTTTGGCA");
        let mut fronts = XdropFronts::new();
        let best = evaluate_xdrop(&scores(), &mut fronts, &forward_view(&u), &forward_view(&v), 8);
        assert_eq!(16, best.ivalue);
        assert_eq!(16, best.jvalue);
        // fifteen matches at 2, one mismatch at -2
        assert_eq!(28, best.score);
    }

    #[test]
    fn indel_is_bridged() {
        let u = chars::encode(b"ACGTACGTTTTTGGCA");
        let v = chars::encode(b"ACGTACGTTTTTGGCAA");
        let mut fronts = XdropFronts::new();
        let best = evaluate_xdrop(&scores(), &mut fronts, &forward_view(&u), &forward_view(&v), 8);
        assert_eq!(16, best.ivalue);
        // the trailing insertion never pays for itself
        assert_eq!(16, best.jvalue);
    }

    #[test]
    fn left_extension_through_reverse_views() {
        // extending left of position 8 in both sequences
        let u = chars::encode(b"GGGGACGTTTTTTTTT");
        let v = chars::encode(b"CCGGACGTAAAAAAAA");
        let uview = SeqView::new(
            aligncore::seqview::SeqSource::Bytes(&u),
            false,
            aligncore::seqview::ReadMode::Forward,
            0,
            0,
            8,
            Some(16),
        )
        .unwrap();
        let vview = SeqView::new(
            aligncore::seqview::SeqSource::Bytes(&v),
            false,
            aligncore::seqview::ReadMode::Forward,
            0,
            0,
            8,
            Some(16),
        )
        .unwrap();
        let mut fronts = XdropFronts::new();
        let best = evaluate_xdrop(&scores(), &mut fronts, &uview, &vview, 5);
        // TGCA matches backwards, then GG vs GG matches two more
        assert_eq!(6, best.ivalue);
        assert_eq!(6, best.jvalue);
    }

    #[test]
    fn separator_truncates() {
        let mut u = chars::encode(b"ACGT");
        u.push(chars::SEPARATOR);
        u.extend(chars::encode(b"ACGT"));
        let v = chars::encode(b"ACGTACGTT");
        let mut fronts = XdropFronts::new();
        let best = evaluate_xdrop(&scores(), &mut fronts, &forward_view(&u), &forward_view(&v), 10);
        assert_eq!(4, best.ivalue);
        assert_eq!(4, best.jvalue);
    }
}
