//! The polishing lattice: a precomputed score table deciding whether an
//! alignment end is "polished".
//!
//! The front aligner probes polishedness at every front expansion, so the
//! O(history) score walk is precomputed into a table of `2^d` entries over
//! d-bit prefixes. A 2d-bit match history is polished iff every prefix of
//! it has a non-negative running score; the table reduces that to two
//! loads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
struct PolishValue {
    score_sum: i16,
    diff_from_max: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct PolishLattice {
    cut_depth: u32,
    mask: u64,
    match_score: i32,
    difference_score: i32,
    values: Vec<PolishValue>,
}

impl PolishLattice {
    pub fn new(error_percentage: f64, history_size: u32) -> Self {
        Self::with_bias(error_percentage, 1.0, history_size)
    }

    pub fn with_bias(error_percentage: f64, matchscore_bias: f64, history_size: u32) -> Self {
        let cut_depth = if history_size == 0 {
            15
        } else {
            (history_size / 2).min(15)
        };
        let match_score = (20.0 * error_percentage * matchscore_bias) as i32;
        debug_assert!(match_score <= 1000);
        let difference_score = 1000 - match_score;
        let entries = 1usize << cut_depth;
        let mut lattice = Self {
            cut_depth,
            mask: entries as u64 - 1,
            match_score,
            difference_score,
            values: vec![
                PolishValue {
                    score_sum: 0,
                    diff_from_max: 0,
                };
                entries
            ],
        };
        lattice.fill(0, 0, 0, 0);
        lattice
    }

    fn fill(&mut self, depth: u32, prefix: u64, score: i32, max_score: i32) {
        debug_assert!(depth <= self.cut_depth);
        if depth == self.cut_depth {
            debug_assert!(prefix < self.values.len() as u64);
            self.values[prefix as usize] = PolishValue {
                score_sum: score as i16,
                diff_from_max: (score - max_score) as i16,
            };
        } else {
            let max_score = max_score.max(score);
            self.fill(depth + 1, prefix << 1, score - self.difference_score, max_score);
            self.fill(depth + 1, (prefix << 1) | 1, score + self.match_score, max_score);
        }
    }

    pub fn cut_depth(&self) -> u32 {
        self.cut_depth
    }

    /// Length of the history window the lattice judges.
    pub fn pol_size(&self) -> u32 {
        2 * self.cut_depth
    }

    pub fn match_score(&self) -> i32 {
        self.match_score
    }

    pub fn difference_score(&self) -> i32 {
        self.difference_score
    }

    /// Largest judgeable history value.
    pub fn max_value(&self) -> u64 {
        (1u64 << (2 * self.cut_depth)) - 1
    }

    /// O(1) polished test on the low `2 * cut_depth` bits of `history`
    /// (least significant bit = most recent position of the window).
    pub fn is_polished(&self, history: u64) -> bool {
        let lo = &self.values[(history & self.mask) as usize];
        if lo.diff_from_max < 0 {
            return false;
        }
        let hi = &self.values[((history >> self.cut_depth) & self.mask) as usize];
        i32::from(lo.score_sum) + i32::from(hi.diff_from_max) >= 0
    }
}
