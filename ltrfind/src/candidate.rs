//! The prediction record of one LTR element.

use serde::{Deserialize, Serialize};

/// Borders and attributes of one predicted LTR pair. Created when a seed
/// survives X-drop extension, refined by the TSD/motif border search,
/// marked `skipped` during duplicate and overlap elimination.
#[derive(Debug, Clone, Copy, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct LtrCandidate {
    /// number of the sequence the element lives on
    pub contig: u64,
    /// 5' border of the left LTR
    pub left_ltr_5: u64,
    /// 3' border of the left LTR
    pub left_ltr_3: u64,
    /// 5' border of the right LTR
    pub right_ltr_5: u64,
    /// 3' border of the right LTR
    pub right_ltr_3: u64,
    pub len_left_tsd: u64,
    pub len_right_tsd: u64,
    /// TSDs were found
    pub tsd: bool,
    /// motif found at the outer borders
    pub motif_near_tsd: bool,
    /// motif found at the inner borders
    pub motif_far_tsd: bool,
    /// length and distance constraints hold
    pub length_dist_constraint: bool,
    /// percentage similarity of the two LTRs
    pub similarity: f64,
    /// dropped by duplicate or overlap elimination
    pub skipped: bool,
}

impl LtrCandidate {
    pub fn new(contig: u64) -> Self {
        Self {
            contig,
            left_ltr_5: 0,
            left_ltr_3: 0,
            right_ltr_5: 0,
            right_ltr_3: 0,
            len_left_tsd: 0,
            len_right_tsd: 0,
            tsd: false,
            motif_near_tsd: false,
            motif_far_tsd: false,
            length_dist_constraint: false,
            similarity: 0.0,
            skipped: false,
        }
    }

    pub fn left_len(&self) -> u64 {
        self.left_ltr_3 - self.left_ltr_5 + 1
    }

    pub fn right_len(&self) -> u64 {
        self.right_ltr_3 - self.right_ltr_5 + 1
    }

    /// Distance between the 5' borders of the two LTRs.
    pub fn ltr_distance(&self) -> u64 {
        self.right_ltr_5 - self.left_ltr_5
    }

    /// Whole element span as an inclusive interval.
    pub fn span(&self) -> (u64, u64) {
        (self.left_ltr_5, self.right_ltr_3)
    }
}
