//! Packed 16-bit alignment edit operations.
//!
//! The two most significant bits select the operation; a zero tag means the
//! remaining bits carry the length of a run of identical residues, so a
//! long match is a single record. Protein scripts use two further bits for
//! the frame variants, which shrinks the run field: DNA runs go up to
//! `2^14 - 1`, protein runs up to `2^12 - 1`.
//!
//! An intron is a deletion record whose length bits are set; introns which
//! start after an incompletely processed codon are stored as the
//! deletion-with-gaps variants.

use serde::{Deserialize, Serialize};

/// The canonical on-wire form of one edit operation.
pub type PackedEditOp = u16;

pub const MAX_RUN_DNA: u16 = (1 << 14) - 1;
pub const MAX_RUN_PROTEIN: u16 = (1 << 12) - 1;

pub(crate) const DELETION_EOP: u16 = 1 << 14; /* 01|00|0^12 */
pub(crate) const INSERTION_EOP: u16 = 1 << 15; /* 10|00|0^12 */
pub(crate) const MISMATCH_EOP: u16 = 3 << 14; /* 11|00|0^12 */
pub(crate) const MISMATCH_WITH_1_GAP_EOP: u16 = 13 << 12; /* 11|01|0^12 */
pub(crate) const MISMATCH_WITH_2_GAPS_EOP: u16 = 14 << 12; /* 11|10|0^12 */
pub(crate) const DELETION_WITH_1_GAP_EOP: u16 = 5 << 12; /* 01|01|0^12 */
pub(crate) const DELETION_WITH_2_GAPS_EOP: u16 = 6 << 12; /* 01|10|0^12 */
/// Pseudo operation reserved for a dummy that is patched later.
pub(crate) const DUMMY_EOP: u16 = 15 << 12; /* 11|11|0^12 */

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Serialize, Deserialize)]
pub enum Alphabet {
    Dna,
    Protein,
}

impl Alphabet {
    pub fn max_run(self) -> u16 {
        match self {
            Self::Dna => MAX_RUN_DNA,
            Self::Protein => MAX_RUN_PROTEIN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(Serialize, Deserialize)]
pub enum EditOpKind {
    Match,
    Intron,
    IntronWith1BaseLeft,
    IntronWith2BasesLeft,
    Mismatch,
    Deletion,
    Insertion,
    MismatchWith1Gap,
    MismatchWith2Gaps,
    DeletionWith1Gap,
    DeletionWith2Gaps,
}

impl EditOpKind {
    /// Frame variants only occur in protein scripts.
    pub fn is_protein_only(self) -> bool {
        matches!(
            self,
            Self::IntronWith1BaseLeft
                | Self::IntronWith2BasesLeft
                | Self::MismatchWith1Gap
                | Self::MismatchWith2Gaps
                | Self::DeletionWith1Gap
                | Self::DeletionWith2Gaps
        )
    }

    pub fn is_intron(self) -> bool {
        matches!(
            self,
            Self::Intron | Self::IntronWith1BaseLeft | Self::IntronWith2BasesLeft
        )
    }

    /// Whether records of this kind carry a run length (everything else is
    /// stored one record per unit).
    pub fn carries_run(self) -> bool {
        matches!(self, Self::Match) || self.is_intron()
    }
}

/// Decodes a packed operation into its kind and run length.
pub fn decode(eop: PackedEditOp, alphabet: Alphabet) -> (EditOpKind, u32) {
    let maxlen = alphabet.max_run();
    if eop & maxlen != 0 {
        let kind = match eop & !maxlen {
            0 => EditOpKind::Match,
            DELETION_EOP => EditOpKind::Intron,
            DELETION_WITH_1_GAP_EOP => {
                debug_assert!(alphabet == Alphabet::Protein);
                EditOpKind::IntronWith1BaseLeft
            }
            DELETION_WITH_2_GAPS_EOP => {
                debug_assert!(alphabet == Alphabet::Protein);
                EditOpKind::IntronWith2BasesLeft
            }
            tag => unreachable!("illegal edit operation tag {tag:#x}"),
        };
        (kind, u32::from(eop & maxlen))
    } else {
        let kind = match eop {
            MISMATCH_EOP => EditOpKind::Mismatch,
            DELETION_EOP => EditOpKind::Deletion,
            INSERTION_EOP => EditOpKind::Insertion,
            MISMATCH_WITH_1_GAP_EOP => EditOpKind::MismatchWith1Gap,
            MISMATCH_WITH_2_GAPS_EOP => {
                debug_assert!(alphabet == Alphabet::Protein);
                EditOpKind::MismatchWith2Gaps
            }
            DELETION_WITH_1_GAP_EOP => {
                debug_assert!(alphabet == Alphabet::Protein);
                EditOpKind::DeletionWith1Gap
            }
            DELETION_WITH_2_GAPS_EOP => {
                debug_assert!(alphabet == Alphabet::Protein);
                EditOpKind::DeletionWith2Gaps
            }
            other => unreachable!("illegal edit operation {other:#x}"),
        };
        (kind, 1)
    }
}

/// Encodes one record. `run` must fit the alphabet's run field for
/// run-carrying kinds and must be 1 for all others.
pub fn encode(kind: EditOpKind, run: u32, alphabet: Alphabet) -> PackedEditOp {
    let maxlen = alphabet.max_run();
    debug_assert!(!kind.is_protein_only() || alphabet == Alphabet::Protein);
    match kind {
        EditOpKind::Match => {
            debug_assert!(run >= 1 && run <= u32::from(maxlen));
            run as u16
        }
        EditOpKind::Intron => {
            debug_assert!(run >= 1 && run <= u32::from(maxlen));
            DELETION_EOP | run as u16
        }
        EditOpKind::IntronWith1BaseLeft => {
            debug_assert!(run >= 1 && run <= u32::from(maxlen));
            DELETION_WITH_1_GAP_EOP | run as u16
        }
        EditOpKind::IntronWith2BasesLeft => {
            debug_assert!(run >= 1 && run <= u32::from(maxlen));
            DELETION_WITH_2_GAPS_EOP | run as u16
        }
        kind => {
            debug_assert!(run == 1);
            match kind {
                EditOpKind::Mismatch => MISMATCH_EOP,
                EditOpKind::Deletion => DELETION_EOP,
                EditOpKind::Insertion => INSERTION_EOP,
                EditOpKind::MismatchWith1Gap => MISMATCH_WITH_1_GAP_EOP,
                EditOpKind::MismatchWith2Gaps => MISMATCH_WITH_2_GAPS_EOP,
                EditOpKind::DeletionWith1Gap => DELETION_WITH_1_GAP_EOP,
                EditOpKind::DeletionWith2Gaps => DELETION_WITH_2_GAPS_EOP,
                _ => unreachable!(),
            }
        }
    }
}

/// Overwrites the run length of a run-carrying record.
pub fn set_run(eop: &mut PackedEditOp, run: u32, alphabet: Alphabet) {
    let maxlen = alphabet.max_run();
    debug_assert!(run >= 1 && run <= u32::from(maxlen));
    *eop = (*eop & !maxlen) | run as u16;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_runs_roundtrip() {
        for run in [1u32, 2, 100, u32::from(MAX_RUN_DNA)] {
            let eop = encode(EditOpKind::Match, run, Alphabet::Dna);
            assert_eq!((EditOpKind::Match, run), decode(eop, Alphabet::Dna));
        }
        let eop = encode(EditOpKind::Match, u32::from(MAX_RUN_PROTEIN), Alphabet::Protein);
        assert_eq!(
            (EditOpKind::Match, u32::from(MAX_RUN_PROTEIN)),
            decode(eop, Alphabet::Protein)
        );
    }

    #[test]
    fn single_unit_ops() {
        for kind in [EditOpKind::Mismatch, EditOpKind::Deletion, EditOpKind::Insertion] {
            let eop = encode(kind, 1, Alphabet::Dna);
            assert_eq!((kind, 1), decode(eop, Alphabet::Dna));
        }
    }

    #[test]
    fn intron_is_a_deletion_with_length() {
        let eop = encode(EditOpKind::Intron, 57, Alphabet::Dna);
        assert_eq!((EditOpKind::Intron, 57), decode(eop, Alphabet::Dna));
        assert_eq!(DELETION_EOP | 57, eop);
    }

    #[test]
    fn protein_frame_variants() {
        for kind in [
            EditOpKind::IntronWith1BaseLeft,
            EditOpKind::IntronWith2BasesLeft,
        ] {
            let eop = encode(kind, 9, Alphabet::Protein);
            assert_eq!((kind, 9), decode(eop, Alphabet::Protein));
        }
        for kind in [
            EditOpKind::MismatchWith1Gap,
            EditOpKind::MismatchWith2Gaps,
            EditOpKind::DeletionWith1Gap,
            EditOpKind::DeletionWith2Gaps,
        ] {
            let eop = encode(kind, 1, Alphabet::Protein);
            assert_eq!((kind, 1), decode(eop, Alphabet::Protein));
        }
    }

    #[test]
    fn set_run_keeps_the_tag() {
        let mut eop = encode(EditOpKind::Intron, 3, Alphabet::Dna);
        set_run(&mut eop, 1000, Alphabet::Dna);
        assert_eq!((EditOpKind::Intron, 1000), decode(eop, Alphabet::Dna));
    }
}
