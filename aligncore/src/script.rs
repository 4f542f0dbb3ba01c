//! Edit scripts: ordered lists of packed edit operations.
//!
//! Scripts are built operation by operation (fronts emit them in reverse
//! chronological order, hence the in-place reversal helpers), can be read
//! twice through independent reader cursors, and render to and from CIGAR
//! strings. Deletion and insertion counts are maintained as operations are
//! appended.

use serde::{Deserialize, Serialize};

use crate::editop::{self, Alphabet, EditOpKind, PackedEditOp};

pub const DELETION_CHAR: char = 'D';
pub const INSERTION_CHAR: char = 'I';
pub const MATCH_CHAR: char = '=';
pub const MISMATCH_CHAR: char = 'X';
pub const REPLACEMENT_CHAR: char = 'M';
pub const INTRON_CHAR: char = 'N';

#[derive(Debug, Clone, thiserror::Error)]
pub enum CigarParseError {
    #[error("illegal character {found:?} in cigar string")]
    IllegalCharacter { found: char },
    #[error("cigar token without a count")]
    MissingCount,
    #[error("trailing count without an operation letter")]
    TrailingCount,
}

/// Number of leading positions/operations hidden at one end of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(Serialize, Deserialize)]
pub struct Cutoffs {
    /// genomic positions cut off
    pub genomic: u64,
    /// reference positions cut off
    pub reference: u64,
    /// whole records cut off; differs from the other two because a whole
    /// intron is one record
    pub ops: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub enum CutoffMode {
    /// stop trimming at the first match or mismatch record
    Minimal,
    /// stop trimming at the first match record
    Relaxed,
    /// stop trimming once a match/mismatch stretch reaches the configured
    /// genomic exon length; the stretch itself is not trimmed
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[derive(Serialize, Deserialize)]
pub struct PolishMeta {
    pub match_score: i32,
    pub difference_score: i32,
    pub pol_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[derive(Serialize, Deserialize)]
pub struct SeedRegion {
    pub offset: u64,
    pub len: u64,
}

/// One merged CIGAR token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    pub kind: EditOpKind,
    pub run: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScriptCounts {
    pub matches: u64,
    pub mismatches: u64,
    pub insertions: u64,
    pub deletions: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditScript {
    ops: Vec<PackedEditOp>,
    alphabet: Alphabet,
    dummy_index: Option<usize>,
    deletions: u64,
    insertions: u64,
    useq: Option<Vec<u8>>,
    vseq: Option<Vec<u8>>,
    seed: Option<SeedRegion>,
    polish: Option<PolishMeta>,
}

impl EditScript {
    pub fn new(alphabet: Alphabet) -> Self {
        Self {
            ops: Vec::new(),
            alphabet,
            dummy_index: None,
            deletions: 0,
            insertions: 0,
            useq: None,
            vseq: None,
            seed: None,
            polish: None,
        }
    }

    pub fn alphabet(&self) -> Alphabet {
        self.alphabet
    }

    /// Number of stored records (not alignment columns).
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn reset(&mut self) {
        self.ops.clear();
        self.dummy_index = None;
        self.deletions = 0;
        self.insertions = 0;
        self.useq = None;
        self.vseq = None;
    }

    pub fn deletion_count(&self) -> u64 {
        self.deletions
    }

    pub fn insertion_count(&self) -> u64 {
        self.insertions
    }

    pub fn set_sequences(&mut self, useq: Vec<u8>, vseq: Vec<u8>) {
        self.useq = Some(useq);
        self.vseq = Some(vseq);
    }

    pub fn sequences(&self) -> Option<(&[u8], &[u8])> {
        Some((self.useq.as_deref()?, self.vseq.as_deref()?))
    }

    pub fn set_seed_region(&mut self, offset: u64, len: u64) {
        self.seed = Some(SeedRegion { offset, len });
    }

    pub fn seed_region(&self) -> Option<SeedRegion> {
        self.seed
    }

    pub fn set_polish_meta(&mut self, meta: PolishMeta) {
        self.polish = Some(meta);
    }

    pub fn polish_meta(&self) -> Option<PolishMeta> {
        self.polish
    }

    /// Appends `run` matched positions, coalescing into a trailing match
    /// record while it has room.
    pub fn add_match(&mut self, run: u64) {
        debug_assert!(run > 0);
        let maxlen = u64::from(self.alphabet.max_run());
        let mut run = run;
        if !self.last_is_dummy()
            && let Some(last) = self.ops.last_mut()
        {
            let (kind, old) = editop::decode(*last, self.alphabet);
            if kind == EditOpKind::Match && u64::from(old) < maxlen {
                let take = run.min(maxlen - u64::from(old));
                editop::set_run(last, (u64::from(old) + take) as u32, self.alphabet);
                run -= take;
            }
        }
        while run > maxlen {
            self.ops
                .push(editop::encode(EditOpKind::Match, maxlen as u32, self.alphabet));
            run -= maxlen;
        }
        if run > 0 {
            self.ops
                .push(editop::encode(EditOpKind::Match, run as u32, self.alphabet));
        }
    }

    pub fn add_mismatch(&mut self) {
        self.ops
            .push(editop::encode(EditOpKind::Mismatch, 1, self.alphabet));
    }

    pub fn add_deletion(&mut self) {
        self.ops
            .push(editop::encode(EditOpKind::Deletion, 1, self.alphabet));
        self.deletions += 1;
    }

    pub fn add_insertion(&mut self) {
        self.ops
            .push(editop::encode(EditOpKind::Insertion, 1, self.alphabet));
        self.insertions += 1;
    }

    /// Appends `run` intron positions, coalescing like [Self::add_match].
    pub fn add_intron(&mut self, run: u64) {
        self.add_intron_kind(EditOpKind::Intron, run);
    }

    pub fn add_intron_with_1_base_left(&mut self, run: u64) {
        debug_assert!(self.alphabet == Alphabet::Protein);
        self.add_intron_kind(EditOpKind::IntronWith1BaseLeft, run);
    }

    pub fn add_intron_with_2_bases_left(&mut self, run: u64) {
        debug_assert!(self.alphabet == Alphabet::Protein);
        self.add_intron_kind(EditOpKind::IntronWith2BasesLeft, run);
    }

    fn add_intron_kind(&mut self, intron: EditOpKind, run: u64) {
        debug_assert!(run > 0);
        let maxlen = u64::from(self.alphabet.max_run());
        let mut run = run;
        if !self.last_is_dummy()
            && let Some(last) = self.ops.last_mut()
        {
            let (kind, old) = editop::decode(*last, self.alphabet);
            if kind == intron && u64::from(old) < maxlen {
                let take = run.min(maxlen - u64::from(old));
                editop::set_run(last, (u64::from(old) + take) as u32, self.alphabet);
                run -= take;
            }
        }
        while run > maxlen {
            self.ops
                .push(editop::encode(intron, maxlen as u32, self.alphabet));
            run -= maxlen;
        }
        if run > 0 {
            self.ops.push(editop::encode(intron, run as u32, self.alphabet));
        }
    }

    pub fn add_mismatch_with_1_gap(&mut self) {
        debug_assert!(self.alphabet == Alphabet::Protein);
        self.ops
            .push(editop::encode(EditOpKind::MismatchWith1Gap, 1, self.alphabet));
    }

    pub fn add_mismatch_with_2_gaps(&mut self) {
        debug_assert!(self.alphabet == Alphabet::Protein);
        self.ops
            .push(editop::encode(EditOpKind::MismatchWith2Gaps, 1, self.alphabet));
    }

    pub fn add_deletion_with_1_gap(&mut self) {
        debug_assert!(self.alphabet == Alphabet::Protein);
        self.ops
            .push(editop::encode(EditOpKind::DeletionWith1Gap, 1, self.alphabet));
        self.deletions += 1;
    }

    pub fn add_deletion_with_2_gaps(&mut self) {
        debug_assert!(self.alphabet == Alphabet::Protein);
        self.ops
            .push(editop::encode(EditOpKind::DeletionWith2Gaps, 1, self.alphabet));
        self.deletions += 1;
    }

    /// Reserves a placeholder which must later be patched to a match or a
    /// mismatch with [Self::set_dummy]. While the dummy is pending the
    /// script is not consumable.
    pub fn add_dummy(&mut self) {
        debug_assert!(self.dummy_index.is_none());
        self.ops.push(editop::DUMMY_EOP);
        self.dummy_index = Some(self.ops.len() - 1);
    }

    pub fn set_dummy(&mut self, is_match: bool) {
        let idx = self.dummy_index.expect("no dummy pending");
        self.ops[idx] = if is_match {
            editop::encode(EditOpKind::Match, 1, self.alphabet)
        } else {
            editop::encode(EditOpKind::Mismatch, 1, self.alphabet)
        };
        self.dummy_index = None;
    }

    pub fn contains_dummy(&self) -> bool {
        self.dummy_index.is_some()
    }

    fn last_is_dummy(&self) -> bool {
        self.dummy_index
            .is_some_and(|idx| idx + 1 == self.ops.len())
    }

    pub fn last_is_intron(&self) -> bool {
        if self.last_is_dummy() {
            return false;
        }
        match self.ops.last() {
            None => false,
            Some(&eop) => editop::decode(eop, self.alphabet).0.is_intron(),
        }
    }

    pub fn reverse(&mut self) {
        self.reverse_suffix_from(0);
    }

    /// Reverses the record order from `first` to the end; the fronts emit
    /// operations newest first, so a freshly reconstructed suffix is
    /// flipped back with this.
    pub fn reverse_suffix_from(&mut self, first: usize) {
        debug_assert!(self.dummy_index.is_none_or(|idx| idx < first));
        self.ops[first..].reverse();
    }

    pub fn prepend(&mut self, other: &EditScript) {
        debug_assert!(self.alphabet == other.alphabet);
        debug_assert!(!other.contains_dummy());
        let mut joined = other.ops.clone();
        joined.extend_from_slice(&self.ops);
        self.ops = joined;
        self.dummy_index = self.dummy_index.map(|idx| idx + other.ops.len());
        self.deletions += other.deletions;
        self.insertions += other.insertions;
    }

    pub fn append(&mut self, other: &EditScript) {
        debug_assert!(self.alphabet == other.alphabet);
        debug_assert!(!other.contains_dummy());
        self.ops.extend_from_slice(&other.ops);
        self.deletions += other.deletions;
        self.insertions += other.insertions;
    }

    /// Decoded records in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (EditOpKind, u32)> + '_ {
        debug_assert!(!self.contains_dummy());
        self.ops
            .iter()
            .map(move |&eop| editop::decode(eop, self.alphabet))
    }

    pub fn reader(&self, forward: bool) -> ScriptReader<'_> {
        debug_assert!(!self.contains_dummy());
        ScriptReader::new(self, forward)
    }

    pub fn counts(&self) -> ScriptCounts {
        let mut counts = ScriptCounts::default();
        for (kind, run) in self.iter() {
            match kind {
                EditOpKind::Match => counts.matches += u64::from(run),
                EditOpKind::Mismatch
                | EditOpKind::MismatchWith1Gap
                | EditOpKind::MismatchWith2Gaps => counts.mismatches += u64::from(run),
                EditOpKind::Insertion => counts.insertions += u64::from(run),
                EditOpKind::Deletion
                | EditOpKind::DeletionWith1Gap
                | EditOpKind::DeletionWith2Gaps => counts.deletions += u64::from(run),
                EditOpKind::Intron
                | EditOpKind::IntronWith1BaseLeft
                | EditOpKind::IntronWith2BasesLeft => {}
            }
        }
        counts
    }

    pub fn to_cigar_string(&self, distinguish_match_mismatch: bool) -> String {
        let mut out = String::new();
        let mut reader = self.reader(true);
        while let Some(co) = reader.next_cigar(distinguish_match_mismatch) {
            out.push_str(&co.run.to_string());
            out.push(pretty_print(co.kind, distinguish_match_mismatch));
        }
        out
    }

    /// Parses `<count><letter>` tokens up to the end, `sep` or a newline.
    pub fn from_cigar_string(
        s: &str,
        sep: Option<char>,
        alphabet: Alphabet,
    ) -> Result<Self, CigarParseError> {
        let mut script = Self::new(alphabet);
        let mut run: u64 = 0;
        let mut have_count = false;
        for c in s.chars() {
            if Some(c) == sep || c == '\n' {
                break;
            }
            if let Some(d) = c.to_digit(10) {
                run = run * 10 + u64::from(d);
                have_count = true;
                continue;
            }
            if !have_count {
                return Err(CigarParseError::MissingCount);
            }
            match c {
                DELETION_CHAR => {
                    for _ in 0..run {
                        script.add_deletion();
                    }
                }
                INSERTION_CHAR => {
                    for _ in 0..run {
                        script.add_insertion();
                    }
                }
                MATCH_CHAR | REPLACEMENT_CHAR => {
                    if run > 0 {
                        script.add_match(run);
                    }
                }
                MISMATCH_CHAR => {
                    for _ in 0..run {
                        script.add_mismatch();
                    }
                }
                INTRON_CHAR => {
                    if run > 0 {
                        script.add_intron(run);
                    }
                }
                found => return Err(CigarParseError::IllegalCharacter { found }),
            }
            run = 0;
            have_count = false;
        }
        if have_count {
            return Err(CigarParseError::TrailingCount);
        }
        Ok(script)
    }

    /// Moves every insertion stretch that sits between two introns past the
    /// surrounding intron(s), so that no exon ends up with zero bases.
    /// Returns how many zero-base exons were removed.
    pub fn remove_zero_base_exons(&mut self) -> u64 {
        debug_assert!(!self.contains_dummy());
        let mut removed = 0;
        let len = self.ops.len();
        if len < 3 {
            return 0;
        }
        let mut i = 1;
        while i + 1 < self.ops.len() {
            if self.kind_at(i) == EditOpKind::Insertion && self.kind_at(i - 1).is_intron() {
                let mut j = i + 1;
                while j < self.ops.len() {
                    if self.kind_at(j).is_intron() {
                        let mut a = i;
                        let mut b = j;
                        while b < self.ops.len() {
                            self.ops.swap(a, b);
                            a += 1;
                            b += 1;
                            if b >= self.ops.len() || !self.kind_at(b).is_intron() {
                                break;
                            }
                        }
                        removed += 1;
                        break;
                    } else if self.kind_at(j) != EditOpKind::Insertion {
                        break;
                    }
                    j += 1;
                }
            }
            i += 1;
        }
        removed
    }

    pub fn contains_no_zero_base_exons(&self) -> bool {
        debug_assert!(!self.contains_dummy());
        let len = self.ops.len();
        for i in 1..len.saturating_sub(1) {
            if self.kind_at(i) == EditOpKind::Insertion && self.kind_at(i - 1).is_intron() {
                for j in i + 1..len {
                    if self.kind_at(j).is_intron() {
                        return false;
                    } else if self.kind_at(j) != EditOpKind::Insertion {
                        break;
                    }
                }
            }
        }
        true
    }

    fn kind_at(&self, idx: usize) -> EditOpKind {
        editop::decode(self.ops[idx], self.alphabet).0
    }

    /// Checks the script against the stored sequences and the claimed
    /// edit distance: match runs must cover equal non-special residues,
    /// mismatch columns must not, and the per-kind sums must account for
    /// both sequence lengths. Violations are programming errors and
    /// abort.
    pub fn verify(&self, edist: u64) {
        let (useq, vseq) = self
            .sequences()
            .expect("verify needs the aligned sequences");
        let mut sum_ulen = 0u64;
        let mut sum_vlen = 0u64;
        let mut sum_dist = 0u64;
        let mut reader = self.reader(true);
        while let Some(co) = reader.next_cigar(true) {
            match co.kind {
                EditOpKind::Deletion
                | EditOpKind::DeletionWith1Gap
                | EditOpKind::DeletionWith2Gaps => {
                    sum_ulen += co.run;
                    sum_dist += co.run;
                }
                EditOpKind::Insertion => {
                    sum_vlen += co.run;
                    sum_dist += co.run;
                }
                EditOpKind::Intron
                | EditOpKind::IntronWith1BaseLeft
                | EditOpKind::IntronWith2BasesLeft => {
                    sum_ulen += co.run;
                }
                EditOpKind::Match | EditOpKind::Mismatch => {
                    if co.kind == EditOpKind::Mismatch {
                        sum_dist += co.run;
                    }
                    for idx in 0..co.run {
                        let a = useq[(sum_ulen + idx) as usize];
                        let b = vseq[(sum_vlen + idx) as usize];
                        let residues_match = a == b && !crate::chars::is_special(a);
                        if co.kind == EditOpKind::Match {
                            assert!(residues_match, "mismatching residues in a match run");
                        } else {
                            assert!(!residues_match, "matching residues in a mismatch run");
                        }
                    }
                    sum_ulen += co.run;
                    sum_vlen += co.run;
                }
                EditOpKind::MismatchWith1Gap | EditOpKind::MismatchWith2Gaps => {
                    sum_dist += co.run;
                    sum_ulen += co.run;
                    sum_vlen += co.run;
                }
            }
        }
        assert!(sum_ulen == useq.len() as u64, "script does not cover the first sequence");
        assert!(sum_vlen == vseq.len() as u64, "script does not cover the second sequence");
        assert!(sum_dist == edist, "script distance does not match");
    }

    /// Leading and terminal cutoffs under the given modes; `min_exon_len`
    /// only matters for [CutoffMode::Strict].
    pub fn determine_cutoffs(
        &self,
        lead_mode: CutoffMode,
        term_mode: CutoffMode,
        min_exon_len: u64,
    ) -> (Cutoffs, Cutoffs) {
        debug_assert!(!self.contains_dummy());
        let forward: Vec<_> = self.iter().collect();
        let lead = cutoffs_one_end(&forward, self.alphabet, lead_mode, min_exon_len);
        let backward: Vec<_> = forward.iter().rev().copied().collect();
        let term = cutoffs_one_end(&backward, self.alphabet, term_mode, min_exon_len);
        (lead, term)
    }
}

fn pretty_print(kind: EditOpKind, distinguish_match_mismatch: bool) -> char {
    match kind {
        EditOpKind::Deletion | EditOpKind::DeletionWith1Gap | EditOpKind::DeletionWith2Gaps => {
            DELETION_CHAR
        }
        EditOpKind::Insertion => INSERTION_CHAR,
        EditOpKind::Mismatch | EditOpKind::MismatchWith1Gap | EditOpKind::MismatchWith2Gaps => {
            if distinguish_match_mismatch {
                MISMATCH_CHAR
            } else {
                REPLACEMENT_CHAR
            }
        }
        EditOpKind::Match => {
            if distinguish_match_mismatch {
                MATCH_CHAR
            } else {
                REPLACEMENT_CHAR
            }
        }
        EditOpKind::Intron | EditOpKind::IntronWith1BaseLeft | EditOpKind::IntronWith2BasesLeft => {
            INTRON_CHAR
        }
    }
}

/// Per-record genomic/reference advance, following the codon bookkeeping of
/// protein alignments.
#[derive(Debug, Clone, Copy, Default)]
struct Traversal {
    genomic: u64,
    reference: u64,
    processing_intron_with_1_base_left: bool,
    processing_intron_with_2_bases_left: bool,
}

const CODON_LENGTH: u64 = 3;

impl Traversal {
    fn advance(&mut self, kind: EditOpKind, run: u64, alphabet: Alphabet) {
        debug_assert!(
            !(self.processing_intron_with_1_base_left && self.processing_intron_with_2_bases_left)
        );
        let protein = alphabet == Alphabet::Protein;
        match kind {
            EditOpKind::Match | EditOpKind::Mismatch => {
                if protein {
                    if self.processing_intron_with_1_base_left {
                        debug_assert!(run == 1);
                        self.processing_intron_with_1_base_left = false;
                        self.genomic += run * CODON_LENGTH - 1;
                        self.reference += run;
                    } else if self.processing_intron_with_2_bases_left {
                        debug_assert!(run == 1);
                        self.processing_intron_with_2_bases_left = false;
                        self.genomic += run * CODON_LENGTH - 2;
                        self.reference += run - 1;
                    } else {
                        self.genomic += run * CODON_LENGTH;
                        self.reference += run;
                    }
                } else {
                    self.genomic += run;
                    self.reference += run;
                }
            }
            EditOpKind::Deletion => {
                self.genomic += if protein { CODON_LENGTH } else { 1 };
            }
            EditOpKind::Insertion => self.reference += 1,
            EditOpKind::Intron => self.genomic += run,
            EditOpKind::IntronWith1BaseLeft => {
                if !self.processing_intron_with_1_base_left {
                    self.processing_intron_with_1_base_left = true;
                    self.genomic += 1;
                }
                self.genomic += run;
            }
            EditOpKind::IntronWith2BasesLeft => {
                if !self.processing_intron_with_2_bases_left {
                    self.processing_intron_with_2_bases_left = true;
                    self.genomic += 2;
                    self.reference += 1;
                }
                self.genomic += run;
            }
            EditOpKind::MismatchWith1Gap => {
                if self.processing_intron_with_1_base_left {
                    self.processing_intron_with_1_base_left = false;
                    self.genomic += 1;
                    self.reference += 1;
                } else if self.processing_intron_with_2_bases_left {
                    self.processing_intron_with_2_bases_left = false;
                } else {
                    self.genomic += 2;
                    self.reference += 1;
                }
            }
            EditOpKind::MismatchWith2Gaps => {
                if self.processing_intron_with_1_base_left {
                    self.processing_intron_with_1_base_left = false;
                    self.reference += 1;
                } else {
                    self.genomic += 1;
                    self.reference += 1;
                }
            }
            EditOpKind::DeletionWith1Gap => {
                if self.processing_intron_with_1_base_left {
                    self.processing_intron_with_1_base_left = false;
                    self.genomic += 1;
                } else {
                    self.genomic += 2;
                }
            }
            EditOpKind::DeletionWith2Gaps => {
                if !self.processing_intron_with_1_base_left {
                    self.genomic += 1;
                }
            }
        }
    }
}

fn is_matchish(kind: EditOpKind) -> bool {
    matches!(
        kind,
        EditOpKind::Match
            | EditOpKind::Mismatch
            | EditOpKind::MismatchWith1Gap
            | EditOpKind::MismatchWith2Gaps
    )
}

fn exon_genomic_factor(kind: EditOpKind, alphabet: Alphabet) -> u64 {
    if alphabet != Alphabet::Protein {
        return 1;
    }
    match kind {
        EditOpKind::MismatchWith1Gap => 2,
        EditOpKind::MismatchWith2Gaps => 1,
        _ => CODON_LENGTH,
    }
}

fn cutoffs_one_end(
    records: &[(EditOpKind, u32)],
    alphabet: Alphabet,
    mode: CutoffMode,
    min_exon_len: u64,
) -> Cutoffs {
    let mut cutoffs = Cutoffs::default();
    let mut state = Traversal::default();
    // strict-mode exon accumulators
    let mut exon_genomic = 0u64;
    let mut exon_reference = 0u64;
    let mut exon_ops = 0u64;
    for &(kind, run) in records {
        let run = u64::from(run);
        let stop = match mode {
            CutoffMode::Minimal => is_matchish(kind),
            CutoffMode::Relaxed => kind == EditOpKind::Match,
            CutoffMode::Strict => {
                is_matchish(kind)
                    && !state.processing_intron_with_1_base_left
                    && !state.processing_intron_with_2_bases_left
                    && exon_genomic + run * exon_genomic_factor(kind, alphabet) >= min_exon_len
            }
        };
        if stop {
            if mode == CutoffMode::Strict {
                cutoffs.genomic = state.genomic - exon_genomic;
                cutoffs.reference = state.reference - exon_reference;
                cutoffs.ops -= exon_ops;
            } else {
                cutoffs.genomic = state.genomic;
                cutoffs.reference = state.reference;
            }
            return cutoffs;
        }
        cutoffs.ops += 1;
        if mode == CutoffMode::Strict {
            if is_matchish(kind) {
                exon_genomic += run * exon_genomic_factor(kind, alphabet);
                exon_reference += run;
                exon_ops += 1;
            } else {
                exon_genomic = 0;
                exon_reference = 0;
                exon_ops = 0;
            }
        }
        state.advance(kind, run, alphabet);
    }
    cutoffs.genomic = state.genomic;
    cutoffs.reference = state.reference;
    cutoffs
}

/// Cursor over a script, merging consecutive records of one kind into
/// single CIGAR tokens. Forward and backward readings are independent of
/// each other and of the script.
pub struct ScriptReader<'a> {
    script: &'a EditScript,
    next: usize,
    forward: bool,
    remaining: usize,
}

impl<'a> ScriptReader<'a> {
    fn new(script: &'a EditScript, forward: bool) -> Self {
        Self {
            script,
            next: if forward {
                0
            } else {
                script.ops.len().saturating_sub(1)
            },
            forward,
            remaining: script.ops.len(),
        }
    }

    fn bump(&mut self) {
        self.remaining -= 1;
        if self.forward {
            self.next += 1;
        } else {
            self.next = self.next.wrapping_sub(1);
        }
    }

    fn peek(&self) -> Option<(EditOpKind, u32)> {
        if self.remaining == 0 {
            return None;
        }
        Some(editop::decode(
            self.script.ops[self.next],
            self.script.alphabet,
        ))
    }

    /// The next merged token, or `None` once the script is exhausted.
    pub fn next_cigar(&mut self, distinguish_match_mismatch: bool) -> Option<CigarOp> {
        let (first_kind, first_run) = self.peek()?;
        self.bump();
        let mut current = CigarOp {
            kind: if !distinguish_match_mismatch && first_kind == EditOpKind::Mismatch {
                EditOpKind::Match
            } else {
                first_kind
            },
            run: u64::from(first_run),
        };
        while let Some((kind, run)) = self.peek() {
            let kind = if !distinguish_match_mismatch && kind == EditOpKind::Mismatch {
                EditOpKind::Match
            } else {
                kind
            };
            if kind != current.kind {
                break;
            }
            current.run += u64::from(run);
            self.bump();
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dna() -> EditScript {
        EditScript::new(Alphabet::Dna)
    }

    #[test]
    fn matches_coalesce_until_max_run() {
        let mut s = dna();
        s.add_match(3);
        s.add_match(4);
        assert_eq!(1, s.len());
        s.add_mismatch();
        s.add_match(2);
        assert_eq!(3, s.len());
        assert_eq!("7=1X2=", s.to_cigar_string(true));
        assert_eq!("10M", s.to_cigar_string(false));
    }

    #[test]
    fn undistinguished_cigar_merges_match_and_mismatch() {
        let mut s = dna();
        s.add_match(4);
        s.add_mismatch();
        s.add_match(3);
        assert_eq!("4=1X3=", s.to_cigar_string(true));
        assert_eq!("8M", s.to_cigar_string(false));
    }

    #[test]
    fn long_match_splits_into_max_runs() {
        let mut s = dna();
        let total = u64::from(editop::MAX_RUN_DNA) + 5;
        s.add_match(total);
        assert_eq!(2, s.len());
        assert_eq!(format!("{total}="), s.to_cigar_string(true));
    }

    #[test]
    fn cigar_round_trip() {
        let cigar = "12=1X3=2I5=3D7=";
        let s = EditScript::from_cigar_string(cigar, None, Alphabet::Dna).unwrap();
        assert_eq!(cigar, s.to_cigar_string(true));
        let again =
            EditScript::from_cigar_string(&s.to_cigar_string(true), None, Alphabet::Dna).unwrap();
        assert_eq!(s, again);
        assert_eq!(2, s.insertion_count());
        assert_eq!(3, s.deletion_count());
    }

    proptest::proptest! {
        #[test]
        fn cigar_round_trip_any_script(cigar in "([1-9][0-9]{0,2}[=XIDN]){1,16}") {
            // one parse normalises adjacent runs; after that the textual
            // and the record forms are stable under round-tripping
            let s1 = EditScript::from_cigar_string(&cigar, None, Alphabet::Dna).unwrap();
            let c1 = s1.to_cigar_string(true);
            let s2 = EditScript::from_cigar_string(&c1, None, Alphabet::Dna).unwrap();
            proptest::prop_assert_eq!(&s1, &s2);
            proptest::prop_assert_eq!(c1, s2.to_cigar_string(true));
        }

        #[test]
        fn cigar_accounting_matches_parse(cigar in "([1-9][0-9]{0,2}[=XID]){1,16}") {
            let s = EditScript::from_cigar_string(&cigar, None, Alphabet::Dna).unwrap();
            let counts = s.counts();
            proptest::prop_assert_eq!(counts.insertions, s.insertion_count());
            proptest::prop_assert_eq!(counts.deletions, s.deletion_count());
        }
    }

    #[test]
    fn cigar_stops_at_separator_and_rejects_garbage() {
        let s = EditScript::from_cigar_string("4=;9X", Some(';'), Alphabet::Dna).unwrap();
        assert_eq!("4=", s.to_cigar_string(true));
        assert!(EditScript::from_cigar_string("3=4", None, Alphabet::Dna).is_err());
        assert!(EditScript::from_cigar_string("=", None, Alphabet::Dna).is_err());
        assert!(EditScript::from_cigar_string("3Q", None, Alphabet::Dna).is_err());
    }

    #[test]
    fn dummy_blocks_consumption_until_patched() {
        let mut s = dna();
        s.add_match(2);
        s.add_dummy();
        assert!(s.contains_dummy());
        assert!(!s.last_is_intron());
        s.set_dummy(false);
        assert!(!s.contains_dummy());
        assert_eq!("2=1X", s.to_cigar_string(true));

        let mut s = dna();
        s.add_dummy();
        s.set_dummy(true);
        s.add_match(3);
        // the patched dummy is a match record the next match coalesces into
        assert_eq!(1, s.len());
        assert_eq!("4=", s.to_cigar_string(true));
    }

    #[test]
    fn dummy_does_not_coalesce_while_pending() {
        let mut s = dna();
        s.add_dummy();
        s.add_match(3);
        s.set_dummy(true);
        assert_eq!(2, s.len());
        assert_eq!("4=", s.to_cigar_string(true));
    }

    #[test]
    fn reverse_suffix() {
        let mut s = dna();
        s.add_deletion();
        s.add_match(2);
        s.add_insertion();
        s.reverse_suffix_from(1);
        assert_eq!("1D1I2=", s.to_cigar_string(true));
        s.reverse();
        assert_eq!("2=1I1D", s.to_cigar_string(true));
    }

    #[test]
    fn prepend_append_keep_counts() {
        let mut a = EditScript::from_cigar_string("2=1D", None, Alphabet::Dna).unwrap();
        let b = EditScript::from_cigar_string("1I3=", None, Alphabet::Dna).unwrap();
        a.append(&b);
        assert_eq!("2=1D1I3=", a.to_cigar_string(true));
        let c = EditScript::from_cigar_string("1X", None, Alphabet::Dna).unwrap();
        a.prepend(&c);
        assert_eq!("1X2=1D1I3=", a.to_cigar_string(true));
        assert_eq!(1, a.deletion_count());
        assert_eq!(1, a.insertion_count());
    }

    #[test]
    fn backward_reader_mirrors_forward() {
        let s = EditScript::from_cigar_string("4=1X2D3=", None, Alphabet::Dna).unwrap();
        let mut r = s.reader(false);
        let mut tokens = Vec::new();
        while let Some(co) = r.next_cigar(true) {
            tokens.push((co.kind, co.run));
        }
        assert_eq!(
            vec![
                (EditOpKind::Match, 3),
                (EditOpKind::Deletion, 2),
                (EditOpKind::Mismatch, 1),
                (EditOpKind::Match, 4),
            ],
            tokens
        );
    }

    #[test]
    fn intron_is_one_record() {
        let mut s = dna();
        s.add_match(2);
        s.add_intron(120);
        s.add_intron(7);
        s.add_match(2);
        assert_eq!(3, s.len());
        assert_eq!("2=127N2=", s.to_cigar_string(true));
        assert!(!s.last_is_intron());
        let mut t = dna();
        t.add_intron(9);
        assert!(t.last_is_intron());
    }

    #[test]
    fn zero_base_exon_removal() {
        // intron, insertion, intron: the insertion moves past the intron
        let mut s = dna();
        s.add_match(2);
        s.add_intron(10);
        s.add_insertion();
        s.add_intron(20);
        s.add_match(2);
        assert!(!s.contains_no_zero_base_exons());
        assert_eq!(1, s.remove_zero_base_exons());
        assert!(s.contains_no_zero_base_exons());
        assert_eq!("2=10N20N1I2=", s.to_cigar_string(true));
    }

    #[test]
    fn zero_base_exon_keeps_clean_scripts() {
        let mut s = dna();
        s.add_match(2);
        s.add_intron(10);
        s.add_match(1);
        s.add_insertion();
        s.add_intron(20);
        s.add_match(2);
        assert!(s.contains_no_zero_base_exons());
        assert_eq!(0, s.remove_zero_base_exons());
    }

    #[test]
    fn verify_accepts_a_faithful_script() {
        use crate::chars;
        let u = chars::encode(b"ACGTACGT");
        let v = chars::encode(b"ACGTTCGT");
        let mut s = EditScript::from_cigar_string("4=1X3=", None, Alphabet::Dna).unwrap();
        s.set_sequences(u, v);
        s.verify(1);
    }

    #[test]
    #[should_panic(expected = "matching residues in a mismatch run")]
    fn verify_rejects_a_lying_script() {
        use crate::chars;
        let u = chars::encode(b"ACGT");
        let v = chars::encode(b"ACGT");
        let mut s = EditScript::from_cigar_string("2=1X1=", None, Alphabet::Dna).unwrap();
        s.set_sequences(u, v);
        s.verify(1);
    }

    #[test]
    fn seed_region_and_polish_meta_are_carried() {
        let mut s = dna();
        s.add_match(8);
        assert_eq!(None, s.seed_region());
        s.set_seed_region(2, 4);
        assert_eq!(Some(SeedRegion { offset: 2, len: 4 }), s.seed_region());
        s.set_polish_meta(PolishMeta {
            match_score: 200,
            difference_score: 800,
            pol_size: 30,
        });
        assert_eq!(30, s.polish_meta().unwrap().pol_size);
    }

    #[test]
    fn counts_accounting() {
        let s = EditScript::from_cigar_string("4=2X1I3D2=", None, Alphabet::Dna).unwrap();
        let counts = s.counts();
        assert_eq!(6, counts.matches);
        assert_eq!(2, counts.mismatches);
        assert_eq!(1, counts.insertions);
        assert_eq!(3, counts.deletions);
    }

    #[test]
    fn minimal_cutoffs_stop_at_first_matchish() {
        let s = EditScript::from_cigar_string("2D1X4=1I", None, Alphabet::Dna).unwrap();
        let (lead, term) = s.determine_cutoffs(CutoffMode::Minimal, CutoffMode::Minimal, 0);
        // leading deletions are cut, the mismatch already stops the trim
        assert_eq!(2, lead.ops);
        assert_eq!(2, lead.genomic);
        assert_eq!(0, lead.reference);
        // terminal insertion is cut
        assert_eq!(1, term.ops);
        assert_eq!(0, term.genomic);
        assert_eq!(1, term.reference);
    }

    #[test]
    fn relaxed_cutoffs_cut_leading_mismatches() {
        let s = EditScript::from_cigar_string("2D1X4=", None, Alphabet::Dna).unwrap();
        let (lead, _) = s.determine_cutoffs(CutoffMode::Relaxed, CutoffMode::Minimal, 0);
        assert_eq!(3, lead.ops);
        assert_eq!(3, lead.genomic);
        assert_eq!(1, lead.reference);
    }

    #[test]
    fn strict_cutoffs_require_a_long_enough_exon() {
        // the 2= stretch is too short for min_exon_len 4 and gets cut with
        // its surrounding indels; the 5= stretch stops the trim
        let s = EditScript::from_cigar_string("1D2=1I5=", None, Alphabet::Dna).unwrap();
        let (lead, _) = s.determine_cutoffs(CutoffMode::Strict, CutoffMode::Minimal, 4);
        assert_eq!(3, lead.ops);
        assert_eq!(3, lead.genomic);
        assert_eq!(3, lead.reference);
    }

    #[test]
    fn strict_cutoffs_roll_back_the_stretch() {
        // the stretch 2=1X3= reaches length 4 on its third record and is
        // rolled back out of the cutoff
        let s = EditScript::from_cigar_string("1D2=1X3=", None, Alphabet::Dna).unwrap();
        let (lead, _) = s.determine_cutoffs(CutoffMode::Strict, CutoffMode::Minimal, 4);
        assert_eq!(1, lead.ops);
        assert_eq!(1, lead.genomic);
        assert_eq!(0, lead.reference);
    }
}
