//! Streaming DUST low-complexity masker.
//!
//! The masker scores triplet frequencies in a sliding window over a
//! buffered lookahead of `windowsize + linker` residues. Residues come out
//! in input order, each exactly once, with low-complexity stretches
//! lowercased in the original and replaced by the wildcard code in the
//! encoded value. After the first full pass the recorded masked ranges are
//! replayed directly, so reopening the masker on the same input is cheap.
//!
//! Windowing and scoring follow Morgulis et al. 2006; per-sequence state
//! resets at every separator, so masks never cross one.

use std::collections::VecDeque;
use std::io;

use aligncore::chars;
use serde::{Deserialize, Serialize};

const TRIPLET_VALUES: usize = 64;

/// Where the masker reads `(encoded value, original byte)` pairs from.
pub trait ResidueSource {
    fn next_with_original(&mut self) -> io::Result<Option<(u8, u8)>>;
}

/// In-memory source over ASCII sequences joined by separators.
#[derive(Debug, Clone, Default)]
pub struct SliceSource {
    pairs: Vec<(u8, u8)>,
    next: usize,
}

impl SliceSource {
    pub fn from_sequences<S: AsRef<[u8]>>(seqs: &[S]) -> Self {
        let mut pairs = Vec::new();
        for (i, s) in seqs.iter().enumerate() {
            if i > 0 {
                pairs.push((chars::SEPARATOR, b'\n'));
            }
            for &b in s.as_ref() {
                pairs.push((chars::encode_base(b), b));
            }
        }
        Self { pairs, next: 0 }
    }

    /// Replays masker output (the idempotence path).
    pub fn from_pairs(pairs: Vec<(u8, u8)>) -> Self {
        Self { pairs, next: 0 }
    }

    pub fn rewind(&mut self) {
        self.next = 0;
    }
}

impl ResidueSource for SliceSource {
    fn next_with_original(&mut self) -> io::Result<Option<(u8, u8)>> {
        match self.pairs.get(self.next) {
            Some(&pair) => {
                self.next += 1;
                Ok(Some(pair))
            }
            None => Ok(None),
        }
    }
}

/// A masked stretch of the input, both ends inclusive, in absolute
/// positions over the concatenation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[derive(Serialize, Deserialize)]
pub struct MaskedRange {
    pub begin: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct DustEntry {
    val: u8,
    orig: u8,
    max_score: f64,
    mask_length: u64,
    next_mask: u64,
}

#[derive(Debug)]
pub struct DustMasker {
    buf: Vec<DustEntry>,
    buf_initialized: bool,
    buf_readpos: u64,
    buf_insertpos: u64,
    buf_remaining: u64,
    buf_size: u64,

    nuc_val1: u8,
    nuc_val2: u8,

    // names follow Morgulis et al. 2006
    rv: u64,
    rw: u64,
    cv: [u64; TRIPLET_VALUES],
    cw: [u64; TRIPLET_VALUES],
    l_param: u64,
    w_queue: VecDeque<u8>,

    total_length: u64,
    current_length: u64,
    current_pos_total: u64,
    current_pos_local: u64,

    last_seq_start: u64,

    mask_length: u64,
    next_mask: u64,
    current_is_masked: bool,

    masking_done: bool,
    masked_regions: Vec<MaskedRange>,
    current_region_index: usize,

    windowsize: u64,
    linker: u64,
    threshold: f64,
}

/// Performs `val % limit` assuming `val < 2 * limit`.
fn wrap_value_once(val: &mut u64, limit: u64) {
    if *val >= limit {
        *val -= limit;
    }
}

fn nucleotide_value(c: u8) -> u8 {
    match c {
        b'a' | b'A' => 0,
        b'c' | b'C' => 1,
        b'g' | b'G' => 2,
        b't' | b'T' => 3,
        _ => 0,
    }
}

fn add_triplet_info(r: &mut u64, c: &mut [u64; TRIPLET_VALUES], t: u8) {
    *r += c[t as usize];
    c[t as usize] += 1;
}

fn rem_triplet_info(r: &mut u64, c: &mut [u64; TRIPLET_VALUES], t: u8) {
    c[t as usize] -= 1;
    *r -= c[t as usize];
}

impl DustMasker {
    pub fn new(windowsize: u64, threshold: f64, linker: u64) -> Self {
        debug_assert!(windowsize >= 3 && linker >= 1);
        let buf_size = windowsize + linker;
        Self {
            buf: vec![DustEntry::default(); buf_size as usize],
            buf_initialized: false,
            buf_readpos: 0,
            buf_insertpos: 0,
            buf_remaining: 0,
            buf_size,
            nuc_val1: 0,
            nuc_val2: 0,
            rv: 0,
            rw: 0,
            cv: [0; TRIPLET_VALUES],
            cw: [0; TRIPLET_VALUES],
            l_param: 0,
            w_queue: VecDeque::with_capacity(windowsize as usize),
            total_length: 0,
            current_length: 0,
            current_pos_total: 0,
            current_pos_local: 0,
            last_seq_start: 0,
            mask_length: 0,
            next_mask: 0,
            current_is_masked: false,
            masking_done: false,
            masked_regions: Vec::new(),
            current_region_index: 0,
            windowsize,
            linker,
            threshold,
        }
    }

    pub fn masking_done(&self) -> bool {
        self.masking_done
    }

    /// Masked stretches recorded during the first pass.
    pub fn masked_regions(&self) -> &[MaskedRange] {
        &self.masked_regions
    }

    /// Rescans suffixes of the current window for a score maximum above the
    /// threshold that dominates any previously masked interval overlapping
    /// this window, and records the masked interval start. With linking
    /// enabled, nearby masks are glued through a `next_mask` distance.
    fn find_perfect(&mut self) {
        let mut r = self.rv;
        let mut ctmp = self.cv;
        let mut max_score = 0.0f64;
        let mut score_to_beat = 0.0f64;
        let mut best_idx = 0u64;
        let mut found = false;

        let linker_offset = if self.current_length > self.windowsize {
            self.linker.min(self.current_length - self.windowsize)
        } else {
            0
        };
        let readpos = if self.current_length < self.buf_size {
            self.last_seq_start
        } else {
            self.buf_readpos
        };

        let noof = self.w_queue.len() as u64;
        if noof <= self.l_param {
            return;
        }
        let length = noof - self.l_param - 1;
        for step in 0..=length {
            let idx = length - step;
            let mut window_idx = readpos + idx + linker_offset;
            wrap_value_once(&mut window_idx, self.buf_size);
            score_to_beat = score_to_beat.max(self.buf[window_idx as usize].max_score);
            let t = self.w_queue[idx as usize];
            add_triplet_info(&mut r, &mut ctmp, t);
            let new_score = r as f64 / (noof - idx - 1) as f64;
            if new_score > self.threshold && new_score >= max_score && new_score >= score_to_beat {
                found = true;
                max_score = new_score;
                best_idx = idx;
                self.buf[window_idx as usize].max_score = max_score;
            }
        }

        if found {
            let mut buf_idx = readpos + best_idx + linker_offset;
            wrap_value_once(&mut buf_idx, self.buf_size);
            let entry = &mut self.buf[buf_idx as usize];
            entry.mask_length = entry.mask_length.max(noof + 2 - best_idx);

            if self.linker > 1 {
                let link_length = (best_idx + linker_offset)
                    .min(self.linker)
                    .min(self.current_length - 1);
                let mut link_idx = readpos + best_idx + linker_offset - link_length;
                wrap_value_once(&mut link_idx, self.buf_size);
                let entry = &mut self.buf[link_idx as usize];
                entry.next_mask = entry.next_mask.max(link_length);
            }
        }
    }

    /// Reads one residue into the lookahead and updates the triplet
    /// window. Returns false at the end of the input.
    fn shift_window(&mut self, source: &mut dyn ResidueSource) -> io::Result<bool> {
        let Some((t_val, t_orig)) = source.next_with_original()? else {
            return Ok(false);
        };

        self.buf_remaining += 1;
        self.current_length += 1;
        self.total_length += 1;
        self.buf[self.buf_insertpos as usize] = DustEntry {
            val: t_val,
            orig: t_orig,
            max_score: 0.0,
            mask_length: 0,
            next_mask: 0,
        };
        self.buf_insertpos += 1;
        wrap_value_once(&mut self.buf_insertpos, self.buf_size);

        if self.masking_done {
            return Ok(true);
        }
        if chars::is_separator(t_val) {
            // reset for the next sequence of a multi-sequence input
            self.last_seq_start = self.buf_insertpos;
            self.nuc_val1 = 0;
            self.nuc_val2 = 0;
            self.rv = 0;
            self.rw = 0;
            self.l_param = 0;
            self.current_length = 0;
            self.cv = [0; TRIPLET_VALUES];
            self.cw = [0; TRIPLET_VALUES];
            self.w_queue.clear();
            return Ok(true);
        }

        let nuc_val = nucleotide_value(t_orig);
        let triplet_val = self.nuc_val1 * 16 + self.nuc_val2 * 4 + nuc_val;
        self.nuc_val1 = self.nuc_val2;
        self.nuc_val2 = nuc_val;
        if self.current_length <= 2 {
            return Ok(true);
        }

        // SHIFT_WINDOW of Morgulis et al. 2006
        if self.w_queue.len() as u64 >= self.windowsize.saturating_sub(2) {
            let s = self.w_queue.pop_front().expect("window queue is nonempty");
            rem_triplet_info(&mut self.rw, &mut self.cw, s);
            if self.l_param > self.w_queue.len() as u64 {
                self.l_param -= 1;
                rem_triplet_info(&mut self.rv, &mut self.cv, s);
            }
        }
        self.w_queue.push_back(triplet_val);
        self.l_param += 1;
        add_triplet_info(&mut self.rw, &mut self.cw, triplet_val);
        add_triplet_info(&mut self.rv, &mut self.cv, triplet_val);
        if self.cv[triplet_val as usize] as f64 > 2.0 * self.threshold {
            loop {
                let idx = self.w_queue.len() as u64 - self.l_param;
                let s = self.w_queue[idx as usize];
                rem_triplet_info(&mut self.rv, &mut self.cv, s);
                self.l_param -= 1;
                if s == triplet_val {
                    break;
                }
            }
        }
        if self.rw as f64 > self.l_param as f64 * self.threshold {
            self.find_perfect();
        }
        Ok(true)
    }

    /// Yields the next residue of the masked stream, or `None` at the end
    /// of the input. The first exhaustion of the source finishes the scan
    /// phase; reading on afterwards replays the source against the
    /// recorded masked ranges.
    pub fn next_with_original(
        &mut self,
        source: &mut dyn ResidueSource,
    ) -> io::Result<Option<(u8, u8)>> {
        if self.masking_done {
            let Some((mut val, mut orig)) = source.next_with_original()? else {
                self.current_region_index = 0;
                self.current_pos_total = 0;
                self.current_pos_local = 0;
                return Ok(None);
            };
            if self.current_region_index < self.masked_regions.len() {
                let range = self.masked_regions[self.current_region_index];
                if self.current_pos_total >= range.begin {
                    if self.current_pos_total <= range.end && !chars::is_separator(val) {
                        orig = orig.to_ascii_lowercase();
                        val = chars::WILDCARD;
                    } else {
                        self.current_region_index += 1;
                    }
                }
            }
            self.current_pos_total += 1;
            self.current_pos_local += 1;
            return Ok(Some((val, orig)));
        }

        if !self.buf_initialized {
            for _ in 0..self.buf_size {
                if !self.shift_window(source)? {
                    break;
                }
            }
            self.buf_initialized = true;
        }
        if self.buf_remaining == 0 {
            log::debug!(
                "dust scan finished: {} residues, {} masked region(s)",
                self.total_length,
                self.masked_regions.len()
            );
            self.masking_done = true;
            self.current_pos_total = 0;
            return Ok(None);
        }
        self.buf_remaining -= 1;
        let readpos = self.buf_readpos as usize;
        self.mask_length = self.mask_length.max(self.buf[readpos].mask_length);

        if self.linker > 1 {
            self.next_mask = self.next_mask.max(self.buf[readpos].next_mask);
            if self.mask_length > 0 {
                self.mask_length = self.mask_length.max(self.next_mask);
            }
            if self.next_mask > 0 {
                self.next_mask -= 1;
            }
        }

        let mut val = self.buf[readpos].val;
        let mut orig = self.buf[readpos].orig;
        if self.mask_length > 0 && !chars::is_separator(val) {
            orig = orig.to_ascii_lowercase();
            val = chars::WILDCARD;
        }

        if self.mask_length > 0 {
            if !self.current_is_masked {
                self.masked_regions.push(MaskedRange {
                    begin: self.current_pos_total,
                    end: self.current_pos_total,
                });
            }
            let region = self.masked_regions.last_mut().expect("region just pushed");
            region.end = self.current_pos_total;
            self.current_is_masked = true;
            self.mask_length -= 1;
        } else {
            self.current_is_masked = false;
        }
        self.buf_readpos += 1;
        wrap_value_once(&mut self.buf_readpos, self.buf_size);
        self.current_pos_total += 1;
        self.shift_window(source)?;
        Ok(Some((val, orig)))
    }

    /// Drains the whole source, returning the transformed encoded values
    /// and original bytes.
    pub fn mask_all(&mut self, source: &mut dyn ResidueSource) -> io::Result<(Vec<u8>, Vec<u8>)> {
        let mut vals = Vec::new();
        let mut origs = Vec::new();
        while let Some((val, orig)) = self.next_with_original(source)? {
            vals.push(val);
            origs.push(orig);
        }
        Ok((vals, origs))
    }
}
