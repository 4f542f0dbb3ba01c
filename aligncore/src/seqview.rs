//! Positional views over encoded substrings (the sequence abstraction the
//! aligner reads through).
//!
//! A view fixes a substring, a reading direction and an optional complement
//! transformation at construction time and is immutable afterwards. The
//! four canonical reading modes collapse to two flags: whether the physical
//! access position grows left to right, and whether residues are
//! complemented on the way out.

use std::cell::RefCell;

use crate::chars;
use crate::provider::{ProviderReader, ReadDirection, SequenceProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub enum ReadMode {
    Forward,
    Reverse,
    Complement,
    ReverseComplement,
}

impl ReadMode {
    pub fn is_reverse(self) -> bool {
        matches!(self, Self::Reverse | Self::ReverseComplement)
    }

    pub fn is_complement(self) -> bool {
        matches!(self, Self::Complement | Self::ReverseComplement)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SeqViewError {
    #[error("substring at {start} of length {len} does not fit its source (length {total})")]
    OutOfBounds { start: u64, len: u64, total: u64 },
    #[error("reverse reading requires a known total source length")]
    UnknownTotalLength,
}

/// What a view reads from.
pub enum SeqSource<'a> {
    /// A flat buffer of encoded residues.
    Bytes(&'a [u8]),
    /// Twobit-packed residues, 32 per word, high bits first.
    TwoBit(&'a [u64]),
    /// A lazily decoding cursor over an indexed sequence; decoded residues
    /// are kept in a grow-on-demand cache.
    Lazy(&'a dyn SequenceProvider),
    /// Generic random access into an encoded sequence.
    Access(&'a dyn SequenceProvider),
}

enum Backing<'a> {
    Bytes(&'a [u8]),
    TwoBit(&'a [u64]),
    Lazy(RefCell<ReaderCache<'a>>),
    Access(&'a dyn SequenceProvider),
}

struct ReaderCache<'a> {
    reader: ProviderReader<'a>,
    cache: Vec<u8>,
}

const CACHE_CHUNK: usize = 16;

impl ReaderCache<'_> {
    fn get(&mut self, idx: usize, len: usize) -> u8 {
        while idx >= self.cache.len() {
            let to_store = (self.cache.len() + CACHE_CHUNK).min(len);
            for _ in self.cache.len()..to_store {
                let c = self.reader.next_encoded_char();
                self.cache.push(c);
            }
        }
        self.cache[idx]
    }
}

pub struct SeqView<'a> {
    backing: Backing<'a>,
    start: u64,
    len: u64,
    offset: u64,
    seq_start: u64,
    read_left_to_right: bool,
    dir_is_complement: bool,
}

impl<'a> SeqView<'a> {
    /// Builds a view of `len` residues beginning at `start` within the
    /// source, to be read as the `right_extension` half of an alignment in
    /// the given mode. `total_len` is the addressable length of the source
    /// (mandatory for the reverse modes).
    pub fn new(
        source: SeqSource<'a>,
        right_extension: bool,
        mode: ReadMode,
        seq_start: u64,
        start: u64,
        len: u64,
        total_len: Option<u64>,
    ) -> Result<Self, SeqViewError> {
        debug_assert!(seq_start <= start);
        let total = match total_len {
            Some(t) => t,
            None if mode.is_reverse() => return Err(SeqViewError::UnknownTotalLength),
            None => u64::MAX,
        };
        let out_of_bounds = || SeqViewError::OutOfBounds {
            start,
            len,
            total,
        };

        let offset = if right_extension {
            if mode.is_reverse() {
                if start >= total {
                    return Err(out_of_bounds());
                }
                total - 1 - start
            } else {
                start
            }
        } else if mode.is_reverse() {
            if start + total < len {
                return Err(out_of_bounds());
            }
            start + total - len
        } else {
            if start + len == 0 {
                return Err(out_of_bounds());
            }
            start + len - 1
        };
        let read_left_to_right = right_extension != mode.is_reverse();

        if read_left_to_right {
            if total != u64::MAX && offset + len > seq_start + total {
                return Err(out_of_bounds());
            }
        } else if offset + 1 < len {
            return Err(out_of_bounds());
        }

        let backing = match source {
            SeqSource::Bytes(b) => {
                let buffer_overrun = if read_left_to_right {
                    offset + len > b.len() as u64
                } else {
                    len > 0 && offset >= b.len() as u64
                };
                if buffer_overrun {
                    return Err(SeqViewError::OutOfBounds {
                        start,
                        len,
                        total: b.len() as u64,
                    });
                }
                Backing::Bytes(b)
            }
            SeqSource::TwoBit(words) => Backing::TwoBit(words),
            SeqSource::Access(p) => Backing::Access(p),
            SeqSource::Lazy(p) => {
                let direction = if read_left_to_right {
                    ReadDirection::Forward
                } else {
                    ReadDirection::Backward
                };
                Backing::Lazy(RefCell::new(ReaderCache {
                    reader: ProviderReader::new(p, offset, direction),
                    cache: Vec::new(),
                }))
            }
        };

        Ok(Self {
            backing,
            start,
            len,
            offset,
            seq_start,
            read_left_to_right,
            dir_is_complement: mode.is_complement(),
        })
    }

    /// A forward view over a whole encoded buffer.
    pub fn over_bytes(bytes: &'a [u8]) -> Self {
        Self::new(
            SeqSource::Bytes(bytes),
            true,
            ReadMode::Forward,
            0,
            0,
            bytes.len() as u64,
            Some(bytes.len() as u64),
        )
        .expect("a whole buffer is always in bounds")
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    fn raw_char(&self, idx: u64) -> u8 {
        debug_assert!(idx < self.len);
        match &self.backing {
            Backing::Lazy(cell) => cell.borrow_mut().get(idx as usize, self.len as usize),
            backing => {
                let accesspos = if self.read_left_to_right {
                    self.offset + idx
                } else {
                    debug_assert!(self.offset >= idx);
                    self.offset - idx
                };
                match backing {
                    Backing::Bytes(b) => b[accesspos as usize],
                    Backing::TwoBit(words) => twobit_char_at(words, accesspos),
                    Backing::Access(p) => p.char_at(accesspos),
                    Backing::Lazy(_) => unreachable!(),
                }
            }
        }
    }

    /// The logical residue at `idx`, direction and complement applied.
    /// Wildcards are returned verbatim.
    pub fn char_at(&self, idx: u64) -> u8 {
        let c = self.raw_char(idx);
        if self.dir_is_complement {
            chars::complement(c)
        } else {
            c
        }
    }

    /// Length of the longest common prefix of `self[self_start..]` and
    /// `other[other_start..]`, stopping at the first special residue or the
    /// first difference.
    pub fn lcp(&self, other: &SeqView<'_>, self_start: u64, other_start: u64) -> u64 {
        debug_assert!(self.len >= self_start && other.len >= other_start);
        let maxlen = (self.len - self_start).min(other.len - other_start);
        for k in 0..maxlen {
            let u_cc = self.raw_char(self_start + k);
            if chars::is_special(u_cc) {
                return k;
            }
            let u_cc = if self.dir_is_complement {
                chars::complement(u_cc)
            } else {
                u_cc
            };
            let v_cc = other.raw_char(other_start + k);
            if chars::is_special(v_cc) {
                return k;
            }
            let v_cc = if other.dir_is_complement {
                chars::complement(v_cc)
            } else {
                v_cc
            };
            if u_cc != v_cc {
                return k;
            }
        }
        maxlen
    }

    /// Decodes the whole view into a fresh buffer of residue codes.
    pub fn extract(&self) -> Vec<u8> {
        (0..self.len).map(|i| self.char_at(i)).collect()
    }
}

fn twobit_char_at(words: &[u64], pos: u64) -> u8 {
    const UNITS: u64 = 32;
    let word = words[(pos / UNITS) as usize];
    let shift = 2 * (UNITS - 1 - pos % UNITS);
    ((word >> shift) & 3) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FlatSequence;

    fn view(bytes: &[u8], right: bool, mode: ReadMode) -> SeqView<'_> {
        SeqView::new(
            SeqSource::Bytes(bytes),
            right,
            mode,
            0,
            0,
            bytes.len() as u64,
            Some(bytes.len() as u64),
        )
        .unwrap()
    }

    #[test]
    fn four_reading_modes() {
        // acgt
        let enc = chars::encode(b"acgt");
        let fwd = view(&enc, true, ReadMode::Forward);
        assert_eq!(vec![0, 1, 2, 3], fwd.extract());
        let cpl = view(&enc, true, ReadMode::Complement);
        assert_eq!(vec![3, 2, 1, 0], cpl.extract());
        // a left extension reads right to left
        let rev = view(&enc, false, ReadMode::Forward);
        assert_eq!(vec![3, 2, 1, 0], rev.extract());
        let rc = view(&enc, true, ReadMode::ReverseComplement);
        assert_eq!(vec![0, 1, 2, 3], rc.extract());
    }

    #[test]
    fn wildcard_returned_verbatim_and_never_matches() {
        let enc = chars::encode(b"acNgt");
        let u = view(&enc, true, ReadMode::Forward);
        assert_eq!(chars::WILDCARD, u.char_at(2));
        let v = view(&enc, true, ReadMode::Forward);
        // the wildcard stops the walk even against itself
        assert_eq!(2, u.lcp(&v, 0, 0));
    }

    #[test]
    fn lcp_stops_at_difference() {
        let a = chars::encode(b"acgtacgt");
        let b = chars::encode(b"acgttcgt");
        let u = view(&a, true, ReadMode::Forward);
        let v = view(&b, true, ReadMode::Forward);
        assert_eq!(4, u.lcp(&v, 0, 0));
        assert_eq!(3, u.lcp(&v, 5, 5));
        assert_eq!(0, u.lcp(&v, 8, 8));
    }

    #[test]
    fn lcp_symmetry() {
        let a = chars::encode(b"gattacagatta");
        let b = chars::encode(b"cgattacatt");
        let (n, m) = (a.len() as u64, b.len() as u64);
        let u = view(&a, true, ReadMode::Forward);
        let v = view(&b, true, ReadMode::Forward);
        let u_rev = view(&a, false, ReadMode::Forward);
        let v_rev = view(&b, false, ReadMode::Forward);
        for i in 0..n {
            for j in 0..m {
                let k = u.lcp(&v, i, j);
                if k == 0 {
                    continue;
                }
                // only left-maximal matches mirror exactly
                let left_maximal = i == 0
                    || j == 0
                    || a[i as usize - 1] != b[j as usize - 1]
                    || chars::is_special(a[i as usize - 1]);
                if left_maximal {
                    assert_eq!(k, u_rev.lcp(&v_rev, n - i - k, m - j - k));
                }
            }
        }
    }

    #[test]
    fn out_of_bounds_is_an_error() {
        let enc = chars::encode(b"acgt");
        let r = SeqView::new(
            SeqSource::Bytes(&enc),
            true,
            ReadMode::Forward,
            0,
            2,
            3,
            Some(4),
        );
        assert!(matches!(r, Err(SeqViewError::OutOfBounds { .. })));
        let r = SeqView::new(SeqSource::Bytes(&enc), true, ReadMode::Reverse, 0, 0, 4, None);
        assert!(matches!(r, Err(SeqViewError::UnknownTotalLength)));
    }

    #[test]
    fn lazy_reader_caches_in_chunks() {
        let fs = FlatSequence::from_sequences(&[b"acgtacgtacgtacgtacgtacgt".as_slice()]);
        let v = SeqView::new(
            SeqSource::Lazy(&fs),
            true,
            ReadMode::Forward,
            0,
            0,
            24,
            Some(24),
        )
        .unwrap();
        // jumping past the first chunk still decodes everything in between
        assert_eq!(3, v.char_at(19));
        assert_eq!(0, v.char_at(0));
        assert_eq!(chars::encode(b"acgtacgtacgtacgtacgtacgt"), v.extract());
    }

    #[test]
    fn lazy_reader_backward() {
        let fs = FlatSequence::from_sequences(&[b"aacg".as_slice()]);
        let v = SeqView::new(
            SeqSource::Lazy(&fs),
            false,
            ReadMode::Forward,
            0,
            0,
            4,
            Some(4),
        )
        .unwrap();
        assert_eq!(vec![2, 1, 0, 0], v.extract());
    }

    #[test]
    fn twobit_source() {
        // a c g t packed into the top byte of a word
        let word = (0u64 << 62) | (1 << 60) | (2 << 58) | (3 << 56);
        let words = [word];
        let v = SeqView::new(
            SeqSource::TwoBit(&words),
            true,
            ReadMode::Forward,
            0,
            0,
            4,
            Some(4),
        )
        .unwrap();
        assert_eq!(vec![0, 1, 2, 3], v.extract());
    }
}
