//! Tracepoint support.
//!
//! A trace is a compressed alignment representation: per fixed-stride
//! segment of the first sequence it stores only how many residues of the
//! second sequence that segment aligns to. An alignment is rebuilt from a
//! trace by re-aligning every segment with the full (non-pruned) wavefront
//! and concatenating the resulting scripts.

use crate::editop::Alphabet;
use crate::front::FullFrontEdist;
use crate::script::EditScript;

#[derive(Debug, Clone, thiserror::Error)]
pub enum TraceParseError {
    #[error("cannot read a number from trace element {element:?}")]
    BadNumber { element: String },
    #[error("empty trace")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceSegment {
    pub aligned_u: u64,
    pub aligned_v: u64,
}

/// Parses a comma-separated trace, stopping at `sep` or the end.
pub fn parse_trace(s: &str, sep: Option<char>) -> Result<Vec<i64>, TraceParseError> {
    let body = match sep {
        Some(sep) => s.split(sep).next().unwrap_or(""),
        None => s,
    };
    let mut values = Vec::new();
    for element in body.split(',') {
        let element = element.trim();
        if element.is_empty() {
            continue;
        }
        let value = element.parse().map_err(|_| TraceParseError::BadNumber {
            element: element.to_owned(),
        })?;
        values.push(value);
    }
    if values.is_empty() {
        return Err(TraceParseError::Empty);
    }
    Ok(values)
}

/// Splits a script into fixed-stride segments: each covers `delta`
/// positions of the first sequence (the last one possibly fewer) and
/// reports how many positions of the second sequence align against it.
pub fn script_segments(script: &EditScript, delta: u64) -> Vec<TraceSegment> {
    use crate::editop::EditOpKind;

    debug_assert!(delta > 0);
    let mut segments = Vec::new();
    let mut aligned_u = 0u64;
    let mut aligned_v = 0u64;
    for (kind, run) in script.iter() {
        for _ in 0..run {
            match kind {
                EditOpKind::Deletion => aligned_u += 1,
                EditOpKind::Insertion => aligned_v += 1,
                EditOpKind::Match | EditOpKind::Mismatch => {
                    aligned_u += 1;
                    aligned_v += 1;
                }
                other => unreachable!("tracepoints are a plain DNA representation, got {other:?}"),
            }
            if aligned_u == delta {
                segments.push(TraceSegment {
                    aligned_u: delta,
                    aligned_v,
                });
                aligned_u = 0;
                aligned_v = 0;
            }
        }
    }
    if aligned_u > 0 || aligned_v > 0 {
        segments.push(TraceSegment {
            aligned_u,
            aligned_v,
        });
    }
    segments
}

/// The trace of a script: per segment the aligned length in the second
/// sequence, differential (`delta - aligned_v`) when `dtrace` is set.
pub fn script_to_trace(script: &EditScript, delta: u64, dtrace: bool) -> Vec<i64> {
    script_segments(script, delta)
        .into_iter()
        .map(|seg| {
            if dtrace {
                delta as i64 - seg.aligned_v as i64
            } else {
                seg.aligned_v as i64
            }
        })
        .collect()
}

/// Rebuilds an edit script from a trace by re-aligning each delta segment
/// with the full wavefront and concatenating the per-segment scripts.
pub fn script_from_trace(
    trace: &[i64],
    dtrace: bool,
    delta: u64,
    useq: &[u8],
    vseq: &[u8],
    fet: &mut FullFrontEdist,
) -> EditScript {
    let ulen = useq.len() as u64;
    let mut script = EditScript::new(Alphabet::Dna);
    let mut offset_u = 0u64;
    let mut offset_v = 0u64;
    for &value in trace {
        let aligned_v = if dtrace {
            let v = delta as i64 - value;
            debug_assert!(v >= 0);
            v as u64
        } else {
            debug_assert!(value >= 0);
            value as u64
        };
        debug_assert!(offset_u < ulen);
        let aligned_u = delta.min(ulen - offset_u);
        let useg = &useq[offset_u as usize..(offset_u + aligned_u) as usize];
        let vseg = &vseq[offset_v as usize..(offset_v + aligned_v) as usize];
        let distance = fet.distance_with_trace(useg, vseg);
        let endpoint = fet.endpoint(aligned_u, aligned_v, distance);
        fet.trace()
            .to_script_directed(&endpoint, Some(useg), Some(vseg), &mut script);
        offset_u += aligned_u;
        offset_v += aligned_v;
    }
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chars;
    use crate::script::ScriptCounts;

    #[test]
    fn parse_plain_and_separated() {
        assert_eq!(vec![4, 5, 3], parse_trace("4,5,3", None).unwrap());
        assert_eq!(vec![4, 5], parse_trace("4,5;9", Some(';')).unwrap());
        assert!(parse_trace("", None).is_err());
        assert!(parse_trace("4,x", None).is_err());
    }

    #[test]
    fn segments_of_a_known_script() {
        let s = EditScript::from_cigar_string("4=1I4=1D2=", None, Alphabet::Dna).unwrap();
        // stride 5 over u: 4=1I consumes 4 of u and 5 of v; the fifth u
        // position comes from the next match
        let segs = script_segments(&s, 5);
        assert_eq!(
            vec![
                TraceSegment { aligned_u: 5, aligned_v: 6 },
                TraceSegment { aligned_u: 5, aligned_v: 4 },
                TraceSegment { aligned_u: 1, aligned_v: 1 },
            ],
            segs
        );
        assert_eq!(vec![6, 4, 1], script_to_trace(&s, 5, false));
        assert_eq!(vec![-1, 1, 4], script_to_trace(&s, 5, true));
    }

    #[test]
    fn trace_round_trip_preserves_spans() {
        let u = chars::encode(b"GATTACAGATTACAGATT");
        let v = chars::encode(b"GATTCAGATTACAGGATT");
        let mut fet = FullFrontEdist::new();
        let d = fet.distance_with_trace(&u, &v);
        let endpoint = fet.endpoint(u.len() as u64, v.len() as u64, d);
        let mut script = EditScript::new(Alphabet::Dna);
        fet.trace()
            .to_script_directed(&endpoint, Some(&u), Some(&v), &mut script);

        let delta = 6;
        let trace = script_to_trace(&script, delta, false);
        let rebuilt = script_from_trace(&trace, false, delta, &u, &v, &mut fet);
        let ScriptCounts {
            matches,
            mismatches,
            insertions,
            deletions,
        } = rebuilt.counts();
        assert_eq!(u.len() as u64, matches + mismatches + deletions);
        assert_eq!(v.len() as u64, matches + mismatches + insertions);
        // segment-optimal re-alignment reproduces the overall distance
        assert_eq!(d, mismatches + insertions + deletions);
    }
}
