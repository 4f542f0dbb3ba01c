//! Duplicate and overlap elimination over predicted LTR elements.

use crate::candidate::LtrCandidate;

/// Marks exact duplicates as skipped. Duplicates occur when different
/// seeds extend to the same boundary coordinates; the later one loses.
pub fn remove_duplicates(candidates: &mut [LtrCandidate]) {
    for i in 0..candidates.len() {
        if candidates[i].skipped {
            continue;
        }
        let (start_i, end_i) = candidates[i].span();
        for j in i + 1..candidates.len() {
            if candidates[j].skipped {
                continue;
            }
            let (start_j, end_j) = candidates[j].span();
            if start_i == start_j && end_i == end_j {
                candidates[j].skipped = true;
            }
        }
    }
}

/// Resolves overlapping predictions. With `no_overlap_allowed` every
/// member of an overlapping cluster drops out; otherwise the prediction
/// with the lower similarity does (ties keep the earlier one).
pub fn remove_overlaps(candidates: &mut [LtrCandidate], no_overlap_allowed: bool) {
    for i in 0..candidates.len() {
        if candidates[i].skipped {
            continue;
        }
        let (mut start_i, mut end_i) = candidates[i].span();
        for j in i + 1..candidates.len() {
            if candidates[j].skipped {
                continue;
            }
            let (start_j, end_j) = candidates[j].span();
            if end_i < start_j || end_j < start_i {
                continue;
            }
            if no_overlap_allowed {
                // the whole cluster goes; widen the window so transitive
                // overlaps are caught too
                start_i = start_i.min(start_j);
                end_i = end_i.max(end_j);
                candidates[i].skipped = true;
                candidates[j].skipped = true;
            } else if candidates[i].similarity >= candidates[j].similarity {
                candidates[j].skipped = true;
            } else {
                candidates[i].skipped = true;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(left5: u64, right3: u64, similarity: f64) -> LtrCandidate {
        let mut c = LtrCandidate::new(0);
        c.left_ltr_5 = left5;
        c.left_ltr_3 = left5 + 100;
        c.right_ltr_5 = right3 - 100;
        c.right_ltr_3 = right3;
        c.similarity = similarity;
        c
    }

    #[test]
    fn exact_duplicates_skip_the_later_one() {
        let mut cands = vec![
            candidate(100, 5000, 95.0),
            candidate(100, 5000, 97.0),
            candidate(200, 6000, 90.0),
        ];
        remove_duplicates(&mut cands);
        assert!(!cands[0].skipped);
        assert!(cands[1].skipped);
        assert!(!cands[2].skipped);
        // survivors are pairwise distinct
        let survivors: Vec<_> = cands.iter().filter(|c| !c.skipped).map(|c| c.span()).collect();
        let mut dedup = survivors.clone();
        dedup.dedup();
        assert_eq!(survivors, dedup);
    }

    #[test]
    fn best_of_overlap_keeps_higher_similarity() {
        let mut cands = vec![candidate(100, 5000, 90.0), candidate(4000, 9000, 95.0)];
        remove_overlaps(&mut cands, false);
        assert!(cands[0].skipped);
        assert!(!cands[1].skipped);

        // ties keep the earlier one
        let mut cands = vec![candidate(100, 5000, 95.0), candidate(4000, 9000, 95.0)];
        remove_overlaps(&mut cands, false);
        assert!(!cands[0].skipped);
        assert!(cands[1].skipped);
    }

    proptest::proptest! {
        #[test]
        fn elimination_invariants(
            spans in proptest::collection::vec((0u64..800, 0u64..800, 0u32..100), 1..12),
        ) {
            let mut cands: Vec<LtrCandidate> = spans
                .iter()
                .map(|&(a, b, sim)| {
                    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                    let mut c = LtrCandidate::new(0);
                    c.left_ltr_5 = lo;
                    c.left_ltr_3 = lo + 100;
                    c.right_ltr_5 = hi + 200;
                    c.right_ltr_3 = hi + 300;
                    c.similarity = f64::from(sim);
                    c
                })
                .collect();
            remove_duplicates(&mut cands);
            // no two survivors share both border coordinates
            let mut spans_seen = std::collections::HashSet::new();
            for c in cands.iter().filter(|c| !c.skipped) {
                proptest::prop_assert!(spans_seen.insert(c.span()));
            }
            remove_overlaps(&mut cands, true);
            // surviving intervals are pairwise disjoint
            let survivors: Vec<_> = cands.iter().filter(|c| !c.skipped).collect();
            for a in 0..survivors.len() {
                for b in a + 1..survivors.len() {
                    let (sa, ea) = survivors[a].span();
                    let (sb, eb) = survivors[b].span();
                    proptest::prop_assert!(ea < sb || eb < sa);
                }
            }
        }
    }

    #[test]
    fn no_overlap_drops_the_whole_cluster() {
        let mut cands = vec![
            candidate(100, 5000, 90.0),
            candidate(4000, 9000, 95.0),
            candidate(20000, 30000, 85.0),
        ];
        remove_overlaps(&mut cands, true);
        assert!(cands[0].skipped);
        assert!(cands[1].skipped);
        assert!(!cands[2].skipped);
        // surviving intervals are pairwise disjoint
        let survivors: Vec<_> = cands.iter().filter(|c| !c.skipped).collect();
        for a in 0..survivors.len() {
            for b in a + 1..survivors.len() {
                let (sa, ea) = survivors[a].span();
                let (sb, eb) = survivors[b].span();
                assert!(ea < sb || eb < sa);
            }
        }
    }
}
