//! File identity matching and containment classification.

use super::{ComparableFile, MatchClass};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How two files are judged to be the same photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Same filename (with extension) and same size
    #[default]
    NameAndSize,
    /// Name and size, and capture times must agree when both sides have one
    CorroborateCaptureTime,
}

impl MatchPolicy {
    pub fn description(&self) -> &'static str {
        match self {
            MatchPolicy::NameAndSize => "filename and size",
            MatchPolicy::CorroborateCaptureTime => {
                "filename and size, corroborated by capture time when both sides have one"
            }
        }
    }
}

/// Count matched pairs between two file multisets.
///
/// Each file is used at most once. Files only ever match within the same
/// (filename, size) bucket.
pub fn count_matches(
    reference: &[ComparableFile],
    candidate: &[ComparableFile],
    policy: MatchPolicy,
) -> usize {
    let mut buckets: HashMap<(&str, u64), (Vec<Option<DateTime<Utc>>>, Vec<Option<DateTime<Utc>>>)> =
        HashMap::new();

    for file in reference {
        buckets
            .entry((file.filename.as_str(), file.size))
            .or_default()
            .0
            .push(file.captured);
    }
    for file in candidate {
        if let Some(bucket) = buckets.get_mut(&(file.filename.as_str(), file.size)) {
            bucket.1.push(file.captured);
        }
    }

    buckets
        .values()
        .map(|(refs, cands)| match policy {
            MatchPolicy::NameAndSize => refs.len().min(cands.len()),
            MatchPolicy::CorroborateCaptureTime => corroborated_pairs(refs, cands),
        })
        .sum()
}

/// Maximum pairing inside one bucket when timestamps must agree if both exist.
///
/// Equal timestamps pair first, then dated references take undated
/// candidates, then undated references take whatever is left.
fn corroborated_pairs(refs: &[Option<DateTime<Utc>>], cands: &[Option<DateTime<Utc>>]) -> usize {
    let mut cand_dated: HashMap<DateTime<Utc>, usize> = HashMap::new();
    let mut cand_undated = 0usize;
    for captured in cands {
        match captured {
            Some(t) => *cand_dated.entry(*t).or_default() += 1,
            None => cand_undated += 1,
        }
    }

    let mut matched = 0;
    let mut ref_dated_left = 0;
    let mut ref_undated = 0;
    for captured in refs {
        match captured {
            Some(t) => match cand_dated.get_mut(t) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    matched += 1;
                }
                _ => ref_dated_left += 1,
            },
            None => ref_undated += 1,
        }
    }

    let dated_to_undated = ref_dated_left.min(cand_undated);
    matched += dated_to_undated;

    let cand_left = cand_dated.values().sum::<usize>() + cand_undated - dated_to_undated;
    matched + ref_undated.min(cand_left)
}

/// Classify by containment and compute the divergence percentage.
///
/// Percentages are relative to the reference count and rounded to the
/// nearest integer. Either side being empty is unrelated at 0%.
pub fn classify(reference_count: usize, candidate_count: usize, matched: usize) -> (MatchClass, u32) {
    if reference_count == 0 || candidate_count == 0 {
        return (MatchClass::Unrelated, 0);
    }

    let percent_of_reference =
        |n: usize| ((n as f64 / reference_count as f64) * 100.0).round() as u32;

    match (matched == reference_count, matched == candidate_count) {
        (true, true) => (MatchClass::Exact, 0),
        (true, false) => (
            MatchClass::PartialPlus,
            percent_of_reference(candidate_count - matched),
        ),
        (false, true) => (
            MatchClass::PartialMinus,
            percent_of_reference(reference_count - matched),
        ),
        (false, false) => (MatchClass::Unrelated, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn file(name: &str, size: u64, captured: Option<i64>) -> ComparableFile {
        ComparableFile {
            relative_path: name.into(),
            filename: name.to_string(),
            size,
            captured: captured.map(|s| Utc.timestamp_opt(s, 0).unwrap()),
        }
    }

    #[test]
    fn name_and_size_must_both_agree() {
        let reference = vec![file("a.dng", 10, None), file("b.dng", 20, None)];
        let candidate = vec![file("a.dng", 10, None), file("b.dng", 21, None), file("A.dng", 10, None)];

        assert_eq!(count_matches(&reference, &candidate, MatchPolicy::NameAndSize), 1);
    }

    #[test]
    fn duplicates_within_a_side_match_at_most_once() {
        let reference = vec![file("a.dng", 10, None), file("a.dng", 10, None)];
        let candidate = vec![file("a.dng", 10, None)];

        assert_eq!(count_matches(&reference, &candidate, MatchPolicy::NameAndSize), 1);
    }

    #[test]
    fn default_policy_ignores_timestamp_disagreement() {
        let reference = vec![file("a.dng", 10, Some(100))];
        let candidate = vec![file("a.dng", 10, Some(999))];

        assert_eq!(count_matches(&reference, &candidate, MatchPolicy::NameAndSize), 1);
        assert_eq!(
            count_matches(&reference, &candidate, MatchPolicy::CorroborateCaptureTime),
            0
        );
    }

    #[test]
    fn missing_timestamp_still_matches_under_corroboration() {
        let reference = vec![file("a.dng", 10, Some(100)), file("b.dng", 5, None)];
        let candidate = vec![file("a.dng", 10, None), file("b.dng", 5, Some(7))];

        assert_eq!(
            count_matches(&reference, &candidate, MatchPolicy::CorroborateCaptureTime),
            2
        );
    }

    #[test]
    fn corroboration_prefers_equal_timestamps() {
        // Pairing ref@1 with the undated candidate first would strand ref@2
        let refs = vec![Some(1), None]
            .into_iter()
            .map(|s: Option<i64>| s.map(|s| Utc.timestamp_opt(s, 0).unwrap()))
            .collect::<Vec<_>>();
        let cands = vec![Some(1), Some(9)]
            .into_iter()
            .map(|s: Option<i64>| s.map(|s| Utc.timestamp_opt(s, 0).unwrap()))
            .collect::<Vec<_>>();

        assert_eq!(corroborated_pairs(&refs, &cands), 2);
    }

    #[test]
    fn classification_table() {
        assert_eq!(classify(2, 2, 2), (MatchClass::Exact, 0));
        assert_eq!(classify(2, 3, 2), (MatchClass::PartialPlus, 50));
        assert_eq!(classify(10, 8, 8), (MatchClass::PartialMinus, 20));
        assert_eq!(classify(3, 3, 2), (MatchClass::Unrelated, 0));
        assert_eq!(classify(0, 0, 0), (MatchClass::Unrelated, 0));
        assert_eq!(classify(4, 0, 0), (MatchClass::Unrelated, 0));
    }

    #[test]
    fn percentages_round_to_nearest() {
        // 1 / 3 = 33.3%
        assert_eq!(classify(3, 4, 3), (MatchClass::PartialPlus, 33));
        // 2 / 3 = 66.7%
        assert_eq!(classify(3, 1, 1), (MatchClass::PartialMinus, 67));
    }
}
