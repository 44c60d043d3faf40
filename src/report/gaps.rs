//! Gap analysis over identifier sequences such as `MPO-001, MPO-002, ...`.

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use tracing::{info, warn};

/// Number of missing values listed in a report line.
pub const PREVIEW_LEN: usize = 10;

/// Missing numbers for one identifier prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceGap {
    pub prefix: String,
    /// First missing numbers in ascending order, at most [`PREVIEW_LEN`].
    pub preview: Vec<u64>,
    pub missing_count: u64,
}

const IDENTIFIER_PATTERN: &str = r"([A-Za-z-]+)(\d+)";

/// Group identifiers by prefix and report every prefix whose numbers leave
/// holes between their minimum and maximum. Identifiers without a
/// `<letters-or-dashes><digits>` run are ignored.
pub fn find_gaps<'a>(identifiers: impl IntoIterator<Item = &'a str>) -> Vec<SequenceGap> {
    let Ok(pattern) = Regex::new(IDENTIFIER_PATTERN) else {
        return Vec::new();
    };
    let mut sequences: BTreeMap<String, BTreeSet<u64>> = BTreeMap::new();
    for identifier in identifiers {
        let Some(caps) = pattern.captures(identifier) else {
            continue;
        };
        let Ok(number) = caps[2].parse::<u64>() else {
            continue;
        };
        sequences
            .entry(caps[1].to_string())
            .or_default()
            .insert(number);
    }

    sequences
        .into_iter()
        .filter_map(|(prefix, numbers)| sequence_gap(prefix, &numbers))
        .collect()
}

fn sequence_gap(prefix: String, numbers: &BTreeSet<u64>) -> Option<SequenceGap> {
    let (&min, &max) = (numbers.first()?, numbers.last()?);
    let span = (max - min).saturating_add(1);
    let missing_count = span - numbers.len() as u64;
    if missing_count == 0 {
        return None;
    }

    let mut preview = Vec::with_capacity(PREVIEW_LEN);
    let mut previous = min;
    'outer: for &n in numbers.iter().skip(1) {
        for hole in previous + 1..n {
            if preview.len() == PREVIEW_LEN {
                break 'outer;
            }
            preview.push(hole);
        }
        previous = n;
    }

    Some(SequenceGap {
        prefix,
        preview,
        missing_count,
    })
}

/// Log the gap report for a set of identifiers.
pub fn log_gaps<'a>(identifiers: impl IntoIterator<Item = &'a str>) -> Vec<SequenceGap> {
    let gaps = find_gaps(identifiers);
    if gaps.is_empty() {
        info!("No gaps detected in identifier sequences");
    }
    for gap in &gaps {
        let more = gap.missing_count.saturating_sub(gap.preview.len() as u64);
        if more > 0 {
            warn!(
                prefix = %gap.prefix,
                "Gaps detected: {:?} and {} more ({} missing)",
                gap.preview, more, gap.missing_count
            );
        } else {
            warn!(
                prefix = %gap.prefix,
                "Gaps detected: {:?} ({} missing)",
                gap.preview, gap.missing_count
            );
        }
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_gap() {
        let gaps = find_gaps(["A-1", "A-2", "A-4"]);
        assert_eq!(
            gaps,
            vec![SequenceGap {
                prefix: "A-".into(),
                preview: vec![3],
                missing_count: 1,
            }]
        );
    }

    #[test]
    fn test_prefixes_are_independent() {
        let gaps = find_gaps(["MPO-001", "MPO-003", "FA-10", "FA-11", "FA-12"]);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].prefix, "MPO-");
        assert_eq!(gaps[0].preview, vec![2]);
    }

    #[test]
    fn test_preview_is_capped() {
        let gaps = find_gaps(["X1", "X100"]);
        assert_eq!(gaps[0].preview, (2..12).collect::<Vec<u64>>());
        assert_eq!(gaps[0].missing_count, 98);
    }

    #[test]
    fn test_unpatterned_identifiers_ignored() {
        assert!(find_gaps(["12345", "hello", ""]).is_empty());
    }

    #[test]
    fn test_no_gaps() {
        assert!(find_gaps(["B-7", "B-8", "B-9", "B-8"]).is_empty());
        assert!(find_gaps(["B-7"]).is_empty());
    }

    #[test]
    fn test_pattern_found_inside_identifier() {
        let gaps = find_gaps(["box 1/A-1", "box 2/A-3"]);
        assert_eq!(gaps[0].prefix, "A-");
        assert_eq!(gaps[0].preview, vec![2]);
    }
}
