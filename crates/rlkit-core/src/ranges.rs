//! Range selector grammar for archive operations.
//!
//! Selectors are `N`, `N-M`, `N~M`, `N.M` (inclusive ranges) and the
//! negations `!N`, `!N-M` and friends. Positives accumulate, negatives
//! subtract; negatives alone subtract from the full slot range. Indices
//! beyond the archive are silently dropped.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::archive::MAX_SEENS;
use crate::error::{Error, Result};

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(!?)(\d+)(?:[-~.](\d+))?$").unwrap())
}

/// Parse selector tokens into a sorted, deduplicated index set.
/// Empty input selects every slot.
pub fn parse_ranges<S: AsRef<str>>(args: &[S]) -> Result<Vec<usize>> {
    if args.is_empty() {
        return Ok((0..MAX_SEENS).collect());
    }

    let mut included = BTreeSet::new();
    let mut excluded = BTreeSet::new();
    let mut any_positive = false;

    for arg in args {
        let arg = arg.as_ref().trim();
        if arg.is_empty() {
            continue;
        }

        let caps = token_re()
            .captures(arg)
            .ok_or_else(|| Error::BadRange(arg.to_string()))?;

        let negated = !caps[1].is_empty();
        let start: usize = caps[2]
            .parse()
            .map_err(|_| Error::BadRange(arg.to_string()))?;
        let end: usize = match caps.get(3) {
            Some(m) => m
                .as_str()
                .parse()
                .map_err(|_| Error::BadRange(arg.to_string()))?,
            None => start,
        };
        if end < start {
            return Err(Error::BadRange(arg.to_string()));
        }

        let set = if negated {
            &mut excluded
        } else {
            any_positive = true;
            &mut included
        };
        for i in start..=end.min(MAX_SEENS - 1) {
            set.insert(i);
        }
    }

    // only exclusions: subtract from the full range
    if !any_positive && !excluded.is_empty() {
        included = (0..MAX_SEENS).collect();
    }

    Ok(included.difference(&excluded).copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Vec<usize> {
        parse_ranges(args).unwrap()
    }

    #[test]
    fn empty_means_all() {
        let all = parse(&[]);
        assert_eq!(all.len(), MAX_SEENS);
        assert_eq!(all[0], 0);
        assert_eq!(all[9999], 9999);
    }

    #[test]
    fn single_and_ranges() {
        assert_eq!(parse(&["42"]), vec![42]);
        assert_eq!(parse(&["5-8"]), vec![5, 6, 7, 8]);
        assert_eq!(parse(&["10~15"]), vec![10, 11, 12, 13, 14, 15]);
        assert_eq!(parse(&["3.5"]), vec![3, 4, 5]);
    }

    #[test]
    fn accumulates_sorted_and_deduplicated() {
        assert_eq!(parse(&["100", "0", "5-7", "5", "100"]), vec![0, 5, 6, 7, 100]);
    }

    #[test]
    fn negation() {
        assert_eq!(
            parse(&["0-10", "!5"]),
            vec![0, 1, 2, 3, 4, 6, 7, 8, 9, 10]
        );
        assert_eq!(parse(&["0-10", "!3-5"]), vec![0, 1, 2, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn negation_alone_starts_from_everything() {
        let got = parse(&["!1-9998"]);
        assert_eq!(got, vec![0, 9999]);
    }

    #[test]
    fn out_of_archive_indices_are_dropped() {
        assert_eq!(parse(&["9999-20000"]), vec![9999]);
        assert!(parse(&["10000"]).is_empty());
    }

    #[test]
    fn malformed_tokens_fail() {
        for bad in ["abc", "1-2-3", "-5", "5-", "!", "1..2"] {
            assert!(
                matches!(parse_ranges(&[bad]), Err(Error::BadRange(_))),
                "expected BadRange for {:?}",
                bad
            );
        }
    }
}
