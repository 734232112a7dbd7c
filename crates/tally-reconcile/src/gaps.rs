//! Pure gap-detection algorithms. No I/O; the [`Reconciler`](crate::Reconciler)
//! feeds them what it reads from the store.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::{
  Error, Result,
  report::{SourceComparison, TimeGap},
};

/// IDs missing from the contiguous numeric range spanned by `ids`.
///
/// Only IDs of the form `{prefix}{digits}` take part. Missing IDs are
/// zero-padded to the narrowest suffix width observed, so `ORD001..ORD005`
/// without `ORD003` yields `["ORD003"]`.
///
/// Cost is proportional to the span between the smallest and largest
/// suffix, not to the number of IDs; spans wider than `max_span` are refused.
pub fn sequence_gaps<S: AsRef<str>>(
  ids: &[S],
  prefix: &str,
  max_span: u64,
) -> Result<Vec<String>> {
  let mut observed = BTreeSet::new();
  let mut width = usize::MAX;

  for id in ids {
    let Some(suffix) = id.as_ref().strip_prefix(prefix) else { continue };
    if suffix.is_empty() || !suffix.bytes().all(|b| b.is_ascii_digit()) {
      continue;
    }
    let Ok(n) = suffix.parse::<u64>() else { continue };
    width = width.min(suffix.len());
    observed.insert(n);
  }

  let (Some(&min), Some(&max)) = (observed.first(), observed.last()) else {
    return Ok(Vec::new());
  };

  let span = (max - min).saturating_add(1);
  if span > max_span {
    return Err(Error::SequenceSpanTooLarge { span, max: max_span });
  }

  Ok(
    (min..=max)
      .filter(|n| !observed.contains(n))
      .map(|n| format!("{prefix}{n:0width$}"))
      .collect(),
  )
}

/// Gaps longer than `expected` between consecutive timestamps. `stamps`
/// must be in ascending order.
pub fn time_gaps(stamps: &[DateTime<Utc>], expected: Duration) -> Vec<TimeGap> {
  stamps
    .windows(2)
    .filter_map(|pair| {
      let (prev, next) = (pair[0], pair[1]);
      let gap = next - prev;
      (gap > expected).then(|| TimeGap {
        gap_start:   prev,
        gap_end:     next,
        gap_minutes: gap.num_minutes(),
      })
    })
    .collect()
}

/// Two-way set difference, both sides sorted.
pub fn compare_ids<'a, 'b>(
  source: impl IntoIterator<Item = &'a str>,
  ledger: impl IntoIterator<Item = &'b str>,
) -> SourceComparison {
  let source: BTreeSet<&str> = source.into_iter().collect();
  let ledger: BTreeSet<&str> = ledger.into_iter().collect();

  SourceComparison {
    missing_in_db:     source.difference(&ledger).map(|s| s.to_string()).collect(),
    missing_in_source: ledger.difference(&source).map(|s| s.to_string()).collect(),
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn sequence_gap_in_the_middle() {
    let ids = ["ORD001", "ORD002", "ORD004", "ORD005"];
    assert_eq!(sequence_gaps(&ids, "ORD", 1000).unwrap(), vec!["ORD003"]);
  }

  #[test]
  fn sequence_ignores_foreign_ids() {
    let ids = ["ORD7", "ORD9", "EXP8", "ORD-8", "ORD"];
    assert_eq!(sequence_gaps(&ids, "ORD", 1000).unwrap(), vec!["ORD8"]);
  }

  #[test]
  fn sequence_without_matches_is_empty() {
    let ids: [&str; 0] = [];
    assert!(sequence_gaps(&ids, "ORD", 10).unwrap().is_empty());
    assert!(sequence_gaps(&["ORD5"], "ORD", 10).unwrap().is_empty());
  }

  #[test]
  fn sequence_span_is_bounded() {
    let err = sequence_gaps(&["A1", "A500"], "A", 100).unwrap_err();
    assert!(matches!(err, Error::SequenceSpanTooLarge { span: 500, max: 100 }));
  }

  #[test]
  fn sequence_span_over_the_whole_u64_range_is_refused() {
    let ids = ["ORD0", "ORD18446744073709551615"];
    let err = sequence_gaps(&ids, "ORD", 100_000).unwrap_err();
    assert!(matches!(
      err,
      Error::SequenceSpanTooLarge { span: u64::MAX, max: 100_000 }
    ));
  }

  #[test]
  fn time_gaps_only_over_threshold() {
    let t = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    let stamps = [
      t,
      t + Duration::minutes(120),
      t + Duration::minutes(241),
      t + Duration::minutes(250),
    ];
    let gaps = time_gaps(&stamps, Duration::minutes(120));
    assert_eq!(gaps, vec![TimeGap {
      gap_start:   t + Duration::minutes(120),
      gap_end:     t + Duration::minutes(241),
      gap_minutes: 121,
    }]);
  }

  #[test]
  fn time_gaps_need_two_events() {
    let t = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
    assert!(time_gaps(&[], Duration::minutes(1)).is_empty());
    assert!(time_gaps(&[t], Duration::minutes(1)).is_empty());
  }

  #[test]
  fn id_comparison_is_two_way() {
    let cmp = compare_ids(["A", "B", "C"], ["B", "C", "D", "D"]);
    assert_eq!(cmp.missing_in_db, vec!["A"]);
    assert_eq!(cmp.missing_in_source, vec!["D"]);
  }
}
