//! Upstream per-sample presort helper.
//!
//! Raw minimizer values arrive unsorted and with repeats; the merge engine
//! requires each input stream to be strictly increasing with no duplicate
//! keys. This helper reestablishes that invariant in memory: the two
//! halves of the buffer sort concurrently, then one serial ordered merge
//! folds them back together, deduplicating.

use anyhow::Result;
use std::path::Path;
use std::time::Instant;

use crate::merge_pair::MergeOptions;
use crate::stream::{read_stream_words, write_stream_words};

/// Counters reported by a presort.
#[derive(Debug, Default, Clone, Copy)]
pub struct PresortStats {
    pub values_in: u64,
    pub values_out: u64,
}

/// Sort and deduplicate a buffer of raw values in place.
pub fn sort_values(values: &mut Vec<u64>) {
    if values.len() < 2 {
        return;
    }
    let mid = values.len() / 2;
    {
        let (left, right) = values.split_at_mut(mid);
        rayon::join(|| left.sort_unstable(), || right.sort_unstable());
    }

    // Serial merge of the two sorted halves back into the original buffer
    let mut merged = Vec::with_capacity(values.len());
    let mut i = 0;
    let mut j = mid;
    while i < mid && j < values.len() {
        let next = if values[i] <= values[j] {
            i += 1;
            values[i - 1]
        } else {
            j += 1;
            values[j - 1]
        };
        if merged.last() != Some(&next) {
            merged.push(next);
        }
    }
    for &value in &values[i..mid] {
        if merged.last() != Some(&value) {
            merged.push(value);
        }
    }
    for &value in &values[j..] {
        if merged.last() != Some(&value) {
            merged.push(value);
        }
    }
    *values = merged;
}

/// Presort one sample's raw value file into a sorted, deduplicated stream.
pub fn presort<P: AsRef<Path>>(input: P, output: P, options: &MergeOptions) -> Result<PresortStats> {
    let start_time = Instant::now();

    let mut values = read_stream_words(&input)?;
    let values_in = values.len() as u64;
    sort_values(&mut values);
    write_stream_words(&output, &values)?;

    let stats = PresortStats {
        values_in,
        values_out: values.len() as u64,
    };
    if !options.quiet {
        eprintln!(
            "Sorted {} values into {} distinct keys in {:.2?}",
            stats.values_in,
            stats.values_out,
            start_time.elapsed()
        );
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_values() {
        let mut values = vec![9u64, 1, 5, 1, 7, 3, 5, 0];
        sort_values(&mut values);
        assert_eq!(values, vec![0, 1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_sort_values_small() {
        let mut values = Vec::new();
        sort_values(&mut values);
        assert!(values.is_empty());

        let mut values = vec![42u64];
        sort_values(&mut values);
        assert_eq!(values, vec![42]);
    }

    #[test]
    fn test_sort_values_duplicates_across_halves() {
        // Same value in both halves collapses to one
        let mut values = vec![5u64, 5, 5, 5];
        sort_values(&mut values);
        assert_eq!(values, vec![5]);
    }

    #[test]
    fn test_sort_values_already_sorted() {
        let mut values: Vec<u64> = (0..100).collect();
        sort_values(&mut values);
        assert_eq!(values, (0..100).collect::<Vec<u64>>());
    }
}
