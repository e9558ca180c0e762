use anyhow::{Result, ensure};
use std::path::Path;
use std::time::Instant;

use crate::merge::{InputCursor, OutputCursor};
use crate::merge_pair::MergeOptions;
use crate::stream::{FileWordReader, FileWordWriter, WordRead, WordWrite};

/// Counters reported by an n-way consolidation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsolidateStats {
    pub streams: usize,
    pub records_in: u64,
    pub records_out: u64,
}

/// Consolidate two or more colorless sorted streams in one pass.
///
/// The output is the sorted set union of all input keys; this variant
/// carries no per-record colors.
pub fn consolidate<P: AsRef<Path>, Q: AsRef<Path>>(
    inputs: &[P],
    output: Q,
    options: &MergeOptions,
) -> Result<ConsolidateStats> {
    ensure!(
        inputs.len() >= 2,
        "Consolidation needs at least two input streams"
    );
    let start_time = Instant::now();

    let readers = inputs
        .iter()
        .map(FileWordReader::open)
        .collect::<Result<Vec<_>>>()?;
    let writer = FileWordWriter::create(&output)?;
    let (writer, stats) = run_nway(readers, writer, options.buffer_words)?;
    writer.finish()?;

    if !options.quiet {
        eprintln!(
            "Consolidated {} streams ({} records) into {} keys in {:.2?}",
            stats.streams,
            stats.records_in,
            stats.records_out,
            start_time.elapsed()
        );
    }
    Ok(stats)
}

/// N-way colorless merge body. A linear scan picks each round's minimum
/// head key; fan-in stays small enough that a priority queue would not
/// pay for itself.
pub(crate) fn run_nway<R: WordRead, W: WordWrite>(
    readers: Vec<R>,
    writer: W,
    buffer_words: usize,
) -> Result<(W, ConsolidateStats)> {
    let streams = readers.len();
    let mut live: Vec<InputCursor<R>> = readers
        .into_iter()
        .map(|reader| InputCursor::new(reader, 1, buffer_words))
        .collect();
    let mut out = OutputCursor::new(writer, 1, buffer_words);
    let mut last_key = u64::MAX;
    let mut records_in = 0;

    loop {
        // Refill every empty cursor; drop the ones whose reader is done
        let mut i = 0;
        while i < live.len() {
            live[i].refill()?;
            if live[i].has_record() {
                i += 1;
            } else {
                records_in += live[i].records;
                live.swap_remove(i);
            }
        }
        if live.is_empty() {
            break;
        }

        // Emit minima until the winning stream's buffer runs dry, then
        // return to the refill loop
        loop {
            let mut min_idx = 0;
            let mut min_key = live[0].key();
            for (idx, cursor) in live.iter().enumerate().skip(1) {
                if cursor.key() < min_key {
                    min_key = cursor.key();
                    min_idx = idx;
                }
            }
            if min_key != last_key {
                if !out.has_room() {
                    out.flush_all()?;
                }
                out.push_key(min_key);
                last_key = min_key;
            }
            live[min_idx].advance();
            if !live[min_idx].has_record() {
                break;
            }
        }
    }

    out.flush_all()?;
    let stats = ConsolidateStats {
        streams,
        records_in,
        records_out: out.records,
    };
    Ok((out.into_writer(), stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{MemWordReader, MemWordWriter};

    fn nway(inputs: &[&[u64]], buffer_words: usize) -> (Vec<u64>, ConsolidateStats) {
        let readers: Vec<MemWordReader> = inputs.iter().map(|s| MemWordReader::new(s)).collect();
        let (writer, stats) = run_nway(readers, MemWordWriter::new(), buffer_words).unwrap();
        (writer.into_words(), stats)
    }

    #[test]
    fn test_three_way_union() {
        let (out, stats) = nway(&[&[1, 4, 7], &[2, 4, 8], &[3, 4, 9]], 8);
        assert_eq!(out, vec![1, 2, 3, 4, 7, 8, 9]);
        assert_eq!(stats.streams, 3);
        assert_eq!(stats.records_in, 9);
        assert_eq!(stats.records_out, 7);
    }

    #[test]
    fn test_duplicates_across_refills() {
        let a: Vec<u64> = (0..50).collect();
        let b: Vec<u64> = (25..75).collect();
        let c: Vec<u64> = (0..75).step_by(5).collect();
        for buffer_words in [1, 2, 3, 8, 64] {
            let (out, _) = nway(&[&a, &b, &c], buffer_words);
            assert_eq!(
                out,
                (0..75).collect::<Vec<u64>>(),
                "buffer_words = {}",
                buffer_words
            );
        }
    }

    #[test]
    fn test_empty_and_uneven_streams() {
        let (out, stats) = nway(&[&[], &[5, 6], &[6]], 8);
        assert_eq!(out, vec![5, 6]);
        assert_eq!(stats.records_in, 3);
        assert_eq!(stats.records_out, 2);
    }

    #[test]
    fn test_all_streams_identical() {
        let a: Vec<u64> = vec![10, 20, 30];
        let (out, _) = nway(&[&a, &a, &a, &a], 2);
        assert_eq!(out, vec![10, 20, 30]);
    }
}
