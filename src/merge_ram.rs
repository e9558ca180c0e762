//! In-memory variants of the merge operations.
//!
//! Same algorithm bodies as the streaming merges, run through the memory
//! backend. Chosen by callers for merge-tree levels whose total input size
//! is small enough to avoid disk round-trips.

use anyhow::{Result, ensure};

use crate::level::MergeStrategy;
use crate::merge_nway::run_nway;
use crate::merge_pair::{run_pairwise, widen_stream};
use crate::stream::{MemWordReader, MemWordWriter};

/// Cursor window for RAM merges. Inputs are already resident, so this
/// only bounds working-set granularity.
const RAM_BUFFER_WORDS: usize = 1 << 16;

/// Merge two sorted word buffers. The output buffer is pre-sized to its
/// record-count upper bound (every input record yields at most one output
/// record) and shrunk to the written length.
pub fn merge_pair_ram(a: &[u64], b: &[u64], level1: u32, level2: u32) -> Result<Vec<u64>> {
    let strategy = MergeStrategy::dispatch(level1, level2, false)?;
    let plan = strategy.plan();
    ensure!(
        a.len() % plan.stride1 == 0,
        "First input holds {} words, not a multiple of the {}-word record at level {}",
        a.len(),
        plan.stride1,
        level1
    );
    ensure!(
        b.len() % plan.stride2 == 0,
        "Second input holds {} words, not a multiple of the {}-word record at level {}",
        b.len(),
        plan.stride2,
        level2
    );

    let max_records = a.len() / plan.stride1 + b.len() / plan.stride2;
    let writer = MemWordWriter::with_capacity(max_records * plan.stride_out);
    let (writer, _stats) = run_pairwise(
        &plan,
        MemWordReader::new(a),
        MemWordReader::new(b),
        writer,
        RAM_BUFFER_WORDS,
    )?;
    Ok(writer.into_words())
}

/// Self-widening over a resident colorless buffer: every key gains color
/// bit 0.
pub fn widen_ram(a: &[u64]) -> Result<Vec<u64>> {
    let writer = MemWordWriter::with_capacity(a.len() * 2);
    let (writer, _stats) = widen_stream(MemWordReader::new(a), writer, RAM_BUFFER_WORDS)?;
    Ok(writer.into_words())
}

/// N-way consolidation of resident colorless buffers.
pub fn consolidate_ram(inputs: &[&[u64]]) -> Result<Vec<u64>> {
    ensure!(
        inputs.len() >= 2,
        "Consolidation needs at least two input buffers"
    );
    let readers: Vec<MemWordReader> = inputs.iter().map(|s| MemWordReader::new(s)).collect();
    let writer = MemWordWriter::with_capacity(inputs.iter().map(|s| s.len()).sum());
    let (writer, _stats) = run_nway(readers, writer, RAM_BUFFER_WORDS)?;
    Ok(writer.into_words())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_pair_ram_matches_streaming_semantics() {
        let a = vec![0u64, 1, 2, 1, 4, 1];
        let b = vec![0u64, 1, 2, 1, 6, 1];
        let out = merge_pair_ram(&a, &b, 1, 1).unwrap();
        assert_eq!(out, vec![0, 3, 2, 3, 4, 1, 6, 2]);
    }

    #[test]
    fn test_merge_pair_ram_rejects_ragged_input() {
        assert!(merge_pair_ram(&[1, 1, 2], &[1, 1], 1, 1).is_err());
    }

    #[test]
    fn test_merge_pair_ram_rejects_bad_levels() {
        assert!(merge_pair_ram(&[], &[], 3, 3).is_err());
    }

    #[test]
    fn test_widen_ram() {
        let out = widen_ram(&[3, 5, 8]).unwrap();
        assert_eq!(out, vec![3, 1, 5, 1, 8, 1]);
    }

    #[test]
    fn test_consolidate_ram() {
        let out = consolidate_ram(&[&[1, 3], &[2, 3], &[3, 4]]).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_output_shrunk_to_written_length() {
        // Fully overlapping inputs write half the upper bound
        let a = vec![1u64, 2, 3, 4];
        let out = merge_pair_ram(&a, &a, 0, 0).unwrap();
        assert_eq!(out, vec![1, 2, 3, 4]);
        assert!(out.capacity() <= 2 * out.len());
    }
}
