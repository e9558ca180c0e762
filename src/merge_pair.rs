use anyhow::{Result, ensure};
use std::path::Path;
use std::time::Instant;

use crate::level::{ColorOffset, MergePlan, MergeStrategy};
use crate::merge::{DEFAULT_BUFFER_WORDS, InputCursor, MergeStats, OutputCursor};
use crate::stream::{FileWordReader, FileWordWriter, WordRead, WordWrite};

/// Options shared by the path-level merge operations.
#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    /// I/O buffer size per stream, in words
    pub buffer_words: usize,

    /// Suppress progress reporting
    pub quiet: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        MergeOptions {
            buffer_words: DEFAULT_BUFFER_WORDS,
            quiet: false,
        }
    }
}

/// Merge two sorted streams on disk into one sorted, deduplicated colored
/// stream.
///
/// The strategy is selected from `(level1, level2)`; passing the same path
/// twice at levels (0, 0) self-widens the stream instead. The output is
/// written next to its final path and only persisted on success.
pub fn merge<P: AsRef<Path>>(
    input1: P,
    input2: P,
    output: P,
    level1: u32,
    level2: u32,
    options: &MergeOptions,
) -> Result<MergeStats> {
    let start_time = Instant::now();

    let same_source = input1.as_ref() == input2.as_ref();
    let strategy = MergeStrategy::dispatch(level1, level2, same_source)?;
    if !options.quiet {
        eprintln!(
            "Merging levels ({}, {}) into level {}",
            level1,
            level2,
            strategy.output_level()
        );
    }

    let reader1 = FileWordReader::open(&input1)?;
    let writer = FileWordWriter::create(&output)?;
    let (writer, stats) = match strategy {
        MergeStrategy::SelfWiden => widen_stream(reader1, writer, options.buffer_words)?,
        _ => {
            let reader2 = FileWordReader::open(&input2)?;
            run_pairwise(
                &strategy.plan(),
                reader1,
                reader2,
                writer,
                options.buffer_words,
            )?
        }
    };
    writer.finish()?;

    if !options.quiet {
        eprintln!(
            "Merged {} + {} records into {} ({} shared keys) in {:.2?}",
            stats.records_in1,
            stats.records_in2,
            stats.records_out,
            stats.shared_keys(),
            start_time.elapsed()
        );
    }
    Ok(stats)
}

/// Self-widening: every key of a colorless stream gains color bit 0.
/// The key sequence is unchanged.
pub(crate) fn widen_stream<R: WordRead, W: WordWrite>(
    reader: R,
    writer: W,
    buffer_words: usize,
) -> Result<(W, MergeStats)> {
    let mut input = InputCursor::new(reader, 1, buffer_words);
    let mut out = OutputCursor::new(writer, 2, buffer_words);

    loop {
        input.refill()?;
        if !input.has_record() {
            break;
        }
        while input.has_record() {
            if !out.has_room() {
                out.flush_all()?;
            }
            out.push_key(input.key());
            out.last_colors_mut()[0] = 1;
            input.advance();
        }
    }
    out.flush_all()?;

    let stats = MergeStats {
        records_in1: input.records,
        records_in2: 0,
        records_out: out.records,
        output_level: 1,
    };
    Ok((out.into_writer(), stats))
}

/// The shared pairwise streaming merge. All non-widening strategies run
/// this body; the plan fixes record strides and input 2's color offset.
pub(crate) fn run_pairwise<R1: WordRead, R2: WordRead, W: WordWrite>(
    plan: &MergePlan,
    reader1: R1,
    reader2: R2,
    writer: W,
    buffer_words: usize,
) -> Result<(W, MergeStats)> {
    let mut in1 = InputCursor::new(reader1, plan.stride1, buffer_words);
    let mut in2 = InputCursor::new(reader2, plan.stride2, buffer_words);
    let mut out = OutputCursor::new(writer, plan.stride_out, buffer_words);

    // Sentinel: no key emitted yet
    let mut last_key = u64::MAX;

    loop {
        in1.refill()?;
        in2.refill()?;
        if !in1.has_record() || !in2.has_record() {
            break;
        }
        while in1.has_record() && in2.has_record() {
            if !out.has_room() {
                out.flush_keep_last()?;
            }
            // On a tie input 1 wins; input 2's record for the same key is
            // folded in on its own next iteration. Never consume both.
            if in1.key() <= in2.key() {
                emit(&mut in1, &mut out, ColorOffset::ZERO, &mut last_key)?;
            } else {
                emit(&mut in2, &mut out, plan.offset2, &mut last_key)?;
            }
        }
    }

    // At most one input still holds records; stream it through
    drain(&mut in1, &mut out, ColorOffset::ZERO, &mut last_key)?;
    drain(&mut in2, &mut out, plan.offset2, &mut last_key)?;

    out.flush_all()?;
    let stats = MergeStats {
        records_in1: in1.records,
        records_in2: in2.records,
        records_out: out.records,
        output_level: plan.output_level,
    };
    Ok((out.into_writer(), stats))
}

/// Consume the winning record: fold its colors into the previous output
/// record when the key repeats, append a new record otherwise.
fn emit<R: WordRead, W: WordWrite>(
    winner: &mut InputCursor<R>,
    out: &mut OutputCursor<W>,
    at: ColorOffset,
    last_key: &mut u64,
) -> Result<()> {
    let key = winner.key();
    if key == *last_key {
        ensure!(
            !out.is_empty(),
            "Internal error: duplicate key {:#018x} with no buffered output record",
            key
        );
        place_colors(winner.colors(), out.last_colors_mut(), at);
    } else {
        out.push_key(key);
        place_colors(winner.colors(), out.last_colors_mut(), at);
        *last_key = key;
    }
    winner.advance();
    Ok(())
}

/// Drain one input once the other side is exhausted. The head record may
/// still duplicate the last emitted key and fold in; everything after it
/// is strictly greater and appends.
fn drain<R: WordRead, W: WordWrite>(
    input: &mut InputCursor<R>,
    out: &mut OutputCursor<W>,
    at: ColorOffset,
    last_key: &mut u64,
) -> Result<()> {
    loop {
        input.refill()?;
        if !input.has_record() {
            return Ok(());
        }
        while input.has_record() {
            if !out.has_room() {
                out.flush_keep_last()?;
            }
            emit(input, out, at, last_key)?;
        }
    }
}

/// OR `colors` into `out` at the given word-and-bit offset. A color word
/// shifted across a word boundary carries its high bits into the next
/// output word.
pub(crate) fn place_colors(colors: &[u64], out: &mut [u64], at: ColorOffset) {
    for (i, &word) in colors.iter().enumerate() {
        out[at.word + i] |= word << at.bit;
        if at.bit != 0 {
            let carry = word >> (64 - at.bit);
            if carry != 0 {
                out[at.word + i + 1] |= carry;
            }
        }
    }
}
