use crate::level::{color_words, record_stride};
use crate::stream::{self, WordRead, WordWrite};
use anyhow::{Result, ensure};
use std::path::Path;

// Re-export merge operations
pub use crate::merge_nway::{ConsolidateStats, consolidate};
pub use crate::merge_pair::{MergeOptions, merge};
pub use crate::merge_ram::{consolidate_ram, merge_pair_ram, widen_ram};

/// Default I/O window per stream: 1 Mi words (8 MiB).
pub const DEFAULT_BUFFER_WORDS: usize = 1 << 20;

/// Counters reported by a pairwise merge.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeStats {
    pub records_in1: u64,
    pub records_in2: u64,
    pub records_out: u64,
    pub output_level: u32,
}

impl MergeStats {
    /// Keys present in both inputs. Every input record yields exactly one
    /// output record unless its key also arrived from the other side.
    pub fn shared_keys(&self) -> u64 {
        self.records_in1 + self.records_in2 - self.records_out
    }
}

/// Read-side cursor: a reader, its bounded buffer and the position of the
/// next unread record.
pub(crate) struct InputCursor<R> {
    reader: R,
    stride: usize,
    buf: Vec<u64>,
    len: usize,
    pos: usize,
    exhausted: bool,
    pub(crate) records: u64,
}

impl<R: WordRead> InputCursor<R> {
    pub(crate) fn new(reader: R, stride: usize, buffer_words: usize) -> Self {
        // Whole records only
        let cap = buffer_words.max(stride) / stride * stride;
        InputCursor {
            reader,
            stride,
            buf: vec![0; cap],
            len: 0,
            pos: 0,
            exhausted: false,
            records: 0,
        }
    }

    /// Refill once every buffered record has been consumed. A read of 0
    /// marks the input permanently exhausted; no recursion, no retry.
    pub(crate) fn refill(&mut self) -> Result<()> {
        if self.pos < self.len || self.exhausted {
            return Ok(());
        }
        let n = self.reader.read_words(&mut self.buf)?;
        ensure!(
            n % self.stride == 0,
            "Input stream ends inside a record ({} words read, {} words per record)",
            n,
            self.stride
        );
        self.len = n;
        self.pos = 0;
        if n == 0 {
            self.exhausted = true;
        }
        Ok(())
    }

    pub(crate) fn has_record(&self) -> bool {
        self.pos < self.len
    }

    pub(crate) fn key(&self) -> u64 {
        self.buf[self.pos]
    }

    pub(crate) fn colors(&self) -> &[u64] {
        &self.buf[self.pos + 1..self.pos + self.stride]
    }

    pub(crate) fn advance(&mut self) {
        self.pos += self.stride;
        self.records += 1;
    }
}

/// Write-side cursor. The buffer always retains the most recently written
/// record across flushes so a later duplicate key can still fold its
/// colors in.
pub(crate) struct OutputCursor<W> {
    writer: W,
    stride: usize,
    cap: usize,
    buf: Vec<u64>,
    pub(crate) records: u64,
}

impl<W: WordWrite> OutputCursor<W> {
    pub(crate) fn new(writer: W, stride: usize, buffer_words: usize) -> Self {
        // At least two records, so a keep-last flush always frees room
        let cap = (buffer_words / stride * stride).max(2 * stride);
        OutputCursor {
            writer,
            stride,
            cap,
            buf: Vec::with_capacity(cap),
            records: 0,
        }
    }

    pub(crate) fn has_room(&self) -> bool {
        self.buf.len() + self.stride <= self.cap
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append a record: the key followed by zeroed color words.
    pub(crate) fn push_key(&mut self, key: u64) {
        self.buf.push(key);
        self.buf.resize(self.buf.len() + self.stride - 1, 0);
        self.records += 1;
    }

    /// Color words of the most recently written record.
    pub(crate) fn last_colors_mut(&mut self) -> &mut [u64] {
        let start = self.buf.len() - self.stride + 1;
        &mut self.buf[start..]
    }

    /// Write out every buffered record except the last, then re-seat the
    /// last record at the start of the buffer.
    pub(crate) fn flush_keep_last(&mut self) -> Result<()> {
        if self.buf.len() <= self.stride {
            return Ok(());
        }
        let split = self.buf.len() - self.stride;
        self.writer.write_words(&self.buf[..split])?;
        self.buf.copy_within(split.., 0);
        self.buf.truncate(self.stride);
        Ok(())
    }

    /// Write out everything, including the retained last record.
    pub(crate) fn flush_all(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.writer.write_words(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }

    pub(crate) fn into_writer(self) -> W {
        self.writer
    }
}

/// Shape of a stream file at a declared color width.
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub level: u32,
    pub words: u64,
    pub records: u64,
    pub words_per_record: u64,
}

/// Report the shape of a stream file. The color width is not
/// self-describing, so the caller supplies it.
pub fn info<P: AsRef<Path>>(path: P, level: u32) -> Result<StreamInfo> {
    let words = stream::count_words(&path)?;
    let stride = record_stride(level) as u64;
    ensure!(
        words % stride == 0,
        "Stream {:?} holds {} words, not a multiple of the {}-word record at level {}",
        path.as_ref(),
        words,
        stride,
        level
    );

    let info = StreamInfo {
        level,
        words,
        records: words / stride,
        words_per_record: stride,
    };
    eprintln!("Stream information:");
    eprintln!("  Color bits (level): {}", info.level);
    eprintln!("  Color words per record: {}", color_words(level));
    eprintln!("  Words per record: {}", info.words_per_record);
    eprintln!("  Records: {}", info.records);
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{MemWordReader, MemWordWriter};

    #[test]
    fn test_input_cursor_whole_records() {
        // Stride-2 records through a 5-word window: capacity rounds down to 4
        let words: Vec<u64> = vec![10, 1, 20, 2, 30, 3];
        let mut cursor = InputCursor::new(MemWordReader::new(&words), 2, 5);
        let mut seen = Vec::new();
        loop {
            cursor.refill().unwrap();
            if !cursor.has_record() {
                break;
            }
            while cursor.has_record() {
                seen.push((cursor.key(), cursor.colors().to_vec()));
                cursor.advance();
            }
        }
        assert_eq!(
            seen,
            vec![(10, vec![1]), (20, vec![2]), (30, vec![3])]
        );
        assert_eq!(cursor.records, 3);
    }

    #[test]
    fn test_input_cursor_truncated_record() {
        let words: Vec<u64> = vec![10, 1, 20];
        let mut cursor = InputCursor::new(MemWordReader::new(&words), 2, 64);
        assert!(cursor.refill().is_err());
    }

    #[test]
    fn test_output_cursor_keep_last() {
        let mut out = OutputCursor::new(MemWordWriter::new(), 2, 4);
        out.push_key(10);
        out.last_colors_mut()[0] = 1;
        out.push_key(20);
        out.last_colors_mut()[0] = 2;
        assert!(!out.has_room());

        out.flush_keep_last().unwrap();
        assert!(out.has_room());
        // The retained record can still accumulate colors
        out.last_colors_mut()[0] |= 4;
        out.push_key(30);
        out.flush_all().unwrap();

        assert_eq!(out.records, 3);
        assert_eq!(out.into_writer().into_words(), vec![10, 1, 20, 6, 30, 0]);
    }

    #[test]
    fn test_merge_stats_shared_keys() {
        let stats = MergeStats {
            records_in1: 10,
            records_in2: 8,
            records_out: 14,
            output_level: 2,
        };
        assert_eq!(stats.shared_keys(), 4);
    }
}
