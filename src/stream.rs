use anyhow::{Context, Result, ensure};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Bounded read of 64-bit words into a caller-owned buffer.
///
/// Returns the number of words read; 0 signals that the stream is
/// exhausted. Short counts occur only at the end of a stream.
pub trait WordRead {
    fn read_words(&mut self, buf: &mut [u64]) -> Result<usize>;
}

/// Sequential write of 64-bit words.
pub trait WordWrite {
    fn write_words(&mut self, words: &[u64]) -> Result<()>;
}

/// Buffered little-endian word reader over a disk file.
///
/// The file handle is scoped to the reader and released on drop on all
/// exit paths.
pub struct FileWordReader {
    path: PathBuf,
    inner: BufReader<File>,
    scratch: Vec<u8>,
}

impl FileWordReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file =
            File::open(&path).with_context(|| format!("Failed to open input stream {:?}", path))?;
        Ok(FileWordReader {
            path,
            inner: BufReader::new(file),
            scratch: Vec::new(),
        })
    }
}

impl WordRead for FileWordReader {
    fn read_words(&mut self, buf: &mut [u64]) -> Result<usize> {
        let want = buf.len() * 8;
        self.scratch.resize(want, 0);
        let mut filled = 0;
        while filled < want {
            let n = self
                .inner
                .read(&mut self.scratch[filled..want])
                .with_context(|| format!("Failed to read from stream {:?}", self.path))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        ensure!(
            filled % 8 == 0,
            "Stream {:?} is truncated mid-word ({} trailing bytes)",
            self.path,
            filled % 8
        );
        for (word, chunk) in buf.iter_mut().zip(self.scratch[..filled].chunks_exact(8)) {
            *word = u64::from_le_bytes(chunk.try_into().unwrap());
        }
        Ok(filled / 8)
    }
}

/// Buffered little-endian word writer.
///
/// Words go to a temporary file in the destination's directory; the
/// destination path only appears once `finish` succeeds. If the writer is
/// dropped without finishing, the temporary file is removed, so an
/// interrupted merge never leaves an output that looks complete.
pub struct FileWordWriter {
    path: PathBuf,
    inner: BufWriter<NamedTempFile>,
    scratch: Vec<u8>,
}

impl FileWordWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file for output {:?}", path))?;
        Ok(FileWordWriter {
            path,
            inner: BufWriter::new(tmp),
            scratch: Vec::new(),
        })
    }

    /// Flush buffered words and move the temporary file onto the
    /// destination path.
    pub fn finish(self) -> Result<()> {
        let path = self.path;
        let tmp = self
            .inner
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush output {:?}: {}", path, e.error()))?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to persist output {:?}", path))?;
        Ok(())
    }
}

impl WordWrite for FileWordWriter {
    fn write_words(&mut self, words: &[u64]) -> Result<()> {
        self.scratch.clear();
        self.scratch.reserve(words.len() * 8);
        for word in words {
            self.scratch.extend_from_slice(&word.to_le_bytes());
        }
        self.inner
            .write_all(&self.scratch)
            .with_context(|| format!("Failed to write to output {:?}", self.path))?;
        Ok(())
    }
}

/// Reader over a word buffer already resident in memory.
pub struct MemWordReader<'a> {
    words: &'a [u64],
    pos: usize,
}

impl<'a> MemWordReader<'a> {
    pub fn new(words: &'a [u64]) -> Self {
        MemWordReader { words, pos: 0 }
    }
}

impl WordRead for MemWordReader<'_> {
    fn read_words(&mut self, buf: &mut [u64]) -> Result<usize> {
        let n = buf.len().min(self.words.len() - self.pos);
        buf[..n].copy_from_slice(&self.words[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

/// Writer into an owned, resizable word buffer.
#[derive(Default)]
pub struct MemWordWriter {
    words: Vec<u64>,
}

impl MemWordWriter {
    pub fn new() -> Self {
        MemWordWriter::default()
    }

    pub fn with_capacity(words: usize) -> Self {
        MemWordWriter {
            words: Vec::with_capacity(words),
        }
    }

    /// Take the written words, shrunk to the written length.
    pub fn into_words(mut self) -> Vec<u64> {
        self.words.shrink_to_fit();
        self.words
    }
}

impl WordWrite for MemWordWriter {
    fn write_words(&mut self, words: &[u64]) -> Result<()> {
        self.words.extend_from_slice(words);
        Ok(())
    }
}

/// Number of words in a stream file, derived from its size.
pub fn count_words<P: AsRef<Path>>(path: P) -> Result<u64> {
    let path = path.as_ref();
    let len = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat stream {:?}", path))?
        .len();
    ensure!(
        len % 8 == 0,
        "Stream {:?} is truncated mid-word ({} bytes)",
        path,
        len
    );
    Ok(len / 8)
}

/// Read an entire stream into memory. Intended for the in-memory merge
/// path and the presort helper, where inputs are known to fit.
pub fn read_stream_words<P: AsRef<Path>>(path: P) -> Result<Vec<u64>> {
    let path = path.as_ref();
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read stream {:?}", path))?;
    ensure!(
        bytes.len() % 8 == 0,
        "Stream {:?} is truncated mid-word ({} bytes)",
        path,
        bytes.len()
    );
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
        .collect())
}

/// Write a word buffer to a stream file via the temp-then-persist path.
pub fn write_stream_words<P: AsRef<Path>>(path: P, words: &[u64]) -> Result<()> {
    let mut writer = FileWordWriter::create(path)?;
    writer.write_words(words)?;
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream.bin");
        let words = vec![0u64, 1, u64::MAX, 42, 1 << 63];

        write_stream_words(&path, &words).unwrap();
        assert_eq!(count_words(&path).unwrap(), 5);
        assert_eq!(read_stream_words(&path).unwrap(), words);

        // Bounded reads see the same words in chunks
        let mut reader = FileWordReader::open(&path).unwrap();
        let mut buf = [0u64; 2];
        let mut seen = Vec::new();
        loop {
            let n = reader.read_words(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            seen.extend_from_slice(&buf[..n]);
        }
        assert_eq!(seen, words);
    }

    #[test]
    fn test_truncated_stream_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        std::fs::write(&path, [0u8; 11]).unwrap();

        assert!(count_words(&path).is_err());
        assert!(read_stream_words(&path).is_err());

        let mut reader = FileWordReader::open(&path).unwrap();
        let mut buf = [0u64; 4];
        assert!(reader.read_words(&mut buf).is_err());
    }

    #[test]
    fn test_missing_input_is_fatal() {
        assert!(FileWordReader::open("/nonexistent/stream.bin").is_err());
    }

    #[test]
    fn test_unfinished_writer_leaves_no_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");
        {
            let mut writer = FileWordWriter::create(&path).unwrap();
            writer.write_words(&[1, 2, 3]).unwrap();
            // dropped without finish()
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_mem_backend() {
        let words = vec![7u64, 8, 9];
        let mut reader = MemWordReader::new(&words);
        let mut buf = [0u64; 2];
        assert_eq!(reader.read_words(&mut buf).unwrap(), 2);
        assert_eq!(buf, [7, 8]);
        assert_eq!(reader.read_words(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 9);
        assert_eq!(reader.read_words(&mut buf).unwrap(), 0);

        let mut writer = MemWordWriter::with_capacity(16);
        writer.write_words(&[1, 2]).unwrap();
        writer.write_words(&[3]).unwrap();
        assert_eq!(writer.into_words(), vec![1, 2, 3]);
    }
}
