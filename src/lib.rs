//! # Braid
//!
//! A streaming color-merge engine for minimizer indexes: merges sorted
//! per-sample minimizer streams into one sorted, deduplicated stream in
//! which each distinct key carries a bitset of the samples that contain it.
//!
//! This crate provides both a library and a binary for building colored
//! indexes out of externally produced per-sample streams.
//!
#![doc = include_str!("../README.md")]

// Re-export public functionality
pub mod level;
pub mod merge;
pub mod merge_nway;
pub mod merge_pair;
pub mod merge_ram;
pub mod presort;
pub mod stream;

// Re-export the important structures and functions for library users
pub use level::{ColorOffset, MergeStrategy, color_words, record_stride};
pub use merge::{
    DEFAULT_BUFFER_WORDS, MergeStats, StreamInfo, consolidate_ram, info as stream_info,
    merge_pair_ram, widen_ram,
};
pub use merge_nway::{ConsolidateStats, consolidate as run_consolidate};
pub use merge_pair::{MergeOptions, merge as run_merge};
pub use presort::{PresortStats, presort as run_presort, sort_values};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// JSON summary structure for a pairwise merge
#[derive(Serialize, Deserialize)]
pub struct MergeSummary {
    pub version: String,
    pub input1: String,
    pub input2: String,
    pub output: String,
    pub level1: u32,
    pub level2: u32,
    pub output_level: u32,
    pub records_in1: u64,
    pub records_in2: u64,
    pub records_out: u64,
    pub shared_keys: u64,
    pub time: f64,
    pub records_per_second: u64,
}

/// Configuration for a pairwise merge
pub struct MergeConfig {
    /// Path to the first input stream
    pub input1: PathBuf,

    /// Path to the second input stream
    pub input2: PathBuf,

    /// Path to the output stream
    pub output: PathBuf,

    /// Color bit width of the first input
    pub level1: u32,

    /// Color bit width of the second input
    pub level2: u32,

    /// I/O buffer size per stream in words
    pub buffer_words: usize,

    /// Path to JSON summary file
    pub summary_path: Option<PathBuf>,

    /// Suppress progress reporting
    pub quiet: bool,
}

impl MergeConfig {
    /// Create a merge configuration for the given input and output paths
    pub fn new<P: AsRef<Path>>(input1: P, input2: P, output: P) -> Self {
        MergeConfig {
            input1: input1.as_ref().to_path_buf(),
            input2: input2.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            level1: 0,
            level2: 0,
            buffer_words: DEFAULT_BUFFER_WORDS,
            summary_path: None,
            quiet: false,
        }
    }

    /// Set the color bit widths of the two inputs
    pub fn with_levels(mut self, level1: u32, level2: u32) -> Self {
        self.level1 = level1;
        self.level2 = level2;
        self
    }

    /// Set the I/O buffer size per stream in words
    pub fn with_buffer_words(mut self, buffer_words: usize) -> Self {
        self.buffer_words = buffer_words;
        self
    }

    /// Set the summary path
    pub fn with_summary<P: AsRef<Path>>(mut self, summary_path: P) -> Self {
        self.summary_path = Some(summary_path.as_ref().to_path_buf());
        self
    }

    /// Set quiet mode
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Execute the merge with this configuration
    pub fn execute(&self) -> Result<MergeStats> {
        let start_time = Instant::now();
        let options = MergeOptions {
            buffer_words: self.buffer_words,
            quiet: self.quiet,
        };
        let stats = merge_pair::merge(
            &self.input1,
            &self.input2,
            &self.output,
            self.level1,
            self.level2,
            &options,
        )?;

        // Build and write JSON summary if path provided
        if let Some(summary_path) = &self.summary_path {
            let time = start_time.elapsed().as_secs_f64();
            let records_in = stats.records_in1 + stats.records_in2;
            let summary = MergeSummary {
                version: format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
                input1: self.input1.to_string_lossy().to_string(),
                input2: self.input2.to_string_lossy().to_string(),
                output: self.output.to_string_lossy().to_string(),
                level1: self.level1,
                level2: self.level2,
                output_level: stats.output_level,
                records_in1: stats.records_in1,
                records_in2: stats.records_in2,
                records_out: stats.records_out,
                shared_keys: stats.shared_keys(),
                time,
                records_per_second: if time > 0.0 {
                    (records_in as f64 / time) as u64
                } else {
                    0
                },
            };

            let file = File::create(summary_path)
                .context(format!("Failed to create summary: {:?}", summary_path))?;
            serde_json::to_writer_pretty(BufWriter::new(file), &summary)
                .context("Failed to write summary")?;
            if !self.quiet {
                eprintln!("Summary saved to {:?}", summary_path);
            }
        }

        Ok(stats)
    }
}

/// Configuration for an n-way consolidation
pub struct ConsolidateConfig {
    /// Paths to the input streams
    pub inputs: Vec<PathBuf>,

    /// Path to the output stream
    pub output: PathBuf,

    /// I/O buffer size per stream in words
    pub buffer_words: usize,

    /// Suppress progress reporting
    pub quiet: bool,
}

impl ConsolidateConfig {
    /// Create a consolidation configuration for the given inputs and output
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(inputs: &[P], output: Q) -> Self {
        ConsolidateConfig {
            inputs: inputs.iter().map(|p| p.as_ref().to_path_buf()).collect(),
            output: output.as_ref().to_path_buf(),
            buffer_words: DEFAULT_BUFFER_WORDS,
            quiet: false,
        }
    }

    /// Set the I/O buffer size per stream in words
    pub fn with_buffer_words(mut self, buffer_words: usize) -> Self {
        self.buffer_words = buffer_words;
        self
    }

    /// Set quiet mode
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Execute the consolidation with this configuration
    pub fn execute(&self) -> Result<ConsolidateStats> {
        let options = MergeOptions {
            buffer_words: self.buffer_words,
            quiet: self.quiet,
        };
        merge_nway::consolidate(&self.inputs, &self.output, &options)
    }
}
