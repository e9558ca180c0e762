use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const DEFAULT_BUFFER_MIB: usize = 8;

/// Convert a buffer size in MiB to 64-bit words
fn buffer_words(buffer_mib: usize) -> usize {
    (buffer_mib.max(1) * (1 << 20)) / 8
}

#[derive(Parser)]
#[command(author, version, about = "Streaming color-merge engine for minimizer indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge two sorted streams into one sorted, colored stream
    Merge {
        /// Path to the first input stream
        input1: PathBuf,

        /// Path to the second input stream (repeat the first path with
        /// levels 0 0 to self-widen)
        input2: PathBuf,

        /// Path to the output stream
        #[arg(short = 'o', long = "output")]
        output: PathBuf,

        /// Color bit width of the first input
        #[arg(short = '1', long = "level1", default_value_t = 0)]
        level1: u32,

        /// Color bit width of the second input
        #[arg(short = '2', long = "level2", default_value_t = 0)]
        level2: u32,

        /// I/O buffer size per stream in MiB
        #[arg(short = 'b', long = "buffer-mib", default_value_t = DEFAULT_BUFFER_MIB)]
        buffer_mib: usize,

        /// Path to JSON summary file
        #[arg(short = 's', long = "summary")]
        summary: Option<PathBuf>,

        /// Suppress progress reporting
        #[arg(short = 'q', long = "quiet", default_value_t = false)]
        quiet: bool,
    },

    /// Consolidate two or more colorless sorted streams in one pass
    Consolidate {
        /// Paths to the input streams
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<PathBuf>,

        /// Path to the output stream
        #[arg(short = 'o', long = "output")]
        output: PathBuf,

        /// I/O buffer size per stream in MiB
        #[arg(short = 'b', long = "buffer-mib", default_value_t = DEFAULT_BUFFER_MIB)]
        buffer_mib: usize,

        /// Suppress progress reporting
        #[arg(short = 'q', long = "quiet", default_value_t = false)]
        quiet: bool,
    },

    /// Sort and deduplicate one sample's raw values in memory
    Presort {
        /// Path to the raw value file
        input: PathBuf,

        /// Path to the output stream
        #[arg(short = 'o', long = "output")]
        output: PathBuf,

        /// Suppress progress reporting
        #[arg(short = 'q', long = "quiet", default_value_t = false)]
        quiet: bool,
    },

    /// Show information about a stream file
    Info {
        /// Path to the stream file
        input: PathBuf,

        /// Color bit width of the stream
        #[arg(short = 'l', long = "level", default_value_t = 0)]
        level: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Merge {
            input1,
            input2,
            output,
            level1,
            level2,
            buffer_mib,
            summary,
            quiet,
        } => {
            let mut config = braid::MergeConfig::new(input1, input2, output)
                .with_levels(*level1, *level2)
                .with_buffer_words(buffer_words(*buffer_mib))
                .with_quiet(*quiet);
            if let Some(summary_path) = summary {
                config = config.with_summary(summary_path);
            }
            config.execute()?;
        }
        Commands::Consolidate {
            inputs,
            output,
            buffer_mib,
            quiet,
        } => {
            braid::ConsolidateConfig::new(inputs, output)
                .with_buffer_words(buffer_words(*buffer_mib))
                .with_quiet(*quiet)
                .execute()?;
        }
        Commands::Presort {
            input,
            output,
            quiet,
        } => {
            let options = braid::MergeOptions {
                buffer_words: braid::DEFAULT_BUFFER_WORDS,
                quiet: *quiet,
            };
            braid::run_presort(input, output, &options)?;
        }
        Commands::Info { input, level } => {
            braid::stream_info(input, *level)?;
        }
    }

    Ok(())
}
