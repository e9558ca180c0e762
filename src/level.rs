use anyhow::{Result, bail};

/// Number of color words carried by each record of a stream at `level`
/// color bits. Zero means no color tracking.
pub fn color_words(level: u32) -> usize {
    level.div_ceil(64) as usize
}

/// Words per record at `level`: the key plus its color words.
pub fn record_stride(level: u32) -> usize {
    1 + color_words(level)
}

/// Word-and-bit position at which one input's color bits land in the
/// merged output color vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorOffset {
    pub word: usize,
    pub bit: u32,
}

impl ColorOffset {
    pub const ZERO: ColorOffset = ColorOffset { word: 0, bit: 0 };

    /// Offset for the second input of a merge whose first input carries
    /// `level` color bits.
    pub fn for_level(level: u32) -> Self {
        ColorOffset {
            word: (level / 64) as usize,
            bit: level % 64,
        }
    }
}

/// Merge strategy selected from the color widths of the two inputs.
///
/// The output of every merge carries `level_1 + level_2` color bits, with
/// input 2's bits starting at position `level_1`, never overlapping input
/// 1's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// A colorless stream merged with itself: every record gains exactly
    /// one color bit, value 1.
    SelfWiden,
    /// Union of two distinct colorless streams; the output stays colorless.
    NoColor,
    /// Equal widths whose combined colors still fit one word (1, 2, 4, 8,
    /// 16 or 32 bits).
    SingleWord { width: u32 },
    /// Equal widths of 64 bits or more; colors span multiple words.
    MultiWord { width: u32 },
    /// Unequal widths, including zero/nonzero mixes.
    Asymmetric { level1: u32, level2: u32 },
}

impl MergeStrategy {
    /// Select the strategy for `(level1, level2)`. `same_source` must be
    /// true when both inputs denote the same stream.
    ///
    /// Any combination outside the supported table is a fatal
    /// configuration error; there is no fallback.
    pub fn dispatch(level1: u32, level2: u32, same_source: bool) -> Result<Self> {
        Ok(match (level1, level2) {
            (0, 0) if same_source => MergeStrategy::SelfWiden,
            (0, 0) => MergeStrategy::NoColor,
            (1, 1) => MergeStrategy::SingleWord { width: 1 },
            (a, b) if a == b && matches!(a, 2 | 4 | 8 | 16 | 32) => {
                MergeStrategy::SingleWord { width: a }
            }
            (a, b) if a == b && a >= 64 => MergeStrategy::MultiWord { width: a },
            (a, b) if a != b => MergeStrategy::Asymmetric {
                level1: a,
                level2: b,
            },
            (a, b) => bail!(
                "Unsupported level combination ({}, {}): equal widths must be 0, 1, 2, 4, 8, 16, 32 or at least 64",
                a,
                b
            ),
        })
    }

    /// Color widths of the two inputs.
    pub fn input_levels(&self) -> (u32, u32) {
        match *self {
            MergeStrategy::SelfWiden | MergeStrategy::NoColor => (0, 0),
            MergeStrategy::SingleWord { width } | MergeStrategy::MultiWord { width } => {
                (width, width)
            }
            MergeStrategy::Asymmetric { level1, level2 } => (level1, level2),
        }
    }

    /// Color width of the merged output.
    pub fn output_level(&self) -> u32 {
        match *self {
            MergeStrategy::SelfWiden => 1,
            MergeStrategy::NoColor => 0,
            MergeStrategy::SingleWord { width } | MergeStrategy::MultiWord { width } => 2 * width,
            MergeStrategy::Asymmetric { level1, level2 } => level1 + level2,
        }
    }

    /// Fixed per-merge geometry for the shared pairwise engine.
    pub fn plan(&self) -> MergePlan {
        let (level1, level2) = self.input_levels();
        let output_level = self.output_level();
        MergePlan {
            level1,
            level2,
            output_level,
            stride1: record_stride(level1),
            stride2: record_stride(level2),
            stride_out: record_stride(output_level),
            offset2: ColorOffset::for_level(level1),
        }
    }
}

/// Record geometry of one pairwise merge: input strides, output stride and
/// the offset at which input 2's colors land.
#[derive(Debug, Clone, Copy)]
pub struct MergePlan {
    pub level1: u32,
    pub level2: u32,
    pub output_level: u32,
    pub stride1: usize,
    pub stride2: usize,
    pub stride_out: usize,
    pub offset2: ColorOffset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_words() {
        assert_eq!(color_words(0), 0);
        assert_eq!(color_words(1), 1);
        assert_eq!(color_words(64), 1);
        assert_eq!(color_words(65), 2);
        assert_eq!(color_words(128), 2);
        assert_eq!(color_words(129), 3);
    }

    #[test]
    fn test_record_stride() {
        assert_eq!(record_stride(0), 1);
        assert_eq!(record_stride(32), 2);
        assert_eq!(record_stride(64), 2);
        assert_eq!(record_stride(128), 3);
    }

    #[test]
    fn test_color_offset() {
        assert_eq!(ColorOffset::for_level(0), ColorOffset { word: 0, bit: 0 });
        assert_eq!(ColorOffset::for_level(2), ColorOffset { word: 0, bit: 2 });
        assert_eq!(ColorOffset::for_level(64), ColorOffset { word: 1, bit: 0 });
        assert_eq!(ColorOffset::for_level(96), ColorOffset { word: 1, bit: 32 });
    }

    #[test]
    fn test_dispatch_table() {
        assert_eq!(
            MergeStrategy::dispatch(0, 0, true).unwrap(),
            MergeStrategy::SelfWiden
        );
        assert_eq!(
            MergeStrategy::dispatch(0, 0, false).unwrap(),
            MergeStrategy::NoColor
        );
        assert_eq!(
            MergeStrategy::dispatch(1, 1, false).unwrap(),
            MergeStrategy::SingleWord { width: 1 }
        );
        for width in [2, 4, 8, 16, 32] {
            assert_eq!(
                MergeStrategy::dispatch(width, width, false).unwrap(),
                MergeStrategy::SingleWord { width }
            );
        }
        assert_eq!(
            MergeStrategy::dispatch(64, 64, false).unwrap(),
            MergeStrategy::MultiWord { width: 64 }
        );
        assert_eq!(
            MergeStrategy::dispatch(96, 96, false).unwrap(),
            MergeStrategy::MultiWord { width: 96 }
        );
        assert_eq!(
            MergeStrategy::dispatch(0, 2, false).unwrap(),
            MergeStrategy::Asymmetric {
                level1: 0,
                level2: 2
            }
        );
        assert_eq!(
            MergeStrategy::dispatch(2, 4, false).unwrap(),
            MergeStrategy::Asymmetric {
                level1: 2,
                level2: 4
            }
        );
    }

    #[test]
    fn test_dispatch_rejects_unsupported_widths() {
        assert!(MergeStrategy::dispatch(3, 3, false).is_err());
        assert!(MergeStrategy::dispatch(48, 48, false).is_err());
        assert!(MergeStrategy::dispatch(63, 63, false).is_err());
    }

    #[test]
    fn test_output_levels() {
        assert_eq!(MergeStrategy::SelfWiden.output_level(), 1);
        assert_eq!(MergeStrategy::NoColor.output_level(), 0);
        assert_eq!(MergeStrategy::SingleWord { width: 16 }.output_level(), 32);
        assert_eq!(MergeStrategy::MultiWord { width: 64 }.output_level(), 128);
        assert_eq!(
            MergeStrategy::Asymmetric {
                level1: 2,
                level2: 4
            }
            .output_level(),
            6
        );
    }

    #[test]
    fn test_plan_geometry() {
        let plan = MergeStrategy::dispatch(32, 32, false).unwrap().plan();
        assert_eq!((plan.stride1, plan.stride2, plan.stride_out), (2, 2, 2));
        assert_eq!(plan.offset2, ColorOffset { word: 0, bit: 32 });

        let plan = MergeStrategy::dispatch(64, 64, false).unwrap().plan();
        assert_eq!((plan.stride1, plan.stride2, plan.stride_out), (2, 2, 3));
        assert_eq!(plan.offset2, ColorOffset { word: 1, bit: 0 });

        let plan = MergeStrategy::dispatch(96, 96, false).unwrap().plan();
        assert_eq!((plan.stride1, plan.stride2, plan.stride_out), (3, 3, 4));
        assert_eq!(plan.offset2, ColorOffset { word: 1, bit: 32 });

        let plan = MergeStrategy::dispatch(0, 0, false).unwrap().plan();
        assert_eq!((plan.stride1, plan.stride2, plan.stride_out), (1, 1, 1));
    }
}
