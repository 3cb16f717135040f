use serde::{Deserialize, Serialize};

use super::error::CaptureError;

pub const MIN_SAMPLE_RATE: u32 = 1_000;
pub const MAX_SAMPLE_RATE: u32 = 384_000;
pub const MAX_BIT_DEPTH: u16 = 32;
pub const MIN_CHANNEL_COUNT: u16 = 1;
pub const MAX_CHANNEL_COUNT: u16 = 1024;

/// Sample encoding of a capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatTag {
    #[default]
    Pcm,
    IeeeFloat,
}

impl FormatTag {
    /// WAVE format code (`WAVE_FORMAT_PCM` / `WAVE_FORMAT_IEEE_FLOAT`).
    pub fn wave_format_code(self) -> u16 {
        match self {
            Self::Pcm => 0x0001,
            Self::IeeeFloat => 0x0003,
        }
    }
}

impl TryFrom<u16> for FormatTag {
    type Error = CaptureError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            0x0001 => Ok(Self::Pcm),
            0x0003 => Ok(Self::IeeeFloat),
            other => Err(CaptureError::Param(format!("unsupported format tag: {other:#06x}"))),
        }
    }
}

/// Validated PCM stream description.
///
/// Fields are private so the derived values (`block_align`,
/// `avg_bytes_per_sec`) can never disagree with the base values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureFormat {
    tag: FormatTag,
    sample_rate: u32,
    bit_depth: u16,
    channels: u16,
    block_align: u16,
    avg_bytes_per_sec: u32,
}

impl CaptureFormat {
    /// Validate and build a format.
    ///
    /// `FormatTag::IeeeFloat` always uses 32-bit samples; the requested bit
    /// depth is still range-checked but then replaced.
    pub fn new(sample_rate: u32, bit_depth: u16, channels: u16, tag: FormatTag) -> Result<Self, CaptureError> {
        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(CaptureError::Param(format!("unsupported sample rate: {sample_rate}")));
        }
        if bit_depth == 0 || bit_depth > MAX_BIT_DEPTH || bit_depth % 8 != 0 {
            return Err(CaptureError::Param(format!("unsupported bit depth: {bit_depth}")));
        }
        if !(MIN_CHANNEL_COUNT..=MAX_CHANNEL_COUNT).contains(&channels) {
            return Err(CaptureError::Param(format!("unsupported channel count: {channels}")));
        }

        let bit_depth = match tag {
            FormatTag::IeeeFloat => 32,
            FormatTag::Pcm => bit_depth,
        };
        let block_align = channels * (bit_depth / 8);

        Ok(Self {
            tag,
            sample_rate,
            bit_depth,
            channels,
            block_align,
            avg_bytes_per_sec: sample_rate * block_align as u32,
        })
    }

    pub fn tag(&self) -> FormatTag {
        self.tag
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bit_depth(&self) -> u16 {
        self.bit_depth
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Bytes per frame (one sample for every channel).
    pub fn block_align(&self) -> u16 {
        self.block_align
    }

    pub fn avg_bytes_per_sec(&self) -> u32 {
        self.avg_bytes_per_sec
    }

    /// Number of bytes covering `secs` of audio, rounded down to whole frames.
    ///
    /// Negative or NaN durations count as zero; oversized or infinite ones
    /// saturate at `u64::MAX`.
    pub fn bytes_for_duration(&self, secs: f64) -> u64 {
        if !(secs > 0.0) {
            return 0;
        }
        // Float-to-int `as` saturates, so infinity lands on u64::MAX.
        let frames = (self.sample_rate as f64 * secs).floor() as u64;
        frames.saturating_mul(u64::from(self.block_align))
    }
}

/// The process whose audio is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetProcess {
    pub process_id: u32,
    /// `true`: capture only this process tree. `false`: capture everything on
    /// the device except this process tree.
    pub include_tree: bool,
}

impl TargetProcess {
    pub fn new(process_id: u32, include_tree: bool) -> Result<Self, CaptureError> {
        if process_id == 0 {
            return Err(CaptureError::Param("process id must be non-zero".into()));
        }
        Ok(Self {
            process_id,
            include_tree,
        })
    }
}
