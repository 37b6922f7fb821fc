//! Texture format value type.
//!
//! Formats are small immutable values copied freely between tables, layouts
//! and required-element registrations. All derivation helpers clamp the
//! resulting dimensions to a minimum of 1 so format algebra can never produce
//! a zero-sized target.

use serde::{Deserialize, Serialize};

use crate::error::{CompileError, SourcePos};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelLayout {
    R,
    Rg,
    Rgb,
    Rgba,
}

impl ChannelLayout {
    pub fn channel_count(self) -> u32 {
        match self {
            ChannelLayout::R => 1,
            ChannelLayout::Rg => 2,
            ChannelLayout::Rgb => 3,
            ChannelLayout::Rgba => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleDepth {
    UnsignedByte,
    HalfFloat,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WrapMode {
    Clamp,
    Repeat,
    Mirror,
}

/// GPU texture format: dimensions, channel layout, sample depth and the
/// sampling parameters a render target created from it will use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureFormat {
    pub width: u32,
    pub height: u32,
    pub channels: ChannelLayout,
    pub depth: SampleDepth,
    pub filter: FilterMode,
    pub wrap: WrapMode,
    pub mip_levels: u32,
}

fn clamp_min_1(v: u32) -> u32 {
    v.max(1)
}

impl TextureFormat {
    pub fn new(width: u32, height: u32, channels: ChannelLayout, depth: SampleDepth) -> Self {
        Self {
            width: clamp_min_1(width),
            height: clamp_min_1(height),
            channels,
            depth,
            filter: FilterMode::Linear,
            wrap: WrapMode::Clamp,
            mip_levels: 1,
        }
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Pixel count times channel count.
    pub fn element_count(&self) -> u64 {
        self.pixel_count() * u64::from(self.channels.channel_count())
    }

    /// Two formats are compatible when a texture of one can feed a pipeline
    /// input declared with the other: identical storage, sampling aside.
    pub fn compatible_with(&self, other: &TextureFormat) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.channels == other.channels
            && self.depth == other.depth
    }

    pub fn resized(&self, width: u32, height: u32) -> Self {
        Self {
            width: clamp_min_1(width),
            height: clamp_min_1(height),
            ..*self
        }
    }

    pub fn scaled_by(&self, fx: f64, fy: f64) -> Self {
        let width = (f64::from(self.width) * fx).floor() as u32;
        let height = (f64::from(self.height) * fy).floor() as u32;
        self.resized(width, height)
    }

    /// Adopt another format's dimensions, keeping everything else.
    pub fn scaled_to(&self, reference: &TextureFormat) -> Self {
        self.resized(reference.width, reference.height)
    }

    pub fn with_channels(&self, channels: ChannelLayout) -> Self {
        Self { channels, ..*self }
    }

    pub fn with_depth(&self, depth: SampleDepth) -> Self {
        Self { depth, ..*self }
    }

    pub fn with_filtering(&self, filter: FilterMode, wrap: WrapMode) -> Self {
        Self {
            filter,
            wrap,
            ..*self
        }
    }

    pub fn with_mip_levels(&self, mip_levels: u32) -> Self {
        Self {
            mip_levels: clamp_min_1(mip_levels),
            ..*self
        }
    }

    /// Short human-readable form used in diagnostics.
    pub fn describe(&self) -> String {
        format!(
            "{}x{} {:?}/{:?}",
            self.width, self.height, self.channels, self.depth
        )
    }
}

// Script-facing enumeration spellings. Kept next to the types so the script
// compiler and the format modules agree on one vocabulary.

pub(crate) fn parse_channels(value: &str, at: &SourcePos) -> Result<ChannelLayout, CompileError> {
    match value {
        "R" => Ok(ChannelLayout::R),
        "RG" => Ok(ChannelLayout::Rg),
        "RGB" => Ok(ChannelLayout::Rgb),
        "RGBA" => Ok(ChannelLayout::Rgba),
        other => Err(CompileError::InvalidValue {
            what: "channel layout",
            value: other.to_string(),
            at: at.clone(),
        }),
    }
}

pub(crate) fn parse_depth(value: &str, at: &SourcePos) -> Result<SampleDepth, CompileError> {
    match value {
        "UNSIGNED_BYTE" => Ok(SampleDepth::UnsignedByte),
        "HALF_FLOAT" => Ok(SampleDepth::HalfFloat),
        "FLOAT" => Ok(SampleDepth::Float),
        other => Err(CompileError::InvalidValue {
            what: "sample depth",
            value: other.to_string(),
            at: at.clone(),
        }),
    }
}

pub(crate) fn parse_filter(value: &str, at: &SourcePos) -> Result<FilterMode, CompileError> {
    match value {
        "NEAREST" => Ok(FilterMode::Nearest),
        "LINEAR" => Ok(FilterMode::Linear),
        other => Err(CompileError::InvalidValue {
            what: "filter mode",
            value: other.to_string(),
            at: at.clone(),
        }),
    }
}

pub(crate) fn parse_wrap(value: &str, at: &SourcePos) -> Result<WrapMode, CompileError> {
    match value {
        "CLAMP" => Ok(WrapMode::Clamp),
        "REPEAT" => Ok(WrapMode::Repeat),
        "MIRROR" => Ok(WrapMode::Mirror),
        other => Err(CompileError::InvalidValue {
            what: "wrap mode",
            value: other.to_string(),
            at: at.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_clamp_to_one() {
        let fmt = TextureFormat::new(16, 16, ChannelLayout::Rgba, SampleDepth::UnsignedByte);
        let shrunk = fmt.scaled_by(0.001, 0.001);
        assert_eq!((shrunk.width, shrunk.height), (1, 1));
        assert_eq!(fmt.resized(0, 5).width, 1);
        assert_eq!(fmt.with_mip_levels(0).mip_levels, 1);
    }

    #[test]
    fn counts() {
        let fmt = TextureFormat::new(8, 4, ChannelLayout::Rgb, SampleDepth::Float);
        assert_eq!(fmt.pixel_count(), 32);
        assert_eq!(fmt.element_count(), 96);
    }

    #[test]
    fn compatibility_ignores_sampling() {
        let a = TextureFormat::new(8, 8, ChannelLayout::Rgba, SampleDepth::UnsignedByte);
        let b = a.with_filtering(FilterMode::Nearest, WrapMode::Repeat);
        assert!(a.compatible_with(&b));
        assert!(!a.compatible_with(&a.with_channels(ChannelLayout::R)));
    }
}
