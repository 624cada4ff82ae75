//! Typed component parameters.
//!
//! Every parameter structure names the port it applies to and implements
//! [`OmxParam`], so callers can get and set them through
//! [`crate::ComponentExt`] without dealing with raw indexes.

use crate::{CodecBufferType, CodingType, GraphicPixelFormat, OmxColorFormat, PortIndex};

/// I frames allowed.
pub const PICTURE_TYPE_I: u32 = 0x01;
/// P frames allowed.
pub const PICTURE_TYPE_P: u32 = 0x02;
/// B frames allowed.
pub const PICTURE_TYPE_B: u32 = 0x04;

/// Parameter identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamIndex {
    PortDefinition,
    VideoPortFormat,
    UseBufferType,
    BufferHandleUsage,
    OutputCrop,
    VideoBitrate,
    ConstantQuality,
    VideoAvc,
    VideoHevc,
    ColorAspects,
    IntraRefreshVop,
}

impl ParamIndex {
    /// Wire value, as carried in [`crate::CodecEvent::PortSettingsChanged`].
    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::PortDefinition => 0x0200_0001,
            Self::VideoPortFormat => 0x0600_0001,
            Self::VideoBitrate => 0x0600_0004,
            Self::VideoAvc => 0x0600_000F,
            Self::IntraRefreshVop => 0x0600_002A,
            Self::OutputCrop => 0x0700_001D,
            Self::UseBufferType => 0x7F00_0001,
            Self::BufferHandleUsage => 0x7F00_0002,
            Self::ConstantQuality => 0x7F00_0003,
            Self::VideoHevc => 0x7F00_0004,
            Self::ColorAspects => 0x7F00_0005,
        }
    }
}

/// Implemented by every parameter structure.
pub trait OmxParam: Clone + Send {
    const INDEX: ParamIndex;

    fn into_param(self) -> Param;

    fn from_param(param: Param) -> Option<Self>;
}

macro_rules! omx_params {
    ($($variant:ident($ty:ident)),* $(,)?) => {
        /// Any parameter structure, tagged by kind.
        #[derive(Debug, Clone, PartialEq)]
        pub enum Param {
            $($variant($ty),)*
        }

        impl Param {
            #[must_use]
            pub fn index(&self) -> ParamIndex {
                match self {
                    $(Self::$variant(_) => ParamIndex::$variant,)*
                }
            }

            /// Port the parameter applies to.
            #[must_use]
            pub fn port(&self) -> PortIndex {
                match self {
                    $(Self::$variant(p) => p.port,)*
                }
            }
        }

        $(
            impl OmxParam for $ty {
                const INDEX: ParamIndex = ParamIndex::$variant;

                fn into_param(self) -> Param {
                    Param::$variant(self)
                }

                fn from_param(param: Param) -> Option<Self> {
                    match param {
                        Param::$variant(p) => Some(p),
                        _ => None,
                    }
                }
            }
        )*
    };
}

omx_params! {
    PortDefinition(PortDefinition),
    VideoPortFormat(VideoPortFormat),
    UseBufferType(UseBufferType),
    BufferHandleUsage(BufferHandleUsage),
    OutputCrop(OutputCrop),
    VideoBitrate(VideoBitrate),
    ConstantQuality(ConstantQuality),
    VideoAvc(AvcParams),
    VideoHevc(HevcParams),
    ColorAspects(ColorAspectsParam),
    IntraRefreshVop(IntraRefreshVop),
}

/// Video part of a port definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoPortDefinition {
    pub frame_width: u32,
    pub frame_height: u32,
    pub stride: i32,
    pub slice_height: u32,
    pub bitrate: u32,
    /// Frame rate in Q16 fixed point.
    pub x_framerate: u32,
    pub compression_format: CodingType,
    pub color_format: OmxColorFormat,
}

/// Buffer requirements and format of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortDefinition {
    pub port: PortIndex,
    pub enabled: bool,
    pub populated: bool,
    pub buffer_count_actual: u32,
    pub buffer_count_min: u32,
    pub buffer_size: u32,
    pub video: VideoPortDefinition,
}

/// Compression and pixel format of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoPortFormat {
    pub port: PortIndex,
    pub compress_format: CodingType,
    pub color_format: GraphicPixelFormat,
    /// Frame rate in Q16 fixed point.
    pub framerate: u32,
}

impl Default for VideoPortFormat {
    fn default() -> Self {
        Self {
            port: PortIndex::Input,
            compress_format: CodingType::Unused,
            color_format: GraphicPixelFormat::Butt,
            framerate: 0,
        }
    }
}

/// Memory kind the codec will pass on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseBufferType {
    pub port: PortIndex,
    pub buffer_type: CodecBufferType,
}

impl Default for UseBufferType {
    fn default() -> Self {
        Self {
            port: PortIndex::Input,
            buffer_type: CodecBufferType::AvShareMemFd,
        }
    }
}

/// Graphic buffer usage the component requires on a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferHandleUsage {
    pub port: PortIndex,
    pub usage: u64,
}

/// Valid region of the decoded frames (a config, not a parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutputCrop {
    pub port: PortIndex,
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

/// Bitrate control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ControlRate {
    #[default]
    Disable,
    Variable,
    Constant,
}

/// Target bitrate of an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoBitrate {
    pub port: PortIndex,
    pub control_rate: ControlRate,
    pub target_bitrate: u32,
}

/// Constant-quality rate control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConstantQuality {
    pub port: PortIndex,
    pub quality: u32,
}

/// AVC profiles understood by the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AvcProfileType {
    #[default]
    Baseline,
    Main,
    Extended,
    High,
    High10,
    High422,
    High444,
}

/// AVC deblocking filter mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AvcLoopFilter {
    #[default]
    Enable,
    Disable,
    DisableSliceBoundary,
}

/// AVC encoder parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AvcParams {
    pub port: PortIndex,
    pub slice_header_spacing: u32,
    pub p_frames: u32,
    pub b_frames: u32,
    pub use_hadamard: bool,
    pub ref_frames: u32,
    pub ref_idx10_active_minus1: u32,
    pub ref_idx11_active_minus1: u32,
    pub enable_uep: bool,
    pub enable_fmo: bool,
    pub enable_aso: bool,
    pub enable_rs: bool,
    pub profile: AvcProfileType,
    pub level: u32,
    /// `PICTURE_TYPE_*` bits.
    pub allowed_picture_types: u32,
    pub frame_mbs_only: bool,
    pub mbaff: bool,
    pub entropy_coding_cabac: bool,
    pub weighted_p_prediction: bool,
    pub const_ipred: bool,
    pub direct_8x8_inference: bool,
    pub direct_spatial_temporal: bool,
    pub cabac_init_idc: u32,
    pub loop_filter: AvcLoopFilter,
}

/// HEVC profiles understood by the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HevcProfileType {
    #[default]
    Main,
    Main10,
    MainStill,
    Main10Hdr10,
}

/// HEVC encoder parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HevcParams {
    pub port: PortIndex,
    pub profile: HevcProfileType,
    pub level: u32,
    pub key_frame_interval: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorRange {
    #[default]
    Unspecified,
    Full,
    Limited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorPrimaries {
    #[default]
    Unspecified,
    Bt709,
    Bt470M,
    Bt601_625,
    Bt601_525,
    GenericFilm,
    Bt2020,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorTransfer {
    #[default]
    Unspecified,
    Linear,
    Smpte170,
    Gamma22,
    Gamma28,
    Pq,
    Hlg,
    Smpte240,
    Xvycc,
    Bt1361,
    St428,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ColorMatrix {
    #[default]
    Unspecified,
    Bt709,
    Fcc,
    Bt601,
    Smpte240,
    Bt2020,
    Bt2020Constant,
    Max,
}

/// Color description of the encoded stream (a config).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorAspectsParam {
    pub port: PortIndex,
    pub range: ColorRange,
    pub primaries: ColorPrimaries,
    pub transfer: ColorTransfer,
    pub matrix: ColorMatrix,
}

/// Request an intra refresh on the next frame (a config).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntraRefreshVop {
    pub port: PortIndex,
    pub refresh: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_roundtrip_keeps_kind() {
        let def = PortDefinition {
            port: PortIndex::Output,
            buffer_count_actual: 4,
            ..Default::default()
        };
        let param = def.into_param();
        assert_eq!(param.index(), ParamIndex::PortDefinition);
        assert_eq!(param.port(), PortIndex::Output);
        assert_eq!(PortDefinition::from_param(param.clone()), Some(def));
        assert_eq!(AvcParams::from_param(param), None);
    }

    #[test]
    fn test_param_index_raw_distinct() {
        let all = [
            ParamIndex::PortDefinition,
            ParamIndex::VideoPortFormat,
            ParamIndex::UseBufferType,
            ParamIndex::BufferHandleUsage,
            ParamIndex::OutputCrop,
            ParamIndex::VideoBitrate,
            ParamIndex::ConstantQuality,
            ParamIndex::VideoAvc,
            ParamIndex::VideoHevc,
            ParamIndex::ColorAspects,
            ParamIndex::IntraRefreshVop,
        ];
        let mut raws: Vec<u32> = all.iter().map(|i| i.raw()).collect();
        raws.sort_unstable();
        raws.dedup();
        assert_eq!(raws.len(), all.len());
    }
}
