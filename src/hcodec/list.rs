//! Capabilities of the hardware video components.

use std::collections::BTreeMap;

use hcodec_hdi::{
    BitRateMode, CodecCompCapability, CodecRole, CodecType, ComponentManager, GraphicPixelFormat,
    HdiProfile, RangeValue,
};

use crate::convert::{graphic_to_pixel, hdi_to_avc_profile, hdi_to_hevc_profile, role_to_mime};
use crate::types::{BitrateMode, PixelFormat};
use crate::{CodecError, CodecResult};

/// Number of AVC levels, from level 1 to level 5.1.
const AVC_LEVEL_COUNT: i32 = 16;
/// Number of HEVC levels, from level 1 to level 6.2.
const HEVC_LEVEL_COUNT: i32 = 13;

/// Inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Range {
    pub min: i32,
    pub max: i32,
}

impl From<RangeValue> for Range {
    fn from(value: RangeValue) -> Self {
        Self {
            min: value.min,
            max: value.max,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    VideoDecoder,
    VideoEncoder,
}

/// What one hardware component can do, in client terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityData {
    pub codec_name: String,
    pub kind: CodecKind,
    /// `video/avc` or `video/hevc`.
    pub mime_type: &'static str,
    pub is_vendor: bool,
    pub is_software: bool,
    /// Width and height alignment.
    pub alignment: (i32, i32),
    pub width: Range,
    pub height: Range,
    pub bitrate: Range,
    pub frame_rate: Range,
    pub block_per_frame: Range,
    pub block_per_second: Range,
    /// Block width and height.
    pub block_size: (i32, i32),
    pub pixel_formats: Vec<PixelFormat>,
    pub bitrate_modes: Vec<BitrateMode>,
    /// Measured frame rate range per `(width, height)`.
    pub measured_frame_rate: BTreeMap<(i32, i32), Range>,
    /// Supported levels per raw profile value.
    pub profile_levels: BTreeMap<i32, Vec<i32>>,
    pub max_instances: u32,
    pub support_swap_width_height: bool,
}

/// Entry point for querying hardware codec capabilities.
pub struct HCodecList;

impl HCodecList {
    /// Capabilities of every AVC and HEVC component of `manager`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Unknown`] if the driver cannot list its
    /// components.
    pub fn capabilities(manager: &dyn ComponentManager) -> CodecResult<Vec<CapabilityData>> {
        let caps = manager.component_capability_list().map_err(|e| {
            tracing::error!("failed to query component capability list: {}", e);
            CodecError::Unknown
        })?;
        Ok(caps.iter().filter_map(to_user_capability).collect())
    }

    /// Capability record of component `name`, if the driver has it.
    pub(crate) fn find(
        manager: &dyn ComponentManager,
        name: &str,
    ) -> CodecResult<Option<CodecCompCapability>> {
        let caps = manager.component_capability_list().map_err(|e| {
            tracing::error!("failed to query component capability list: {}", e);
            CodecError::Unknown
        })?;
        Ok(caps.into_iter().find(|cap| cap.comp_name == name))
    }
}

fn to_user_capability(cap: &CodecCompCapability) -> Option<CapabilityData> {
    let mime_type = role_to_mime(cap.role)?;
    let kind = match cap.codec_type {
        CodecType::VideoDecoder => CodecKind::VideoDecoder,
        CodecType::VideoEncoder => CodecKind::VideoEncoder,
        other => {
            tracing::warn!("unsupported codec type {:?} of {}", other, cap.comp_name);
            return None;
        }
    };
    let port = &cap.port;
    Some(CapabilityData {
        codec_name: cap.comp_name.clone(),
        kind,
        mime_type,
        is_vendor: true,
        is_software: cap.is_software,
        alignment: (port.width_alignment, port.height_alignment),
        width: Range {
            min: port.min_size.width,
            max: port.max_size.width,
        },
        height: Range {
            min: port.min_size.height,
            max: port.max_size.height,
        },
        bitrate: cap.bit_rate.into(),
        frame_rate: port.frame_rate.into(),
        block_per_frame: port.block_count.into(),
        block_per_second: port.blocks_per_second.into(),
        block_size: (port.block_size.width, port.block_size.height),
        pixel_formats: pixel_formats(&port.supported_pix_fmts),
        bitrate_modes: bitrate_modes(&port.bit_rate_modes),
        measured_frame_rate: measured_frame_rate(&port.measured_frame_rate),
        profile_levels: profile_levels(cap.role, &cap.supported_profiles),
        max_instances: cap.max_inst,
        support_swap_width_height: cap.can_swap_width_height,
    })
}

fn pixel_formats(raw: &[i32]) -> Vec<PixelFormat> {
    raw.iter()
        .filter(|fmt| **fmt > 0)
        .filter_map(|fmt| {
            let pixel = GraphicPixelFormat::from_raw(*fmt).and_then(graphic_to_pixel);
            if pixel.is_none() {
                tracing::warn!("unsupported pixel format {}", fmt);
            }
            pixel
        })
        .collect()
}

fn bitrate_modes(modes: &[BitRateMode]) -> Vec<BitrateMode> {
    modes
        .iter()
        .filter_map(|mode| match mode {
            BitRateMode::Vbr => Some(BitrateMode::Vbr),
            BitRateMode::Cbr => Some(BitrateMode::Cbr),
            BitRateMode::Cq => Some(BitrateMode::Cq),
            BitRateMode::Invalid => None,
        })
        .collect()
}

/// Decode the flattened `(width, height, min, max)` quadruples.
fn measured_frame_rate(flat: &[i32]) -> BTreeMap<(i32, i32), Range> {
    flat.chunks_exact(4)
        .filter(|q| q[0] > 0)
        .map(|q| ((q[0], q[1]), Range { min: q[2], max: q[3] }))
        .collect()
}

fn profile_levels(role: CodecRole, profiles: &[HdiProfile]) -> BTreeMap<i32, Vec<i32>> {
    let mut map = BTreeMap::new();
    for profile in profiles {
        let (user, level_count) = match role {
            CodecRole::VideoAvc => (hdi_to_avc_profile(*profile).map(|p| p.raw()), AVC_LEVEL_COUNT),
            CodecRole::VideoHevc => (
                hdi_to_hevc_profile(*profile).map(|p| p.raw()),
                HEVC_LEVEL_COUNT,
            ),
            _ => (None, 0),
        };
        let Some(user) = user else {
            tracing::warn!("unsupported hdi profile {:?}", profile);
            continue;
        };
        map.entry(user).or_insert_with(|| (0..level_count).collect());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AvcProfile, HevcProfile};

    #[test]
    fn test_measured_frame_rate() {
        let map = measured_frame_rate(&[1920, 1080, 30, 60, 0, 0, 1, 1, 640, 480]);
        assert_eq!(map.len(), 1);
        assert_eq!(map[&(1920, 1080)], Range { min: 30, max: 60 });
    }

    #[test]
    fn test_pixel_formats_skip_unknown() {
        let formats = pixel_formats(&[
            GraphicPixelFormat::Ycbcr420Sp.raw(),
            0,
            GraphicPixelFormat::Butt.raw(),
            GraphicPixelFormat::Rgba8888.raw(),
        ]);
        assert_eq!(formats, vec![PixelFormat::Nv12, PixelFormat::Rgba]);
    }

    #[test]
    fn test_profile_levels() {
        let avc = profile_levels(
            CodecRole::VideoAvc,
            &[HdiProfile::AvcBaseline, HdiProfile::AvcHigh, HdiProfile::HevcMain],
        );
        assert_eq!(avc.len(), 2);
        assert_eq!(avc[&AvcProfile::High.raw()].len(), AVC_LEVEL_COUNT as usize);

        let hevc = profile_levels(CodecRole::VideoHevc, &[HdiProfile::HevcMain10]);
        assert_eq!(hevc[&HevcProfile::Main10.raw()].len(), HEVC_LEVEL_COUNT as usize);
    }

    #[test]
    fn test_bitrate_modes_drop_invalid() {
        assert_eq!(
            bitrate_modes(&[BitRateMode::Invalid, BitRateMode::Cq, BitRateMode::Cbr]),
            vec![BitrateMode::Cq, BitrateMode::Cbr]
        );
    }
}
