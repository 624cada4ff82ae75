//! Conversions between client types and driver types.

use hcodec_hdi::{
    AvcProfileType, CodecRole, CodingType, ColorMatrix, ColorPrimaries, ColorTransfer,
    GraphicPixelFormat, HdiProfile, HevcProfileType, OmxColorFormat, TransformType,
};

use crate::types::{
    AvcProfile, ColorPrimary, HevcProfile, MatrixCoefficient, PixelFormat, TransferCharacteristic,
};

/// Coding type of a component role. Only AVC and HEVC are handled.
#[must_use]
pub fn role_to_coding_type(role: CodecRole) -> Option<CodingType> {
    match role {
        CodecRole::VideoAvc => Some(CodingType::Avc),
        CodecRole::VideoHevc => Some(CodingType::Hevc),
        other => {
            tracing::warn!("unknown codec role {:?}", other);
            None
        }
    }
}

/// Mime type of a component role.
#[must_use]
pub fn role_to_mime(role: CodecRole) -> Option<&'static str> {
    match role {
        CodecRole::VideoAvc => Some("video/avc"),
        CodecRole::VideoHevc => Some("video/hevc"),
        _ => None,
    }
}

#[must_use]
pub fn pixel_to_graphic(format: PixelFormat) -> GraphicPixelFormat {
    match format {
        PixelFormat::Yuvi420 => GraphicPixelFormat::Ycbcr420P,
        PixelFormat::Nv12 => GraphicPixelFormat::Ycbcr420Sp,
        PixelFormat::Nv21 => GraphicPixelFormat::Ycrcb420Sp,
        PixelFormat::Rgba => GraphicPixelFormat::Rgba8888,
    }
}

#[must_use]
pub fn graphic_to_pixel(format: GraphicPixelFormat) -> Option<PixelFormat> {
    match format {
        GraphicPixelFormat::Ycbcr420P => Some(PixelFormat::Yuvi420),
        GraphicPixelFormat::Ycbcr420Sp => Some(PixelFormat::Nv12),
        GraphicPixelFormat::Ycrcb420Sp => Some(PixelFormat::Nv21),
        GraphicPixelFormat::Rgba8888 => Some(PixelFormat::Rgba),
        GraphicPixelFormat::Butt => None,
    }
}

/// Display and client pixel format of a component color format.
#[must_use]
pub fn omx_to_formats(format: OmxColorFormat) -> Option<(GraphicPixelFormat, PixelFormat)> {
    match format {
        OmxColorFormat::YUV420_PLANAR => Some((GraphicPixelFormat::Ycbcr420P, PixelFormat::Yuvi420)),
        OmxColorFormat::YUV420_SEMI_PLANAR => {
            Some((GraphicPixelFormat::Ycbcr420Sp, PixelFormat::Nv12))
        }
        other => {
            tracing::warn!("unknown omx color format {}", other.0);
            None
        }
    }
}

/// Surface transform for a rotation angle in degrees.
#[must_use]
pub fn rotation_to_transform(angle: i32) -> Option<TransformType> {
    match angle {
        0 => Some(TransformType::RotateNone),
        90 => Some(TransformType::Rotate90),
        180 => Some(TransformType::Rotate180),
        270 => Some(TransformType::Rotate270),
        _ => {
            tracing::warn!("unknown rotation {}", angle);
            None
        }
    }
}

#[must_use]
pub fn primary_to_hdi(primary: ColorPrimary) -> ColorPrimaries {
    match primary {
        ColorPrimary::Bt709 => ColorPrimaries::Bt709,
        ColorPrimary::Unspecified => ColorPrimaries::Unspecified,
        ColorPrimary::Bt470M => ColorPrimaries::Bt470M,
        ColorPrimary::Bt601_625 => ColorPrimaries::Bt601_625,
        ColorPrimary::Bt601_525 | ColorPrimary::Smpte240 => ColorPrimaries::Bt601_525,
        ColorPrimary::GenericFilm => ColorPrimaries::GenericFilm,
        ColorPrimary::Bt2020 => ColorPrimaries::Bt2020,
        ColorPrimary::Smpte428 | ColorPrimary::P3Dci | ColorPrimary::P3D65 => ColorPrimaries::Max,
    }
}

#[must_use]
pub fn transfer_to_hdi(transfer: TransferCharacteristic) -> ColorTransfer {
    use TransferCharacteristic as T;
    match transfer {
        T::Bt709 | T::Bt601 | T::Bt2020_10Bit | T::Bt2020_12Bit => ColorTransfer::Smpte170,
        T::Unspecified => ColorTransfer::Unspecified,
        T::Gamma22 => ColorTransfer::Gamma22,
        T::Gamma28 => ColorTransfer::Gamma28,
        T::Smpte240 => ColorTransfer::Smpte240,
        T::Linear => ColorTransfer::Linear,
        T::Log | T::LogSqrt | T::Iec61966_2_1 => ColorTransfer::Max,
        T::Iec61966_2_4 => ColorTransfer::Xvycc,
        T::Bt1361 => ColorTransfer::Bt1361,
        T::Pq => ColorTransfer::Pq,
        T::Smpte428 => ColorTransfer::St428,
        T::Hlg => ColorTransfer::Hlg,
    }
}

#[must_use]
pub fn matrix_to_hdi(matrix: MatrixCoefficient) -> ColorMatrix {
    use MatrixCoefficient as M;
    match matrix {
        M::Identity | M::Ycgco | M::Smpte2085 | M::Ictcp => ColorMatrix::Max,
        M::Bt709 => ColorMatrix::Bt709,
        M::Unspecified => ColorMatrix::Unspecified,
        M::Fcc => ColorMatrix::Fcc,
        M::Bt601_625 | M::Bt601_525 => ColorMatrix::Bt601,
        M::Smpte240 => ColorMatrix::Smpte240,
        M::Bt2020Ncl | M::ChromaticityNcl => ColorMatrix::Bt2020,
        M::Bt2020Cl | M::ChromaticityCl => ColorMatrix::Bt2020Constant,
    }
}

/// Raw color primaries value to the driver's, unknown values unspecified.
#[must_use]
pub fn raw_primary_to_hdi(raw: i32) -> ColorPrimaries {
    ColorPrimary::from_raw(raw).map_or_else(
        || {
            tracing::warn!("unknown color primary {}, use unspecified instead", raw);
            ColorPrimaries::Unspecified
        },
        primary_to_hdi,
    )
}

#[must_use]
pub fn raw_transfer_to_hdi(raw: i32) -> ColorTransfer {
    TransferCharacteristic::from_raw(raw).map_or_else(
        || {
            tracing::warn!("unknown transfer {}, use unspecified instead", raw);
            ColorTransfer::Unspecified
        },
        transfer_to_hdi,
    )
}

#[must_use]
pub fn raw_matrix_to_hdi(raw: i32) -> ColorMatrix {
    MatrixCoefficient::from_raw(raw).map_or_else(
        || {
            tracing::warn!("unknown matrix {}, use unspecified instead", raw);
            ColorMatrix::Unspecified
        },
        matrix_to_hdi,
    )
}

#[must_use]
pub fn avc_profile_to_hdi(profile: AvcProfile) -> Option<AvcProfileType> {
    match profile {
        AvcProfile::Baseline => Some(AvcProfileType::Baseline),
        AvcProfile::Extended => Some(AvcProfileType::Extended),
        AvcProfile::High => Some(AvcProfileType::High),
        AvcProfile::High10 => Some(AvcProfileType::High10),
        AvcProfile::High422 => Some(AvcProfileType::High422),
        AvcProfile::High444 => Some(AvcProfileType::High444),
        AvcProfile::Main => Some(AvcProfileType::Main),
        AvcProfile::ConstrainedBaseline | AvcProfile::ConstrainedHigh => {
            tracing::warn!("unknown avc profile {:?}", profile);
            None
        }
    }
}

#[must_use]
pub fn hevc_profile_to_hdi(profile: HevcProfile) -> Option<HevcProfileType> {
    match profile {
        HevcProfile::Main => Some(HevcProfileType::Main),
        HevcProfile::Main10 => Some(HevcProfileType::Main10),
        HevcProfile::MainStill => Some(HevcProfileType::MainStill),
        HevcProfile::Main10Hdr10 => Some(HevcProfileType::Main10Hdr10),
        HevcProfile::Main10Hdr10Plus => {
            tracing::warn!("unknown hevc profile {:?}", profile);
            None
        }
    }
}

/// Client AVC profile of a capability profile.
#[must_use]
pub fn hdi_to_avc_profile(profile: HdiProfile) -> Option<AvcProfile> {
    match profile {
        HdiProfile::AvcBaseline => Some(AvcProfile::Baseline),
        HdiProfile::AvcHigh => Some(AvcProfile::High),
        HdiProfile::AvcMain => Some(AvcProfile::Main),
        _ => None,
    }
}

/// Client HEVC profile of a capability profile.
#[must_use]
pub fn hdi_to_hevc_profile(profile: HdiProfile) -> Option<HevcProfile> {
    match profile {
        HdiProfile::HevcMain => Some(HevcProfile::Main),
        HdiProfile::HevcMain10 => Some(HevcProfile::Main10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_graphic_roundtrip() {
        for fmt in [
            PixelFormat::Yuvi420,
            PixelFormat::Nv12,
            PixelFormat::Nv21,
            PixelFormat::Rgba,
        ] {
            assert_eq!(graphic_to_pixel(pixel_to_graphic(fmt)), Some(fmt));
        }
        assert_eq!(graphic_to_pixel(GraphicPixelFormat::Butt), None);
    }

    #[test]
    fn test_omx_color_table() {
        assert_eq!(
            omx_to_formats(OmxColorFormat::YUV420_SEMI_PLANAR),
            Some((GraphicPixelFormat::Ycbcr420Sp, PixelFormat::Nv12))
        );
        assert_eq!(omx_to_formats(OmxColorFormat(1234)), None);
    }

    #[test]
    fn test_rotation() {
        assert_eq!(rotation_to_transform(90), Some(TransformType::Rotate90));
        assert_eq!(rotation_to_transform(45), None);
    }

    #[test]
    fn test_unknown_color_values_are_unspecified() {
        assert_eq!(raw_primary_to_hdi(99), ColorPrimaries::Unspecified);
        assert_eq!(raw_transfer_to_hdi(3), ColorTransfer::Unspecified);
        assert_eq!(raw_matrix_to_hdi(-1), ColorMatrix::Unspecified);
        assert_eq!(raw_primary_to_hdi(ColorPrimary::Smpte240.raw()), ColorPrimaries::Bt601_525);
        assert_eq!(raw_transfer_to_hdi(TransferCharacteristic::Bt709.raw()), ColorTransfer::Smpte170);
    }

    #[test]
    fn test_profiles() {
        assert_eq!(avc_profile_to_hdi(AvcProfile::Main), Some(AvcProfileType::Main));
        assert_eq!(avc_profile_to_hdi(AvcProfile::ConstrainedHigh), None);
        assert_eq!(hevc_profile_to_hdi(HevcProfile::Main10Hdr10Plus), None);
        assert_eq!(hdi_to_avc_profile(HdiProfile::HevcMain), None);
        assert_eq!(hdi_to_hevc_profile(HdiProfile::HevcMain10), Some(HevcProfile::Main10));
    }

    #[test]
    fn test_roles() {
        assert_eq!(role_to_coding_type(CodecRole::VideoHevc), Some(CodingType::Hevc));
        assert_eq!(role_to_coding_type(CodecRole::AudioAac), None);
        assert_eq!(role_to_mime(CodecRole::VideoAvc), Some("video/avc"));
    }
}
