//! Client-facing enumerations and buffer metadata.
//!
//! Enumerations travel through [`crate::Format`] as plain integers; each
//! type offers `raw()` and `from_raw()` for the conversion.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

macro_rules! raw_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = $raw:expr,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)*
        }

        impl $name {
            /// Integer value used in formats.
            #[must_use]
            pub const fn raw(self) -> i32 {
                match self {
                    $(Self::$variant => $raw,)*
                }
            }

            /// Parse an integer format value.
            #[must_use]
            pub const fn from_raw(raw: i32) -> Option<Self> {
                match raw {
                    $($raw => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

raw_enum! {
    /// Raw pixel layout of frames exchanged with the client.
    pub enum PixelFormat {
        Yuvi420 = 1,
        Nv12 = 2,
        Nv21 = 3,
        Rgba = 5,
    }
}

raw_enum! {
    /// Encoder rate control.
    pub enum BitrateMode {
        /// Constant bitrate.
        Cbr = 0,
        /// Variable bitrate.
        Vbr = 1,
        /// Constant quality.
        Cq = 2,
    }
}

raw_enum! {
    pub enum AvcProfile {
        Baseline = 0,
        ConstrainedBaseline = 1,
        ConstrainedHigh = 2,
        Extended = 3,
        High = 4,
        High10 = 5,
        High422 = 6,
        High444 = 7,
        Main = 8,
    }
}

raw_enum! {
    pub enum HevcProfile {
        Main = 0,
        Main10 = 1,
        MainStill = 2,
        Main10Hdr10 = 3,
        Main10Hdr10Plus = 4,
    }
}

raw_enum! {
    pub enum ColorPrimary {
        Bt709 = 1,
        Unspecified = 2,
        Bt470M = 4,
        Bt601_625 = 5,
        Bt601_525 = 6,
        Smpte240 = 7,
        GenericFilm = 8,
        Bt2020 = 9,
        Smpte428 = 10,
        P3Dci = 11,
        P3D65 = 12,
    }
}

raw_enum! {
    pub enum TransferCharacteristic {
        Bt709 = 1,
        Unspecified = 2,
        Gamma22 = 4,
        Gamma28 = 5,
        Bt601 = 6,
        Smpte240 = 7,
        Linear = 8,
        Log = 9,
        LogSqrt = 10,
        Iec61966_2_4 = 11,
        Bt1361 = 12,
        Iec61966_2_1 = 13,
        Bt2020_10Bit = 14,
        Bt2020_12Bit = 15,
        Pq = 16,
        Smpte428 = 17,
        Hlg = 18,
    }
}

raw_enum! {
    pub enum MatrixCoefficient {
        Identity = 0,
        Bt709 = 1,
        Unspecified = 2,
        Fcc = 4,
        Bt601_625 = 5,
        Bt601_525 = 6,
        Smpte240 = 7,
        Ycgco = 8,
        Bt2020Ncl = 9,
        Bt2020Cl = 10,
        Smpte2085 = 11,
        ChromaticityNcl = 12,
        ChromaticityCl = 13,
        Ictcp = 14,
    }
}

/// Flags attached to a client buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferFlag(pub u32);

impl BufferFlag {
    pub const NONE: Self = Self(0);
    /// Last buffer of the stream.
    pub const EOS: Self = Self(1 << 0);
    /// Key frame.
    pub const SYNC_FRAME: Self = Self(1 << 1);
    pub const PARTIAL_FRAME: Self = Self(1 << 2);
    /// Codec specific data (SPS/PPS).
    pub const CODEC_DATA: Self = Self(1 << 3);

    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for BufferFlag {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for BufferFlag {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for BufferFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Payload description of a queued or produced buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodecBufferInfo {
    pub presentation_time_us: i64,
    /// Payload length in bytes.
    pub size: i32,
    /// Payload start within the buffer.
    pub offset: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_roundtrip() {
        assert_eq!(PixelFormat::from_raw(PixelFormat::Nv12.raw()), Some(PixelFormat::Nv12));
        assert_eq!(PixelFormat::from_raw(4), None);
        assert_eq!(AvcProfile::from_raw(8), Some(AvcProfile::Main));
        assert_eq!(BitrateMode::from_raw(2), Some(BitrateMode::Cq));
        assert_eq!(MatrixCoefficient::from_raw(3), None);
    }

    #[test]
    fn test_buffer_flag_ops() {
        let mut flag = BufferFlag::SYNC_FRAME;
        assert!(!flag.contains(BufferFlag::EOS));
        flag |= BufferFlag::EOS;
        assert!(flag.contains(BufferFlag::EOS));
        assert!(flag.contains(BufferFlag::NONE));
        assert_eq!((BufferFlag::EOS | BufferFlag::CODEC_DATA).0, 9);
        assert_eq!(BufferFlag::CODEC_DATA.to_string(), "0x8");
    }
}
