//! String-keyed, typed property bag used for configuration and negotiated
//! formats.

use std::collections::BTreeMap;
use std::fmt;

/// Well-known format keys.
pub mod keys {
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const PIXEL_FORMAT: &str = "pixel_format";
    pub const FRAME_RATE: &str = "frame_rate";
    pub const BITRATE: &str = "bitrate";
    pub const VIDEO_ENCODE_BITRATE_MODE: &str = "video_encode_bitrate_mode";
    /// Key frame interval in milliseconds. Negative means a single key frame.
    pub const I_FRAME_INTERVAL: &str = "i_frame_interval";
    pub const PROFILE: &str = "codec_profile";
    pub const QUALITY: &str = "quality";
    pub const RANGE_FLAG: &str = "range_flag";
    pub const COLOR_PRIMARIES: &str = "color_primaries";
    pub const TRANSFER_CHARACTERISTICS: &str = "transfer_characteristics";
    pub const MATRIX_COEFFICIENTS: &str = "matrix_coefficients";
    pub const ROTATION_ANGLE: &str = "rotation_angle";
    pub const MAX_INPUT_SIZE: &str = "max_input_size";
    /// Non-zero requests an IDR frame (encoder `set_parameters`).
    pub const REQUEST_I_FRAME: &str = "req_i_frame";
    pub const CODEC_NAME: &str = "codec_name";
    pub const STRIDE: &str = "stride";
    pub const MAX_B_FRAMES: &str = "max-bframes";
    /// Graphic pixel format the decoder renders with.
    pub const DISPLAY_PIXEL_FORMAT: &str = "displayPixelFormat";
}

/// A single typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatValue {
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
}

impl fmt::Display for FormatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Long(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => f.write_str(v),
        }
    }
}

/// Ordered map of format properties.
///
/// Getters return `None` when the key is absent or holds an incompatible
/// type. Integer values widen to `i64` and `f64` on read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Format {
    values: BTreeMap<String, FormatValue>,
}

impl Format {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_int(&mut self, key: &str, value: i32) {
        self.values.insert(key.to_string(), FormatValue::Int(value));
    }

    pub fn set_long(&mut self, key: &str, value: i64) {
        self.values.insert(key.to_string(), FormatValue::Long(value));
    }

    pub fn set_double(&mut self, key: &str, value: f64) {
        self.values.insert(key.to_string(), FormatValue::Double(value));
    }

    pub fn set_string(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .insert(key.to_string(), FormatValue::String(value.into()));
    }

    /// Builder-style [`Format::set_int`].
    #[must_use]
    pub fn with_int(mut self, key: &str, value: i32) -> Self {
        self.set_int(key, value);
        self
    }

    #[must_use]
    pub fn with_long(mut self, key: &str, value: i64) -> Self {
        self.set_long(key, value);
        self
    }

    #[must_use]
    pub fn with_double(mut self, key: &str, value: f64) -> Self {
        self.set_double(key, value);
        self
    }

    #[must_use]
    pub fn with_string(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_string(key, value);
        self
    }

    #[must_use]
    pub fn get_int(&self, key: &str) -> Option<i32> {
        match self.values.get(key)? {
            FormatValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_long(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            FormatValue::Int(v) => Some(i64::from(*v)),
            FormatValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_double(&self, key: &str) -> Option<f64> {
        match self.values.get(key)? {
            FormatValue::Int(v) => Some(f64::from(*v)),
            FormatValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            FormatValue::String(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FormatValue> {
        self.values.get(key)
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<FormatValue> {
        self.values.remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormatValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let fmt = Format::new()
            .with_int(keys::WIDTH, 1024)
            .with_double(keys::FRAME_RATE, 29.97)
            .with_string(keys::CODEC_NAME, "c");
        assert_eq!(fmt.get_int(keys::WIDTH), Some(1024));
        assert_eq!(fmt.get_string(keys::WIDTH), None);
        assert_eq!(fmt.get_double(keys::FRAME_RATE), Some(29.97));
        assert_eq!(fmt.get_int(keys::FRAME_RATE), None);
        assert_eq!(fmt.get_string(keys::CODEC_NAME), Some("c"));
        assert_eq!(fmt.get_int(keys::HEIGHT), None);
    }

    #[test]
    fn test_int_widens() {
        let fmt = Format::new().with_int(keys::BITRATE, 5).with_long(keys::QUALITY, 7);
        assert_eq!(fmt.get_long(keys::BITRATE), Some(5));
        assert_eq!(fmt.get_double(keys::BITRATE), Some(5.0));
        assert_eq!(fmt.get_int(keys::QUALITY), None);
        assert_eq!(fmt.get_long(keys::QUALITY), Some(7));
    }

    #[test]
    fn test_display_is_sorted() {
        let fmt = Format::new().with_int(keys::WIDTH, 2).with_int(keys::HEIGHT, 1);
        assert_eq!(fmt.to_string(), "height=1, width=2");
    }
}
