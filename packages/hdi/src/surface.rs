//! Graphics surface (buffer queue) interface.
//!
//! A surface is a queue of graphic buffers with a producer end and a
//! consumer end. Decoders render into the producer end of a display
//! surface; encoders read frames from the consumer end of an input surface.

use std::fmt;
use std::sync::Arc;

use crate::{HdiResult, SharedMemory};

/// CPU may read the buffer.
pub const BUFFER_USAGE_CPU_READ: u64 = 1 << 0;
/// CPU may write the buffer.
pub const BUFFER_USAGE_CPU_WRITE: u64 = 1 << 1;
/// Buffer memory is DMA capable.
pub const BUFFER_USAGE_MEM_DMA: u64 = 1 << 3;

/// Pixel layout of a graphic buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicPixelFormat {
    /// 32-bit RGBA.
    Rgba8888,
    /// YUV 4:2:0 semi-planar, UV interleaved (NV12).
    Ycbcr420Sp,
    /// YUV 4:2:0 semi-planar, VU interleaved (NV21).
    Ycrcb420Sp,
    /// YUV 4:2:0 planar (I420).
    Ycbcr420P,
    /// No pixel format (compressed port).
    Butt,
}

impl GraphicPixelFormat {
    /// Wire value of this format.
    #[must_use]
    pub const fn raw(self) -> i32 {
        match self {
            Self::Rgba8888 => 12,
            Self::Ycbcr420Sp => 24,
            Self::Ycrcb420Sp => 25,
            Self::Ycbcr420P => 26,
            Self::Butt => i32::MAX,
        }
    }

    /// Parse a wire value.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            12 => Some(Self::Rgba8888),
            24 => Some(Self::Ycbcr420Sp),
            25 => Some(Self::Ycrcb420Sp),
            26 => Some(Self::Ycbcr420P),
            i32::MAX => Some(Self::Butt),
            _ => None,
        }
    }

    /// Bytes needed for one frame of `stride` x `height` pixels.
    #[must_use]
    pub fn frame_size(self, stride: u32, height: u32) -> usize {
        let pixels = stride as usize * height as usize;
        match self {
            Self::Rgba8888 => pixels * 4,
            Self::Butt => 0,
            _ => pixels * 3 / 2,
        }
    }
}

/// Display transform applied by the compositor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransformType {
    /// No rotation.
    #[default]
    RotateNone,
    /// Rotate 90 degrees.
    Rotate90,
    /// Rotate 180 degrees.
    Rotate180,
    /// Rotate 270 degrees.
    Rotate270,
}

/// Rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Parameters for requesting a buffer from a producer surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequestConfig {
    pub width: u32,
    pub height: u32,
    pub stride_alignment: u32,
    pub format: GraphicPixelFormat,
    pub usage: u64,
    /// Milliseconds to wait for a free buffer.
    pub timeout_ms: u32,
}

impl Default for BufferRequestConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
            stride_alignment: 1,
            format: GraphicPixelFormat::Ycbcr420Sp,
            usage: BUFFER_USAGE_CPU_READ | BUFFER_USAGE_CPU_WRITE | BUFFER_USAGE_MEM_DMA,
            timeout_ms: 0,
        }
    }
}

/// Parameters for flushing a rendered buffer to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferFlushConfig {
    /// Valid (cropped) region of the frame.
    pub damage: Rect,
    /// Presentation timestamp in microseconds.
    pub timestamp: i64,
}

/// A graphic buffer owned by a surface.
///
/// Buffers are identified by `seq_num`; two `SurfaceBuffer` handles with the
/// same sequence number refer to the same underlying graphic memory.
pub struct SurfaceBuffer {
    seq_num: u32,
    width: u32,
    height: u32,
    stride: u32,
    format: GraphicPixelFormat,
    usage: u64,
    memory: SharedMemory,
}

impl SurfaceBuffer {
    /// Wrap `memory` as a graphic buffer.
    #[must_use]
    pub fn new(
        seq_num: u32,
        config: &BufferRequestConfig,
        stride: u32,
        memory: SharedMemory,
    ) -> Self {
        Self {
            seq_num,
            width: config.width,
            height: config.height,
            stride,
            format: config.format,
            usage: config.usage,
            memory,
        }
    }

    #[must_use]
    pub fn seq_num(&self) -> u32 {
        self.seq_num
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    #[must_use]
    pub fn format(&self) -> GraphicPixelFormat {
        self.format
    }

    #[must_use]
    pub fn usage(&self) -> u64 {
        self.usage
    }

    /// Pixel memory of this buffer.
    #[must_use]
    pub fn memory(&self) -> &SharedMemory {
        &self.memory
    }

    /// Whether `other` is a handle to the same graphic buffer.
    #[must_use]
    pub fn same_handle(&self, other: &SurfaceBuffer) -> bool {
        self.seq_num == other.seq_num
    }
}

impl fmt::Debug for SurfaceBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceBuffer")
            .field("seq_num", &self.seq_num)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .finish()
    }
}

/// A buffer taken from the consumer end of a surface.
#[derive(Debug, Clone)]
pub struct AcquiredBuffer {
    pub buffer: Arc<SurfaceBuffer>,
    pub fence_fd: i32,
    /// Presentation timestamp in microseconds.
    pub timestamp: i64,
}

/// Callback fired by a surface when a buffer changes hands.
pub type BufferListener = Box<dyn Fn() + Send + Sync>;

/// One end of a graphic buffer queue.
///
/// Producer-side calls on a consumer surface (and the other way around)
/// fail with [`crate::HdiError::NotSupported`].
pub trait Surface: Send + Sync {
    /// Whether this handle is the consumer end.
    fn is_consumer(&self) -> bool;

    /// Take a free buffer to render into.
    fn request_buffer(&self, config: &BufferRequestConfig) -> HdiResult<Arc<SurfaceBuffer>>;

    /// Queue a rendered buffer for the consumer.
    fn flush_buffer(&self, buffer: &Arc<SurfaceBuffer>, config: &BufferFlushConfig) -> HdiResult;

    /// Return a requested buffer without rendering it.
    fn cancel_buffer(&self, buffer: &Arc<SurfaceBuffer>) -> HdiResult;

    /// Set how many buffers the queue may hold.
    fn set_queue_size(&self, size: u32) -> HdiResult;

    /// Set the display transform of the queued buffers.
    fn set_transform(&self, transform: TransformType) -> HdiResult;

    /// Fire `listener` each time the consumer releases a buffer.
    fn register_release_listener(&self, listener: BufferListener) -> HdiResult;

    /// Take the oldest queued buffer.
    fn acquire_buffer(&self) -> HdiResult<AcquiredBuffer>;

    /// Give an acquired buffer back to the producer.
    fn release_buffer(&self, buffer: &Arc<SurfaceBuffer>, fence_fd: i32) -> HdiResult;

    /// Fire `listener` each time the producer queues a buffer.
    fn register_consumer_listener(&self, listener: BufferListener) -> HdiResult;
}

/// Creates buffer queues.
pub trait SurfaceAllocator: Send + Sync {
    /// Create a new queue, returning `(consumer, producer)`.
    fn create_surface_pair(&self, name: &str) -> HdiResult<(Arc<dyn Surface>, Arc<dyn Surface>)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_raw_roundtrip() {
        for fmt in [
            GraphicPixelFormat::Rgba8888,
            GraphicPixelFormat::Ycbcr420Sp,
            GraphicPixelFormat::Ycrcb420Sp,
            GraphicPixelFormat::Ycbcr420P,
            GraphicPixelFormat::Butt,
        ] {
            assert_eq!(GraphicPixelFormat::from_raw(fmt.raw()), Some(fmt));
        }
        assert_eq!(GraphicPixelFormat::from_raw(-1), None);
    }

    #[test]
    fn test_frame_size() {
        assert_eq!(GraphicPixelFormat::Ycbcr420Sp.frame_size(64, 32), 64 * 32 * 3 / 2);
        assert_eq!(GraphicPixelFormat::Rgba8888.frame_size(64, 32), 64 * 32 * 4);
    }
}
