//! Component protocol types: ports, states, commands, events and buffer
//! descriptors.

use std::fmt;
use std::sync::Arc;

use crate::{SharedMemory, SurfaceBuffer};

/// The buffer marks the end of the stream.
pub const BUFFER_FLAG_EOS: u32 = 0x0000_0001;
/// The buffer holds a key frame.
pub const BUFFER_FLAG_SYNCFRAME: u32 = 0x0000_0020;
/// The buffer holds codec configuration data (SPS/PPS).
pub const BUFFER_FLAG_CODECCONFIG: u32 = 0x0000_0080;

/// One direction of a component's data flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PortIndex {
    /// Data flowing into the component.
    #[default]
    Input,
    /// Data flowing out of the component.
    Output,
}

impl PortIndex {
    /// Port value meaning "every port" in flush commands and events.
    pub const ALL: u32 = u32::MAX;

    /// Wire value of this port.
    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::Input => 0,
            Self::Output => 1,
        }
    }

    /// Parse a wire value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Input),
            1 => Some(Self::Output),
            _ => None,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

impl fmt::Display for PortIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Component state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OmxState {
    /// The component hit an unrecoverable error.
    Invalid,
    /// Created, no buffers.
    Loaded,
    /// Buffers allocated, not processing.
    Idle,
    /// Processing buffers.
    Executing,
}

impl OmxState {
    #[must_use]
    pub const fn raw(self) -> u32 {
        match self {
            Self::Invalid => 0,
            Self::Loaded => 1,
            Self::Idle => 2,
            Self::Executing => 3,
        }
    }

    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Invalid),
            1 => Some(Self::Loaded),
            2 => Some(Self::Idle),
            3 => Some(Self::Executing),
            _ => None,
        }
    }
}

/// Command kinds, as reported back in [`CodecEvent::CmdComplete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    StateSet,
    Flush,
    PortDisable,
    PortEnable,
}

/// Command sent to a component. Completion is reported asynchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecCommand {
    /// Move to a new state.
    StateSet(OmxState),
    /// Return every buffer held on a port (or [`PortIndex::ALL`]).
    Flush(u32),
    /// Disable a port. Completes once all of its buffers are freed.
    PortDisable(u32),
    /// Enable a port. Completes once it is repopulated.
    PortEnable(u32),
}

impl CodecCommand {
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::StateSet(_) => CommandKind::StateSet,
            Self::Flush(_) => CommandKind::Flush,
            Self::PortDisable(_) => CommandKind::PortDisable,
            Self::PortEnable(_) => CommandKind::PortEnable,
        }
    }

    /// Value echoed back as the `data` of the completion event.
    #[must_use]
    pub fn param(&self) -> u32 {
        match *self {
            Self::StateSet(state) => state.raw(),
            Self::Flush(port) | Self::PortDisable(port) | Self::PortEnable(port) => port,
        }
    }
}

/// Asynchronous event raised by a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecEvent {
    /// A command finished. `data` is the command's [`CodecCommand::param`].
    CmdComplete { cmd: CommandKind, data: u32 },
    /// The component hit an error.
    Error { code: i32 },
    /// The format of `port` changed. `index` is 0 or the parameter index
    /// that changed.
    PortSettingsChanged { port: u32, index: u32 },
}

/// Compression format of a video port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CodingType {
    /// Raw (uncompressed) port.
    #[default]
    Unused,
    Avc,
    Hevc,
}

/// Raw color format of a video port.
///
/// Components may report formats this crate has no name for, so this is a
/// transparent wrapper rather than a closed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OmxColorFormat(pub u32);

impl OmxColorFormat {
    pub const UNUSED: Self = Self(0);
    pub const YUV420_PLANAR: Self = Self(19);
    pub const YUV420_SEMI_PLANAR: Self = Self(21);
}

/// How a buffer's memory is passed to the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecBufferType {
    /// Shared memory, by descriptor.
    AvShareMemFd,
    /// A graphic buffer handle fixed at allocation.
    Handle,
    /// A graphic buffer handle supplied anew with each empty call.
    DynamicHandle,
}

/// Buffer descriptor exchanged with the component.
#[derive(Debug, Clone)]
pub struct OmxCodecBuffer {
    /// Assigned by the component on `use_buffer`.
    pub buffer_id: u32,
    pub buffer_type: CodecBufferType,
    pub alloc_len: u32,
    pub filled_len: u32,
    pub offset: u32,
    pub fence_fd: i32,
    /// Presentation timestamp in microseconds.
    pub pts: i64,
    /// `BUFFER_FLAG_*` bits.
    pub flag: u32,
    /// Read-only for the component (input buffers).
    pub read_only: bool,
    pub memory: Option<SharedMemory>,
    pub handle: Option<Arc<SurfaceBuffer>>,
}

impl OmxCodecBuffer {
    /// Describe a shared memory block of `size` bytes.
    #[must_use]
    pub fn from_shared_memory(memory: SharedMemory, size: u32, read_only: bool) -> Self {
        Self {
            buffer_id: 0,
            buffer_type: CodecBufferType::AvShareMemFd,
            alloc_len: size,
            filled_len: 0,
            offset: 0,
            fence_fd: -1,
            pts: 0,
            flag: 0,
            read_only,
            memory: Some(memory),
            handle: None,
        }
    }

    /// Describe a graphic buffer.
    #[must_use]
    pub fn from_surface_buffer(buffer: Arc<SurfaceBuffer>) -> Self {
        let alloc_len = u32::try_from(buffer.memory().size()).unwrap_or(u32::MAX);
        Self {
            buffer_id: 0,
            buffer_type: CodecBufferType::Handle,
            alloc_len,
            filled_len: 0,
            offset: 0,
            fence_fd: -1,
            pts: 0,
            flag: 0,
            read_only: false,
            memory: None,
            handle: Some(buffer),
        }
    }

    /// Describe an empty dynamic-handle slot.
    #[must_use]
    pub fn dynamic() -> Self {
        Self {
            buffer_id: 0,
            buffer_type: CodecBufferType::DynamicHandle,
            alloc_len: 0,
            filled_len: 0,
            offset: 0,
            fence_fd: -1,
            pts: 0,
            flag: 0,
            read_only: false,
            memory: None,
            handle: None,
        }
    }

    #[must_use]
    pub fn is_eos(&self) -> bool {
        self.flag & BUFFER_FLAG_EOS != 0
    }
}

/// Codec kind advertised by a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    VideoDecoder,
    VideoEncoder,
    AudioDecoder,
    AudioEncoder,
}

/// Media role advertised by a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecRole {
    VideoAvc,
    VideoHevc,
    VideoMpeg4,
    AudioAac,
}

/// Bitrate control mode advertised by an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitRateMode {
    Invalid,
    Vbr,
    Cbr,
    Cq,
}

/// Profile identifiers advertised in capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HdiProfile {
    AvcBaseline,
    AvcMain,
    AvcHigh,
    HevcMain,
    HevcMain10,
}

/// Inclusive integer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RangeValue {
    pub min: i32,
    pub max: i32,
}

impl RangeValue {
    #[must_use]
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }
}

/// Width and height in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

/// Video port limits of a component.
#[derive(Debug, Clone, Default)]
pub struct VideoPortCap {
    pub min_size: Size,
    pub max_size: Size,
    pub width_alignment: i32,
    pub height_alignment: i32,
    pub block_count: RangeValue,
    pub blocks_per_second: RangeValue,
    pub block_size: Size,
    /// Raw [`crate::GraphicPixelFormat`] values.
    pub supported_pix_fmts: Vec<i32>,
    pub bit_rate_modes: Vec<BitRateMode>,
    pub frame_rate: RangeValue,
    /// Flattened `(width, height, min_fps, max_fps)` quadruples.
    pub measured_frame_rate: Vec<i32>,
}

/// Capability record of one component.
#[derive(Debug, Clone)]
pub struct CodecCompCapability {
    pub role: CodecRole,
    pub codec_type: CodecType,
    pub comp_name: String,
    pub supported_profiles: Vec<HdiProfile>,
    /// Maximum number of live instances of this component.
    pub max_inst: u32,
    pub is_software: bool,
    pub bit_rate: RangeValue,
    pub can_swap_width_height: bool,
    pub port: VideoPortCap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_raw() {
        assert_eq!(PortIndex::from_raw(PortIndex::Input.raw()), Some(PortIndex::Input));
        assert_eq!(PortIndex::from_raw(PortIndex::Output.raw()), Some(PortIndex::Output));
        assert_eq!(PortIndex::from_raw(PortIndex::ALL), None);
    }

    #[test]
    fn test_command_param_echoes_target() {
        let cmd = CodecCommand::StateSet(OmxState::Idle);
        assert_eq!(cmd.kind(), CommandKind::StateSet);
        assert_eq!(OmxState::from_raw(cmd.param()), Some(OmxState::Idle));
        assert_eq!(CodecCommand::Flush(PortIndex::ALL).param(), PortIndex::ALL);
    }

    #[test]
    fn test_dynamic_buffer_is_empty() {
        let buf = OmxCodecBuffer::dynamic();
        assert_eq!(buf.alloc_len, 0);
        assert_eq!(buf.buffer_type, CodecBufferType::DynamicHandle);
        assert!(buf.handle.is_none() && buf.memory.is_none());
    }
}
