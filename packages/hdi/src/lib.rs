//! Hardware codec driver interface for hcodec.
//!
//! This crate describes the driver side of a hardware video codec: a
//! component manager that enumerates and instantiates codec components, the
//! component itself (driven through the OMX command/parameter protocol), the
//! callback sink through which the component reports asynchronous events,
//! and the graphics surfaces that decoders render into and encoders read
//! from.
//!
//! # Component lifecycle
//!
//! ```ignore
//! use hcodec_hdi::{CodecCommand, Component, OmxState};
//!
//! component.send_command(CodecCommand::StateSet(OmxState::Idle))?;
//! // ... register buffers with use_buffer, wait for CmdComplete ...
//! component.send_command(CodecCommand::StateSet(OmxState::Executing))?;
//! component.fill_this_buffer(&output)?;
//! component.empty_this_buffer(&input)?;
//! ```
//!
//! # Feature Flags
//!
//! - `fake` - In-process fake driver ([`fake`]) for tests and demos

mod component;
mod error;
mod memory;
mod param;
mod surface;
mod types;

#[cfg(feature = "fake")]
pub mod fake;

pub use component::{Component, ComponentCallback, ComponentExt, ComponentManager};
pub use error::{HdiError, HdiResult};
pub use memory::SharedMemory;
pub use param::{
    AvcLoopFilter, AvcParams, AvcProfileType, BufferHandleUsage, ColorAspectsParam, ColorMatrix,
    ColorPrimaries, ColorRange, ColorTransfer, ConstantQuality, ControlRate, HevcParams,
    HevcProfileType, IntraRefreshVop, OmxParam, OutputCrop, Param, ParamIndex, PortDefinition,
    UseBufferType, VideoBitrate, VideoPortDefinition, VideoPortFormat, PICTURE_TYPE_B,
    PICTURE_TYPE_I, PICTURE_TYPE_P,
};
pub use surface::{
    AcquiredBuffer, BufferFlushConfig, BufferListener, BufferRequestConfig, GraphicPixelFormat,
    Rect, Surface, SurfaceAllocator, SurfaceBuffer, TransformType, BUFFER_USAGE_CPU_READ,
    BUFFER_USAGE_CPU_WRITE, BUFFER_USAGE_MEM_DMA,
};
pub use types::{
    BitRateMode, CodecBufferType, CodecCommand, CodecCompCapability, CodecEvent, CodecRole,
    CodecType, CodingType, CommandKind, HdiProfile, OmxCodecBuffer, OmxColorFormat, OmxState,
    PortIndex, RangeValue, Size, VideoPortCap, BUFFER_FLAG_CODECCONFIG, BUFFER_FLAG_EOS,
    BUFFER_FLAG_SYNCFRAME,
};
