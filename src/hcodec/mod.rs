//! Hardware video codec instance.
//!
//! [`HCodec`] wraps one driver component. Every call is a synchronous
//! round-trip to the instance's message loop thread, which owns all state;
//! driver callbacks are posted to the same loop, so all state changes are
//! totally ordered.
//!
//! ```no_run
//! use std::sync::Arc;
//! use hcodec::{keys, CodecOptions, Format, HCodec, HdiContext, PixelFormat};
//! # fn run(ctx: HdiContext, callback: Arc<dyn hcodec::CodecCallback>) -> hcodec::CodecResult {
//! let codec = HCodec::create("OMX.vendor.video.decoder.avc", ctx, CodecOptions::new())?;
//! codec.set_callback(callback)?;
//! let format = Format::new()
//!     .with_int(keys::WIDTH, 1920)
//!     .with_int(keys::HEIGHT, 1080)
//!     .with_int(keys::PIXEL_FORMAT, PixelFormat::Nv12.raw());
//! codec.configure(&format)?;
//! codec.start()?;
//! # Ok(())
//! # }
//! ```

mod buffer;
mod codec;
mod decoder;
mod encoder;
mod list;
mod msg;
mod state;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use hcodec_hdi::{CodecType, SharedMemory, Surface};

pub use list::{CapabilityData, CodecKind, HCodecList, Range};

use self::codec::{Codec, Direction};
use self::msg::{Msg, Reply};
use self::state::StateId;
use crate::convert::role_to_coding_type;
use crate::format::keys;
use crate::msg_loop::MsgLoop;
use crate::state_machine::StateMachine;
use crate::{
    BufferFlag, CodecBufferInfo, CodecCallback, CodecError, CodecOptions, CodecResult, Format,
    HdiContext,
};

/// A hardware encoder or decoder instance.
pub struct HCodec {
    msg_loop: MsgLoop<Msg, Reply, Codec>,
    name: String,
    direction: Direction,
    sync_timeout: Option<Duration>,
}

impl HCodec {
    /// Create an instance of component `name`.
    ///
    /// Whether it encodes or decodes, and which coding it handles, comes
    /// from the driver's capability record of `name`.
    ///
    /// # Errors
    ///
    /// - [`CodecError::InvalidVal`] if the driver has no component `name`.
    /// - [`CodecError::Unsupported`] if it is not an AVC/HEVC video codec.
    /// - [`CodecError::Unknown`] if the component cannot be created, for
    ///   instance when its instance limit is reached.
    pub fn create(name: &str, ctx: HdiContext, options: CodecOptions) -> CodecResult<Self> {
        let Some(cap) = HCodecList::find(ctx.manager.as_ref(), name)? else {
            tracing::error!("no component named {}", name);
            return Err(CodecError::InvalidVal);
        };
        let coding = role_to_coding_type(cap.role).ok_or(CodecError::Unsupported)?;
        let direction = match cap.codec_type {
            CodecType::VideoDecoder => Direction::Decoder,
            CodecType::VideoEncoder => Direction::Encoder,
            other => {
                tracing::error!("{} is a {:?}, not a video codec", name, other);
                return Err(CodecError::Unsupported);
            }
        };
        let sync_timeout = options.sync_timeout;
        let msg_loop = MsgLoop::spawn(&format!("{}_loop", direction), move |handle| {
            let mut codec = Codec::new(direction, coding, ctx, options, handle);
            codec.change_state_to(StateId::Uninitialized);
            codec
        })
        .map_err(|e| {
            tracing::error!("spawn message loop failed: {}", e);
            CodecError::Unknown
        })?;
        let codec = Self {
            msg_loop,
            name: name.to_string(),
            direction,
            sync_timeout,
        };
        codec.init()?;
        tracing::info!("{} {} created", direction, name);
        Ok(codec)
    }

    fn init(&self) -> CodecResult {
        self.send(Msg::Init(self.name.clone()))?.into_status()
    }

    fn send(&self, msg: Msg) -> CodecResult<Reply> {
        let what = msg.what();
        self.msg_loop
            .handle()
            .send_sync(msg, self.sync_timeout)
            .ok_or_else(|| {
                tracing::error!("{} got no reply in time", what);
                CodecError::Unknown
            })
    }

    fn status(&self, msg: Msg) -> CodecResult {
        self.send(msg)?.into_status()
    }

    /// Component name this instance was created with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_encoder(&self) -> bool {
        self.direction == Direction::Encoder
    }

    /// Register the receiver of asynchronous events. Required before
    /// [`HCodec::start`].
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidState`] unless the instance is initialized and
    /// not started.
    pub fn set_callback(&self, callback: Arc<dyn CodecCallback>) -> CodecResult {
        self.status(Msg::SetCallback(callback))
    }

    /// Negotiate port formats. `width`, `height` and `pixel_format` are
    /// required; encoder rate control, profile and color settings are
    /// applied on a best-effort basis.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidVal`] if a required key is missing or invalid.
    pub fn configure(&self, format: &Format) -> CodecResult {
        self.status(Msg::Configure(format.clone()))
    }

    /// Create the surface an encoder reads its frames from. Render into the
    /// returned producer.
    ///
    /// # Errors
    ///
    /// [`CodecError::Unsupported`] on a decoder,
    /// [`CodecError::InvalidOperation`] if an input surface is already set.
    pub fn create_input_surface(&self) -> CodecResult<Arc<dyn Surface>> {
        self.send(Msg::CreateInputSurface)?.into_surface()
    }

    /// Make an encoder read its frames from the consumer end `surface`.
    ///
    /// # Errors
    ///
    /// [`CodecError::Unsupported`] on a decoder,
    /// [`CodecError::InvalidVal`] if `surface` is a producer.
    pub fn set_input_surface(&self, surface: Arc<dyn Surface>) -> CodecResult {
        self.status(Msg::SetInputSurface(surface))
    }

    /// Make a decoder render into the producer end `surface`.
    ///
    /// # Errors
    ///
    /// [`CodecError::Unsupported`] on an encoder,
    /// [`CodecError::InvalidVal`] if `surface` is a consumer.
    pub fn set_output_surface(&self, surface: Arc<dyn Surface>) -> CodecResult {
        self.status(Msg::SetOutputSurface(surface))
    }

    /// Allocate buffers and start processing. Returns once the component is
    /// executing.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidOperation`] if no callback is set or the
    /// instance is not configured.
    pub fn start(&self) -> CodecResult {
        self.status(Msg::Start)
    }

    /// Stop processing and free buffers. The configuration is kept, so
    /// [`HCodec::start`] may be called again. No-op when not started.
    ///
    /// # Errors
    ///
    /// [`CodecError::Unknown`] if the driver rejects the transition.
    pub fn stop(&self) -> CodecResult {
        self.status(Msg::Stop)
    }

    /// Drop all buffers in flight. Input buffers are handed out again
    /// afterwards.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidState`] unless running.
    pub fn flush(&self) -> CodecResult {
        self.status(Msg::Flush)
    }

    /// Release the component and create it anew. The configuration is lost.
    ///
    /// # Errors
    ///
    /// Any error of [`HCodec::release`] or of re-creating the component.
    pub fn reset(&self) -> CodecResult {
        self.release()?;
        self.init()
    }

    /// Stop and release the driver component. No-op when already released.
    ///
    /// # Errors
    ///
    /// [`CodecError::Unknown`] if the driver rejects the transition.
    pub fn release(&self) -> CodecResult {
        self.status(Msg::Release)
    }

    /// Negotiated input format.
    ///
    /// # Errors
    ///
    /// [`CodecError::Unknown`] if not configured yet.
    pub fn input_format(&self) -> CodecResult<Format> {
        self.send(Msg::GetInputFormat)?.into_format()
    }

    /// Negotiated output format, with the component name under
    /// [`keys::CODEC_NAME`].
    ///
    /// # Errors
    ///
    /// [`CodecError::Unknown`] if not configured yet.
    pub fn output_format(&self) -> CodecResult<Format> {
        let mut format = self.send(Msg::GetOutputFormat)?.into_format()?;
        format.set_string(keys::CODEC_NAME, self.name.clone());
        Ok(format)
    }

    /// Change parameters while running: `req_i_frame` for encoders,
    /// `rotation_angle` for decoders rendering to a surface.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidVal`] for an unknown rotation angle,
    /// [`CodecError::Unknown`] if the driver rejects the parameter.
    pub fn set_parameters(&self, format: &Format) -> CodecResult {
        self.status(Msg::SetParameters(format.clone()))
    }

    /// Make the next encoded frame an IDR frame.
    ///
    /// # Errors
    ///
    /// [`CodecError::Unsupported`] on a decoder.
    pub fn request_idr_frame(&self) -> CodecResult {
        self.status(Msg::RequestIdrFrame)
    }

    /// Memory of input buffer `index`, which must be owned by the caller.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidState`] if the buffer is not the caller's,
    /// [`CodecError::InvalidOperation`] with an input surface.
    pub fn get_input_buffer(&self, index: u32) -> CodecResult<SharedMemory> {
        self.send(Msg::GetInputBuffer(index))?.into_memory()
    }

    /// Hand input buffer `index`, filled as described by `info`, to the
    /// codec. Queuing after end of stream keeps the buffer.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidState`] if the buffer is not the caller's,
    /// [`CodecError::InvalidVal`] if `info` does not fit the buffer.
    pub fn queue_input_buffer(
        &self,
        index: u32,
        info: CodecBufferInfo,
        flag: BufferFlag,
    ) -> CodecResult {
        self.status(Msg::QueueInputBuffer { index, info, flag })
    }

    /// Signal end of stream on an encoder reading from a surface.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidOperation`] without an input surface,
    /// [`CodecError::Unsupported`] on a decoder.
    pub fn notify_eos(&self) -> CodecResult {
        self.status(Msg::NotifyEos)
    }

    /// Memory of output buffer `index`, which must be owned by the caller.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidState`] if the buffer is not the caller's,
    /// [`CodecError::InvalidOperation`] with an output surface.
    pub fn get_output_buffer(&self, index: u32) -> CodecResult<SharedMemory> {
        self.send(Msg::GetOutputBuffer(index))?.into_memory()
    }

    /// Give output buffer `index` back without rendering it.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidState`] if the buffer is not the caller's.
    pub fn release_output_buffer(&self, index: u32) -> CodecResult {
        self.status(Msg::ReleaseOutputBuffer(index))
    }

    /// Queue decoded buffer `index` to the output surface for display.
    ///
    /// # Errors
    ///
    /// [`CodecError::InvalidState`] if the buffer is not the caller's,
    /// [`CodecError::InvalidOperation`] without an output surface.
    pub fn render_output_buffer(&self, index: u32) -> CodecResult {
        self.status(Msg::RenderOutputBuffer(index))
    }
}

impl Drop for HCodec {
    fn drop(&mut self) {
        if let Some(mut codec) = self.msg_loop.stop() {
            codec.release_component();
        }
        tracing::info!("{} {} destroyed", self.direction, self.name);
    }
}
