//! Hardware video codec driver.
//!
//! This crate drives an OMX-style hardware video component (see
//! [`hcodec_hdi`]) on behalf of a client. Each [`HCodec`] instance owns a
//! message loop thread; public calls are synchronous round-trips to it, and
//! driver callbacks are posted to the same loop. The loop runs a seven-state
//! machine (`Uninitialized`, `Initialized`, `Starting`, `Running`,
//! `OutputPortChanged`, `Flushing`, `Stopping`) and enforces a strict
//! ownership protocol over every input and output buffer slot.
//!
//! # Quick Start (Decoding)
//!
//! ```ignore
//! use hcodec::{keys, CodecOptions, Format, HCodec, HdiContext, PixelFormat};
//!
//! let decoder = HCodec::create("OMX.vendor.video.decoder.avc", ctx, CodecOptions::new())?;
//! decoder.set_callback(callback)?;
//! decoder.configure(
//!     &Format::new()
//!         .with_int(keys::WIDTH, 1920)
//!         .with_int(keys::HEIGHT, 1080)
//!         .with_int(keys::PIXEL_FORMAT, PixelFormat::Nv12.raw()),
//! )?;
//! decoder.start()?;
//!
//! // on_input_buffer_available(index): fill and queue
//! let memory = decoder.get_input_buffer(index)?;
//! memory.write_at(0, &access_unit);
//! decoder.queue_input_buffer(index, info, BufferFlag::NONE)?;
//! ```
//!
//! # Surfaces
//!
//! A decoder given an output surface renders frames into it with
//! [`HCodec::render_output_buffer`]. An encoder given an input surface
//! (from [`HCodec::create_input_surface`]) reads frames straight from it;
//! frames arriving while every input slot is busy, or before the codec is
//! started, are held back in the surface until a slot frees up. A flush or
//! a stop drops the frames still held back.
//!
//! # Feature Flags
//!
//! - `fake` - Build the `fake-codec` demo on the in-process fake driver

mod callback;
pub mod convert;
mod error;
mod format;
mod hcodec;
pub mod msg_loop;
mod options;
pub mod state_machine;
mod types;

pub use callback::{CodecCallback, ErrorType};
pub use error::{result_code, CodecError, CodecResult};
pub use format::{keys, Format, FormatValue};
pub use hcodec::{CapabilityData, CodecKind, HCodec, HCodecList, Range};
pub use options::{CodecOptions, HdiContext, DEFAULT_STUCK_TIMEOUT};
pub use types::{
    AvcProfile, BitrateMode, BufferFlag, CodecBufferInfo, ColorPrimary, HevcProfile,
    MatrixCoefficient, PixelFormat, TransferCharacteristic,
};
