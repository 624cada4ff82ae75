//! Client callback interface.

use crate::{BufferFlag, CodecBufferInfo, CodecError, Format};

/// Origin of an error reported through [`CodecCallback::on_error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Raised by the codec itself or its driver.
    Internal,
    /// Raised by an extension.
    Extend,
}

/// Receives asynchronous codec notifications.
///
/// Every method is called on the codec's message loop thread. Every codec
/// operation is a round-trip through that same thread, so implementations
/// must not call back into the instance; hand the event to another thread
/// (for example through a channel) instead.
pub trait CodecCallback: Send + Sync {
    /// A fatal error happened. The instance should be released.
    fn on_error(&self, error_type: ErrorType, error: CodecError);

    /// The negotiated output format changed.
    fn on_output_format_changed(&self, format: &Format);

    /// Input buffer `index` is ready to be filled and queued.
    fn on_input_buffer_available(&self, index: u32);

    /// Output buffer `index` holds data described by `info`.
    fn on_output_buffer_available(&self, index: u32, info: CodecBufferInfo, flag: BufferFlag);
}
