//! Messages exchanged with the codec loop.

use std::fmt;
use std::sync::Arc;

use hcodec_hdi::{CodecEvent, OmxCodecBuffer, SharedMemory, Surface};

use crate::{BufferFlag, CodecBufferInfo, CodecCallback, CodecError, CodecResult, Format};

/// Message kind, used for logging and for the pending-reply table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum MsgWhat {
    Init,
    SetCallback,
    Configure,
    CreateInputSurface,
    SetInputSurface,
    SetOutputSurface,
    Start,
    GetInputFormat,
    GetOutputFormat,
    SetParameters,
    RequestIdrFrame,
    Flush,
    GetInputBuffer,
    QueueInputBuffer,
    NotifyEos,
    GetOutputBuffer,
    RenderOutputBuffer,
    ReleaseOutputBuffer,
    GetBufferFromSurface,
    CheckIfStuck,
    ForceShutdown,
    Stop,
    Release,
    CodecEvent,
    EmptyBufferDone,
    FillBufferDone,
}

impl fmt::Display for MsgWhat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Message payloads.
pub(crate) enum Msg {
    Init(String),
    SetCallback(Arc<dyn CodecCallback>),
    Configure(Format),
    CreateInputSurface,
    SetInputSurface(Arc<dyn Surface>),
    SetOutputSurface(Arc<dyn Surface>),
    Start,
    GetInputFormat,
    GetOutputFormat,
    SetParameters(Format),
    RequestIdrFrame,
    Flush,
    GetInputBuffer(u32),
    QueueInputBuffer {
        index: u32,
        info: CodecBufferInfo,
        flag: BufferFlag,
    },
    NotifyEos,
    GetOutputBuffer(u32),
    RenderOutputBuffer(u32),
    ReleaseOutputBuffer(u32),
    GetBufferFromSurface,
    /// Watchdog armed in the state of the given generation.
    CheckIfStuck(u64),
    ForceShutdown(u64),
    Stop,
    Release,
    CodecEvent(CodecEvent),
    EmptyBufferDone(u32),
    FillBufferDone(OmxCodecBuffer),
}

impl Msg {
    pub(crate) fn what(&self) -> MsgWhat {
        match self {
            Self::Init(_) => MsgWhat::Init,
            Self::SetCallback(_) => MsgWhat::SetCallback,
            Self::Configure(_) => MsgWhat::Configure,
            Self::CreateInputSurface => MsgWhat::CreateInputSurface,
            Self::SetInputSurface(_) => MsgWhat::SetInputSurface,
            Self::SetOutputSurface(_) => MsgWhat::SetOutputSurface,
            Self::Start => MsgWhat::Start,
            Self::GetInputFormat => MsgWhat::GetInputFormat,
            Self::GetOutputFormat => MsgWhat::GetOutputFormat,
            Self::SetParameters(_) => MsgWhat::SetParameters,
            Self::RequestIdrFrame => MsgWhat::RequestIdrFrame,
            Self::Flush => MsgWhat::Flush,
            Self::GetInputBuffer(_) => MsgWhat::GetInputBuffer,
            Self::QueueInputBuffer { .. } => MsgWhat::QueueInputBuffer,
            Self::NotifyEos => MsgWhat::NotifyEos,
            Self::GetOutputBuffer(_) => MsgWhat::GetOutputBuffer,
            Self::RenderOutputBuffer(_) => MsgWhat::RenderOutputBuffer,
            Self::ReleaseOutputBuffer(_) => MsgWhat::ReleaseOutputBuffer,
            Self::GetBufferFromSurface => MsgWhat::GetBufferFromSurface,
            Self::CheckIfStuck(_) => MsgWhat::CheckIfStuck,
            Self::ForceShutdown(_) => MsgWhat::ForceShutdown,
            Self::Stop => MsgWhat::Stop,
            Self::Release => MsgWhat::Release,
            Self::CodecEvent(_) => MsgWhat::CodecEvent,
            Self::EmptyBufferDone(_) => MsgWhat::EmptyBufferDone,
            Self::FillBufferDone(_) => MsgWhat::FillBufferDone,
        }
    }
}

/// Reply to a synchronous message.
pub(crate) enum Reply {
    Status(CodecResult),
    Format(CodecResult<Format>),
    Memory(CodecResult<SharedMemory>),
    Surface(CodecResult<Arc<dyn Surface>>),
}

fn mismatched<T>(expected: &str) -> CodecResult<T> {
    tracing::error!("reply is not a {}", expected);
    Err(CodecError::Unknown)
}

impl Reply {
    pub(crate) fn into_status(self) -> CodecResult {
        match self {
            Self::Status(r) => r,
            _ => mismatched("status"),
        }
    }

    pub(crate) fn into_format(self) -> CodecResult<Format> {
        match self {
            Self::Format(r) => r,
            Self::Status(Err(e)) => Err(e),
            _ => mismatched("format"),
        }
    }

    pub(crate) fn into_memory(self) -> CodecResult<SharedMemory> {
        match self {
            Self::Memory(r) => r,
            Self::Status(Err(e)) => Err(e),
            _ => mismatched("buffer"),
        }
    }

    pub(crate) fn into_surface(self) -> CodecResult<Arc<dyn Surface>> {
        match self {
            Self::Surface(r) => r,
            Self::Status(Err(e)) => Err(e),
            _ => mismatched("surface"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generic_error_reply_converts() {
        let reply = Reply::Status(Err(CodecError::InvalidState));
        assert_eq!(reply.into_memory().unwrap_err(), CodecError::InvalidState);
        let reply = Reply::Status(Ok(()));
        assert_eq!(reply.into_format().unwrap_err(), CodecError::Unknown);
        let reply = Reply::Format(Ok(Format::new()));
        assert_eq!(reply.into_status().unwrap_err(), CodecError::Unknown);
    }

    #[test]
    fn test_what() {
        assert_eq!(Msg::CheckIfStuck(3).what(), MsgWhat::CheckIfStuck);
        assert_eq!(Msg::GetInputBuffer(1).what().to_string(), "GetInputBuffer");
    }
}
